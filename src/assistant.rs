// assistant.rs: The surface the UI layer talks to: capture screen context,
// send a message, switch backend, replace the preamble.
//
// All conversation mutation goes through one async mutex. The network call
// runs outside it; only the final history append re-acquires it.

use std::sync::Arc;
use tokio::sync::Mutex as TokioMutex;

use crate::ai::{BackendConfig, ChatMessage, ChatResult, ChatTransport};
use crate::capture::metadata::platform_inspector;
use crate::capture::ocr::RapidOcrEngine;
use crate::capture::screen::{FrameAcquirer, XcapDisplaySource};
use crate::capture::{ContextAssembler, ContextPostProcessor};
use crate::conversation::Conversation;
use crate::settings::Settings;

pub struct Assistant {
    conversation: TokioMutex<Conversation>,
    transport: TokioMutex<ChatTransport>,
    assembler: ContextAssembler,
    post_processor: Option<ContextPostProcessor>,
}

impl Assistant {
    pub fn new(assembler: ContextAssembler, transport: ChatTransport, system_preamble: &str) -> Self {
        Self {
            conversation: TokioMutex::new(Conversation::new(system_preamble)),
            transport: TokioMutex::new(transport),
            assembler,
            post_processor: None,
        }
    }

    pub fn with_post_processor(mut self, post_processor: ContextPostProcessor) -> Self {
        self.post_processor = Some(post_processor);
        self
    }

    /// Wire up the real screen, OS and HTTP collaborators from settings.
    pub fn from_settings(settings: &Settings) -> Self {
        let acquirer = FrameAcquirer::new(Arc::new(XcapDisplaySource))
            .with_timeout(settings.capture_timeout());
        let assembler = ContextAssembler::new(
            acquirer,
            Arc::from(platform_inspector()),
            Arc::new(RapidOcrEngine::new(settings.ocr_url.clone())),
        );
        let transport = ChatTransport::new(settings.backend.clone())
            .with_openai_base_url(settings.openai_url.clone())
            .with_ollama_base_url(settings.ollama_url.clone())
            .with_fallback_api_key(Settings::env_api_key());

        let assistant = Self::new(assembler, transport, &settings.system_preamble);
        log::info!("Assistant configured (backend={})", settings.backend.name());
        match &settings.post_process_url {
            Some(url) => assistant.with_post_processor(ContextPostProcessor::new(url.clone())),
            None => assistant,
        }
    }

    /// Capture the screen and hold the result for the next message.
    /// Returns the attached blob so the caller can show a preview.
    pub async fn capture_and_attach_context(&self) -> String {
        let mut blob = self.assembler.build_context().await;
        if let Some(pp) = &self.post_processor {
            blob = pp.process(blob).await;
        }
        log::info!("Screen context captured ({} chars)", blob.chars().count());
        self.conversation.lock().await.attach_context(blob.clone());
        blob
    }

    pub async fn send_message(&self, text: &str) -> ChatResult {
        let transport = self.transport.lock().await.clone();
        let request = {
            let mut conversation = self.conversation.lock().await;
            transport.prepare(&mut conversation, text)?
        };

        let reply = transport.dispatch(&request).await?;
        if request.backend.preserves_history() {
            self.conversation.lock().await.append_assistant(reply.clone());
        }
        Ok(reply)
    }

    pub async fn set_backend(&self, backend: BackendConfig) {
        self.transport.lock().await.set_backend(backend);
    }

    pub async fn backend(&self) -> BackendConfig {
        self.transport.lock().await.backend().clone()
    }

    pub async fn set_system_preamble(&self, preamble: &str) {
        self.conversation.lock().await.set_system_preamble(preamble);
        log::info!("System preamble updated ({} chars)", preamble.len());
    }

    pub async fn system_preamble(&self) -> String {
        self.conversation.lock().await.system_preamble().to_string()
    }

    pub async fn history(&self) -> Vec<ChatMessage> {
        self.conversation.lock().await.history().to_vec()
    }

    pub async fn pending_context(&self) -> Option<String> {
        self.conversation
            .lock()
            .await
            .pending_context()
            .map(str::to_string)
    }
}
