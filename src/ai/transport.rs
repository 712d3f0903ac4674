// transport.rs: One request/response contract over every chat backend.
//
// Request shaping and response parsing dispatch on `BackendConfig`; the HTTP
// exchange and the failure classification are shared.

use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use super::companion::{self, CompanionChatRequest};
use super::ollama::{self, OllamaRequest};
use super::openai::{self, OpenAiRequest};
use super::{BackendConfig, ChatError, ChatResult};
use crate::conversation::Conversation;

/// A fully-shaped request, detached from the conversation so the network call
/// can run without holding any lock on it.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub url: String,
    pub body: Value,
    pub bearer_token: Option<String>,
    pub timeout: Duration,
    pub backend: BackendConfig,
}

impl PreparedRequest {
    /// Number of messages in the outgoing body, for logging.
    pub fn message_count(&self) -> usize {
        self.body["messages"].as_array().map_or(0, Vec::len)
    }
}

#[derive(Debug, Clone)]
pub struct ChatTransport {
    client: Client,
    backend: BackendConfig,
    openai_base_url: String,
    ollama_base_url: String,
    /// Used when the OpenAI backend carries no key of its own. Never persisted.
    fallback_api_key: Option<String>,
}

impl ChatTransport {
    pub fn new(backend: BackendConfig) -> Self {
        Self {
            client: Client::new(),
            backend,
            openai_base_url: openai::DEFAULT_BASE_URL.into(),
            ollama_base_url: ollama::DEFAULT_BASE_URL.into(),
            fallback_api_key: None,
        }
    }

    pub fn with_openai_base_url(mut self, url: impl Into<String>) -> Self {
        self.openai_base_url = url.into();
        self
    }

    pub fn with_ollama_base_url(mut self, url: impl Into<String>) -> Self {
        self.ollama_base_url = url.into();
        self
    }

    pub fn with_fallback_api_key(mut self, key: Option<String>) -> Self {
        self.fallback_api_key = key.filter(|k| !k.trim().is_empty());
        self
    }

    pub fn backend(&self) -> &BackendConfig {
        &self.backend
    }

    /// Switch backends. Conversation state lives elsewhere and is untouched.
    pub fn set_backend(&mut self, backend: BackendConfig) {
        log::info!("Chat backend switched: {} -> {}", self.backend.name(), backend.name());
        self.backend = backend;
    }

    /// Consume pending context and shape the request for the active backend.
    ///
    /// For the history-preserving backend the user turn is appended to the
    /// transcript here, before the call is made.
    pub fn prepare(
        &self,
        conversation: &mut Conversation,
        user_text: &str,
    ) -> Result<PreparedRequest, ChatError> {
        // A missing key leaves the pending context in place.
        let openai_key = match &self.backend {
            BackendConfig::OpenAi { api_key, .. } if !api_key.trim().is_empty() => {
                Some(api_key.clone())
            }
            BackendConfig::OpenAi { .. } => match &self.fallback_api_key {
                Some(key) => Some(key.clone()),
                None => {
                    return Err(ChatError::NotConfigured(
                        "OpenAI API key not configured".into(),
                    ))
                }
            },
            _ => None,
        };
        let content = conversation.compose_user_content(user_text);

        let prepared = match &self.backend {
            BackendConfig::OpenAi { model, .. } => {
                let messages = conversation.stateless_messages(&content);
                PreparedRequest {
                    url: openai::endpoint(&self.openai_base_url),
                    body: to_body(&OpenAiRequest {
                        model,
                        messages: &messages,
                    })?,
                    bearer_token: openai_key,
                    timeout: openai::REQUEST_TIMEOUT,
                    backend: self.backend.clone(),
                }
            }
            BackendConfig::Ollama { model } => {
                let messages = conversation.stateless_messages(&content);
                PreparedRequest {
                    url: ollama::endpoint(&self.ollama_base_url),
                    body: to_body(&OllamaRequest {
                        model,
                        messages: &messages,
                        stream: false,
                    })?,
                    bearer_token: None,
                    timeout: ollama::REQUEST_TIMEOUT,
                    backend: self.backend.clone(),
                }
            }
            BackendConfig::LocalService { base_url } => {
                conversation.append_user(content);
                PreparedRequest {
                    url: companion::chat_endpoint(base_url),
                    body: to_body(&CompanionChatRequest {
                        messages: conversation.history(),
                    })?,
                    bearer_token: None,
                    timeout: companion::REQUEST_TIMEOUT,
                    backend: self.backend.clone(),
                }
            }
        };
        Ok(prepared)
    }

    /// Perform the HTTP exchange and normalise the outcome.
    pub async fn dispatch(&self, request: &PreparedRequest) -> ChatResult {
        log::debug!(
            "Chat POST {} ({} messages, backend={})",
            request.url,
            request.message_count(),
            request.backend.name()
        );

        let mut req = self
            .client
            .post(&request.url)
            .timeout(request.timeout)
            .header("Content-Type", "application/json");
        if let Some(token) = &request.bearer_token {
            req = req.header("Authorization", format!("Bearer {}", token));
        }

        let response = req.json(&request.body).send().await.map_err(|e| {
            log::error!("Chat service error: {}", e);
            ChatError::Transport(e.to_string())
        })?;

        let status = response.status();
        let raw_body = response.text().await.map_err(|e| {
            log::error!("Failed to read chat response body: {}", e);
            ChatError::Transport(e.to_string())
        })?;

        if !status.is_success() {
            log::error!("Chat HTTP {}: {}", status.as_u16(), raw_body);
            return Err(ChatError::Http {
                status: status.as_u16(),
                raw_body,
            });
        }

        let parsed = match &request.backend {
            BackendConfig::OpenAi { .. } => openai::parse_response(&raw_body),
            BackendConfig::Ollama { .. } => ollama::parse_response(&raw_body),
            BackendConfig::LocalService { .. } => companion::parse_response(&raw_body),
        };
        parsed.map_err(|message| {
            log::error!("Chat decode failed ({}). Raw={}", message, raw_body);
            ChatError::Decode { message, raw_body }
        })
    }

    /// `prepare` + `dispatch`, recording the reply for history-preserving backends.
    pub async fn send(&self, conversation: &mut Conversation, user_text: &str) -> ChatResult {
        let request = self.prepare(conversation, user_text)?;
        let reply = self.dispatch(&request).await?;
        if request.backend.preserves_history() {
            conversation.append_assistant(reply.clone());
        }
        Ok(reply)
    }
}

fn to_body<T: serde::Serialize>(request: &T) -> Result<Value, ChatError> {
    serde_json::to_value(request).map_err(|e| ChatError::Transport(format!("encode request: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::Role;

    #[test]
    fn openai_request_has_bearer_and_two_messages() {
        let transport = ChatTransport::new(BackendConfig::OpenAi {
            api_key: "sk-test".into(),
            model: "gpt-4o".into(),
        });
        let mut conv = Conversation::new("pre");
        conv.append_user("old turn");

        let req = transport.prepare(&mut conv, "hi").unwrap();
        assert_eq!(req.url, "https://api.openai.com/v1/chat/completions");
        assert_eq!(req.bearer_token.as_deref(), Some("sk-test"));
        assert_eq!(req.message_count(), 2);
        assert_eq!(req.body["messages"][1]["content"], "hi");
        // stateless backends never grow the transcript
        assert_eq!(conv.history().len(), 2);
    }

    #[test]
    fn openai_without_key_is_not_configured() {
        let transport = ChatTransport::new(BackendConfig::OpenAi {
            api_key: "  ".into(),
            model: "gpt-4o".into(),
        });
        let mut conv = Conversation::new("pre");
        conv.attach_context("ctx");
        let err = transport.prepare(&mut conv, "hi").unwrap_err();
        assert!(matches!(err, ChatError::NotConfigured(_)));
        assert_eq!(conv.pending_context(), Some("ctx"));
    }

    #[test]
    fn fallback_key_applies_only_when_stored_key_is_empty() {
        let fallback = Some("sk-env".to_string());
        let mut conv = Conversation::new("pre");

        let empty = ChatTransport::new(BackendConfig::OpenAi {
            api_key: String::new(),
            model: "gpt-4o".into(),
        })
        .with_fallback_api_key(fallback.clone());
        let req = empty.prepare(&mut conv, "hi").unwrap();
        assert_eq!(req.bearer_token.as_deref(), Some("sk-env"));
        // the configured backend itself never picks up the fallback
        assert_eq!(
            empty.backend(),
            &BackendConfig::OpenAi {
                api_key: String::new(),
                model: "gpt-4o".into()
            }
        );

        let stored = ChatTransport::new(BackendConfig::OpenAi {
            api_key: "sk-stored".into(),
            model: "gpt-4o".into(),
        })
        .with_fallback_api_key(fallback);
        let req = stored.prepare(&mut conv, "hi").unwrap();
        assert_eq!(req.bearer_token.as_deref(), Some("sk-stored"));

        let blank = ChatTransport::new(BackendConfig::OpenAi {
            api_key: String::new(),
            model: "gpt-4o".into(),
        })
        .with_fallback_api_key(Some("   ".into()));
        assert!(matches!(
            blank.prepare(&mut conv, "hi"),
            Err(ChatError::NotConfigured(_))
        ));
    }

    #[test]
    fn ollama_request_uses_loopback_and_no_auth() {
        let transport = ChatTransport::new(BackendConfig::Ollama {
            model: "llama3".into(),
        });
        let mut conv = Conversation::new("pre");
        let req = transport.prepare(&mut conv, "hi").unwrap();
        assert_eq!(req.url, "http://127.0.0.1:11434/api/chat");
        assert!(req.bearer_token.is_none());
        assert_eq!(req.body["stream"], serde_json::json!(false));
        assert_eq!(req.timeout, ollama::REQUEST_TIMEOUT);
        assert!(req.timeout > openai::REQUEST_TIMEOUT);
    }

    #[test]
    fn local_service_appends_user_turn_and_sends_history() {
        let transport = ChatTransport::new(BackendConfig::LocalService {
            base_url: "http://127.0.0.1:5001".into(),
        });
        let mut conv = Conversation::new("pre");
        conv.attach_context("ctx");

        let req = transport.prepare(&mut conv, "hi").unwrap();
        assert_eq!(req.url, "http://127.0.0.1:5001/chat");
        assert_eq!(conv.history().len(), 2);
        assert_eq!(conv.history()[1].role, Role::User);
        assert_eq!(req.body["messages"][0]["role"], "system");
        assert_eq!(req.body["messages"][1]["content"], "Context:\nctx\n\nUser:\nhi");
    }

    #[test]
    fn set_backend_keeps_base_urls() {
        let mut transport = ChatTransport::new(BackendConfig::default())
            .with_ollama_base_url("http://127.0.0.1:9999");
        transport.set_backend(BackendConfig::Ollama {
            model: "mistral".into(),
        });
        let mut conv = Conversation::new("pre");
        let req = transport.prepare(&mut conv, "hi").unwrap();
        assert_eq!(req.url, "http://127.0.0.1:9999/api/chat");
        assert_eq!(transport.backend().name(), "ollama");
    }
}
