// conversation.rs: Rolling transcript plus the one-shot "pending context" slot.

use crate::ai::{ChatMessage, Role};

/// Conversation state shared by every backend.
///
/// The history always starts with the system preamble at index 0. Only
/// history-preserving backends append user/assistant turns to it; stateless
/// backends read just the preamble.
#[derive(Debug, Clone)]
pub struct Conversation {
    history: Vec<ChatMessage>,
    /// Screen context waiting to be attached to the next user message.
    pending_context: Option<String>,
}

impl Conversation {
    pub fn new(system_preamble: impl Into<String>) -> Self {
        Self {
            history: vec![ChatMessage::system(system_preamble)],
            pending_context: None,
        }
    }

    /// Set the pending context, replacing any blob that was never sent.
    pub fn attach_context(&mut self, blob: impl Into<String>) {
        if self.pending_context.is_some() {
            log::debug!("Overwriting unconsumed pending context");
        }
        self.pending_context = Some(blob.into());
    }

    pub fn pending_context(&self) -> Option<&str> {
        self.pending_context.as_deref()
    }

    /// Build the outgoing user content, consuming the pending context.
    ///
    /// A non-empty pending blob turns `text` into
    /// `"Context:\n<blob>\n\nUser:\n<text>"`; the slot is empty afterwards
    /// either way.
    pub fn compose_user_content(&mut self, text: &str) -> String {
        match self.pending_context.take() {
            Some(ctx) if !ctx.is_empty() => format!("Context:\n{}\n\nUser:\n{}", ctx, text),
            _ => text.to_string(),
        }
    }

    pub fn append_user(&mut self, content: impl Into<String>) {
        self.history.push(ChatMessage::user(content));
    }

    pub fn append_assistant(&mut self, content: impl Into<String>) {
        self.history.push(ChatMessage::assistant(content));
    }

    pub fn system_preamble(&self) -> &str {
        match self.history.first() {
            Some(msg) if msg.role == Role::System => &msg.content,
            _ => "",
        }
    }

    /// Rewrite the system entry at index 0 in place.
    pub fn set_system_preamble(&mut self, preamble: impl Into<String>) {
        let entry = ChatMessage::system(preamble);
        match self.history.first_mut() {
            Some(first) if first.role == Role::System => *first = entry,
            _ => self.history.insert(0, entry),
        }
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Messages for a stateless backend: the preamble and the current turn only.
    pub fn stateless_messages(&self, user_content: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(self.system_preamble()),
            ChatMessage::user(user_content),
        ]
    }
}
