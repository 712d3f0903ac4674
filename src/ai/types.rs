use serde::{Deserialize, Serialize};

/// Result of a single `send`: the assistant's reply text, or a classified failure.
pub type ChatResult = Result<String, ChatError>;

/// One entry of the conversation transcript, serialised as `{role, content}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// The active chat backend. Exactly one is selected at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum BackendConfig {
    /// Hosted OpenAI-style chat completions API.
    #[serde(rename_all = "camelCase")]
    OpenAi { api_key: String, model: String },
    /// Ollama-style local model server.
    Ollama { model: String },
    /// Local companion service that keeps the whole transcript.
    #[serde(rename_all = "camelCase")]
    LocalService { base_url: String },
}

impl BackendConfig {
    /// Only the companion service receives (and accumulates) the full history.
    pub fn preserves_history(&self) -> bool {
        matches!(self, BackendConfig::LocalService { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            BackendConfig::OpenAi { .. } => "openai",
            BackendConfig::Ollama { .. } => "ollama",
            BackendConfig::LocalService { .. } => "local-service",
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::LocalService {
            base_url: "http://127.0.0.1:5001".into(),
        }
    }
}

/// Coarse classification of a chat failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    HttpError,
    DecodeError,
}

/// Error type for chat operations
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Connection failed: {0}")]
    Transport(String),
    #[error("Backend not configured: {0}")]
    NotConfigured(String),
    #[error("HTTP {status}: {raw_body}")]
    Http { status: u16, raw_body: String },
    #[error("Invalid response: {message}")]
    Decode { message: String, raw_body: String },
}

impl ChatError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChatError::Transport(_) | ChatError::NotConfigured(_) => ErrorKind::Transport,
            ChatError::Http { .. } => ErrorKind::HttpError,
            ChatError::Decode { .. } => ErrorKind::DecodeError,
        }
    }

    pub fn http_status(&self) -> Option<u16> {
        match self {
            ChatError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The response body exactly as the backend sent it, when there was one.
    pub fn raw_body(&self) -> Option<&str> {
        match self {
            ChatError::Http { raw_body, .. } | ChatError::Decode { raw_body, .. } => {
                Some(raw_body.as_str())
            }
            _ => None,
        }
    }

    /// Short text for the end user. HTTP failures prefer the error message the
    /// backend embedded in its JSON body, then the raw body, then the bare status.
    /// Decode failures always summarise; the body stays available via `raw_body`.
    pub fn user_message(&self) -> String {
        match self {
            ChatError::Http { status, raw_body } => summarize_error_body(raw_body)
                .or_else(|| {
                    let trimmed = raw_body.trim();
                    (!trimmed.is_empty()).then(|| trimmed.to_string())
                })
                .unwrap_or_else(|| format!("HTTP {}", status)),
            ChatError::Decode { message, .. } => format!("Could not decode response: {}", message),
            other => other.to_string(),
        }
    }
}

/// Pull a human-readable message out of the common error envelopes:
/// `{"error": {"message": "..."}}` (OpenAI), `{"error": "..."}` (Ollama),
/// `{"detail": "..."}` (FastAPI).
fn summarize_error_body(raw: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    let candidate = value
        .pointer("/error/message")
        .or_else(|| value.get("error"))
        .or_else(|| value.get("detail"))?;
    candidate
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
