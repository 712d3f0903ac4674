// ollama.rs: Request/response shapes for an Ollama-style local model server.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::ChatMessage;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:11434";

/// Local inference is slow, especially on first model load.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Serialize)]
pub(crate) struct OllamaRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    pub stream: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: OllamaMessageResponse,
}

#[derive(Debug, Deserialize)]
struct OllamaMessageResponse {
    content: String,
}

pub fn endpoint(base_url: &str) -> String {
    format!("{}/api/chat", base_url.trim_end_matches('/'))
}

/// Extract `message.content`.
pub fn parse_response(body: &str) -> Result<String, String> {
    serde_json::from_str::<OllamaResponse>(body)
        .map(|r| r.message.content)
        .map_err(|e| format!("Failed to parse Ollama response: {}", e))
}
