// companion.rs: The local companion service: `/chat` takes the whole
// transcript, `/process` cleans up captured context text.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::ChatMessage;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Serialize)]
pub(crate) struct CompanionChatRequest<'a> {
    pub messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct CompanionChatResponse {
    response: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ProcessRequest<'a> {
    pub text: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProcessResponse {
    pub processed: String,
}

pub fn chat_endpoint(base_url: &str) -> String {
    format!("{}/chat", base_url.trim_end_matches('/'))
}

/// Extract `response`.
pub fn parse_response(body: &str) -> Result<String, String> {
    serde_json::from_str::<CompanionChatResponse>(body)
        .map(|r| r.response)
        .map_err(|e| format!("Chat decode failed: {}", e))
}
