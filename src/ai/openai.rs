// openai.rs: Request/response shapes for the hosted OpenAI-style
// chat completions API.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::ChatMessage;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Hosted APIs answer quickly or not at all.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
pub(crate) struct OpenAiRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessageResponse,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessageResponse {
    content: String,
}

pub fn endpoint(base_url: &str) -> String {
    format!("{}/v1/chat/completions", base_url.trim_end_matches('/'))
}

/// Extract `choices[0].message.content`.
pub fn parse_response(body: &str) -> Result<String, String> {
    let parsed: OpenAiResponse =
        serde_json::from_str(body).map_err(|e| format!("Failed to parse OpenAI response: {}", e))?;
    parsed
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .ok_or_else(|| "OpenAI response contained no choices".to_string())
}
