// ocr.rs: Text recognition over a captured frame.

use async_trait::async_trait;
use reqwest::multipart;
use std::time::Duration;

use super::screen::CapturedFrame;

pub const DEFAULT_OCR_URL: &str = "http://127.0.0.1:9003/ocr";

#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("image encoding failed: {0}")]
    Encode(String),
    #[error("OCR service unreachable: {0}")]
    Request(String),
    #[error("OCR service returned {status}: {body}")]
    Service { status: u16, body: String },
    #[error("unexpected OCR response: {0}")]
    Response(String),
}

/// A text recognition engine.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Top candidate for each detected text region, in the engine's order.
    async fn recognize(&self, frame: &CapturedFrame) -> Result<Vec<String>, OcrError>;

    fn name(&self) -> &str;
}

/// Run OCR and join the lines. Never fails: an engine error becomes
/// `"(OCR failed: <message>)"`.
pub async fn extract_text(engine: &dyn OcrEngine, frame: &CapturedFrame) -> String {
    match engine.recognize(frame).await {
        Ok(lines) => {
            log::debug!("{} recognised {} text regions", engine.name(), lines.len());
            lines.join("\n")
        }
        Err(e) => {
            log::warn!("OCR via {} failed: {}", engine.name(), e);
            format!("(OCR failed: {})", e)
        }
    }
}

/// Client for a RapidOCR-style HTTP service: multipart PNG upload under the
/// `image` field, response `{"0": {"rec_txt": "..."}, "1": {...}}`.
pub struct RapidOcrEngine {
    api_url: String,
    client: reqwest::Client,
}

impl RapidOcrEngine {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            client: reqwest::Client::new(),
        }
    }

    fn parse_regions(result: &serde_json::Value) -> Result<Vec<String>, OcrError> {
        let obj = result
            .as_object()
            .ok_or_else(|| OcrError::Response("expected a JSON object".into()))?;

        let mut regions: Vec<(u64, &str)> = obj
            .iter()
            .filter_map(|(key, item)| {
                let index = key.parse::<u64>().ok()?;
                let text = item.get("rec_txt").and_then(|v| v.as_str())?;
                Some((index, text))
            })
            .collect();
        regions.sort_by_key(|(index, _)| *index);

        Ok(regions.into_iter().map(|(_, text)| text.to_string()).collect())
    }
}

impl Default for RapidOcrEngine {
    fn default() -> Self {
        Self::new(DEFAULT_OCR_URL)
    }
}

#[async_trait]
impl OcrEngine for RapidOcrEngine {
    async fn recognize(&self, frame: &CapturedFrame) -> Result<Vec<String>, OcrError> {
        let png = frame.to_png().map_err(|e| OcrError::Encode(e.to_string()))?;
        let part = multipart::Part::bytes(png)
            .file_name("screen.png")
            .mime_str("image/png")
            .map_err(|e| OcrError::Encode(e.to_string()))?;
        let form = multipart::Form::new().part("image", part);

        log::debug!("Sending OCR request to {}", self.api_url);
        let response = self
            .client
            .post(&self.api_url)
            .timeout(Duration::from_secs(30))
            .multipart(form)
            .send()
            .await
            .map_err(|e| OcrError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OcrError::Service {
                status: status.as_u16(),
                body,
            });
        }

        let result: serde_json::Value = response
            .json()
            .await
            .map_err(|e| OcrError::Response(e.to_string()))?;
        Self::parse_regions(&result)
    }

    fn name(&self) -> &str {
        "rapidocr"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::screen::RawSample;

    fn frame() -> CapturedFrame {
        RawSample::rgba(2, 2, vec![255; 16]).into_frame().unwrap()
    }

    #[test]
    fn regions_sorted_numerically() {
        let result = serde_json::json!({
            "10": {"rec_txt": "eleventh", "score": "0.9"},
            "2": {"rec_txt": "third"},
            "0": {"rec_txt": "first"},
            "1": {"rec_txt": "second"},
            "meta": {"rec_txt": "ignored"}
        });
        let lines = RapidOcrEngine::parse_regions(&result).unwrap();
        assert_eq!(lines, vec!["first", "second", "third", "eleventh"]);
    }

    #[test]
    fn non_object_response_is_an_error() {
        assert!(RapidOcrEngine::parse_regions(&serde_json::json!(["a"])).is_err());
    }

    #[tokio::test]
    async fn recognizes_via_http_service() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/ocr")
            .match_header(
                "content-type",
                mockito::Matcher::Regex("multipart/form-data.*".into()),
            )
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"0":{"rec_txt":"Hello"},"1":{"rec_txt":"World"}}"#)
            .create_async()
            .await;

        let engine = RapidOcrEngine::new(format!("{}/ocr", server.url()));
        assert_eq!(extract_text(&engine, &frame()).await, "Hello\nWorld");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn service_error_becomes_placeholder() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/ocr")
            .with_status(500)
            .with_body("model not loaded")
            .create_async()
            .await;

        let engine = RapidOcrEngine::new(format!("{}/ocr", server.url()));
        let text = extract_text(&engine, &frame()).await;
        assert!(text.starts_with("(OCR failed: "), "got {text}");
        assert!(text.contains("model not loaded"));
        assert!(text.ends_with(')'));
    }
}
