// context.rs: Turns one screen capture into the text blob attached to the
// next chat message.

use std::sync::Arc;
use std::time::Duration;

use super::metadata::{collect_metadata, ContextMetadata, DesktopInspector};
use super::ocr::{extract_text, OcrEngine};
use super::screen::FrameAcquirer;
use crate::ai::companion::{ProcessRequest, ProcessResponse};

/// Blob used when no frame could be captured.
pub const SCREENSHOT_FAILED: &str = "(screenshot failed)";

/// Characters of the blob shown back to the user after a capture.
pub const PREVIEW_CHARS: usize = 300;

pub struct ContextAssembler {
    acquirer: FrameAcquirer,
    inspector: Arc<dyn DesktopInspector>,
    ocr: Arc<dyn OcrEngine>,
}

impl ContextAssembler {
    pub fn new(
        acquirer: FrameAcquirer,
        inspector: Arc<dyn DesktopInspector>,
        ocr: Arc<dyn OcrEngine>,
    ) -> Self {
        Self {
            acquirer,
            inspector,
            ocr,
        }
    }

    /// Capture, describe and OCR the screen. Always yields a usable blob.
    pub async fn build_context(&self) -> String {
        let frame = match self.acquirer.capture_frame().await {
            Ok(frame) => frame,
            Err(e) => {
                log::error!("Screen capture failed: {}", e);
                return SCREENSHOT_FAILED.to_string();
            }
        };

        let inspector = Arc::clone(&self.inspector);
        let meta_frame = frame.clone();
        let (metadata, text) = tokio::join!(
            tokio::task::spawn_blocking(move || collect_metadata(inspector.as_ref(), &meta_frame)),
            extract_text(self.ocr.as_ref(), &frame),
        );
        let metadata = metadata.unwrap_or_else(|e| {
            log::warn!("Metadata collection task failed: {}", e);
            ContextMetadata {
                width: frame.width(),
                height: frame.height(),
                ..Default::default()
            }
        });

        let mut lines = metadata.lines();
        lines.push(String::new());
        lines.push(text);
        lines.join("\n")
    }
}

/// First `PREVIEW_CHARS` characters of a blob, with a trailing ellipsis.
pub fn preview(blob: &str) -> String {
    let head: String = blob.chars().take(PREVIEW_CHARS).collect();
    format!("{}…", head)
}

/// Optional clean-up pass through the companion service's `/process` endpoint.
pub struct ContextPostProcessor {
    url: String,
    client: reqwest::Client,
}

impl ContextPostProcessor {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Returns the processed text, or `blob` unchanged on any failure.
    pub async fn process(&self, blob: String) -> String {
        match self.try_process(&blob).await {
            Ok(processed) => processed,
            Err(e) => {
                log::warn!("Context post-processing skipped: {}", e);
                blob
            }
        }
    }

    async fn try_process(&self, blob: &str) -> Result<String, String> {
        let response = self
            .client
            .post(&self.url)
            .timeout(Duration::from_secs(10))
            .json(&ProcessRequest { text: blob })
            .send()
            .await
            .map_err(|e| format!("request to {} failed: {}", self.url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {}", status));
        }
        response
            .json::<ProcessResponse>()
            .await
            .map(|r| r.processed)
            .map_err(|e| format!("decode failed: {}", e))
    }
}
