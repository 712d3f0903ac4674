//! The `capture` module turns the current screen into chat context:
//! one frame from the primary display, metadata about the foreground
//! window, OCR text, and the assembled blob.

pub mod context;
pub mod metadata;
pub mod ocr;
pub mod screen;

pub use context::{preview, ContextAssembler, ContextPostProcessor, SCREENSHOT_FAILED};
pub use metadata::{ContextMetadata, DesktopInspector};
pub use ocr::{OcrEngine, OcrError};
pub use screen::{CaptureError, CapturedFrame, DisplaySource, FrameAcquirer, FrameSink};
