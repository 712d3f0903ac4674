// screen.rs: Acquires exactly one frame from the primary display.
//
// A capture source delivers samples through a `FrameSink` callback; the
// acquirer bridges that callback to a single awaited value with a oneshot
// channel, and stops the stream on every exit path.

use image::{ImageFormat, RgbaImage};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;

/// Upper bound for one capture; the OS call itself has none.
pub const DEFAULT_CAPTURE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("no shareable display available")]
    NoDisplay,
    #[error("screen capture not permitted: {0}")]
    PermissionDenied(String),
    #[error("capture stream failed: {0}")]
    StreamFailed(String),
    #[error("capture stream ended without delivering a frame")]
    NoFrame,
    #[error("no frame delivered within {0:?}")]
    TimedOut(Duration),
    #[error("could not convert captured sample: {0}")]
    ConversionFailed(String),
}

/// A single still frame in RGBA8. Owned by whoever called `capture_frame`.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    image: RgbaImage,
}

impl CapturedFrame {
    pub fn from_image(image: RgbaImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// PNG-encode the frame, e.g. for upload to an OCR service.
    pub fn to_png(&self) -> Result<Vec<u8>, image::ImageError> {
        let mut buffer = Cursor::new(Vec::new());
        self.image.write_to(&mut buffer, ImageFormat::Png)?;
        Ok(buffer.into_inner())
    }
}

/// A shareable display as reported by the capture source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayInfo {
    pub id: u32,
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub is_primary: bool,
}

/// Stream settings. The pipeline wants one frame, so the queue holds one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    pub width: u32,
    pub height: u32,
    pub queue_depth: usize,
}

impl StreamConfig {
    pub fn single_frame(display: &DisplayInfo) -> Self {
        Self {
            width: display.width,
            height: display.height,
            queue_depth: 1,
        }
    }
}

/// A raw sample as delivered by the capture source: tightly packed or
/// row-padded RGBA8.
#[derive(Debug, Clone)]
pub struct RawSample {
    pub width: u32,
    pub height: u32,
    pub bytes_per_row: usize,
    pub data: Vec<u8>,
}

impl RawSample {
    pub fn rgba(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            bytes_per_row: width as usize * 4,
            data,
        }
    }

    /// Strip row padding and wrap the pixels as a `CapturedFrame`.
    pub fn into_frame(self) -> Result<CapturedFrame, CaptureError> {
        if self.width == 0 || self.height == 0 {
            return Err(CaptureError::ConversionFailed(format!(
                "empty sample ({}x{})",
                self.width, self.height
            )));
        }
        let row_len = self.width as usize * 4;
        if self.bytes_per_row < row_len {
            return Err(CaptureError::ConversionFailed(format!(
                "row stride {} shorter than {} bytes",
                self.bytes_per_row, row_len
            )));
        }
        let needed = self.bytes_per_row * (self.height as usize - 1) + row_len;
        if self.data.len() < needed {
            return Err(CaptureError::ConversionFailed(format!(
                "sample holds {} bytes, expected at least {}",
                self.data.len(),
                needed
            )));
        }

        let pixels = if self.bytes_per_row == row_len {
            let mut data = self.data;
            data.truncate(row_len * self.height as usize);
            data
        } else {
            self.data
                .chunks(self.bytes_per_row)
                .take(self.height as usize)
                .flat_map(|row| &row[..row_len])
                .copied()
                .collect()
        };

        RgbaImage::from_raw(self.width, self.height, pixels)
            .map(CapturedFrame::from_image)
            .ok_or_else(|| CaptureError::ConversionFailed("pixel buffer size mismatch".into()))
    }
}

type SampleSlot = Arc<Mutex<Option<oneshot::Sender<Option<RawSample>>>>>;

/// Callback target handed to a capture stream.
///
/// Resolves its waiter exactly once: the first `deliver` or `end` wins and
/// every later call is a no-op. Dropping every clone without resolving also
/// wakes the waiter.
#[derive(Clone)]
pub struct FrameSink {
    slot: SampleSlot,
}

impl FrameSink {
    pub fn new() -> (Self, oneshot::Receiver<Option<RawSample>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                slot: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// Hand over a sample. Returns false if the waiter was already resolved.
    pub fn deliver(&self, sample: RawSample) -> bool {
        self.resolve(Some(sample))
    }

    /// Signal that the stream stopped or failed without a sample.
    pub fn end(&self) -> bool {
        self.resolve(None)
    }

    fn resolve(&self, value: Option<RawSample>) -> bool {
        let sender = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match sender {
            Some(tx) => tx.send(value).is_ok(),
            None => false,
        }
    }
}

/// Something that can enumerate displays and stream samples from one.
pub trait DisplaySource: Send + Sync {
    fn displays(&self) -> Result<Vec<DisplayInfo>, CaptureError>;

    fn start_stream(
        &self,
        display: &DisplayInfo,
        config: &StreamConfig,
        sink: FrameSink,
    ) -> Result<Box<dyn CaptureStream>, CaptureError>;
}

/// A running capture stream.
pub trait CaptureStream: Send {
    fn stop(&mut self);
}

/// Stops the wrapped stream when dropped, including when the awaiting future
/// is cancelled.
struct StreamGuard {
    stream: Box<dyn CaptureStream>,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.stream.stop();
        log::debug!("Capture stream stopped");
    }
}

pub struct FrameAcquirer {
    source: Arc<dyn DisplaySource>,
    timeout: Duration,
}

impl FrameAcquirer {
    pub fn new(source: Arc<dyn DisplaySource>) -> Self {
        Self {
            source,
            timeout: DEFAULT_CAPTURE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Capture one frame of the primary display.
    pub async fn capture_frame(&self) -> Result<CapturedFrame, CaptureError> {
        let source = Arc::clone(&self.source);
        let displays = tokio::task::spawn_blocking(move || source.displays())
            .await
            .map_err(|e| CaptureError::StreamFailed(format!("display enumeration task: {}", e)))??;

        let display = displays
            .iter()
            .find(|d| d.is_primary)
            .or_else(|| displays.first())
            .ok_or(CaptureError::NoDisplay)?;

        let config = StreamConfig::single_frame(display);
        log::info!(
            "Capturing display {} ({}x{})",
            display.name,
            config.width,
            config.height
        );

        let (sink, rx) = FrameSink::new();
        let guard = StreamGuard {
            stream: self.source.start_stream(display, &config, sink)?,
        };

        let outcome = tokio::time::timeout(self.timeout, rx).await;
        drop(guard);

        let sample = match outcome {
            Ok(Ok(Some(sample))) => sample,
            Ok(Ok(None)) | Ok(Err(_)) => return Err(CaptureError::NoFrame),
            Err(_) => return Err(CaptureError::TimedOut(self.timeout)),
        };
        sample.into_frame()
    }
}

// ── xcap-backed source ──────────────────────────────────────────────────

/// Captures through `xcap`. Each stream grabs one image on a dedicated
/// thread and pushes it into the sink.
#[derive(Debug, Default)]
pub struct XcapDisplaySource;

struct XcapStream {
    stopped: Arc<AtomicBool>,
}

impl CaptureStream for XcapStream {
    fn stop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

impl DisplaySource for XcapDisplaySource {
    fn displays(&self) -> Result<Vec<DisplayInfo>, CaptureError> {
        let monitors = xcap::Monitor::all()
            .map_err(|e| CaptureError::PermissionDenied(format!("enumerate monitors: {e}")))?;
        Ok(monitors
            .iter()
            .map(|m| DisplayInfo {
                id: m.id(),
                name: m.name().to_string(),
                width: m.width(),
                height: m.height(),
                is_primary: m.is_primary(),
            })
            .collect())
    }

    fn start_stream(
        &self,
        display: &DisplayInfo,
        config: &StreamConfig,
        sink: FrameSink,
    ) -> Result<Box<dyn CaptureStream>, CaptureError> {
        let stopped = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stopped);
        let display_id = display.id;
        log::debug!(
            "Starting xcap stream on display {} (queue depth {})",
            display_id,
            config.queue_depth
        );

        std::thread::Builder::new()
            .name("screen-capture".into())
            .spawn(move || {
                let captured = xcap::Monitor::all()
                    .map_err(|e| format!("enumerate monitors: {e}"))
                    .and_then(|monitors| {
                        monitors
                            .into_iter()
                            .find(|m| m.id() == display_id)
                            .ok_or_else(|| format!("display {display_id} disappeared"))
                    })
                    .and_then(|m| m.capture_image().map_err(|e| format!("capture_image: {e}")));

                if flag.load(Ordering::SeqCst) {
                    sink.end();
                    return;
                }
                match captured {
                    Ok(img) => {
                        let (w, h) = (img.width(), img.height());
                        sink.deliver(RawSample::rgba(w, h, img.into_raw()));
                    }
                    Err(e) => {
                        log::error!("Capture error: {}", e);
                        sink.end();
                    }
                }
            })
            .map_err(|e| CaptureError::StreamFailed(format!("spawn capture thread: {e}")))?;

        Ok(Box::new(XcapStream { stopped }))
    }
}

// ── Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    enum Behaviour {
        Deliver,
        EndWithoutFrame,
        Hang,
        DropSink,
    }

    struct MockSource {
        displays: Vec<DisplayInfo>,
        behaviour: Behaviour,
        stops: Arc<AtomicUsize>,
        // Keeps the sink alive for `Hang`.
        held: Mutex<Option<FrameSink>>,
    }

    struct MockStream {
        stops: Arc<AtomicUsize>,
    }

    impl CaptureStream for MockStream {
        fn stop(&mut self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl DisplaySource for MockSource {
        fn displays(&self) -> Result<Vec<DisplayInfo>, CaptureError> {
            Ok(self.displays.clone())
        }

        fn start_stream(
            &self,
            display: &DisplayInfo,
            config: &StreamConfig,
            sink: FrameSink,
        ) -> Result<Box<dyn CaptureStream>, CaptureError> {
            assert_eq!(config.queue_depth, 1);
            assert_eq!(config.width, display.width);
            match self.behaviour {
                Behaviour::Deliver => {
                    let data = vec![255u8; (display.width * display.height * 4) as usize];
                    assert!(sink.deliver(RawSample::rgba(display.width, display.height, data)));
                    // late event after resolution is ignored
                    assert!(!sink.end());
                }
                Behaviour::EndWithoutFrame => {
                    sink.end();
                }
                Behaviour::Hang => {
                    *self.held.lock().unwrap() = Some(sink);
                }
                Behaviour::DropSink => drop(sink),
            }
            Ok(Box::new(MockStream {
                stops: Arc::clone(&self.stops),
            }))
        }
    }

    fn display(id: u32, primary: bool, w: u32, h: u32) -> DisplayInfo {
        DisplayInfo {
            id,
            name: format!("Display {id}"),
            width: w,
            height: h,
            is_primary: primary,
        }
    }

    fn acquirer(displays: Vec<DisplayInfo>, behaviour: Behaviour) -> (FrameAcquirer, Arc<AtomicUsize>) {
        let stops = Arc::new(AtomicUsize::new(0));
        let source = MockSource {
            displays,
            behaviour,
            stops: Arc::clone(&stops),
            held: Mutex::new(None),
        };
        (
            FrameAcquirer::new(Arc::new(source)).with_timeout(Duration::from_millis(100)),
            stops,
        )
    }

    #[tokio::test]
    async fn captures_primary_display_and_stops_stream() {
        let (acq, stops) = acquirer(
            vec![display(1, false, 8, 8), display(2, true, 4, 3)],
            Behaviour::Deliver,
        );
        let frame = acq.capture_frame().await.unwrap();
        assert_eq!((frame.width(), frame.height()), (4, 3));
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_display_fails_without_starting_stream() {
        let (acq, stops) = acquirer(vec![], Behaviour::Deliver);
        let err = acq.capture_frame().await.unwrap_err();
        assert!(matches!(err, CaptureError::NoDisplay));
        assert_eq!(stops.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stream_end_without_frame_resumes_waiter() {
        let (acq, stops) = acquirer(vec![display(1, true, 2, 2)], Behaviour::EndWithoutFrame);
        let err = acq.capture_frame().await.unwrap_err();
        assert!(matches!(err, CaptureError::NoFrame));
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dropped_sink_resumes_waiter() {
        let (acq, _stops) = acquirer(vec![display(1, true, 2, 2)], Behaviour::DropSink);
        assert!(matches!(
            acq.capture_frame().await.unwrap_err(),
            CaptureError::NoFrame
        ));
    }

    #[tokio::test]
    async fn hung_stream_times_out_and_is_stopped() {
        let (acq, stops) = acquirer(vec![display(1, true, 2, 2)], Behaviour::Hang);
        let err = acq.capture_frame().await.unwrap_err();
        assert!(matches!(err, CaptureError::TimedOut(_)));
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn sink_resolves_once() {
        let (sink, mut rx) = FrameSink::new();
        let other = sink.clone();
        assert!(sink.end());
        assert!(!other.deliver(RawSample::rgba(1, 1, vec![0; 4])));
        assert!(matches!(rx.try_recv(), Ok(None)));
    }

    #[test]
    fn padded_rows_are_repacked() {
        // 2x2 image, 12-byte stride (4 bytes padding per row)
        let mut data = Vec::new();
        data.extend_from_slice(&[1, 1, 1, 255, 2, 2, 2, 255, 0, 0, 0, 0]);
        data.extend_from_slice(&[3, 3, 3, 255, 4, 4, 4, 255]);
        let sample = RawSample {
            width: 2,
            height: 2,
            bytes_per_row: 12,
            data,
        };
        let frame = sample.into_frame().unwrap();
        assert_eq!(frame.image().get_pixel(1, 0).0, [2, 2, 2, 255]);
        assert_eq!(frame.image().get_pixel(0, 1).0, [3, 3, 3, 255]);
    }

    #[test]
    fn short_buffer_is_a_conversion_failure() {
        let err = RawSample::rgba(4, 4, vec![0; 10]).into_frame().unwrap_err();
        assert!(matches!(err, CaptureError::ConversionFailed(_)));

        let err = RawSample::rgba(0, 4, vec![]).into_frame().unwrap_err();
        assert!(matches!(err, CaptureError::ConversionFailed(_)));
    }

    #[test]
    fn frame_encodes_to_png() {
        let frame = RawSample::rgba(2, 2, vec![128; 16]).into_frame().unwrap();
        let png = frame.to_png().unwrap();
        assert_eq!(&png[1..4], b"PNG");
    }
}
