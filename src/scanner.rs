use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::det::TextDetector;
use crate::engine::{EngineError, InitError, ModelProvider, ModelSources, OrtModelProvider};
use crate::image_impl::{Mat, PixelBuffer};
use crate::rec::TextRecognizer;
use crate::types::{ScannerConfig, DET_MARGIN_RATIO};

/// Separator placed between region strings by [`TextScanner::scan`].
pub const RESULT_SEPARATOR: &str = "\t";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Uninitialized,
    Ready,
    Failed,
}

/// Why a scan produced no text.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    #[error("scanner is not ready")]
    NotReady,

    #[error("empty image")]
    EmptyImage,

    #[error("unsupported channel count: {0}")]
    UnsupportedChannels(u8),

    #[error("invalid pixel buffer: {0}")]
    InvalidBuffer(String),

    #[error(transparent)]
    Engine(EngineError),

    #[error("no screen capture source configured")]
    CaptureUnavailable,

    #[error("screen capture failed: {0}")]
    CaptureFailed(#[source] std::io::Error),
}

impl From<EngineError> for ScanError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::EmptyImage => ScanError::EmptyImage,
            EngineError::UnsupportedChannels(c) => ScanError::UnsupportedChannels(c),
            EngineError::InvalidBuffer(msg) => ScanError::InvalidBuffer(msg),
            other => ScanError::Engine(other),
        }
    }
}

/// Screen area in desktop coordinates, edges exclusive on the right and bottom.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScreenRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl ScreenRect {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> i64 {
        self.right as i64 - self.left as i64
    }

    pub fn height(&self) -> i64 {
        self.bottom as i64 - self.top as i64
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }
}

/// Pixels grabbed from the screen, in B, G, R(, A) byte order.
#[derive(Clone, Debug)]
pub struct CapturedFrame {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub stride: usize,
    pub data: Vec<u8>,
}

impl CapturedFrame {
    pub fn as_pixels(&self) -> PixelBuffer<'_> {
        PixelBuffer::new(self.width, self.height, self.channels, self.stride, &self.data)
    }
}

/// Platform screen grabber. The scanner never captures on its own.
pub trait ScreenCapture: Send {
    fn capture(&mut self, rect: &ScreenRect) -> std::io::Result<CapturedFrame>;
}

/// Detection followed by per-region recognition.
///
/// A scanner starts [`PipelineState::Uninitialized`] and becomes usable once
/// [`TextScanner::initialize`] succeeds. Scans on a scanner that is not ready
/// return nothing.
pub struct TextScanner {
    provider: Arc<dyn ModelProvider>,
    config: ScannerConfig,
    det: Option<TextDetector>,
    rec: Option<TextRecognizer>,
    state: PipelineState,
    init_error: Option<InitError>,
    capture: Option<Box<dyn ScreenCapture>>,
}

impl TextScanner {
    pub fn new(provider: Arc<dyn ModelProvider>, config: ScannerConfig) -> Self {
        Self {
            provider,
            config,
            det: None,
            rec: None,
            state: PipelineState::Uninitialized,
            init_error: None,
            capture: None,
        }
    }

    /// Builds and initializes an ONNX Runtime backed scanner. Check
    /// [`TextScanner::state`] before scanning.
    pub fn open(sources: &ModelSources, config: ScannerConfig) -> Self {
        let mut scanner = Self::new(Arc::new(OrtModelProvider), config);
        // The outcome is kept in state() and init_error()
        let _ = scanner.initialize(sources);
        scanner
    }

    pub fn from_files(
        det_model: impl Into<PathBuf>,
        rec_model: impl Into<PathBuf>,
        dictionary: impl Into<PathBuf>,
    ) -> Self {
        let sources = ModelSources::from_files(det_model, rec_model, dictionary);
        Self::open(&sources, ScannerConfig::default())
    }

    /// Argument order matches the C ABI: recognition, dictionary, detection.
    pub fn from_memory(
        rec_model: impl Into<Arc<[u8]>>,
        dictionary: impl Into<Arc<[u8]>>,
        det_model: impl Into<Arc<[u8]>>,
    ) -> Self {
        let sources = ModelSources::from_memory(rec_model, dictionary, det_model);
        Self::open(&sources, ScannerConfig::default())
    }

    pub fn with_capture(mut self, capture: Box<dyn ScreenCapture>) -> Self {
        self.capture = Some(capture);
        self
    }

    pub fn set_capture(&mut self, capture: Option<Box<dyn ScreenCapture>>) {
        self.capture = capture;
    }

    /// Loads both networks and the dictionary. Calling it again discards the
    /// previous sessions first, whatever the outcome.
    pub fn initialize(&mut self, sources: &ModelSources) -> Result<(), InitError> {
        self.det = None;
        self.rec = None;
        self.init_error = None;

        match self.load(sources) {
            Ok((det, rec)) => {
                self.det = Some(det);
                self.rec = Some(rec);
                self.state = PipelineState::Ready;
                info!(
                    threads = self.config.engine.intra_op_num_threads,
                    "scanner ready"
                );
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, status = ?err.status(), "scanner initialization failed");
                self.state = PipelineState::Failed;
                self.init_error = Some(err.clone());
                Err(err)
            }
        }
    }

    fn load(&self, sources: &ModelSources) -> Result<(TextDetector, TextRecognizer), InitError> {
        let cfg = &self.config;
        let det = TextDetector::new(
            self.provider.as_ref(),
            &sources.detection,
            &cfg.det,
            &cfg.engine,
        )?;
        let rec = TextRecognizer::new(
            self.provider.as_ref(),
            &sources.recognition,
            &sources.dictionary,
            &cfg.rec,
            &cfg.engine,
        )?;
        Ok((det, rec))
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == PipelineState::Ready
    }

    pub fn init_error(&self) -> Option<&InitError> {
        self.init_error.as_ref()
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// Recognized strings for `image`, or the reason there are none.
    ///
    /// With `skip_detection` the whole image is treated as a single line and
    /// the detector does not run.
    pub fn try_scan_list(
        &mut self,
        image: &PixelBuffer<'_>,
        skip_detection: bool,
    ) -> Result<Vec<String>, ScanError> {
        let (Some(det), Some(rec)) = (self.det.as_mut(), self.rec.as_mut()) else {
            return Err(ScanError::NotReady);
        };
        if self.state != PipelineState::Ready {
            return Err(ScanError::NotReady);
        }

        let mat = Mat::from_pixels(image)?;
        if mat.channels() < 3 {
            return Err(ScanError::UnsupportedChannels(mat.channels()));
        }

        if skip_detection {
            let text = rec.run(&mat)?;
            return Ok(if text.is_empty() { Vec::new() } else { vec![text] });
        }

        let det_out = det.run(&mat, DET_MARGIN_RATIO)?;
        let crops = det_out.crops();

        let mut results = Vec::with_capacity(crops.len());
        for (i, crop) in crops.iter().enumerate() {
            match rec.run(crop) {
                Ok(text) if !text.is_empty() => results.push(text),
                Ok(_) => {}
                Err(err) => {
                    warn!(region = i, error = %err, "skipping region");
                }
            }
        }

        debug!(
            regions = det_out.len(),
            results = results.len(),
            "scan done"
        );
        Ok(results)
    }

    /// Like [`TextScanner::try_scan_list`], with every failure turned into an
    /// empty list.
    pub fn scan_list(&mut self, image: &PixelBuffer<'_>, skip_detection: bool) -> Vec<String> {
        self.try_scan_list(image, skip_detection)
            .unwrap_or_else(log_scan_error)
    }

    /// All recognized strings joined with a tab.
    pub fn scan(&mut self, image: &PixelBuffer<'_>, skip_detection: bool) -> String {
        join_results(&self.scan_list(image, skip_detection))
    }

    pub fn try_scan_list_screen(
        &mut self,
        rect: &ScreenRect,
        skip_detection: bool,
    ) -> Result<Vec<String>, ScanError> {
        if !self.is_ready() {
            return Err(ScanError::NotReady);
        }
        if rect.is_empty() {
            return Err(ScanError::EmptyImage);
        }
        let capture = self.capture.as_mut().ok_or(ScanError::CaptureUnavailable)?;
        let frame = capture.capture(rect).map_err(ScanError::CaptureFailed)?;
        self.try_scan_list(&frame.as_pixels(), skip_detection)
    }

    pub fn scan_list_screen(&mut self, rect: &ScreenRect, skip_detection: bool) -> Vec<String> {
        self.try_scan_list_screen(rect, skip_detection)
            .unwrap_or_else(log_scan_error)
    }

    pub fn scan_screen(&mut self, rect: &ScreenRect, skip_detection: bool) -> String {
        join_results(&self.scan_list_screen(rect, skip_detection))
    }
}

fn log_scan_error(err: ScanError) -> Vec<String> {
    match err {
        ScanError::NotReady => debug!("scan on a scanner that is not ready"),
        err => warn!(error = %err, "scan failed"),
    }
    Vec::new()
}

pub fn join_results(results: &[String]) -> String {
    results.join(RESULT_SEPARATOR)
}
