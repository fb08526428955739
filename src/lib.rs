//! # textscan
//!
//! Two-stage text extraction on ONNX Runtime: a detection network finds
//! text lines, a recognition network reads each of them.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use textscan::{imread, TextScanner};
//!
//! let mut scanner =
//!     TextScanner::from_files("models/det.onnx", "models/rec.onnx", "models/keys.txt");
//! if let Some(err) = scanner.init_error() {
//!     panic!("init failed: {err}");
//! }
//!
//! let img = imread("image.png")?;
//! for line in scanner.scan_list(&img.as_pixels(), false) {
//!     println!("{line}");
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! The inference backend is reached only through [`ModelProvider`]; pass your
//! own to [`TextScanner::new`] to run on something other than ONNX Runtime.

mod contours;
mod det;
mod engine;
mod image_impl;
mod postprocess;
mod preprocess;
mod rec;
mod scanner;
mod types;

// FFI module for C bindings
#[cfg(feature = "ffi")]
pub mod ffi;

pub use crate::contours::{find_contours, BoundingRect, Contour};
pub use crate::det::{TextDetOutput, TextDetector};
pub use crate::engine::{
    ByteSource, EngineError, InferenceSession, InitError, InitStatus, ModelProvider, ModelRole,
    ModelSources, OrtModelProvider, OrtSession,
};
pub use crate::image_impl::{imread, Mat, PixelBuffer};
pub use crate::postprocess::{crop_regions, sort_reading_order, RegionPostProcess, TextRegion};
pub use crate::preprocess::{align_to_multiple, scale_to_height, to_tensor};
pub use crate::rec::{CharacterDictionary, CtcDecoder, TextRecognizer};
pub use crate::scanner::{
    join_results, CapturedFrame, PipelineState, ScanError, ScreenCapture, ScreenRect,
    TextScanner, RESULT_SEPARATOR,
};
pub use crate::types::{
    ConfigError, DetConfig, EngineConfig, RecConfig, ScannerConfig, DET_ALIGNMENT,
    DET_MARGIN_RATIO, DET_MIN_AREA, DET_THRESH, REC_IMG_HEIGHT,
};
