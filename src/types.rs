use std::path::Path;

use serde::{Deserialize, Serialize};

/// Stride constraint the detection network puts on its input dimensions.
pub const DET_ALIGNMENT: u32 = 32;
/// Heat-map probability at or above which a pixel counts as text.
pub const DET_THRESH: f32 = 0.3;
/// Bounding boxes smaller than this (in pixels) are noise.
pub const DET_MIN_AREA: u32 = 24;
/// Margin added around each region, as a fraction of the region height.
pub const DET_MARGIN_RATIO: f32 = 1.0;
/// Input height of the recognition network.
pub const REC_IMG_HEIGHT: u32 = 48;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub intra_op_num_threads: usize,
    pub inter_op_num_threads: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        // Half the logical CPUs, but never fewer than two workers
        let num_threads = std::thread::available_parallelism()
            .map(|n| n.get() / 2)
            .unwrap_or(0)
            .max(2);

        Self {
            intra_op_num_threads: num_threads,
            inter_op_num_threads: 1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetConfig {
    pub alignment: u32,
    pub thresh: f32,
    pub min_area: u32,
}

impl Default for DetConfig {
    fn default() -> Self {
        Self {
            alignment: DET_ALIGNMENT,
            thresh: DET_THRESH,
            min_area: DET_MIN_AREA,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecConfig {
    pub img_height: u32,
    /// Append a `" "` class after the dictionary entries, for models trained
    /// with PaddleOCR's `use_space_char`.
    pub use_space_char: bool,
}

impl Default for RecConfig {
    fn default() -> Self {
        Self {
            img_height: REC_IMG_HEIGHT,
            use_space_char: false,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub engine: EngineConfig,
    pub det: DetConfig,
    pub rec: RecConfig,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ScannerConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_threads_floor_at_two() {
        let cfg = EngineConfig::default();
        assert!(cfg.intra_op_num_threads >= 2);
        assert_eq!(cfg.inter_op_num_threads, 1);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = ScannerConfig::from_json_str(r#"{ "rec": { "use_space_char": true } }"#).unwrap();
        assert!(cfg.rec.use_space_char);
        assert_eq!(cfg.rec.img_height, REC_IMG_HEIGHT);
        assert_eq!(cfg.det, DetConfig::default());
    }

    #[test]
    fn malformed_json_is_parse_error() {
        let err = ScannerConfig::from_json_str("{ det: ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
