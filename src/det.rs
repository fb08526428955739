use std::time::Instant;

use ndarray::{Axis, Ix2};
use tracing::debug;

use crate::engine::{
    load_model, ByteSource, EngineError, InferenceSession, InitError, ModelProvider, ModelRole,
};
use crate::image_impl::Mat;
use crate::postprocess::{crop_regions, RegionPostProcess, TextRegion};
use crate::preprocess::{align_to_multiple, to_tensor};
use crate::types::{DetConfig, EngineConfig};

pub struct TextDetOutput {
    /// The aligned image the regions refer to.
    pub img: Mat,
    pub regions: Vec<TextRegion>,
    pub elapse: f64,
}

impl TextDetOutput {
    pub fn empty() -> Self {
        Self {
            img: Mat::default(),
            regions: Vec::new(),
            elapse: 0.0,
        }
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Sub-images for every region, in region order.
    pub fn crops(&self) -> Vec<Mat> {
        crop_regions(&self.img, &self.regions)
    }
}

pub struct TextDetector {
    session: Box<dyn InferenceSession>,
    postprocess: RegionPostProcess,
    alignment: u32,
}

impl TextDetector {
    pub fn new(
        provider: &dyn ModelProvider,
        model: &ByteSource,
        cfg: &DetConfig,
        engine_cfg: &EngineConfig,
    ) -> Result<Self, InitError> {
        let session = load_model(provider, ModelRole::Detection, model, engine_cfg)?;
        Ok(Self::with_session(session, cfg))
    }

    pub fn with_session(session: Box<dyn InferenceSession>, cfg: &DetConfig) -> Self {
        Self {
            session,
            postprocess: RegionPostProcess::from_cfg(cfg),
            alignment: cfg.alignment,
        }
    }

    /// Locates text regions. Color input (3 or 4 channels) is required.
    pub fn run(&mut self, img: &Mat, margin_ratio: f32) -> Result<TextDetOutput, EngineError> {
        let start = Instant::now();

        if img.empty() {
            return Err(EngineError::EmptyImage);
        }
        if img.channels() < 3 {
            return Err(EngineError::UnsupportedChannels(img.channels()));
        }

        let aligned = align_to_multiple(img, self.alignment);
        let input = to_tensor(&aligned)?;
        let preds = self.session.run(input)?;

        // The probability map must be [1, 1, H, W]
        let shape = preds.shape().to_vec();
        if shape.len() != 4 || shape[0] != 1 || shape[1] != 1 {
            return Err(EngineError::UnexpectedOutputShape(shape));
        }
        let map = preds
            .index_axis(Axis(0), 0)
            .index_axis_move(Axis(0), 0)
            .into_dimensionality::<Ix2>()
            .map_err(|_| EngineError::UnexpectedOutputShape(shape))?;

        let regions = self
            .postprocess
            .process(map, aligned.cols(), aligned.rows(), margin_ratio);
        let elapse = start.elapsed().as_secs_f64();
        debug!(
            width = aligned.cols(),
            height = aligned.rows(),
            regions = regions.len(),
            elapse,
            "detection done"
        );

        Ok(TextDetOutput {
            img: aligned,
            regions,
            elapse,
        })
    }
}
