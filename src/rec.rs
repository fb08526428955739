use std::time::Instant;

use ndarray::{ArrayD, ArrayView2, Axis, Ix2};
use tracing::{debug, info};

use crate::engine::{
    read_model, ByteSource, EngineError, InferenceSession, InitError, ModelProvider, ModelRole,
};
use crate::image_impl::Mat;
use crate::preprocess::{scale_to_height, to_tensor};
use crate::types::{EngineConfig, RecConfig};

/// Display units the recognizer can emit, one per dictionary line.
///
/// Class 0 of the network is the blank and has no entry here; class `i`
/// maps to entry `i - 1`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CharacterDictionary {
    entries: Vec<String>,
}

impl CharacterDictionary {
    pub fn new(entries: Vec<String>) -> Result<Self, InitError> {
        if entries.is_empty() {
            return Err(InitError::DictionaryInvalid("dictionary is empty".to_string()));
        }
        Ok(Self { entries })
    }

    pub fn from_bytes(bytes: &[u8], use_space_char: bool) -> Result<Self, InitError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| InitError::DictionaryInvalid(format!("not valid UTF-8: {e}")))?;
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);

        let mut entries: Vec<String> = text.lines().map(str::to_string).collect();
        if entries.is_empty() {
            return Err(InitError::DictionaryInvalid("dictionary is empty".to_string()));
        }
        if use_space_char {
            entries.push(" ".to_string());
        }
        Self::new(entries)
    }

    pub fn load(source: &ByteSource, use_space_char: bool) -> Result<Self, InitError> {
        let bytes = source
            .read()
            .map_err(|e| InitError::DictionaryNotFound(format!("{source}: {e}")))?;
        Self::from_bytes(&bytes, use_space_char)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry for a model class index; `None` for the blank and out-of-range classes.
    pub fn get(&self, class_idx: usize) -> Option<&str> {
        class_idx
            .checked_sub(1)
            .and_then(|i| self.entries.get(i))
            .map(String::as_str)
    }
}

/// Greedy CTC decoding: best class per step, repeats collapsed, blanks dropped.
pub struct CtcDecoder {
    dict: CharacterDictionary,
}

impl CtcDecoder {
    pub fn new(dict: CharacterDictionary) -> Self {
        Self { dict }
    }

    pub fn dictionary(&self) -> &CharacterDictionary {
        &self.dict
    }

    /// Decodes a `[T, C]` score matrix.
    pub fn decode(&self, scores: ArrayView2<'_, f32>) -> String {
        let mut text = String::new();
        let mut prev_idx = 0usize;

        for row in scores.rows() {
            let mut best_idx = 0usize;
            let mut best_val = f32::NEG_INFINITY;
            for (ci, &v) in row.iter().enumerate() {
                if ci == 0 || v > best_val {
                    best_val = v;
                    best_idx = ci;
                }
            }

            if best_idx != prev_idx {
                if let Some(ch) = self.dict.get(best_idx) {
                    text.push_str(ch);
                }
            }
            // A blank step resets the memory so the next repeat is emitted again
            prev_idx = best_idx;
        }

        text
    }

    /// Decodes the recognizer's raw output, `[1, T, C]` or `[T, C]`.
    pub fn decode_output(&self, output: &ArrayD<f32>) -> Result<String, EngineError> {
        let shape = output.shape().to_vec();
        let view = match shape.len() {
            3 if shape[0] >= 1 => output.index_axis(Axis(0), 0),
            2 => output.view(),
            _ => return Err(EngineError::UnexpectedOutputShape(shape)),
        };
        let scores = view
            .into_dimensionality::<Ix2>()
            .map_err(|_| EngineError::UnexpectedOutputShape(shape))?;
        Ok(self.decode(scores))
    }
}

pub struct TextRecognizer {
    session: Box<dyn InferenceSession>,
    decoder: CtcDecoder,
    img_height: u32,
}

impl TextRecognizer {
    pub fn new(
        provider: &dyn ModelProvider,
        model: &ByteSource,
        dictionary: &ByteSource,
        cfg: &RecConfig,
        engine_cfg: &EngineConfig,
    ) -> Result<Self, InitError> {
        let bytes = read_model(ModelRole::Recognition, model)?;
        let dict = CharacterDictionary::load(dictionary, cfg.use_space_char)?;
        let session = provider.load(ModelRole::Recognition, &bytes, engine_cfg)?;
        info!(classes = dict.len() + 1, "recognizer ready");
        Ok(Self::with_session(session, dict, cfg.img_height))
    }

    pub fn with_session(
        session: Box<dyn InferenceSession>,
        dict: CharacterDictionary,
        img_height: u32,
    ) -> Self {
        Self {
            session,
            decoder: CtcDecoder::new(dict),
            img_height,
        }
    }

    pub fn decoder(&self) -> &CtcDecoder {
        &self.decoder
    }

    /// Recognizes one line image. Color input (3 or 4 channels) is required.
    pub fn run(&mut self, img: &Mat) -> Result<String, EngineError> {
        let start = Instant::now();

        if img.empty() {
            return Err(EngineError::EmptyImage);
        }
        if img.channels() < 3 {
            return Err(EngineError::UnsupportedChannels(img.channels()));
        }

        let scaled = scale_to_height(img, self.img_height)?;
        let input = to_tensor(&scaled)?;
        let output = self.session.run(input)?;
        let text = self.decoder.decode_output(&output)?;

        debug!(
            width = scaled.cols(),
            chars = text.chars().count(),
            elapse = start.elapsed().as_secs_f64(),
            "recognized line"
        );
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::InitStatus;
    use crate::image_impl::PixelBuffer;
    use ndarray::Array2;
    use std::sync::{Arc, Mutex};

    fn dict(entries: &[&str]) -> CharacterDictionary {
        CharacterDictionary::new(entries.iter().map(|s| s.to_string()).collect()).unwrap()
    }

    /// One-hot score matrix for a class index sequence.
    fn scores(indices: &[usize], classes: usize) -> Array2<f32> {
        let mut m = Array2::<f32>::zeros((indices.len(), classes));
        for (t, &i) in indices.iter().enumerate() {
            m[[t, i]] = 1.0;
        }
        m
    }

    #[test]
    fn blank_separated_repeats_are_kept() {
        let decoder = CtcDecoder::new(dict(&["a", "b", "c"]));
        let m = scores(&[0, 3, 3, 0, 3], 4);
        assert_eq!(decoder.decode(m.view()), "cc");
    }

    #[test]
    fn out_of_range_class_is_skipped() {
        let decoder = CtcDecoder::new(dict(&["a", "b"]));
        let m = scores(&[0, 3, 3, 0, 3], 4);
        assert_eq!(decoder.decode(m.view()), "");
    }

    #[test]
    fn out_of_range_class_still_breaks_runs() {
        let decoder = CtcDecoder::new(dict(&["a", "b"]));
        let m = scores(&[1, 3, 1], 4);
        assert_eq!(decoder.decode(m.view()), "aa");
    }

    #[test]
    fn all_blank_decodes_to_empty() {
        let decoder = CtcDecoder::new(dict(&["a", "b"]));
        assert_eq!(decoder.decode(scores(&[0, 0, 0, 0], 3).view()), "");
        assert_eq!(decoder.decode(Array2::<f32>::zeros((5, 3)).view()), "");
        assert_eq!(decoder.decode(Array2::<f32>::zeros((0, 3)).view()), "");
    }

    #[test]
    fn consecutive_repeats_collapse() {
        let decoder = CtcDecoder::new(dict(&["h", "e", "l", "o"]));
        let m = scores(&[1, 1, 2, 0, 3, 3, 0, 3, 4, 4], 5);
        assert_eq!(decoder.decode(m.view()), "hello");
    }

    #[test]
    fn ties_pick_lowest_index() {
        let decoder = CtcDecoder::new(dict(&["a", "b"]));
        let mut m = Array2::<f32>::zeros((1, 3));
        m[[0, 1]] = 0.5;
        m[[0, 2]] = 0.5;
        assert_eq!(decoder.decode(m.view()), "a");
    }

    #[test]
    fn multi_byte_entries_are_appended_whole() {
        let decoder = CtcDecoder::new(dict(&["你", "好"]));
        let m = scores(&[1, 0, 2], 3);
        assert_eq!(decoder.decode(m.view()), "你好");
    }

    #[test]
    fn decode_output_accepts_batched_and_rejects_other_ranks() {
        let decoder = CtcDecoder::new(dict(&["a", "b"]));
        let batched = scores(&[1, 2], 3).insert_axis(Axis(0)).into_dyn();
        assert_eq!(decoder.decode_output(&batched).unwrap(), "ab");

        let flat = ArrayD::<f32>::zeros(ndarray::IxDyn(&[6]));
        assert!(matches!(
            decoder.decode_output(&flat),
            Err(EngineError::UnexpectedOutputShape(_))
        ));
    }

    #[test]
    fn dictionary_lines_and_space_char() {
        let d = CharacterDictionary::from_bytes(b"a\r\nb\nc", false).unwrap();
        assert_eq!(d.len(), 3);
        assert_eq!(d.get(0), None);
        assert_eq!(d.get(1), Some("a"));
        assert_eq!(d.get(2), Some("b"));
        assert_eq!(d.get(4), None);

        let d = CharacterDictionary::from_bytes("\u{feff}x\n".as_bytes(), true).unwrap();
        assert_eq!(d.len(), 2);
        assert_eq!(d.get(1), Some("x"));
        assert_eq!(d.get(2), Some(" "));
    }

    #[test]
    fn dictionary_errors() {
        let err = CharacterDictionary::from_bytes(b"", true).unwrap_err();
        assert_eq!(err.status(), InitStatus::DictionaryInvalid);

        let err = CharacterDictionary::from_bytes(&[0xff, 0xfe, 0x00], false).unwrap_err();
        assert_eq!(err.status(), InitStatus::DictionaryInvalid);

        let err = CharacterDictionary::load(&ByteSource::from_path("/no/such/keys.txt"), false)
            .unwrap_err();
        assert_eq!(err.status(), InitStatus::DictionaryNotFound);
    }

    struct FixedSession {
        output: ArrayD<f32>,
        seen_shapes: Arc<Mutex<Vec<Vec<usize>>>>,
    }

    impl FixedSession {
        fn new(output: ArrayD<f32>) -> Self {
            Self {
                output,
                seen_shapes: Arc::default(),
            }
        }
    }

    impl InferenceSession for FixedSession {
        fn run(&mut self, input: ndarray::Array4<f32>) -> Result<ArrayD<f32>, EngineError> {
            self.seen_shapes.lock().unwrap().push(input.shape().to_vec());
            Ok(self.output.clone())
        }
    }

    #[test]
    fn recognizer_scales_to_fixed_height() {
        let output = scores(&[1, 0, 2], 3).insert_axis(Axis(0)).into_dyn();
        let session = FixedSession::new(output);
        let shapes = Arc::clone(&session.seen_shapes);
        let mut rec = TextRecognizer::with_session(Box::new(session), dict(&["o", "k"]), 48);

        let data = vec![128u8; 40 * 12 * 3];
        let img = Mat::from_pixels(&PixelBuffer::packed(40, 12, 3, &data)).unwrap();
        assert_eq!(rec.run(&img).unwrap(), "ok");
        assert_eq!(*shapes.lock().unwrap(), vec![vec![1, 3, 48, 160]]);
    }

    #[test]
    fn recognizer_rejects_gray_input() {
        let session = FixedSession::new(ArrayD::zeros(ndarray::IxDyn(&[1, 1, 3])));
        let mut rec = TextRecognizer::with_session(Box::new(session), dict(&["a"]), 48);
        let data = vec![0u8; 16];
        let img = Mat::from_pixels(&PixelBuffer::packed(4, 4, 1, &data)).unwrap();
        assert!(matches!(rec.run(&img), Err(EngineError::UnsupportedChannels(1))));
    }
}
