use std::borrow::Cow;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use ndarray::{Array4, ArrayD};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use tracing::{debug, info};

use crate::types::EngineConfig;

/// Errors raised while preparing tensors or running a loaded model.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("ORT error: {0}")]
    Ort(#[from] ort::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Empty image")]
    EmptyImage,

    #[error("Unsupported channel count: {0}")]
    UnsupportedChannels(u8),

    #[error("Invalid pixel buffer: {0}")]
    InvalidBuffer(String),

    #[error("Unexpected output shape: {0:?}")]
    UnexpectedOutputShape(Vec<usize>),
}

/// Which of the two networks a session belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelRole {
    Detection,
    Recognition,
}

impl fmt::Display for ModelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelRole::Detection => f.write_str("detection"),
            ModelRole::Recognition => f.write_str("recognition"),
        }
    }
}

/// Initialization failures. Any of them leaves the scanner in the failed state.
#[derive(thiserror::Error, Debug, Clone)]
pub enum InitError {
    #[error("{role} model not found: {detail}")]
    ModelNotFound { role: ModelRole, detail: String },

    #[error("dictionary not found: {0}")]
    DictionaryNotFound(String),

    #[error("{role} model is invalid: {detail}")]
    ModelInvalid { role: ModelRole, detail: String },

    #[error("dictionary is invalid: {0}")]
    DictionaryInvalid(String),

    #[error("inference engine mismatch: {0}")]
    EngineVersionMismatch(String),
}

/// Discrete initialization result code, stable across the C ABI.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InitStatus {
    Ok = 0,
    ModelNotFound = 1,
    DictionaryNotFound = 2,
    ModelInvalid = 3,
    DictionaryInvalid = 4,
    EngineVersionMismatch = 5,
}

impl InitError {
    pub fn status(&self) -> InitStatus {
        match self {
            InitError::ModelNotFound { .. } => InitStatus::ModelNotFound,
            InitError::DictionaryNotFound(_) => InitStatus::DictionaryNotFound,
            InitError::ModelInvalid { .. } => InitStatus::ModelInvalid,
            InitError::DictionaryInvalid(_) => InitStatus::DictionaryInvalid,
            InitError::EngineVersionMismatch(_) => InitStatus::EngineVersionMismatch,
        }
    }
}

/// A sequence of bytes, either still on disk or already in memory.
///
/// File-based and in-memory initialization both resolve to bytes through
/// [`ByteSource::read`], so everything downstream has a single code path.
#[derive(Clone)]
pub enum ByteSource {
    Path(PathBuf),
    Memory(Arc<[u8]>),
}

impl ByteSource {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        ByteSource::Path(path.into())
    }

    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> Self {
        ByteSource::Memory(bytes.into())
    }

    pub fn read(&self) -> std::io::Result<Cow<'_, [u8]>> {
        match self {
            ByteSource::Path(path) => std::fs::read(path).map(Cow::Owned),
            ByteSource::Memory(bytes) => Ok(Cow::Borrowed(bytes)),
        }
    }
}

impl fmt::Debug for ByteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ByteSource::Path(path) => f.debug_tuple("Path").field(path).finish(),
            ByteSource::Memory(bytes) => write!(f, "Memory({} bytes)", bytes.len()),
        }
    }
}

impl fmt::Display for ByteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ByteSource::Path(path) => write!(f, "{}", path.display()),
            ByteSource::Memory(bytes) => write!(f, "<memory, {} bytes>", bytes.len()),
        }
    }
}

/// The three inputs a scanner needs before it can become ready.
#[derive(Clone, Debug)]
pub struct ModelSources {
    pub detection: ByteSource,
    pub recognition: ByteSource,
    pub dictionary: ByteSource,
}

impl ModelSources {
    pub fn from_files(
        det_model: impl Into<PathBuf>,
        rec_model: impl Into<PathBuf>,
        dictionary: impl Into<PathBuf>,
    ) -> Self {
        Self {
            detection: ByteSource::from_path(det_model),
            recognition: ByteSource::from_path(rec_model),
            dictionary: ByteSource::from_path(dictionary),
        }
    }

    /// Argument order follows the C ABI: recognition, dictionary, detection.
    pub fn from_memory(
        rec_model: impl Into<Arc<[u8]>>,
        dictionary: impl Into<Arc<[u8]>>,
        det_model: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            detection: ByteSource::from_bytes(det_model),
            recognition: ByteSource::from_bytes(rec_model),
            dictionary: ByteSource::from_bytes(dictionary),
        }
    }
}

/// Runs one loaded network: a single named input in, a single named output out.
pub trait InferenceSession: Send {
    fn run(&mut self, input: Array4<f32>) -> Result<ArrayD<f32>, EngineError>;
}

/// Turns model bytes into a runnable session.
pub trait ModelProvider: Send + Sync {
    fn load(
        &self,
        role: ModelRole,
        model: &[u8],
        engine_cfg: &EngineConfig,
    ) -> Result<Box<dyn InferenceSession>, InitError>;
}

/// Resolves a model source to bytes, mapping I/O failures to
/// [`InitError::ModelNotFound`].
pub(crate) fn read_model(role: ModelRole, source: &ByteSource) -> Result<Cow<'_, [u8]>, InitError> {
    let bytes = source.read().map_err(|e| InitError::ModelNotFound {
        role,
        detail: format!("{source}: {e}"),
    })?;
    if bytes.is_empty() {
        return Err(InitError::ModelInvalid {
            role,
            detail: format!("{source} is empty"),
        });
    }
    Ok(bytes)
}

pub(crate) fn load_model(
    provider: &dyn ModelProvider,
    role: ModelRole,
    source: &ByteSource,
    engine_cfg: &EngineConfig,
) -> Result<Box<dyn InferenceSession>, InitError> {
    let bytes = read_model(role, source)?;
    provider.load(role, &bytes, engine_cfg)
}

/// ONNX Runtime backed [`ModelProvider`].
#[derive(Clone, Copy, Debug, Default)]
pub struct OrtModelProvider;

impl ModelProvider for OrtModelProvider {
    fn load(
        &self,
        role: ModelRole,
        model: &[u8],
        engine_cfg: &EngineConfig,
    ) -> Result<Box<dyn InferenceSession>, InitError> {
        let session = OrtSession::from_bytes(role, model, engine_cfg)?;
        Ok(Box::new(session))
    }
}

pub struct OrtSession {
    session: Session,
    input_name: String,
    output_name: String,
}

fn invalid_model(role: ModelRole, err: impl fmt::Display) -> InitError {
    InitError::ModelInvalid {
        role,
        detail: err.to_string(),
    }
}

impl OrtSession {
    pub fn from_bytes(
        role: ModelRole,
        model: &[u8],
        engine_cfg: &EngineConfig,
    ) -> Result<Self, InitError> {
        let mut builder = Session::builder()
            .map_err(|e| InitError::EngineVersionMismatch(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| invalid_model(role, e))?;

        if engine_cfg.intra_op_num_threads > 0 {
            builder = builder
                .with_intra_threads(engine_cfg.intra_op_num_threads)
                .map_err(|e| invalid_model(role, e))?;
        }

        if engine_cfg.inter_op_num_threads > 0 {
            builder = builder
                .with_inter_threads(engine_cfg.inter_op_num_threads)
                .map_err(|e| invalid_model(role, e))?;
        }

        let session = builder
            .commit_from_memory(model)
            .map_err(|e| invalid_model(role, e))?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or_else(|| invalid_model(role, "model declares no inputs"))?;
        let output_name = session
            .outputs
            .first()
            .map(|output| output.name.clone())
            .ok_or_else(|| invalid_model(role, "model declares no outputs"))?;

        info!(
            %role,
            input = %input_name,
            output = %output_name,
            threads = engine_cfg.intra_op_num_threads,
            "model loaded"
        );

        Ok(Self {
            session,
            input_name,
            output_name,
        })
    }
}

impl InferenceSession for OrtSession {
    fn run(&mut self, input: Array4<f32>) -> Result<ArrayD<f32>, EngineError> {
        debug!(shape = ?input.shape(), "running session");
        let value = Value::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => value])?;
        let output = outputs[self.output_name.as_str()]
            .try_extract_array::<f32>()?
            .to_owned();
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullProvider;

    impl ModelProvider for NullProvider {
        fn load(
            &self,
            role: ModelRole,
            _model: &[u8],
            _engine_cfg: &EngineConfig,
        ) -> Result<Box<dyn InferenceSession>, InitError> {
            Err(InitError::ModelInvalid {
                role,
                detail: "null provider".to_string(),
            })
        }
    }

    #[test]
    fn missing_file_is_model_not_found() {
        let source = ByteSource::from_path("/definitely/not/here/det.onnx");
        let err = load_model(
            &NullProvider,
            ModelRole::Detection,
            &source,
            &EngineConfig::default(),
        )
        .err()
        .unwrap();
        assert_eq!(err.status(), InitStatus::ModelNotFound);
        assert!(err.to_string().starts_with("detection model not found"));
    }

    #[test]
    fn empty_buffer_is_model_invalid() {
        let source = ByteSource::from_bytes(Vec::new());
        let err = load_model(
            &NullProvider,
            ModelRole::Recognition,
            &source,
            &EngineConfig::default(),
        )
        .err()
        .unwrap();
        assert_eq!(err.status(), InitStatus::ModelInvalid);
    }

    #[test]
    fn memory_source_reads_without_copy() {
        let source = ByteSource::from_bytes(vec![1u8, 2, 3]);
        let bytes = source.read().unwrap();
        assert!(matches!(bytes, Cow::Borrowed(_)));
        assert_eq!(&*bytes, &[1, 2, 3]);
        assert_eq!(format!("{source:?}"), "Memory(3 bytes)");
    }

    #[test]
    fn status_codes_are_stable() {
        assert_eq!(InitStatus::Ok as i32, 0);
        assert_eq!(InitStatus::ModelNotFound as i32, 1);
        assert_eq!(InitStatus::DictionaryNotFound as i32, 2);
        assert_eq!(InitStatus::ModelInvalid as i32, 3);
        assert_eq!(InitStatus::DictionaryInvalid as i32, 4);
        assert_eq!(InitStatus::EngineVersionMismatch as i32, 5);
    }
}
