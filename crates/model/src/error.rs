use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("failed to read checkpoint {path}: {source}")]
    CheckpointRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse checkpoint: {0}")]
    CheckpointFormat(#[from] safetensors::SafeTensorError),

    #[error("checkpoint is missing tensors: {0}")]
    MissingTensors(String),

    #[error("checkpoint contains unexpected tensors: {0}")]
    UnexpectedTensors(String),

    #[error("tensor {name} has shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        name: String,
        found: Vec<usize>,
        expected: Vec<usize>,
    },

    #[error("tensor {name} has dtype {found}, expected F32")]
    DtypeMismatch { name: String, found: String },

    #[error("inconsistent architecture: {0}")]
    Architecture(String),

    #[error("input tensor has shape {found:?}, expected {expected:?}")]
    InputShape {
        found: Vec<usize>,
        expected: [usize; 3],
    },

    #[error("head emitted {found} predictions for {expected} anchor boxes")]
    AnchorMismatch { found: usize, expected: usize },

    #[error("failed to build compute pool: {0}")]
    ComputePool(#[from] rayon::ThreadPoolBuildError),
}
