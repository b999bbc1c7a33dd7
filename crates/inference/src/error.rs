use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the image pipeline around the detector.
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),

    #[error("failed to wrap pixel buffer for resizing: {0}")]
    ResizeBuffer(#[from] fast_image_resize::ImageBufferError),

    #[error("failed to resize image: {0}")]
    Resize(#[from] fast_image_resize::ResizeError),

    #[error("tensor layout error: {0}")]
    TensorLayout(#[from] ndarray::ShapeError),

    #[error(transparent)]
    Model(#[from] model::ModelError),

    #[error("failed to read label map {path}: {source}")]
    LabelMapRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse label map: {0}")]
    LabelMapParse(#[from] serde_json::Error),

    #[error("label map has no entries")]
    EmptyLabelMap,

    #[error("failed to read font {path}: {source}")]
    FontRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("font file {path} is not a usable face")]
    FontParse { path: PathBuf },
}
