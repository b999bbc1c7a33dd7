pub mod error;
pub mod labels;
pub mod postprocessing;
pub mod preprocessing;
pub mod rendering;
pub mod service;

// Re-export commonly used types for convenience
pub use error::InferenceError;
pub use labels::LabelMap;
pub use postprocessing::{AnnotatedDetections, PostProcessor, filter_by_score};
pub use preprocessing::{CoordTransform, PreProcessor, load_image};
pub use service::InferenceService;
