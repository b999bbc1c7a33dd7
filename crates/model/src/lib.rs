//! Native single-shot detector with channel attention.
//!
//! The network is described as data: [`backbone::Backbone`] and
//! [`head::HeadSpec`] hold typed layer descriptors, [`assembly`] builds
//! the served variant (attention gate behind every trunk convolution,
//! head sized for the label set), [`checkpoint`] binds a safetensors
//! file to the description under exact congruence, and [`Detector`]
//! interprets the bound layers over ndarray buffers.

pub mod anchors;
pub mod assembly;
pub mod attention;
pub mod backbone;
pub mod checkpoint;
pub mod decode;
pub mod detector;
pub mod device;
pub mod error;
pub mod head;
pub mod layers;
mod ops;

pub use anchors::AnchorConfig;
pub use assembly::{Architecture, assemble};
pub use decode::{DecodeConfig, Detections};
pub use detector::Detector;
pub use device::ComputeDevice;
pub use error::ModelError;
