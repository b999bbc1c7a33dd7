pub mod client;
pub mod errors;

pub use client::RemoteDetector;
pub use errors::BridgeError;
