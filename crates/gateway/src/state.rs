use std::path::PathBuf;
use std::sync::Arc;

use bridge::RemoteDetector;
use inference::{InferenceService, PostProcessor};

/// Shared handles for the request handlers.
///
/// Everything here is read-only after startup; the handlers clone the
/// state freely and never need a lock.
#[derive(Clone)]
pub struct AppState {
    pub inference: Arc<InferenceService>,
    pub post: Arc<PostProcessor>,
    pub remote: Arc<RemoteDetector>,
    pub uploads_dir: PathBuf,
}
