use hardhat_core::{Detection, Result};
use opencv::core::Mat;
use std::path::Path;
use std::sync::Arc;

/// A loaded detection model.
///
/// `detect` receives a BGR frame and the minimum confidence to report. The
/// threshold is applied by the backend itself, and only class ids present in
/// the label table may be returned.
pub trait DetectorBackend: Send + Sync {
    /// Backend identifier, used in logs.
    fn name(&self) -> &str;

    fn detect(&self, frame: &Mat, confidence: f32) -> Result<Vec<Detection>>;
}

/// Turns a model artifact on disk into a [`DetectorBackend`].
pub trait ModelLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Arc<dyn DetectorBackend>>;
}
