//! Model gateway
//!
//! Holds the active detection model behind a read-write lock. Inference clones
//! an `Arc` of the current handle, so a concurrent `load` never tears a read:
//! in-flight calls finish on the model they started with, the next call sees
//! the new one.

use crate::models::{DetectorBackend, ModelLoader};
use hardhat_core::{Detection, Result, VisionError};
use opencv::core::Mat;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Artifacts smaller than this are treated as corrupt.
pub const MIN_MODEL_BYTES: u64 = 1024;

/// A loaded model and the file it came from.
pub struct ModelHandle {
    pub path: PathBuf,
    pub backend: Arc<dyn DetectorBackend>,
}

pub struct ModelGateway {
    loader: Arc<dyn ModelLoader>,
    handle: RwLock<Option<Arc<ModelHandle>>>,
    extension: String,
}

impl ModelGateway {
    /// Empty gateway accepting artifacts with the given extension (no dot).
    pub fn new(loader: Arc<dyn ModelLoader>, extension: impl Into<String>) -> Self {
        Self {
            loader,
            handle: RwLock::new(None),
            extension: extension.into(),
        }
    }

    /// Load the artifact at `path` and make it the active model.
    pub fn load(&self, path: &Path) -> Result<()> {
        let metadata = std::fs::metadata(path)
            .map_err(|_| VisionError::ModelLoad(format!("Model file not found: {}", path.display())))?;
        if !metadata.is_file() {
            return Err(VisionError::ModelLoad(format!(
                "Model path is not a file: {}",
                path.display()
            )));
        }

        let ext_ok = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case(&self.extension))
            .unwrap_or(false);
        if !ext_ok {
            return Err(VisionError::ModelLoad(format!(
                "Expected a .{} model file: {}",
                self.extension,
                path.display()
            )));
        }

        if metadata.len() < MIN_MODEL_BYTES {
            warn!("Rejecting {:?}: only {} bytes", path, metadata.len());
            return Err(VisionError::ModelLoad(format!(
                "Model file too small, likely corrupt: {}",
                path.display()
            )));
        }

        let backend = self.loader.load(path)?;
        let name = backend.name().to_string();
        let handle = Arc::new(ModelHandle {
            path: path.to_path_buf(),
            backend,
        });
        *self.handle.write() = Some(handle);

        info!("🧠 Model {} loaded ({})", path.display(), name);
        Ok(())
    }

    /// Run the active model on a BGR frame.
    pub fn infer(&self, frame: &Mat, confidence: f32) -> Result<Vec<Detection>> {
        let handle = self.current().ok_or(VisionError::ModelNotLoaded)?;
        handle.backend.detect(frame, confidence)
    }

    pub fn current(&self) -> Option<Arc<ModelHandle>> {
        self.handle.read().clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.handle.read().is_some()
    }

    pub fn model_path(&self) -> Option<PathBuf> {
        self.handle.read().as_ref().map(|h| h.path.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hardhat_core::BoundingBox;
    use std::io::Write;

    struct Fixed(&'static str);

    impl DetectorBackend for Fixed {
        fn name(&self) -> &str {
            self.0
        }

        fn detect(&self, _frame: &Mat, confidence: f32) -> Result<Vec<Detection>> {
            Ok(vec![Detection::new(0, confidence.max(0.9), BoundingBox::new(0, 0, 4, 4))])
        }
    }

    struct FixedLoader;

    impl ModelLoader for FixedLoader {
        fn load(&self, path: &Path) -> Result<Arc<dyn DetectorBackend>> {
            let name = if path.to_string_lossy().contains("second") { "second" } else { "first" };
            Ok(Arc::new(Fixed(name)))
        }
    }

    struct FailingLoader;

    impl ModelLoader for FailingLoader {
        fn load(&self, _path: &Path) -> Result<Arc<dyn DetectorBackend>> {
            Err(VisionError::ModelLoad("cannot parse graph".to_string()))
        }
    }

    fn model_file(dir: &Path, name: &str, size: usize) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(&vec![7u8; size]).unwrap();
        path
    }

    #[test]
    fn test_infer_without_model() {
        let gateway = ModelGateway::new(Arc::new(FixedLoader), "onnx");
        assert!(!gateway.is_loaded());
        assert!(matches!(
            gateway.infer(&Mat::default(), 0.5),
            Err(VisionError::ModelNotLoaded)
        ));
    }

    #[test]
    fn test_load_and_swap() {
        let tmp = tempfile::tempdir().unwrap();
        let first = model_file(tmp.path(), "first.onnx", 2048);
        let second = model_file(tmp.path(), "second.onnx", 2048);
        let gateway = ModelGateway::new(Arc::new(FixedLoader), "onnx");

        gateway.load(&first).unwrap();
        let held = gateway.current().unwrap();
        assert_eq!(gateway.model_path(), Some(first.clone()));

        gateway.load(&second).unwrap();
        assert_eq!(gateway.model_path(), Some(second));
        assert_eq!(gateway.current().unwrap().backend.name(), "second");
        // an earlier reader keeps its model
        assert_eq!(held.backend.name(), "first");
        assert_eq!(gateway.infer(&Mat::default(), 0.5).unwrap().len(), 1);
    }

    #[test]
    fn test_load_rejections() {
        let tmp = tempfile::tempdir().unwrap();
        let gateway = ModelGateway::new(Arc::new(FixedLoader), "onnx");

        assert!(gateway.load(&tmp.path().join("missing.onnx")).is_err());
        assert!(gateway.load(tmp.path()).is_err());
        assert!(gateway.load(&model_file(tmp.path(), "weights.pt", 2048)).is_err());
        assert!(gateway.load(&model_file(tmp.path(), "tiny.onnx", 10)).is_err());
        assert!(!gateway.is_loaded());
    }

    #[test]
    fn test_loader_failure_keeps_previous_model() {
        let tmp = tempfile::tempdir().unwrap();
        let good = model_file(tmp.path(), "good.onnx", 2048);
        let gateway = ModelGateway::new(Arc::new(FixedLoader), "onnx");
        gateway.load(&good).unwrap();

        let failing = ModelGateway {
            loader: Arc::new(FailingLoader),
            handle: RwLock::new(gateway.current()),
            extension: "onnx".to_string(),
        };
        assert!(matches!(failing.load(&good), Err(VisionError::ModelLoad(_))));
        assert_eq!(failing.model_path(), Some(good));
    }
}
