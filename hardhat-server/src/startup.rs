// Startup: working directories, stale upload cleanup and the default model

use crate::http::ApiState;
use hardhat_core::ServerConfig;
use hardhat_eye::{ModelGateway, ModelLoader};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{info, warn};

/// Prefix of temporary video uploads.
const TEMP_UPLOAD_PREFIX: &str = "temp_video_";

/// Remove `temp_video_*` files in `dir` at least `max_age` old. Returns the
/// number removed.
pub fn sweep_stale_uploads(dir: &Path, max_age: Duration) -> std::io::Result<usize> {
    let now = SystemTime::now();
    let mut removed = 0;

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let is_temp = entry
            .file_name()
            .to_str()
            .map(|n| n.starts_with(TEMP_UPLOAD_PREFIX))
            .unwrap_or(false);
        if !is_temp {
            continue;
        }
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }
        let age = metadata
            .modified()
            .ok()
            .and_then(|m| now.duration_since(m).ok())
            .unwrap_or(Duration::ZERO);
        if age >= max_age {
            match std::fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => warn!("Failed to remove stale upload {:?}: {}", entry.path(), e),
            }
        }
    }

    Ok(removed)
}

/// Create working directories and clear out abandoned uploads.
pub fn prepare_dirs(config: &ServerConfig) -> anyhow::Result<()> {
    config.init_dirs()?;
    let max_age = Duration::from_secs(config.temp_max_age_hours * 3600);
    match sweep_stale_uploads(&config.upload_dir, max_age) {
        Ok(0) => {}
        Ok(n) => info!("🧹 Removed {} stale uploads from {:?}", n, config.upload_dir),
        Err(e) => warn!("⚠️  Could not sweep {:?}: {}", config.upload_dir, e),
    }
    Ok(())
}

/// Build the shared state and try to load `model` (or the configured
/// default). A failed load is logged and the server starts without a model.
pub fn build_state(
    config: ServerConfig,
    loader: Arc<dyn ModelLoader>,
    model: Option<&Path>,
) -> ApiState {
    let gateway = ModelGateway::new(loader, config.model_extension.clone());
    let path = model
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.default_model_path());

    match gateway.load(&path) {
        Ok(()) => info!("✅ Default model ready"),
        Err(e) => warn!("⚠️  Starting without a model: {}", e),
    }

    ApiState::new(config, gateway)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hardhat_eye::OnnxLoader;

    #[test]
    fn test_sweep_only_temp_uploads() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("temp_video_1.mp4"), b"x").unwrap();
        std::fs::write(tmp.path().join("temp_video_2.avi"), b"x").unwrap();
        std::fs::write(tmp.path().join("output_video_1.mp4"), b"x").unwrap();

        assert_eq!(sweep_stale_uploads(tmp.path(), Duration::ZERO).unwrap(), 2);
        assert!(tmp.path().join("output_video_1.mp4").exists());
        assert!(!tmp.path().join("temp_video_1.mp4").exists());
    }

    #[test]
    fn test_sweep_keeps_recent_uploads() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("temp_video_1.mp4"), b"x").unwrap();
        assert_eq!(sweep_stale_uploads(tmp.path(), Duration::from_secs(3600)).unwrap(), 0);
        assert!(tmp.path().join("temp_video_1.mp4").exists());
    }

    #[test]
    fn test_missing_default_model_still_starts() {
        let tmp = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            model_dir: tmp.path().to_path_buf(),
            ..ServerConfig::default()
        };
        let state = build_state(config, Arc::new(OnnxLoader), None);
        assert!(!state.gateway.is_loaded());
    }
}
