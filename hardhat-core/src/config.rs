//! Server configuration
//!
//! Resolution order: built-in defaults, then an optional TOML file, then
//! `HARDHAT_*` environment variables. The binary applies CLI flags last.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Upload category, used to pick the allowed extension list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Image,
    Video,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory scanned by the model listing endpoint.
    pub model_dir: PathBuf,
    /// Model loaded at startup, relative to `model_dir`.
    pub default_model: String,
    /// Model artifact extension, without the dot.
    pub model_extension: String,
    /// Temporary video uploads.
    pub upload_dir: PathBuf,
    /// Annotated videos kept for retrieval.
    pub output_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub allowed_image_extensions: Vec<String>,
    pub allowed_video_extensions: Vec<String>,
    pub default_confidence: f32,
    pub camera_index: i32,
    pub stream_fps: u32,
    /// Four character code of the output video writer.
    pub output_fourcc: String,
    pub output_extension: String,
    pub cors_origins: Vec<String>,
    pub log_level: String,
    /// Stale temp uploads older than this are removed at startup.
    pub temp_max_age_hours: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            model_dir: PathBuf::from("model"),
            default_model: "best.onnx".to_string(),
            model_extension: "onnx".to_string(),
            upload_dir: PathBuf::from("uploads"),
            output_dir: PathBuf::from("outputs"),
            max_upload_bytes: 16 * 1024 * 1024,
            allowed_image_extensions: ["png", "jpg", "jpeg", "gif", "bmp"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            allowed_video_extensions: ["mp4", "avi", "mov", "mkv", "wmv"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            default_confidence: 0.5,
            camera_index: 0,
            stream_fps: 30,
            output_fourcc: "mp4v".to_string(),
            output_extension: "mp4".to_string(),
            cors_origins: vec!["*".to_string()],
            log_level: "info".to_string(),
            temp_max_age_hours: 24,
        }
    }
}

impl ServerConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.as_ref().display(), e)))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Apply `HARDHAT_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable source.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HARDHAT_HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("HARDHAT_PORT") {
            self.port = parse_var("HARDHAT_PORT", &port)?;
        }
        if let Some(dir) = lookup("HARDHAT_MODEL_DIR") {
            self.model_dir = PathBuf::from(dir);
        }
        if let Some(model) = lookup("HARDHAT_DEFAULT_MODEL") {
            self.default_model = model;
        }
        if let Some(dir) = lookup("HARDHAT_UPLOAD_DIR") {
            self.upload_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("HARDHAT_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(conf) = lookup("HARDHAT_DEFAULT_CONFIDENCE") {
            self.default_confidence = parse_var("HARDHAT_DEFAULT_CONFIDENCE", &conf)?;
        }
        if let Some(index) = lookup("HARDHAT_CAMERA_INDEX") {
            self.camera_index = parse_var("HARDHAT_CAMERA_INDEX", &index)?;
        }
        if let Some(fps) = lookup("HARDHAT_STREAM_FPS") {
            self.stream_fps = parse_var("HARDHAT_STREAM_FPS", &fps)?;
        }
        if let Some(origins) = lookup("HARDHAT_CORS_ORIGINS") {
            self.cors_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(level) = lookup("HARDHAT_LOG_LEVEL") {
            self.log_level = level;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::ValidationError("port cannot be 0".to_string()));
        }
        if !(0.0..=1.0).contains(&self.default_confidence) {
            return Err(ConfigError::ValidationError(
                "default_confidence must be within [0, 1]".to_string(),
            ));
        }
        if self.stream_fps == 0 || self.stream_fps > 120 {
            return Err(ConfigError::ValidationError(
                "stream_fps must be between 1 and 120".to_string(),
            ));
        }
        if self.output_fourcc.chars().count() != 4 {
            return Err(ConfigError::ValidationError(
                "output_fourcc must be exactly four characters".to_string(),
            ));
        }
        if self.max_upload_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "max_upload_bytes must be > 0".to_string(),
            ));
        }
        if self.model_extension.is_empty() || self.model_extension.starts_with('.') {
            return Err(ConfigError::ValidationError(
                "model_extension must be a bare extension such as \"onnx\"".to_string(),
            ));
        }
        Ok(())
    }

    /// Create the model, upload and output directories.
    pub fn init_dirs(&self) -> Result<(), ConfigError> {
        for dir in [&self.model_dir, &self.upload_dir, &self.output_dir] {
            std::fs::create_dir_all(dir)
                .map_err(|e| ConfigError::IoError(format!("{}: {}", dir.display(), e)))?;
        }
        Ok(())
    }

    pub fn default_model_path(&self) -> PathBuf {
        self.model_dir.join(&self.default_model)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// True when `filename` carries an extension allowed for `kind`.
    pub fn is_allowed_upload(&self, kind: UploadKind, filename: &str) -> bool {
        let allowed = match kind {
            UploadKind::Image => &self.allowed_image_extensions,
            UploadKind::Video => &self.allowed_video_extensions,
        };
        match filename.rsplit_once('.') {
            Some((_, ext)) if !ext.is_empty() => allowed.iter().any(|a| a.eq_ignore_ascii_case(ext)),
            _ => false,
        }
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::ParseError(format!("{} has invalid value '{}'", key, value)))
}
