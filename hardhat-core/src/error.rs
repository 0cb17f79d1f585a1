//! Error types shared across the hardhat crates

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VisionError {
    /// Missing or malformed request input.
    #[error("{0}")]
    Validation(String),

    #[error("Model not loaded")]
    ModelNotLoaded,

    #[error("Model load error: {0}")]
    ModelLoad(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("{0}")]
    NotFound(String),

    /// Camera or capture device unavailable.
    #[error("Device error: {0}")]
    Device(String),

    /// Image or video encode/decode failure.
    #[error("Codec error: {0}")]
    Codec(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, VisionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_not_loaded_message() {
        assert_eq!(VisionError::ModelNotLoaded.to_string(), "Model not loaded");
    }

    #[test]
    fn test_validation_message_is_verbatim() {
        let err = VisionError::Validation("No image file provided".to_string());
        assert_eq!(err.to_string(), "No image file provided");
    }

    #[test]
    fn test_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let err: VisionError = io_err.into();
        match err {
            VisionError::Io(_) => {}
            _ => panic!("Expected Io error"),
        }
    }
}
