//! hardhat-core: shared data model for the hardhat detection service
//!
//! Detection records, the fixed class label table, aggregate summaries,
//! the error taxonomy used across the workspace, the wire codec and the
//! server configuration.

pub mod codec;
pub mod config;
pub mod detection;
pub mod error;

pub use codec::DetectionRecord;
pub use config::{ConfigError, ServerConfig, UploadKind};
pub use detection::{BoundingBox, Detection, DetectionSummary, CLASS_LABELS};
pub use error::{Result, VisionError};
