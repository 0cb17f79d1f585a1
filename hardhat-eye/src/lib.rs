//! hardhat-eye: vision side of the hardhat detection service
//!
//! Wraps the ONNX detection model behind a swappable gateway, renders
//! detections onto frames, and drives the video and live camera pipelines.
//! Frames are OpenCV `Mat`s in BGR order throughout.

pub mod annotate;
pub mod camera;
pub mod frame;
pub mod gateway;
pub mod models;
pub mod video;
mod utils;

pub use annotate::annotate;
pub use camera::{CameraGuard, FrameSource, StreamEnd, StreamSettings};
pub use gateway::ModelGateway;
pub use models::{DetectorBackend, ModelLoader, OnnxLoader, YoloModel};
pub use video::{TempUpload, VideoJob, VideoReport};
