//! Detection model backends

pub mod backend;
pub mod yolo;

pub use backend::{DetectorBackend, ModelLoader};
pub use yolo::{decode_output, OnnxLoader, YoloModel};
