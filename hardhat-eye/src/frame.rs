//! Image decode and JPEG encode

use hardhat_core::{Result, VisionError};
use opencv::core::{Mat, Vector};
use opencv::imgcodecs;
use opencv::prelude::*;

/// Decode an uploaded image into a BGR frame.
pub fn decode_image(bytes: &[u8]) -> Result<Mat> {
    if bytes.is_empty() {
        return Err(VisionError::Codec("Empty image payload".to_string()));
    }
    let buf = Vector::<u8>::from_slice(bytes);
    let mat = imgcodecs::imdecode(&buf, imgcodecs::IMREAD_COLOR)
        .map_err(|e| VisionError::Codec(format!("Failed to decode image: {}", e)))?;
    if mat.empty() {
        return Err(VisionError::Codec("Unsupported or corrupt image data".to_string()));
    }
    Ok(mat)
}

pub fn encode_jpeg(frame: &Mat) -> Result<Vec<u8>> {
    let mut buf = Vector::<u8>::new();
    let ok = imgcodecs::imencode(".jpg", frame, &mut buf, &Vector::new())
        .map_err(|e| VisionError::Codec(format!("Failed to encode JPEG: {}", e)))?;
    if !ok {
        return Err(VisionError::Codec("JPEG encoder rejected the frame".to_string()));
    }
    Ok(buf.to_vec())
}
