//! Pixel buffer helpers for model input

use hardhat_core::{Result, VisionError};
use opencv::core::{Mat, CV_8UC3};
use opencv::prelude::*;

/// Upper bound on tensor elements accepted for a single input.
const MAX_TENSOR_ELEMENTS: usize = 100_000_000;

/// Convert an interleaved 8-bit, 3-channel Mat into a planar `[3, H, W]`
/// float buffer scaled to [0, 1]. Channel order is preserved.
pub fn mat_to_chw_tensor(mat: &Mat) -> Result<Vec<f32>> {
    if mat.typ() != CV_8UC3 {
        return Err(VisionError::Inference(format!(
            "Expected an 8-bit 3-channel frame, got Mat type {}",
            mat.typ()
        )));
    }

    let (width, height) = (mat.cols(), mat.rows());
    if width <= 0 || height <= 0 {
        return Err(VisionError::Inference("Invalid image dimensions".to_string()));
    }

    let plane = (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| VisionError::Inference("Frame dimensions overflow".to_string()))?;
    let total = plane
        .checked_mul(3)
        .filter(|t| *t <= MAX_TENSOR_ELEMENTS)
        .ok_or_else(|| VisionError::Inference("Input tensor too large".to_string()))?;

    let owned;
    let source = if mat.is_continuous() {
        mat
    } else {
        owned = mat
            .try_clone()
            .map_err(|e| VisionError::Inference(format!("Failed to copy frame: {}", e)))?;
        &owned
    };
    let bytes = source
        .data_bytes()
        .map_err(|e| VisionError::Inference(format!("Failed to get Mat data: {}", e)))?;
    if bytes.len() < total {
        return Err(VisionError::Inference(format!(
            "Frame buffer too short: {} < {}",
            bytes.len(),
            total
        )));
    }

    let mut tensor = vec![0.0f32; total];
    for (idx, px) in bytes[..total].chunks_exact(3).enumerate() {
        tensor[idx] = px[0] as f32 / 255.0;
        tensor[plane + idx] = px[1] as f32 / 255.0;
        tensor[2 * plane + idx] = px[2] as f32 / 255.0;
    }
    Ok(tensor)
}
