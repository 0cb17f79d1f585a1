//! YOLO object detection model on ONNX Runtime

use super::backend::{DetectorBackend, ModelLoader};
use crate::utils::mat_to_chw_tensor;
use hardhat_core::detection::{class_name, BoundingBox, Detection, CLASS_LABELS};
use hardhat_core::{Result, VisionError};
use opencv::core::{Mat, Size};
use opencv::imgproc;
use opencv::prelude::*;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Square input edge of the exported model.
pub const INPUT_SIZE: u32 = 640;

/// IoU above which a lower scored box of the same class is suppressed.
pub const NMS_IOU_THRESHOLD: f32 = 0.45;

/// Tensor names of Ultralytics ONNX exports.
const INPUT_NAME: &str = "images";
const OUTPUT_NAME: &str = "output0";

/// Detector backed by an ONNX Runtime session.
pub struct YoloModel {
    session: Mutex<Session>,
    input_size: (u32, u32),
}

impl YoloModel {
    pub fn new(model_path: &Path) -> Result<Self> {
        let session = Session::builder()
            .map_err(|e| VisionError::ModelLoad(format!("Failed to create ONNX session: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| VisionError::ModelLoad(format!("Failed to configure ONNX session: {}", e)))?
            .commit_from_file(model_path)
            .map_err(|e| VisionError::ModelLoad(format!("Failed to load YOLO model: {}", e)))?;

        info!("YOLO model loaded from {:?}", model_path);

        Ok(Self {
            session: Mutex::new(session),
            input_size: (INPUT_SIZE, INPUT_SIZE),
        })
    }

    /// Resize, swap to RGB and lay out as `[1, 3, H, W]`.
    fn preprocess(&self, frame: &Mat) -> Result<Tensor<f32>> {
        let (w, h) = self.input_size;

        let mut resized = Mat::default();
        imgproc::resize(
            frame,
            &mut resized,
            Size::new(w as i32, h as i32),
            0.0,
            0.0,
            imgproc::INTER_LINEAR,
        )
        .map_err(|e| VisionError::Inference(format!("Failed to resize frame: {}", e)))?;

        let mut rgb = Mat::default();
        imgproc::cvt_color(&resized, &mut rgb, imgproc::COLOR_BGR2RGB, 0)
            .map_err(|e| VisionError::Inference(format!("Failed to convert color: {}", e)))?;

        let data = mat_to_chw_tensor(&rgb)?;
        let shape = [1usize, 3, h as usize, w as usize];
        Tensor::from_array((shape, data.into_boxed_slice()))
            .map_err(|e| VisionError::Inference(format!("Failed to create input tensor: {}", e)))
    }
}

impl DetectorBackend for YoloModel {
    fn name(&self) -> &str {
        "onnx-yolo"
    }

    fn detect(&self, frame: &Mat, confidence: f32) -> Result<Vec<Detection>> {
        if frame.empty() {
            return Err(VisionError::Inference("Empty frame".to_string()));
        }
        let input = self.preprocess(frame)?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![INPUT_NAME => input])
            .map_err(|e| VisionError::Inference(format!("YOLO inference failed: {}", e)))?;

        let output = outputs.get(OUTPUT_NAME).ok_or_else(|| {
            VisionError::Inference(format!("Model has no '{}' output", OUTPUT_NAME))
        })?;
        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| VisionError::Inference(format!("Failed to extract output tensor: {}", e)))?;
        let dims: Vec<i64> = shape.iter().copied().collect();
        debug!("YOLO output shape: {:?}", dims);

        decode_output(
            &dims,
            data,
            (frame.cols(), frame.rows()),
            self.input_size,
            confidence,
            NMS_IOU_THRESHOLD,
        )
    }
}

/// Loads `.onnx` exports into [`YoloModel`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct OnnxLoader;

impl ModelLoader for OnnxLoader {
    fn load(&self, path: &Path) -> Result<Arc<dyn DetectorBackend>> {
        Ok(Arc::new(YoloModel::new(path)?))
    }
}

/// Decode a raw YOLO head output into detections in frame coordinates.
///
/// Accepts `[1, 4 + C, N]` (the Ultralytics export layout) and the transposed
/// `[1, N, 4 + C]`. Each anchor keeps its best scoring class; anchors below
/// `confidence` or whose class is outside the label table are dropped, then
/// per-class NMS runs. Result is sorted by descending confidence.
pub fn decode_output(
    shape: &[i64],
    data: &[f32],
    frame_size: (i32, i32),
    input_size: (u32, u32),
    confidence: f32,
    iou_threshold: f32,
) -> Result<Vec<Detection>> {
    if shape.len() != 3 || shape.iter().any(|d| *d <= 0) {
        return Err(VisionError::Inference(format!(
            "Unexpected output shape {:?}",
            shape
        )));
    }
    let (a, b) = (shape[1] as usize, shape[2] as usize);
    // Feature axis is the short one: 4 box values plus one score per class.
    let (features, anchors, channel_major) = if a <= b { (a, b, true) } else { (b, a, false) };
    if features <= 4 {
        return Err(VisionError::Inference(format!(
            "Output has no class scores: {:?}",
            shape
        )));
    }
    if data.len() < features * anchors {
        return Err(VisionError::Inference(format!(
            "Output buffer too short for shape {:?}",
            shape
        )));
    }

    let at = |feature: usize, anchor: usize| {
        if channel_major {
            data[feature * anchors + anchor]
        } else {
            data[anchor * features + feature]
        }
    };

    let (frame_w, frame_h) = frame_size;
    let scale_x = frame_w as f32 / input_size.0 as f32;
    let scale_y = frame_h as f32 / input_size.1 as f32;
    let max_x = (frame_w - 1).max(0) as f32;
    let max_y = (frame_h - 1).max(0) as f32;

    let mut candidates: Vec<(usize, f32, [f32; 4])> = Vec::new();
    for i in 0..anchors {
        let mut best_class = 0;
        let mut best_score = f32::MIN;
        for c in 0..features - 4 {
            let score = at(4 + c, i);
            if score > best_score {
                best_score = score;
                best_class = c;
            }
        }
        if !best_score.is_finite() || best_score < confidence || best_class >= CLASS_LABELS.len() {
            continue;
        }

        let (cx, cy, w, h) = (at(0, i), at(1, i), at(2, i), at(3, i));
        let x1 = ((cx - w / 2.0) * scale_x).clamp(0.0, max_x);
        let y1 = ((cy - h / 2.0) * scale_y).clamp(0.0, max_y);
        let x2 = ((cx + w / 2.0) * scale_x).clamp(0.0, max_x);
        let y2 = ((cy + h / 2.0) * scale_y).clamp(0.0, max_y);
        if !(x2 > x1 && y2 > y1) {
            continue;
        }
        candidates.push((best_class, best_score.min(1.0), [x1, y1, x2, y2]));
    }

    candidates.sort_by(|l, r| r.1.total_cmp(&l.1));
    let mut kept: Vec<(usize, f32, [f32; 4])> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let suppressed = kept
            .iter()
            .any(|k| k.0 == candidate.0 && iou(&k.2, &candidate.2) > iou_threshold);
        if !suppressed {
            kept.push(candidate);
        }
    }

    Ok(kept
        .into_iter()
        .filter(|(class_id, _, _)| class_name(*class_id).is_some())
        .map(|(class_id, score, b)| {
            Detection::new(
                class_id,
                score,
                BoundingBox::new(b[0] as i32, b[1] as i32, b[2] as i32, b[3] as i32),
            )
        })
        .collect())
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let ix1 = a[0].max(b[0]);
    let iy1 = a[1].max(b[1]);
    let ix2 = a[2].min(b[2]);
    let iy2 = a[3].min(b[3]);
    let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
    if inter <= 0.0 {
        return 0.0;
    }
    let union = (a[2] - a[0]) * (a[3] - a[1]) + (b[2] - b[0]) * (b[3] - b[1]) - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}
