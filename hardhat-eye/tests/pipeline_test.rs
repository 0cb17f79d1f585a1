//! End-to-end tests for the video and image pipelines using a scripted model

use hardhat_core::{BoundingBox, Detection, Result, VisionError};
use hardhat_eye::frame::{decode_image, encode_jpeg};
use hardhat_eye::{annotate, DetectorBackend, ModelGateway, ModelLoader, VideoJob};
use opencv::core::{Mat, Scalar, Size, CV_8UC3};
use opencv::prelude::*;
use opencv::videoio::VideoWriter;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Two detections per frame, failing on one chosen call.
struct Scripted {
    calls: AtomicUsize,
    fail_on: Option<usize>,
}

impl DetectorBackend for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    fn detect(&self, frame: &Mat, confidence: f32) -> Result<Vec<Detection>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if Some(call) == self.fail_on {
            return Err(VisionError::Inference("scripted failure".to_string()));
        }
        let (w, h) = (frame.cols(), frame.rows());
        Ok(vec![
            Detection::new(0, 0.9, BoundingBox::new(2, 2, w / 2, h / 2)),
            Detection::new(1, 0.6, BoundingBox::new(w / 2, h / 2, w - 3, h - 3)),
        ]
        .into_iter()
        .filter(|d| d.confidence >= confidence)
        .collect())
    }
}

struct ScriptedLoader(Option<usize>);

impl ModelLoader for ScriptedLoader {
    fn load(&self, _path: &Path) -> Result<Arc<dyn DetectorBackend>> {
        Ok(Arc::new(Scripted {
            calls: AtomicUsize::new(0),
            fail_on: self.0,
        }))
    }
}

fn loaded_gateway(dir: &Path, fail_on: Option<usize>) -> ModelGateway {
    let model = dir.join("fake.onnx");
    std::fs::write(&model, vec![1u8; 4096]).unwrap();
    let gateway = ModelGateway::new(Arc::new(ScriptedLoader(fail_on)), "onnx");
    gateway.load(&model).unwrap();
    gateway
}

fn write_clip(path: &Path, frames: usize, fps: f64) {
    let code = VideoWriter::fourcc('M', 'J', 'P', 'G').unwrap();
    let mut writer =
        VideoWriter::new(path.to_str().unwrap(), code, fps, Size::new(64, 48), true).unwrap();
    assert!(writer.is_opened().unwrap());
    for i in 0..frames {
        let shade = (i * 20) as f64;
        let frame = Mat::new_rows_cols_with_default(48, 64, CV_8UC3, Scalar::new(shade, 60.0, 90.0, 0.0))
            .unwrap();
        writer.write(&frame).unwrap();
    }
    writer.release().unwrap();
}

#[test]
fn test_video_counts_every_frame() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("clip.avi");
    let output = tmp.path().join("annotated.avi");
    write_clip(&input, 6, 10.0);

    let gateway = loaded_gateway(tmp.path(), None);
    let report = VideoJob::new(&input, &output).run(&gateway, 0.5, "MJPG").unwrap();

    assert_eq!(report.frame_count, 6);
    assert_eq!(report.total_detections, 12);
    assert_eq!(report.summary.helmets, 6);
    assert_eq!(report.summary.vests, 6);
    assert_eq!(report.frame_errors, 0);
    assert_eq!(report.fps, 10);
    assert!(output.exists());
}

#[test]
fn test_video_threshold_reaches_backend() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("clip.avi");
    write_clip(&input, 4, 10.0);

    let gateway = loaded_gateway(tmp.path(), None);
    let report = VideoJob::new(&input, tmp.path().join("out.avi"))
        .run(&gateway, 0.75, "MJPG")
        .unwrap();
    assert_eq!(report.total_detections, 4);
    assert_eq!(report.summary.vests, 0);
}

#[test]
fn test_video_frame_error_counted() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("clip.avi");
    write_clip(&input, 5, 10.0);

    let gateway = loaded_gateway(tmp.path(), Some(2));
    let report = VideoJob::new(&input, tmp.path().join("out.avi"))
        .run(&gateway, 0.5, "MJPG")
        .unwrap();
    assert_eq!(report.frame_count, 5);
    assert_eq!(report.frame_errors, 1);
    assert_eq!(report.total_detections, 8);
}

#[test]
fn test_video_without_model_counts_errors() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("clip.avi");
    write_clip(&input, 3, 10.0);

    let gateway = ModelGateway::new(Arc::new(ScriptedLoader(None)), "onnx");
    let report = VideoJob::new(&input, tmp.path().join("out.avi"))
        .run(&gateway, 0.5, "MJPG")
        .unwrap();
    assert_eq!(report.frame_count, 3);
    assert_eq!(report.frame_errors, 3);
    assert_eq!(report.total_detections, 0);
}

#[test]
fn test_image_pipeline() {
    let tmp = tempfile::tempdir().unwrap();
    let gateway = loaded_gateway(tmp.path(), None);

    let source = Mat::new_rows_cols_with_default(48, 64, CV_8UC3, Scalar::all(30.0)).unwrap();
    let upload = encode_jpeg(&source).unwrap();

    let frame = decode_image(&upload).unwrap();
    let detections = gateway.infer(&frame, 0.5).unwrap();
    assert!(detections.iter().all(|d| d.label() == "Helmet" || d.label() == "Vest"));

    let annotated = annotate(&frame, &detections).unwrap();
    assert_eq!((annotated.cols(), annotated.rows()), (64, 48));
    assert!(!encode_jpeg(&annotated).unwrap().is_empty());
}
