//! Video file annotation
//!
//! Reads an uploaded container frame by frame, runs detection and annotation
//! on each frame, and writes the result to a new container at the source fps
//! and frame size.

use crate::annotate::annotate;
use crate::gateway::ModelGateway;
use hardhat_core::{DetectionSummary, Result, VisionError};
use opencv::core::{Mat, Size};
use opencv::prelude::*;
use opencv::videoio::{
    VideoCapture, VideoWriter, CAP_ANY, CAP_PROP_FPS, CAP_PROP_FRAME_HEIGHT, CAP_PROP_FRAME_WIDTH,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Used when the container does not report a usable frame rate.
pub const FALLBACK_FPS: f64 = 30.0;

/// Name of a temporary upload, `temp_video_<stamp>.<ext>`.
pub fn temp_video_name(stamp: i64, extension: &str) -> String {
    format!("temp_video_{}.{}", stamp, extension)
}

/// Name of an annotated output, `output_video_<stamp>.<ext>`.
pub fn output_video_name(stamp: i64, extension: &str) -> String {
    format!("output_video_{}.{}", stamp, extension)
}

/// An uploaded file that is removed when dropped.
#[derive(Debug)]
pub struct TempUpload(PathBuf);

impl TempUpload {
    /// Write `bytes` to `path` and take ownership of the file.
    pub fn create(path: PathBuf, bytes: &[u8]) -> Result<Self> {
        std::fs::write(&path, bytes)?;
        Ok(Self(path))
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for TempUpload {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.0) {
            Ok(()) => debug!("Removed temp upload {:?}", self.0),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove temp upload {:?}: {}", self.0, e),
        }
    }
}

/// Counters of a finished job.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VideoReport {
    pub frame_count: u64,
    pub total_detections: u64,
    /// Integer part of the source frame rate.
    pub fps: u32,
    /// Frames written unannotated because inference failed.
    pub frame_errors: u64,
    pub summary: DetectionSummary,
}

pub struct VideoJob {
    input: PathBuf,
    output: PathBuf,
}

impl VideoJob {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
        }
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Process every frame. Blocking; run on a blocking worker.
    pub fn run(&self, gateway: &ModelGateway, confidence: f32, fourcc: &str) -> Result<VideoReport> {
        let mut capture = open_capture(&self.input)?;

        let mut fps = capture.get(CAP_PROP_FPS).map_err(codec_err)?;
        if !fps.is_finite() || fps <= 0.0 {
            warn!("{:?} reports fps {}, using {}", self.input, fps, FALLBACK_FPS);
            fps = FALLBACK_FPS;
        }
        let width = capture.get(CAP_PROP_FRAME_WIDTH).map_err(codec_err)? as i32;
        let height = capture.get(CAP_PROP_FRAME_HEIGHT).map_err(codec_err)? as i32;
        if width <= 0 || height <= 0 {
            return Err(VisionError::Codec(format!(
                "Could not read frame size of {}",
                self.input.display()
            )));
        }

        let mut writer = open_writer(&self.output, fourcc, fps, Size::new(width, height))?;
        info!(
            "🎞️ Processing {:?} -> {:?} ({}x{} @ {:.2} fps)",
            self.input, self.output, width, height, fps
        );

        let mut report = VideoReport {
            fps: fps as u32,
            ..VideoReport::default()
        };
        let mut frame = Mat::default();
        loop {
            let grabbed = capture.read(&mut frame).map_err(codec_err)?;
            if !grabbed || frame.empty() {
                break;
            }
            report.frame_count += 1;

            let out = match gateway.infer(&frame, confidence) {
                Ok(detections) => {
                    report.total_detections += detections.len() as u64;
                    report.summary.merge(&DetectionSummary::from_detections(&detections));
                    annotate(&frame, &detections)?
                }
                Err(e) => {
                    report.frame_errors += 1;
                    warn!("Frame {} of {:?}: {}", report.frame_count, self.input, e);
                    frame.try_clone().map_err(codec_err)?
                }
            };
            writer.write(&out).map_err(codec_err)?;
        }

        writer.release().map_err(codec_err)?;
        capture.release().map_err(codec_err)?;

        info!(
            "✅ Video done: {} frames, {} detections, {} frame errors",
            report.frame_count, report.total_detections, report.frame_errors
        );
        Ok(report)
    }
}

fn open_capture(path: &Path) -> Result<VideoCapture> {
    let name = path_str(path)?;
    let capture = VideoCapture::from_file(name, CAP_ANY)
        .map_err(|e| VisionError::Codec(format!("Failed to open video {}: {}", name, e)))?;
    if !capture.is_opened().map_err(codec_err)? {
        return Err(VisionError::Codec(format!("Could not open video {}", name)));
    }
    Ok(capture)
}

fn open_writer(path: &Path, fourcc: &str, fps: f64, size: Size) -> Result<VideoWriter> {
    let name = path_str(path)?;
    let chars: Vec<char> = fourcc.chars().collect();
    if chars.len() != 4 {
        return Err(VisionError::Config(format!("Invalid fourcc '{}'", fourcc)));
    }
    let code = VideoWriter::fourcc(chars[0], chars[1], chars[2], chars[3]).map_err(codec_err)?;
    let writer = VideoWriter::new(name, code, fps, size, true)
        .map_err(|e| VisionError::Codec(format!("Failed to create video writer {}: {}", name, e)))?;
    if !writer.is_opened().map_err(codec_err)? {
        return Err(VisionError::Codec(format!(
            "Could not open video writer {} ({})",
            name, fourcc
        )));
    }
    Ok(writer)
}

fn path_str(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| VisionError::Validation(format!("Non UTF-8 path: {:?}", path)))
}

fn codec_err(e: opencv::Error) -> VisionError {
    VisionError::Codec(e.to_string())
}
