//! Live camera capture for the detection stream
//!
//! The device is owned by a [`CameraGuard`] and released when the guard drops,
//! whichever way the stream loop exits. Frames leave the loop as ready-made
//! multipart parts through a bounded tokio channel; a closed channel means the
//! client went away.

use crate::annotate::annotate;
use crate::frame::encode_jpeg;
use crate::gateway::ModelGateway;
use bytes::Bytes;
use hardhat_core::codec::multipart_frame;
use hardhat_core::{Result, VisionError};
use opencv::core::Mat;
use opencv::prelude::*;
use opencv::videoio::{VideoCapture, CAP_ANY};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Anything that yields BGR frames. `Ok(None)` means no more frames.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<Option<Mat>>;
}

/// Exclusive handle on a capture device.
pub struct CameraGuard {
    index: i32,
    capture: VideoCapture,
}

impl CameraGuard {
    pub fn open(index: i32) -> Result<Self> {
        let capture = VideoCapture::new(index, CAP_ANY)
            .map_err(|e| VisionError::Device(format!("Failed to open camera {}: {}", index, e)))?;
        let opened = capture
            .is_opened()
            .map_err(|e| VisionError::Device(format!("Camera {} not opened: {}", index, e)))?;
        if !opened {
            return Err(VisionError::Device(format!("Camera {} failed to open", index)));
        }
        info!("📷 Camera {} opened", index);
        Ok(Self { index, capture })
    }

    pub fn index(&self) -> i32 {
        self.index
    }
}

impl FrameSource for CameraGuard {
    fn next_frame(&mut self) -> Result<Option<Mat>> {
        let mut frame = Mat::default();
        let grabbed = self
            .capture
            .read(&mut frame)
            .map_err(|e| VisionError::Device(format!("Camera {} read failed: {}", self.index, e)))?;
        if !grabbed || frame.empty() {
            return Ok(None);
        }
        Ok(Some(frame))
    }
}

impl Drop for CameraGuard {
    fn drop(&mut self) {
        if let Err(e) = self.capture.release() {
            warn!("Failed to release camera {}: {}", self.index, e);
        } else {
            info!("📷 Camera {} released", self.index);
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StreamSettings {
    pub confidence: f32,
    pub fps: u32,
}

impl StreamSettings {
    fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps.max(1) as f64)
    }
}

/// Why a stream loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// Receiver dropped.
    ClientGone,
    /// Source returned no frame.
    SourceExhausted,
    /// Source or encoder failed.
    SourceError,
}

/// Capture, detect, annotate and send frames until the source or the client
/// stops. Blocking; run on a blocking worker.
pub fn run_stream<S: FrameSource>(
    source: &mut S,
    gateway: &ModelGateway,
    settings: StreamSettings,
    tx: &mpsc::Sender<Bytes>,
) -> StreamEnd {
    let interval = settings.frame_interval();
    let mut sent: u64 = 0;

    let end = loop {
        let started = Instant::now();
        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break StreamEnd::SourceExhausted,
            Err(e) => {
                warn!("Stream capture failed: {}", e);
                break StreamEnd::SourceError;
            }
        };

        let out = match gateway.infer(&frame, settings.confidence) {
            Ok(detections) => match annotate(&frame, &detections) {
                Ok(annotated) => annotated,
                Err(e) => {
                    debug!("Annotation failed, sending raw frame: {}", e);
                    frame
                }
            },
            Err(e) => {
                debug!("Inference failed, sending raw frame: {}", e);
                frame
            }
        };

        let jpeg = match encode_jpeg(&out) {
            Ok(jpeg) => jpeg,
            Err(e) => {
                warn!("Stream encode failed: {}", e);
                break StreamEnd::SourceError;
            }
        };
        if tx.blocking_send(multipart_frame(&jpeg)).is_err() {
            break StreamEnd::ClientGone;
        }
        sent += 1;

        if let Some(rest) = interval.checked_sub(started.elapsed()) {
            std::thread::sleep(rest);
        }
    };

    info!("Stream stopped after {} frames: {:?}", sent, end);
    end
}
