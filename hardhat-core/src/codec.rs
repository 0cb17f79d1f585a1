//! Wire formats: JSON detection records, base64 image payloads and the
//! multipart framing used by the live stream.

use crate::detection::{class_id, BoundingBox, Detection};
use crate::error::VisionError;
use base64::{engine::general_purpose, Engine as _};
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// Content type of the live stream response.
pub const STREAM_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

const PART_HEADER: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
const PART_TRAILER: &[u8] = b"\r\n";

/// JSON shape of a detection: `{class, confidence, bbox}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub class: String,
    pub confidence: f64,
    pub bbox: [i32; 4],
}

impl From<&Detection> for DetectionRecord {
    fn from(d: &Detection) -> Self {
        Self {
            class: d.label().to_string(),
            confidence: round3(d.confidence),
            bbox: d.bbox.as_array(),
        }
    }
}

impl TryFrom<&DetectionRecord> for Detection {
    type Error = VisionError;

    fn try_from(record: &DetectionRecord) -> Result<Self, Self::Error> {
        let id = class_id(&record.class).ok_or_else(|| {
            VisionError::Validation(format!("Unknown class label: {}", record.class))
        })?;
        Ok(Detection::new(
            id,
            record.confidence as f32,
            BoundingBox::from(record.bbox),
        ))
    }
}

/// Round a confidence to three decimals for display.
pub fn round3(value: f32) -> f64 {
    (value as f64 * 1000.0).round() / 1000.0
}

pub fn encode_detections(detections: &[Detection]) -> Vec<DetectionRecord> {
    detections.iter().map(DetectionRecord::from).collect()
}

pub fn decode_detections(records: &[DetectionRecord]) -> Result<Vec<Detection>, VisionError> {
    records.iter().map(Detection::try_from).collect()
}

/// Standard base64 text of an encoded image.
pub fn encode_base64(bytes: &[u8]) -> String {
    general_purpose::STANDARD.encode(bytes)
}

pub fn decode_base64(text: &str) -> Result<Vec<u8>, VisionError> {
    general_purpose::STANDARD
        .decode(text)
        .map_err(|e| VisionError::Codec(format!("Invalid base64 payload: {}", e)))
}

/// Wrap one JPEG frame as a part of the `multipart/x-mixed-replace` stream.
pub fn multipart_frame(jpeg: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(PART_HEADER.len() + jpeg.len() + PART_TRAILER.len());
    buf.put_slice(PART_HEADER);
    buf.put_slice(jpeg);
    buf.put_slice(PART_TRAILER);
    buf.freeze()
}
