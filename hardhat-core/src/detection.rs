//! Detection records and the class label table

use serde::{Deserialize, Serialize};

/// Class labels indexed by model class id.
pub const CLASS_LABELS: &[&str] = &["Helmet", "Vest"];

/// Label used when a class id falls outside [`CLASS_LABELS`].
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Look up the label for a class id.
pub fn class_name(class_id: usize) -> Option<&'static str> {
    CLASS_LABELS.get(class_id).copied()
}

/// Reverse lookup of [`class_name`].
pub fn class_id(name: &str) -> Option<usize> {
    CLASS_LABELS.iter().position(|label| *label == name)
}

/// Axis-aligned box in source pixel coordinates, corners inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    pub fn as_array(&self) -> [i32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

impl From<[i32; 4]> for BoundingBox {
    fn from(v: [i32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

/// One object reported by the model for a single frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub class_id: usize,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(class_id: usize, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            class_id,
            confidence,
            bbox,
        }
    }

    /// Label for this detection, [`UNKNOWN_LABEL`] for ids outside the table.
    pub fn label(&self) -> &'static str {
        class_name(self.class_id).unwrap_or(UNKNOWN_LABEL)
    }
}

/// Counts over a detection list. Recomputed on demand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionSummary {
    pub total: usize,
    pub helmets: usize,
    pub vests: usize,
}

impl DetectionSummary {
    pub fn from_detections(detections: &[Detection]) -> Self {
        let mut summary = Self::default();
        for detection in detections {
            summary.add(detection);
        }
        summary
    }

    /// Fold one more detection into the counts.
    pub fn add(&mut self, detection: &Detection) {
        self.total += 1;
        match detection.class_id {
            0 => self.helmets += 1,
            1 => self.vests += 1,
            _ => {}
        }
    }

    /// Merge counts from another frame.
    pub fn merge(&mut self, other: &DetectionSummary) {
        self.total += other.total;
        self.helmets += other.helmets;
        self.vests += other.vests;
    }
}
