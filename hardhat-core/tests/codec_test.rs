//! Wire codec tests for hardhat-core

use hardhat_core::codec::{decode_detections, encode_detections, DetectionRecord};
use hardhat_core::{BoundingBox, Detection, DetectionSummary, CLASS_LABELS};

fn sample_detections() -> Vec<Detection> {
    vec![
        Detection::new(0, 0.91234, BoundingBox::new(12, 40, 88, 120)),
        Detection::new(1, 0.5, BoundingBox::new(0, 0, 640, 480)),
        Detection::new(0, 0.3336, BoundingBox::new(300, 10, 320, 44)),
    ]
}

#[test]
fn test_json_round_trip_preserves_fields() {
    let detections = sample_detections();
    let json = serde_json::to_string(&encode_detections(&detections)).unwrap();

    let records: Vec<DetectionRecord> = serde_json::from_str(&json).unwrap();
    let decoded = decode_detections(&records).unwrap();

    assert_eq!(decoded.len(), detections.len());
    for (original, back) in detections.iter().zip(decoded.iter()) {
        assert_eq!(original.label(), back.label());
        assert_eq!(original.bbox, back.bbox);
        let expected = (original.confidence as f64 * 1000.0).round() / 1000.0;
        assert!((back.confidence as f64 - expected).abs() < 1e-6);
    }
}

#[test]
fn test_only_known_labels_are_emitted() {
    let records = encode_detections(&sample_detections());
    for record in &records {
        assert!(CLASS_LABELS.contains(&record.class.as_str()));
    }
}

#[test]
fn test_empty_list_encodes_to_empty_array() {
    let json = serde_json::to_value(encode_detections(&[])).unwrap();
    assert_eq!(json, serde_json::json!([]));
}

#[test]
fn test_summary_serializes_counts() {
    let summary = DetectionSummary::from_detections(&sample_detections());
    let json = serde_json::to_value(summary).unwrap();
    assert_eq!(json, serde_json::json!({"total": 3, "helmets": 2, "vests": 1}));
}
