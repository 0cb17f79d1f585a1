//! Detection overlay rendering

use hardhat_core::{Detection, Result, VisionError};
use opencv::core::{Mat, Point, Rect, Scalar, Size};
use opencv::imgproc;
use opencv::prelude::*;

const BOX_THICKNESS: i32 = 2;
const FONT_FACE: i32 = imgproc::FONT_HERSHEY_SIMPLEX;
const FONT_SCALE: f64 = 0.5;
const TEXT_THICKNESS: i32 = 2;
/// Label baseline sits this far above the box.
const LABEL_OFFSET: i32 = 10;

/// BGR draw color for a class label.
pub fn class_color(label: &str) -> Scalar {
    match label {
        "Helmet" => Scalar::new(0.0, 255.0, 0.0, 0.0),
        "Vest" => Scalar::new(0.0, 255.0, 255.0, 0.0),
        _ => Scalar::new(0.0, 0.0, 255.0, 0.0),
    }
}

pub fn label_text(detection: &Detection) -> String {
    format!("{} {:.2}", detection.label(), detection.confidence)
}

/// Baseline origin for a label of `text` size above a box at (`x1`, `y1`),
/// kept inside a `frame` sized canvas.
pub fn label_origin(x1: i32, y1: i32, text: Size, frame: Size) -> Point {
    let max_x = (frame.width - text.width).max(0);
    let max_y = (frame.height - 1).max(text.height);
    Point::new(
        x1.clamp(0, max_x),
        (y1 - LABEL_OFFSET).clamp(text.height, max_y),
    )
}

/// Draw every detection onto a copy of `frame`. The input is left untouched.
pub fn annotate(frame: &Mat, detections: &[Detection]) -> Result<Mat> {
    let mut canvas = frame
        .try_clone()
        .map_err(|e| VisionError::Codec(format!("Failed to copy frame: {}", e)))?;
    let frame_size = Size::new(canvas.cols(), canvas.rows());

    for detection in detections {
        let b = &detection.bbox;
        let color = class_color(detection.label());
        imgproc::rectangle(
            &mut canvas,
            Rect::new(b.x1, b.y1, b.width() + 1, b.height() + 1),
            color,
            BOX_THICKNESS,
            imgproc::LINE_8,
            0,
        )
        .map_err(|e| VisionError::Codec(format!("Failed to draw box: {}", e)))?;

        let text = label_text(detection);
        let mut baseline = 0;
        let text_size = imgproc::get_text_size(&text, FONT_FACE, FONT_SCALE, TEXT_THICKNESS, &mut baseline)
            .map_err(|e| VisionError::Codec(format!("Failed to measure label: {}", e)))?;
        imgproc::put_text(
            &mut canvas,
            &text,
            label_origin(b.x1, b.y1, text_size, frame_size),
            FONT_FACE,
            FONT_SCALE,
            color,
            TEXT_THICKNESS,
            imgproc::LINE_8,
            false,
        )
        .map_err(|e| VisionError::Codec(format!("Failed to draw label: {}", e)))?;
    }

    Ok(canvas)
}
