//! YOLOv8 object detector via ONNX Runtime.
//!
//! Decodes the single `[1, 84, N]` prediction head (4 box rows followed by
//! 80 COCO class rows per anchor) with confidence filtering and NMS
//! post-processing.

use crate::labels::COCO_CLASSES;
use crate::types::{nms_indices, BoundingBox, Detection};
use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

// --- Named constants (no magic numbers) ---
const YOLO_INPUT_SIZE: usize = 640;
const YOLO_CONFIDENCE_THRESHOLD: f32 = 0.25;
const YOLO_NMS_THRESHOLD: f32 = 0.45;
const YOLO_BOX_ATTRS: usize = 4;
/// Letterbox padding value, the ultralytics gray.
const YOLO_PAD_VALUE: f32 = 114.0 / 255.0;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0} — export with `yolo export format=onnx` and place in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// External capability producing labeled object detections for a frame.
pub trait ObjectDetector {
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<Detection>, DetectorError>;
}

/// Metadata for coordinate de-mapping after letterbox resize.
struct LetterboxInfo {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

/// YOLOv8-based object detector.
pub struct YoloDetector {
    session: Session,
}

impl YoloDetector {
    /// Load the YOLOv8 ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, DetectorError> {
        if !Path::new(model_path).exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| i.name().to_string()).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name().to_string()).collect::<Vec<_>>(),
            "loaded YOLOv8 model"
        );

        Ok(Self { session })
    }
}

impl ObjectDetector for YoloDetector {
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<Detection>, DetectorError> {
        let (input, letterbox) = preprocess(frame);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, preds) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("prediction head: {e}")))?;

        let num_attrs = YOLO_BOX_ATTRS + COCO_CLASSES.len();
        if preds.is_empty() || preds.len() % num_attrs != 0 {
            return Err(DetectorError::InferenceFailed(format!(
                "prediction head has {} values, expected a multiple of {num_attrs}",
                preds.len()
            )));
        }
        let num_anchors = preds.len() / num_attrs;

        let candidates = decode_predictions(
            preds,
            num_anchors,
            &letterbox,
            frame.width() as f32,
            frame.height() as f32,
            YOLO_CONFIDENCE_THRESHOLD,
        );

        let boxes: Vec<BoundingBox> = candidates.iter().map(|(b, _)| b.clone()).collect();
        let detections = nms_indices(&boxes, YOLO_NMS_THRESHOLD)
            .into_iter()
            .map(|i| {
                let (region, class) = &candidates[i];
                Detection {
                    label: COCO_CLASSES[*class].to_string(),
                    confidence: region.confidence,
                    region: region.clone(),
                }
            })
            .collect();

        Ok(detections)
    }
}

/// Letterbox a frame into a normalized NCHW float tensor.
fn preprocess(frame: &RgbImage) -> (Array4<f32>, LetterboxInfo) {
    let size = YOLO_INPUT_SIZE as f32;
    let (width, height) = frame.dimensions();

    let scale = (size / width as f32).min(size / height as f32);
    let new_w = ((width as f32 * scale).round() as u32).max(1);
    let new_h = ((height as f32 * scale).round() as u32).max(1);
    let pad_x = (size - new_w as f32) / 2.0;
    let pad_y = (size - new_h as f32) / 2.0;

    let resized = image::imageops::resize(frame, new_w, new_h, FilterType::Triangle);

    let mut tensor = Array4::<f32>::from_elem(
        (1, 3, YOLO_INPUT_SIZE, YOLO_INPUT_SIZE),
        YOLO_PAD_VALUE,
    );
    let x_off = pad_x.floor() as usize;
    let y_off = pad_y.floor() as usize;
    for (x, y, pixel) in resized.enumerate_pixels() {
        let tx = x as usize + x_off;
        let ty = y as usize + y_off;
        for c in 0..3 {
            tensor[[0, c, ty, tx]] = pixel[c] as f32 / 255.0;
        }
    }

    (tensor, LetterboxInfo { scale, pad_x, pad_y })
}

/// Decode raw predictions into (box, class index) candidates above the
/// confidence threshold, mapped back to frame coordinates.
///
/// Layout is attribute-major: value `(attr, anchor)` sits at
/// `attr * num_anchors + anchor`, with attributes `[cx, cy, w, h, class 0..80]`.
fn decode_predictions(
    preds: &[f32],
    num_anchors: usize,
    letterbox: &LetterboxInfo,
    frame_width: f32,
    frame_height: f32,
    threshold: f32,
) -> Vec<(BoundingBox, usize)> {
    let mut candidates = Vec::new();

    for anchor in 0..num_anchors {
        let mut best_class = 0;
        let mut best_score = 0.0f32;
        for class in 0..COCO_CLASSES.len() {
            let score = preds[(YOLO_BOX_ATTRS + class) * num_anchors + anchor];
            if score > best_score {
                best_score = score;
                best_class = class;
            }
        }
        if best_score <= threshold {
            continue;
        }

        let cx = preds[anchor];
        let cy = preds[num_anchors + anchor];
        let w = preds[2 * num_anchors + anchor];
        let h = preds[3 * num_anchors + anchor];

        // Map from letterboxed space to original frame space.
        let x1 = ((cx - w / 2.0 - letterbox.pad_x) / letterbox.scale).clamp(0.0, frame_width);
        let y1 = ((cy - h / 2.0 - letterbox.pad_y) / letterbox.scale).clamp(0.0, frame_height);
        let x2 = ((cx + w / 2.0 - letterbox.pad_x) / letterbox.scale).clamp(0.0, frame_width);
        let y2 = ((cy + h / 2.0 - letterbox.pad_y) / letterbox.scale).clamp(0.0, frame_height);
        if x2 <= x1 || y2 <= y1 {
            continue;
        }

        candidates.push((
            BoundingBox {
                x: x1,
                y: y1,
                width: x2 - x1,
                height: y2 - y1,
                confidence: best_score,
            },
            best_class,
        ));
    }

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    const NUM_ATTRS: usize = YOLO_BOX_ATTRS + 80;

    /// Build a prediction buffer for `num_anchors` anchors, all zero.
    fn empty_preds(num_anchors: usize) -> Vec<f32> {
        vec![0.0; NUM_ATTRS * num_anchors]
    }

    fn set_anchor(
        preds: &mut [f32],
        num_anchors: usize,
        anchor: usize,
        cxcywh: [f32; 4],
        class: usize,
        score: f32,
    ) {
        for (attr, v) in cxcywh.iter().enumerate() {
            preds[attr * num_anchors + anchor] = *v;
        }
        preds[(YOLO_BOX_ATTRS + class) * num_anchors + anchor] = score;
    }

    fn identity_letterbox() -> LetterboxInfo {
        LetterboxInfo {
            scale: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
        }
    }

    #[test]
    fn test_decode_single_detection() {
        let num_anchors = 8;
        let mut preds = empty_preds(num_anchors);
        set_anchor(&mut preds, num_anchors, 3, [320.0, 240.0, 100.0, 50.0], 0, 0.9);

        let candidates = decode_predictions(
            &preds,
            num_anchors,
            &identity_letterbox(),
            640.0,
            640.0,
            YOLO_CONFIDENCE_THRESHOLD,
        );

        assert_eq!(candidates.len(), 1);
        let (bbox, class) = &candidates[0];
        assert_eq!(*class, 0);
        assert!((bbox.x - 270.0).abs() < 1e-3);
        assert!((bbox.y - 215.0).abs() < 1e-3);
        assert!((bbox.width - 100.0).abs() < 1e-3);
        assert!((bbox.height - 50.0).abs() < 1e-3);
        assert!((bbox.confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_decode_respects_confidence_threshold() {
        let num_anchors = 4;
        let mut preds = empty_preds(num_anchors);
        set_anchor(&mut preds, num_anchors, 0, [100.0, 100.0, 20.0, 20.0], 5, 0.2);

        let candidates = decode_predictions(
            &preds,
            num_anchors,
            &identity_letterbox(),
            640.0,
            640.0,
            YOLO_CONFIDENCE_THRESHOLD,
        );
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_decode_unmaps_letterbox() {
        // 320x240 frame letterboxed into 640x640: scale 2, pad_y 80.
        let letterbox = LetterboxInfo {
            scale: 2.0,
            pad_x: 0.0,
            pad_y: 80.0,
        };
        let num_anchors = 2;
        let mut preds = empty_preds(num_anchors);
        set_anchor(&mut preds, num_anchors, 1, [320.0, 320.0, 200.0, 120.0], 2, 0.8);

        let candidates =
            decode_predictions(&preds, num_anchors, &letterbox, 320.0, 240.0, 0.25);
        assert_eq!(candidates.len(), 1);
        let (bbox, class) = &candidates[0];
        assert_eq!(*class, 2);
        // cx 320 → (320 - 100 - 0) / 2 = 110
        assert!((bbox.x - 110.0).abs() < 1e-3);
        // cy 320 → (320 - 60 - 80) / 2 = 90
        assert!((bbox.y - 90.0).abs() < 1e-3);
        assert!((bbox.width - 100.0).abs() < 1e-3);
        assert!((bbox.height - 60.0).abs() < 1e-3);
    }

    #[test]
    fn test_preprocess_shape_and_padding() {
        // A wide white frame: letterbox pads top and bottom with gray.
        let frame = RgbImage::from_pixel(640, 320, image::Rgb([255, 255, 255]));
        let (tensor, letterbox) = preprocess(&frame);

        assert_eq!(tensor.shape(), &[1, 3, YOLO_INPUT_SIZE, YOLO_INPUT_SIZE]);
        assert!((letterbox.scale - 1.0).abs() < 1e-6);
        assert!((letterbox.pad_y - 160.0).abs() < 1e-6);

        // Top padding row keeps the pad value; image rows are white.
        assert!((tensor[[0, 0, 0, 0]] - YOLO_PAD_VALUE).abs() < 1e-6);
        assert!((tensor[[0, 0, 320, 320]] - 1.0).abs() < 1e-6);
    }
}
