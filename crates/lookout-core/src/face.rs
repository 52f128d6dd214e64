//! Face detection and embedding via ONNX Runtime.
//!
//! SCRFD (anchor-free, 3-stride) locates faces; each located region is
//! cropped, resized to 112x112, and fed to ArcFace for a 512-dimensional
//! L2-normalized embedding.

use crate::types::{nms_indices, BoundingBox, Embedding, FaceObservation};
use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

// --- SCRFD constants ---
const SCRFD_INPUT_SIZE: usize = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_CONFIDENCE_THRESHOLD: f32 = 0.5;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

// --- ArcFace constants (symmetric normalization, unlike SCRFD) ---
const ARCFACE_INPUT_SIZE: usize = 112;
const ARCFACE_MEAN: f32 = 127.5;
const ARCFACE_STD: f32 = 127.5;
const ARCFACE_EMBEDDING_DIM: usize = 512;

#[derive(Error, Debug)]
pub enum FaceError {
    #[error("model file not found: {0} — download from insightface and place in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// External capability producing face regions and embeddings for a frame.
pub trait FaceAnalyzer {
    /// Detect faces and extract one embedding per face, in detection order.
    fn analyze(&mut self, frame: &RgbImage) -> Result<Vec<FaceObservation>, FaceError>;

    /// Extract the embeddings of every face in a reference image.
    /// Used by the gallery loader.
    fn embed_all(&mut self, image: &RgbImage) -> Result<Vec<Embedding>, FaceError> {
        Ok(self
            .analyze(image)?
            .into_iter()
            .map(|obs| obs.embedding)
            .collect())
    }
}

/// Output tensor indices for one stride: (score_idx, bbox_idx).
type StrideOutputIndices = (usize, usize);

/// SCRFD + ArcFace face analyzer.
pub struct OnnxFaceAnalyzer {
    detector: Session,
    embedder: Session,
    /// Per-stride output indices for strides [8, 16, 32], discovered by
    /// name at load time with a positional fallback.
    stride_outputs: [StrideOutputIndices; 3],
}

impl OnnxFaceAnalyzer {
    /// Load the SCRFD and ArcFace ONNX models.
    pub fn load(detector_path: &str, embedder_path: &str) -> Result<Self, FaceError> {
        for path in [detector_path, embedder_path] {
            if !Path::new(path).exists() {
                return Err(FaceError::ModelNotFound(path.to_string()));
            }
        }

        let detector = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(detector_path)?;

        let output_names: Vec<String> = detector
            .outputs()
            .iter()
            .map(|o| o.name().to_string())
            .collect();
        if output_names.len() < 6 {
            return Err(FaceError::InferenceFailed(format!(
                "SCRFD model requires score and bbox outputs for 3 strides, got {} outputs",
                output_names.len()
            )));
        }
        let stride_outputs = discover_stride_outputs(&output_names);
        tracing::info!(path = detector_path, ?stride_outputs, "loaded SCRFD model");

        let embedder = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(embedder_path)?;
        tracing::info!(path = embedder_path, "loaded ArcFace model");

        Ok(Self {
            detector,
            embedder,
            stride_outputs,
        })
    }

    /// Locate face regions in a frame, highest confidence first.
    fn detect_regions(&mut self, frame: &RgbImage) -> Result<Vec<BoundingBox>, FaceError> {
        let (input, letterbox) = preprocess_scrfd(frame);

        let outputs = self
            .detector
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (stride_pos, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx) = self.stride_outputs[stride_pos];
            let (_, scores) = outputs[score_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| FaceError::InferenceFailed(format!("scores stride {stride}: {e}")))?;
            let (_, bboxes) = outputs[bbox_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| FaceError::InferenceFailed(format!("bboxes stride {stride}: {e}")))?;

            candidates.extend(decode_stride(
                scores,
                bboxes,
                stride,
                &letterbox,
                SCRFD_CONFIDENCE_THRESHOLD,
            ));
        }

        let kept = nms_indices(&candidates, SCRFD_NMS_THRESHOLD)
            .into_iter()
            .map(|i| candidates[i].clone())
            .collect();
        Ok(kept)
    }

    /// Embed a face crop, L2-normalized.
    fn embed(&mut self, face: &RgbImage) -> Result<Embedding, FaceError> {
        let input = preprocess_arcface(face);

        let outputs = self
            .embedder
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| FaceError::InferenceFailed(format!("embedding extraction: {e}")))?;

        let raw: Vec<f32> = raw_data.to_vec();
        if raw.len() != ARCFACE_EMBEDDING_DIM {
            return Err(FaceError::InferenceFailed(format!(
                "expected {ARCFACE_EMBEDDING_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }

        let norm: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
        let values = if norm > 0.0 {
            raw.iter().map(|x| x / norm).collect()
        } else {
            raw
        };

        Ok(Embedding::new(values))
    }
}

impl FaceAnalyzer for OnnxFaceAnalyzer {
    fn analyze(&mut self, frame: &RgbImage) -> Result<Vec<FaceObservation>, FaceError> {
        let regions = self.detect_regions(frame)?;

        let mut observations = Vec::with_capacity(regions.len());
        for region in regions {
            let crop = crop_face(frame, &region);
            let embedding = self.embed(&crop)?;
            observations.push(FaceObservation { region, embedding });
        }
        tracing::debug!(faces = observations.len(), "frame analyzed");
        Ok(observations)
    }
}

/// Metadata for coordinate de-mapping after letterbox resize.
struct LetterboxInfo {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

/// Letterbox a frame into an NCHW float tensor normalized to the SCRFD
/// input distribution. Padding is zero-valued after normalization.
fn preprocess_scrfd(frame: &RgbImage) -> (Array4<f32>, LetterboxInfo) {
    let size = SCRFD_INPUT_SIZE as f32;
    let (width, height) = frame.dimensions();

    let scale = (size / width as f32).min(size / height as f32);
    let new_w = ((width as f32 * scale).round() as u32).max(1);
    let new_h = ((height as f32 * scale).round() as u32).max(1);
    let pad_x = (size - new_w as f32) / 2.0;
    let pad_y = (size - new_h as f32) / 2.0;

    let resized = image::imageops::resize(frame, new_w, new_h, FilterType::Triangle);

    let mut tensor = Array4::<f32>::zeros((1, 3, SCRFD_INPUT_SIZE, SCRFD_INPUT_SIZE));
    let x_off = pad_x.floor() as usize;
    let y_off = pad_y.floor() as usize;
    for (x, y, pixel) in resized.enumerate_pixels() {
        let tx = x as usize + x_off;
        let ty = y as usize + y_off;
        for c in 0..3 {
            tensor[[0, c, ty, tx]] = (pixel[c] as f32 - SCRFD_MEAN) / SCRFD_STD;
        }
    }

    (tensor, LetterboxInfo { scale, pad_x, pad_y })
}

/// Decode SCRFD detections for a single stride level, mapping boxes back
/// to original frame coordinates.
fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    stride: usize,
    letterbox: &LetterboxInfo,
    threshold: f32,
) -> Vec<BoundingBox> {
    let grid_w = SCRFD_INPUT_SIZE / stride;
    let grid_h = SCRFD_INPUT_SIZE / stride;
    let num_anchors = grid_w * grid_h * SCRFD_ANCHORS_PER_CELL;

    let mut detections = Vec::new();

    for idx in 0..num_anchors {
        let score = scores.get(idx).copied().unwrap_or(0.0);
        if score <= threshold {
            continue;
        }

        let cell = idx / SCRFD_ANCHORS_PER_CELL;
        let anchor_cx = (cell % grid_w) as f32 * stride as f32;
        let anchor_cy = (cell / grid_w) as f32 * stride as f32;

        // Offsets are [left, top, right, bottom] in stride units.
        let off = idx * 4;
        if off + 3 >= bboxes.len() {
            continue;
        }
        let x1 = anchor_cx - bboxes[off] * stride as f32;
        let y1 = anchor_cy - bboxes[off + 1] * stride as f32;
        let x2 = anchor_cx + bboxes[off + 2] * stride as f32;
        let y2 = anchor_cy + bboxes[off + 3] * stride as f32;

        let orig_x1 = (x1 - letterbox.pad_x) / letterbox.scale;
        let orig_y1 = (y1 - letterbox.pad_y) / letterbox.scale;
        let orig_x2 = (x2 - letterbox.pad_x) / letterbox.scale;
        let orig_y2 = (y2 - letterbox.pad_y) / letterbox.scale;

        detections.push(BoundingBox {
            x: orig_x1,
            y: orig_y1,
            width: orig_x2 - orig_x1,
            height: orig_y2 - orig_y1,
            confidence: score,
        });
    }

    detections
}

/// Crop a face region out of the frame, clamped to frame bounds.
fn crop_face(frame: &RgbImage, region: &BoundingBox) -> RgbImage {
    let frame_w = frame.width();
    let frame_h = frame.height();

    let x = region.x.max(0.0).min((frame_w - 1) as f32) as u32;
    let y = region.y.max(0.0).min((frame_h - 1) as f32) as u32;
    let x2 = (region.x + region.width).ceil().clamp(0.0, frame_w as f32) as u32;
    let y2 = (region.y + region.height).ceil().clamp(0.0, frame_h as f32) as u32;
    let w = x2.saturating_sub(x).max(1);
    let h = y2.saturating_sub(y).max(1);

    image::imageops::crop_imm(frame, x, y, w, h).to_image()
}

/// Resize a face crop to 112x112 and pack it into an NCHW float tensor.
fn preprocess_arcface(face: &RgbImage) -> Array4<f32> {
    let size = ARCFACE_INPUT_SIZE as u32;
    let resized = image::imageops::resize(face, size, size, FilterType::Triangle);

    let mut tensor =
        Array4::<f32>::zeros((1, 3, ARCFACE_INPUT_SIZE, ARCFACE_INPUT_SIZE));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] =
                (pixel[c] as f32 - ARCFACE_MEAN) / ARCFACE_STD;
        }
    }

    tensor
}

/// Discover SCRFD output tensor ordering by name.
///
/// SCRFD exports name tensors either as "score_8"/"bbox_8"/... or as
/// generic integers. With recognized names, map them to stride slots;
/// otherwise fall back to the standard positional ordering
/// ([0-2] = scores, [3-5] = bboxes for strides 8/16/32).
fn discover_stride_outputs(names: &[String]) -> [StrideOutputIndices; 3] {
    let find = |prefix: &str, stride: usize| -> Option<usize> {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| n == &target)
    };

    let named = SCRFD_STRIDES
        .iter()
        .all(|&s| find("score", s).is_some() && find("bbox", s).is_some());

    if named {
        std::array::from_fn(|i| {
            let stride = SCRFD_STRIDES[i];
            (
                find("score", stride).unwrap(),
                find("bbox", stride).unwrap(),
            )
        })
    } else {
        tracing::info!(
            ?names,
            "SCRFD output names not recognized, using positional mapping"
        );
        [(0, 3), (1, 4), (2, 5)]
    }
}
