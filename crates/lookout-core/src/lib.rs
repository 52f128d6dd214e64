//! lookout-core — perception providers and identity matching.
//!
//! Wraps a YOLOv8 object detector and an SCRFD + ArcFace face pipeline,
//! both running via ONNX Runtime for CPU inference, and provides the
//! known-identity gallery model plus the nearest-identity matcher used by
//! the perception loop.

pub mod detector;
pub mod face;
pub mod gallery;
pub mod labels;
pub mod types;

pub use detector::{DetectorError, ObjectDetector, YoloDetector};
pub use face::{FaceAnalyzer, FaceError, OnnxFaceAnalyzer};
pub use gallery::GalleryError;
pub use types::{
    BoundingBox, Detection, Embedding, EuclideanMatcher, FaceObservation, FrameResult,
    GalleryEntry, IdentityGallery, MatchResult, Matcher, DEFAULT_MATCH_THRESHOLD, UNKNOWN_NAME,
};
