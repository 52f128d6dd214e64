use serde::{Deserialize, Serialize};

/// Sentinel name reported for a face that matches no gallery entry.
pub const UNKNOWN_NAME: &str = "Unknown";

/// Default maximum embedding distance at which two faces count as the
/// same identity.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.6;

/// Axis-aligned bounding region in frame pixel coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl BoundingBox {
    /// Intersection-over-Union with another box.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        let inter_w = (x2 - x1).max(0.0);
        let inter_h = (y2 - y1).max(0.0);
        let inter_area = inter_w * inter_h;

        let union_area = self.width * self.height + other.width * other.height - inter_area;
        if union_area > 0.0 {
            inter_area / union_area
        } else {
            0.0
        }
    }
}

/// Non-Maximum Suppression over region proposals.
///
/// Returns the indices of the boxes to keep, ordered by descending
/// confidence. Shared by both inference providers.
pub fn nms_indices(boxes: &[BoundingBox], iou_threshold: f32) -> Vec<usize> {
    let mut order: Vec<usize> = (0..boxes.len()).collect();
    order.sort_by(|&a, &b| {
        boxes[b]
            .confidence
            .partial_cmp(&boxes[a].confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; boxes.len()];

    for i in 0..order.len() {
        let a = order[i];
        if suppressed[a] {
            continue;
        }
        keep.push(a);
        for &b in order.iter().skip(i + 1) {
            if !suppressed[b] && boxes[a].iou(&boxes[b]) > iou_threshold {
                suppressed[b] = true;
            }
        }
    }

    keep
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Euclidean distance to another embedding.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// A labeled object detection in a frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub region: BoundingBox,
}

/// A detected face region paired with its embedding.
#[derive(Debug, Clone)]
pub struct FaceObservation {
    pub region: BoundingBox,
    pub embedding: Embedding,
}

/// One known identity: display name and reference embedding.
#[derive(Debug, Clone)]
pub struct GalleryEntry {
    pub name: String,
    pub embedding: Embedding,
}

/// The known-identity table, built once at startup and immutable after.
///
/// Names need not be unique; duplicates simply contribute multiple entries.
#[derive(Debug, Clone, Default)]
pub struct IdentityGallery {
    entries: Vec<GalleryEntry>,
}

impl IdentityGallery {
    pub fn new(entries: Vec<GalleryEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of resolving a probe embedding against the gallery.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub matched: bool,
    /// Distance to the nearest gallery entry; infinite for an empty gallery.
    pub distance: f32,
    /// Name of the matched entry, if any.
    pub name: Option<String>,
}

impl MatchResult {
    /// The name to report: the matched identity or the `Unknown` sentinel.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(UNKNOWN_NAME)
    }
}

/// Strategy for resolving a probe embedding against the gallery.
pub trait Matcher {
    fn resolve(&self, probe: &Embedding, gallery: &IdentityGallery) -> MatchResult;
}

/// Two-stage nearest-identity matcher.
///
/// Every gallery entry is first classified independently as a candidate
/// (distance strictly below the threshold); the global nearest entry is
/// then reported only if it is also a candidate. A nearest neighbor that
/// sits beyond the threshold therefore resolves to `Unknown` rather than a
/// low-confidence guess. Ties on the minimum distance resolve to the first
/// entry in gallery order.
pub struct EuclideanMatcher {
    pub threshold: f32,
}

impl Default for EuclideanMatcher {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }
}

impl Matcher for EuclideanMatcher {
    fn resolve(&self, probe: &Embedding, gallery: &IdentityGallery) -> MatchResult {
        if gallery.is_empty() {
            return MatchResult {
                matched: false,
                distance: f32::INFINITY,
                name: None,
            };
        }

        let entries = gallery.entries();
        let distances: Vec<f32> = entries
            .iter()
            .map(|e| probe.euclidean_distance(&e.embedding))
            .collect();

        // Per-entry classification happens before the winner is picked.
        let candidates: Vec<bool> = distances.iter().map(|&d| d < self.threshold).collect();

        let mut best = 0;
        for i in 1..distances.len() {
            if distances[i] < distances[best] {
                best = i;
            }
        }

        if candidates[best] {
            MatchResult {
                matched: true,
                distance: distances[best],
                name: Some(entries[best].name.clone()),
            }
        } else {
            MatchResult {
                matched: false,
                distance: distances[best],
                name: None,
            }
        }
    }
}

/// The aggregate published per frame: detection labels and resolved face
/// names, each in provider output order. Fully replaces the previously
/// published value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameResult {
    pub detected_objects: Vec<String>,
    pub recognized_faces: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn embedding(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec())
    }

    fn gallery(entries: &[(&str, &[f32])]) -> IdentityGallery {
        IdentityGallery::new(
            entries
                .iter()
                .map(|(name, values)| GalleryEntry {
                    name: name.to_string(),
                    embedding: embedding(values),
                })
                .collect(),
        )
    }

    #[test]
    fn test_euclidean_distance() {
        let a = embedding(&[0.0, 0.0]);
        let b = embedding(&[3.0, 4.0]);
        assert!((a.euclidean_distance(&b) - 5.0).abs() < 1e-6);
        assert_eq!(a.euclidean_distance(&a), 0.0);
    }

    #[test]
    fn test_empty_gallery_is_unknown() {
        let result = EuclideanMatcher::default().resolve(&embedding(&[1.0, 0.0]), &gallery(&[]));
        assert!(!result.matched);
        assert_eq!(result.display_name(), UNKNOWN_NAME);
        assert_eq!(result.distance, f32::INFINITY);
    }

    #[test]
    fn test_match_below_threshold() {
        let g = gallery(&[("alice", &[1.0, 0.0]), ("bob", &[0.0, 5.0])]);
        let result = EuclideanMatcher { threshold: 0.6 }.resolve(&embedding(&[1.1, 0.0]), &g);
        assert!(result.matched);
        assert_eq!(result.display_name(), "alice");
        assert!((result.distance - 0.1).abs() < 1e-5);
    }

    #[test]
    fn test_nearest_but_rejected() {
        // A nearest entry exists, but its distance sits beyond the threshold.
        let g = gallery(&[("alice", &[2.0, 0.0]), ("bob", &[0.0, 9.0])]);
        let result = EuclideanMatcher { threshold: 0.6 }.resolve(&embedding(&[0.0, 0.0]), &g);
        assert!(!result.matched);
        assert_eq!(result.display_name(), UNKNOWN_NAME);
        assert!((result.distance - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_farther_distractor_never_changes_match() {
        let probe = embedding(&[1.0, 0.0]);
        let base = gallery(&[("alice", &[1.1, 0.0])]);
        let matcher = EuclideanMatcher { threshold: 0.6 };
        let before = matcher.resolve(&probe, &base);
        assert_eq!(before.display_name(), "alice");

        let with_distractor = gallery(&[("alice", &[1.1, 0.0]), ("mallory", &[1.3, 0.0])]);
        let after = matcher.resolve(&probe, &with_distractor);
        assert_eq!(after.display_name(), "alice");
        assert_eq!(before.distance, after.distance);
    }

    #[test]
    fn test_exact_tie_resolves_to_first_entry() {
        let g = gallery(&[("first", &[1.0, 0.0]), ("second", &[-1.0, 0.0])]);
        let result = EuclideanMatcher { threshold: 2.0 }.resolve(&embedding(&[0.0, 0.0]), &g);
        assert_eq!(result.display_name(), "first");
    }

    #[test]
    fn test_two_stage_policy_equals_threshold_on_winner() {
        // The per-entry classification followed by argmin is equivalent to
        // thresholding the winner directly; pin that equivalence.
        let matcher = EuclideanMatcher { threshold: 0.6 };
        let g = gallery(&[
            ("a", &[0.0, 0.0]),
            ("b", &[0.5, 0.0]),
            ("c", &[3.0, 0.0]),
        ]);
        for probe_x in [-1.0f32, 0.0, 0.25, 0.55, 1.0, 2.9, 10.0] {
            let probe = embedding(&[probe_x, 0.0]);
            let result = matcher.resolve(&probe, &g);

            let naive_best = g
                .entries()
                .iter()
                .min_by(|a, b| {
                    probe
                        .euclidean_distance(&a.embedding)
                        .partial_cmp(&probe.euclidean_distance(&b.embedding))
                        .unwrap()
                })
                .unwrap();
            let naive_dist = probe.euclidean_distance(&naive_best.embedding);
            let naive_name = if naive_dist < matcher.threshold {
                naive_best.name.as_str()
            } else {
                UNKNOWN_NAME
            };
            assert_eq!(result.display_name(), naive_name, "probe_x = {probe_x}");
        }
    }

    #[test]
    fn test_iou_identical_and_disjoint() {
        let a = BoundingBox {
            x: 0.0,
            y: 0.0,
            width: 10.0,
            height: 10.0,
            confidence: 1.0,
        };
        let b = BoundingBox {
            x: 20.0,
            y: 20.0,
            width: 10.0,
            height: 10.0,
            confidence: 1.0,
        };
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        assert!(a.iou(&b).abs() < 1e-6);
    }

    #[test]
    fn test_iou_partial_overlap() {
        let a = BoundingBox {
            x: 0.0,
            y: 0.0,
            width: 10.0,
            height: 10.0,
            confidence: 1.0,
        };
        let b = BoundingBox {
            x: 5.0,
            y: 0.0,
            width: 10.0,
            height: 10.0,
            confidence: 1.0,
        };
        // Overlap 5x10 = 50, union 150.
        assert!((a.iou(&b) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_nms_suppresses_overlapping() {
        let boxes = vec![
            BoundingBox {
                x: 0.0,
                y: 0.0,
                width: 100.0,
                height: 100.0,
                confidence: 0.9,
            },
            BoundingBox {
                x: 5.0,
                y: 5.0,
                width: 100.0,
                height: 100.0,
                confidence: 0.8,
            },
            BoundingBox {
                x: 200.0,
                y: 200.0,
                width: 50.0,
                height: 50.0,
                confidence: 0.7,
            },
        ];
        let keep = nms_indices(&boxes, 0.4);
        assert_eq!(keep, vec![0, 2]);
    }

    #[test]
    fn test_nms_empty() {
        assert!(nms_indices(&[], 0.4).is_empty());
    }

    #[test]
    fn test_frame_result_serializes_as_string_arrays() {
        let result = FrameResult {
            detected_objects: vec!["person".into(), "chair".into()],
            recognized_faces: vec!["alice".into(), UNKNOWN_NAME.into()],
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["detected_objects"][0], "person");
        assert_eq!(json["recognized_faces"][1], "Unknown");
    }
}
