//! Known-identity gallery loading.
//!
//! Scans a directory of reference images once at startup. Each image that
//! yields at least one face contributes a single gallery entry named after
//! the file's base name; images with no detectable face are skipped.

use crate::face::{FaceAnalyzer, FaceError};
use crate::types::{GalleryEntry, IdentityGallery};
use std::path::Path;
use thiserror::Error;

/// Accepted reference image extensions (case-insensitive).
const GALLERY_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("gallery directory {path} unreadable: {source}")]
    Directory {
        path: String,
        source: std::io::Error,
    },
    #[error("face analysis failed for {path}: {source}")]
    Analysis { path: String, source: FaceError },
}

/// Build the identity gallery from a directory of reference images.
///
/// Enumeration order is filesystem-dependent and deliberately not relied
/// upon. A missing or unreadable directory is fatal; an individual image
/// that fails to decode is skipped with a warning.
pub fn load_from_dir(
    dir: &Path,
    analyzer: &mut dyn FaceAnalyzer,
) -> Result<IdentityGallery, GalleryError> {
    let read_dir = std::fs::read_dir(dir).map_err(|source| GalleryError::Directory {
        path: dir.display().to_string(),
        source,
    })?;

    let mut entries = Vec::new();
    for dir_entry in read_dir {
        let dir_entry = dir_entry.map_err(|source| GalleryError::Directory {
            path: dir.display().to_string(),
            source,
        })?;
        let path = dir_entry.path();
        if !has_gallery_extension(&path) {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };

        let image = match image::open(&path) {
            Ok(image) => image.to_rgb8(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping undecodable gallery image");
                continue;
            }
        };

        let embeddings = analyzer
            .embed_all(&image)
            .map_err(|source| GalleryError::Analysis {
                path: path.display().to_string(),
                source,
            })?;
        let Some(embedding) = embeddings.into_iter().next() else {
            tracing::debug!(path = %path.display(), "no face in gallery image, skipping");
            continue;
        };

        entries.push(GalleryEntry {
            name: name.to_string(),
            embedding,
        });
    }

    tracing::info!(entries = entries.len(), dir = %dir.display(), "identity gallery loaded");
    Ok(IdentityGallery::new(entries))
}

fn has_gallery_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            GALLERY_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, Embedding, FaceObservation};
    use image::{Rgb, RgbImage};

    /// Reports one face for any image whose top-left pixel has a nonzero
    /// red channel, with the pixel color as the embedding.
    struct ColorKeyedAnalyzer;

    impl FaceAnalyzer for ColorKeyedAnalyzer {
        fn analyze(&mut self, frame: &RgbImage) -> Result<Vec<FaceObservation>, FaceError> {
            let pixel = frame.get_pixel(0, 0);
            if pixel[0] == 0 {
                return Ok(vec![]);
            }
            Ok(vec![FaceObservation {
                region: BoundingBox {
                    x: 0.0,
                    y: 0.0,
                    width: frame.width() as f32,
                    height: frame.height() as f32,
                    confidence: 1.0,
                },
                embedding: Embedding::new(vec![
                    pixel[0] as f32,
                    pixel[1] as f32,
                    pixel[2] as f32,
                ]),
            }])
        }
    }

    fn write_image(dir: &Path, name: &str, color: [u8; 3]) {
        let image = RgbImage::from_pixel(8, 8, Rgb(color));
        image.save(dir.join(name)).unwrap();
    }

    #[test]
    fn test_loads_only_images_with_faces() {
        let dir = tempfile::tempdir().unwrap();
        write_image(dir.path(), "alice.png", [200, 10, 10]);
        write_image(dir.path(), "bob.png", [150, 40, 40]);
        // No face: red channel is zero.
        write_image(dir.path(), "empty_room.png", [0, 0, 0]);
        // Wrong extension, never decoded.
        std::fs::write(dir.path().join("notes.txt"), b"not an image").unwrap();

        let gallery = load_from_dir(dir.path(), &mut ColorKeyedAnalyzer).unwrap();

        assert_eq!(gallery.len(), 2);
        let mut names: Vec<&str> = gallery.entries().iter().map(|e| e.name.as_str()).collect();
        names.sort_unstable();
        assert_eq!(names, vec!["alice", "bob"]);
    }

    #[test]
    fn test_name_strips_extension_only() {
        let dir = tempfile::tempdir().unwrap();
        write_image(dir.path(), "alice.smith.png", [200, 10, 10]);

        let gallery = load_from_dir(dir.path(), &mut ColorKeyedAnalyzer).unwrap();
        assert_eq!(gallery.entries()[0].name, "alice.smith");
    }

    #[test]
    fn test_undecodable_image_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("corrupt.jpg"), b"\xff\xd8garbage").unwrap();
        write_image(dir.path(), "alice.png", [200, 10, 10]);

        let gallery = load_from_dir(dir.path(), &mut ColorKeyedAnalyzer).unwrap();
        assert_eq!(gallery.len(), 1);
    }

    #[test]
    fn test_missing_directory_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        let result = load_from_dir(&missing, &mut ColorKeyedAnalyzer);
        assert!(matches!(result, Err(GalleryError::Directory { .. })));
    }

    #[test]
    fn test_extension_check_is_case_insensitive() {
        assert!(has_gallery_extension(Path::new("x/FACE.JPG")));
        assert!(has_gallery_extension(Path::new("x/face.Png")));
        assert!(!has_gallery_extension(Path::new("x/face.bmp")));
        assert!(!has_gallery_extension(Path::new("x/face")));
    }
}
