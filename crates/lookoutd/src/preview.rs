//! Annotated-frame preview sink.
//!
//! The loop's render step hands each annotated frame to a sink. The
//! default deployment keeps the latest frame on disk as a JPEG for other
//! tools to display; headless runs use the null sink.

use image::RgbImage;
use std::path::PathBuf;

/// Receives the annotated frame at the end of each cycle.
pub trait FrameSink {
    fn present(&mut self, frame: &RgbImage) -> std::io::Result<()>;
}

/// Discards frames.
pub struct NullSink;

impl FrameSink for NullSink {
    fn present(&mut self, _frame: &RgbImage) -> std::io::Result<()> {
        Ok(())
    }
}

/// Keeps the latest annotated frame at a fixed path, written via temp file
/// and rename so readers never observe a partial JPEG.
pub struct FilePreview {
    path: PathBuf,
    tmp: PathBuf,
}

impl FilePreview {
    pub fn new(path: PathBuf) -> Self {
        let tmp = path.with_extension("tmp.jpg");
        Self { path, tmp }
    }
}

impl FrameSink for FilePreview {
    fn present(&mut self, frame: &RgbImage) -> std::io::Result<()> {
        frame
            .save_with_format(&self.tmp, image::ImageFormat::Jpeg)
            .map_err(std::io::Error::other)?;
        std::fs::rename(&self.tmp, &self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_file_preview_writes_decodable_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preview.jpg");
        let mut sink = FilePreview::new(path.clone());

        let frame = RgbImage::from_pixel(48, 36, Rgb([200, 100, 50]));
        sink.present(&frame).unwrap();

        let written = image::open(&path).unwrap().to_rgb8();
        assert_eq!((written.width(), written.height()), (48, 36));
    }

    #[test]
    fn test_file_preview_overwrites_previous_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preview.jpg");
        let mut sink = FilePreview::new(path.clone());

        sink.present(&RgbImage::from_pixel(16, 16, Rgb([0, 0, 0]))).unwrap();
        sink.present(&RgbImage::from_pixel(24, 24, Rgb([255, 255, 255]))).unwrap();

        let written = image::open(&path).unwrap().to_rgb8();
        assert_eq!(written.width(), 24);
    }

    #[test]
    fn test_null_sink_accepts_frames() {
        let frame = RgbImage::from_pixel(8, 8, Rgb([1, 2, 3]));
        assert!(NullSink.present(&frame).is_ok());
    }
}
