//! Frame annotation — bounding boxes and labels drawn onto the frame.

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use lookout_core::BoundingBox;
use std::path::Path;

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const BOX_THICKNESS: i32 = 2;
const LABEL_SCALE: f32 = 18.0;
/// Labels sit just above the box, like the original overlay.
const LABEL_OFFSET_Y: i32 = 22;

/// Draws detection regions and their labels onto frames.
pub struct Annotator {
    font: Option<FontVec>,
}

impl Annotator {
    /// Label text needs a TrueType font. When the configured font is
    /// missing or invalid, annotation degrades to boxes without labels.
    pub fn new(font_path: &Path) -> Self {
        let font = match std::fs::read(font_path) {
            Ok(bytes) => match FontVec::try_from_vec(bytes) {
                Ok(font) => Some(font),
                Err(_) => {
                    tracing::warn!(path = %font_path.display(), "font file invalid; labels disabled");
                    None
                }
            },
            Err(e) => {
                tracing::warn!(path = %font_path.display(), error = %e, "font unreadable; labels disabled");
                None
            }
        };
        Self { font }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Draw one region and its label. Out-of-frame coordinates are clipped
    /// by the drawing primitives.
    pub fn draw(&self, frame: &mut RgbImage, region: &BoundingBox, label: &str) {
        let x = region.x.round() as i32;
        let y = region.y.round() as i32;
        let width = (region.width.round().max(1.0)) as u32;
        let height = (region.height.round().max(1.0)) as u32;

        for t in 0..BOX_THICKNESS {
            let rect = Rect::at(x - t, y - t).of_size(width + 2 * t as u32, height + 2 * t as u32);
            draw_hollow_rect_mut(frame, rect, BOX_COLOR);
        }

        if let Some(font) = &self.font {
            let label_y = (y - LABEL_OFFSET_Y).max(0);
            draw_text_mut(
                frame,
                BOX_COLOR,
                x.max(0),
                label_y,
                PxScale::from(LABEL_SCALE),
                font,
                label,
            );
        }
    }
}
