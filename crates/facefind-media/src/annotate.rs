//! Overlay drawing for accepted faces.

use facefind_models::PixelRect;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use rusttype::{Font, Scale};
use std::path::Path;

use crate::error::{MediaError, MediaResult};

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const BOX_THICKNESS: u32 = 2;
const TEXT_SCALE: f32 = 18.0;
const TEXT_GAP: i32 = 4;

/// DejaVu Sans, used for captions unless another font is loaded.
static BUNDLED_FONT: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

/// One box and caption to draw on a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    pub rect: PixelRect,
    pub text: String,
}

impl Overlay {
    pub fn new(rect: PixelRect, text: impl Into<String>) -> Self {
        Self {
            rect,
            text: text.into(),
        }
    }
}

/// Draws face boxes and their captions.
#[derive(Clone)]
pub struct Annotator {
    font: Option<Font<'static>>,
}

impl std::fmt::Debug for Annotator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Annotator")
            .field("has_font", &self.font.is_some())
            .finish()
    }
}

impl Default for Annotator {
    fn default() -> Self {
        Self::new()
    }
}

impl Annotator {
    /// Captions in the bundled font.
    pub fn new() -> Self {
        Self {
            font: Font::try_from_bytes(BUNDLED_FONT),
        }
    }

    /// Boxes without captions.
    pub fn boxes_only() -> Self {
        Self { font: None }
    }

    /// Load a TrueType font for captions.
    pub fn with_font_file(path: impl AsRef<Path>) -> MediaResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            MediaError::Font(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::with_font_bytes(bytes)
    }

    pub fn with_font_bytes(bytes: Vec<u8>) -> MediaResult<Self> {
        let font = Font::try_from_vec(bytes)
            .ok_or_else(|| MediaError::Font("not a TrueType font".to_string()))?;
        Ok(Self { font: Some(font) })
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Draw every overlay onto `canvas`.
    pub fn draw(&self, canvas: &mut RgbImage, overlays: &[Overlay]) {
        for overlay in overlays {
            self.draw_box(canvas, overlay.rect);
            if let Some(font) = &self.font {
                draw_caption(canvas, font, overlay);
            }
        }
    }

    fn draw_box(&self, canvas: &mut RgbImage, rect: PixelRect) {
        // Nested one-pixel outlines, growing inward
        for inset in 0..BOX_THICKNESS {
            let width = rect.width.saturating_sub(2 * inset);
            let height = rect.height.saturating_sub(2 * inset);
            if width == 0 || height == 0 {
                break;
            }
            let outline = Rect::at((rect.x + inset) as i32, (rect.y + inset) as i32)
                .of_size(width, height);
            draw_hollow_rect_mut(canvas, outline, BOX_COLOR);
        }
    }
}

fn draw_caption(canvas: &mut RgbImage, font: &Font<'static>, overlay: &Overlay) {
    if overlay.text.is_empty() {
        return;
    }

    let scale = Scale::uniform(TEXT_SCALE);
    let (_, text_height) = text_size(scale, font, &overlay.text);

    // Above the box, or inside it when the box touches the top edge
    let above = overlay.rect.y as i32 - text_height - TEXT_GAP;
    let y = if above >= 0 {
        above
    } else {
        overlay.rect.y as i32 + TEXT_GAP
    };

    draw_text_mut(
        canvas,
        BOX_COLOR,
        overlay.rect.x as i32,
        y,
        scale,
        font,
        &overlay.text,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draws_two_pixel_box() {
        let mut canvas = RgbImage::new(20, 20);
        Annotator::boxes_only().draw(
            &mut canvas,
            &[Overlay::new(PixelRect::new(5, 5, 10, 10), "Alice:90.00")],
        );

        assert_eq!(*canvas.get_pixel(5, 5), BOX_COLOR);
        assert_eq!(*canvas.get_pixel(6, 6), BOX_COLOR);
        assert_eq!(*canvas.get_pixel(14, 10), BOX_COLOR);
        // Interior and exterior untouched
        assert_eq!(*canvas.get_pixel(10, 10), Rgb([0, 0, 0]));
        assert_eq!(*canvas.get_pixel(2, 2), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_tiny_box_does_not_panic() {
        let mut canvas = RgbImage::new(4, 4);
        Annotator::new().draw(&mut canvas, &[Overlay::new(PixelRect::new(3, 3, 1, 1), "x")]);
        assert_eq!(*canvas.get_pixel(3, 3), BOX_COLOR);
    }

    #[test]
    fn test_default_annotator_draws_caption_above_box() {
        let annotator = Annotator::new();
        assert!(annotator.has_font());

        let rect = PixelRect::new(10, 40, 30, 20);
        let mut captioned = RgbImage::new(120, 70);
        let mut bare = RgbImage::new(120, 70);
        annotator.draw(&mut captioned, &[Overlay::new(rect, "Alice:90.00")]);
        annotator.draw(&mut bare, &[Overlay::new(rect, "")]);

        let caption_pixels = captioned
            .enumerate_pixels()
            .filter(|(_, y, p)| *y < rect.y && p.0[1] > 0)
            .count();
        assert!(caption_pixels > 0);
        assert_ne!(captioned, bare);
    }

    #[test]
    fn test_invalid_font_bytes() {
        let err = Annotator::with_font_bytes(vec![0, 1, 2, 3]).unwrap_err();
        assert!(matches!(err, MediaError::Font(_)));
        assert!(!Annotator::boxes_only().has_font());
    }
}
