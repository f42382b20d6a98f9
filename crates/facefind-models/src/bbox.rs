//! Face geometry in source-frame pixel coordinates.

use serde::{Deserialize, Serialize};

/// Detector box in pixels.
///
/// Detector output is not trusted: the origin may be negative and the box may
/// extend past the frame edges.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_corners(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self::new(x1, y1, x2 - x1, y2 - y1)
    }

    #[inline]
    pub fn x2(&self) -> f64 {
        self.x + self.width
    }

    #[inline]
    pub fn y2(&self) -> f64 {
        self.y + self.height
    }

    #[inline]
    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Overlap area shared with `other`; zero when the boxes only touch.
    fn overlap(&self, other: &BoundingBox) -> f64 {
        let w = self.x2().min(other.x2()) - self.x.max(other.x);
        let h = self.y2().min(other.y2()) - self.y.max(other.y);
        if w > 0.0 && h > 0.0 {
            w * h
        } else {
            0.0
        }
    }

    /// Intersection over union, in `[0, 1]`.
    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let shared = self.overlap(other);
        if shared == 0.0 {
            return 0.0;
        }
        let combined = self.area() + other.area() - shared;
        if combined > 0.0 {
            shared / combined
        } else {
            0.0
        }
    }

    /// Clip to the frame, truncating to whole pixels.
    ///
    /// `None` when nothing of the box lies inside the frame.
    pub fn to_pixel_rect(&self, frame_width: u32, frame_height: u32) -> Option<PixelRect> {
        let clip = |v: f64, limit: u32| v.clamp(0.0, limit as f64) as u32;
        let (left, right) = (clip(self.x, frame_width), clip(self.x2(), frame_width));
        let (top, bottom) = (clip(self.y, frame_height), clip(self.y2(), frame_height));

        (right > left && bottom > top).then(|| PixelRect::new(left, top, right - left, bottom - top))
    }
}

/// Integer rectangle fully inside a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// `x + width <= frame_width` and `y + height <= frame_height`.
    pub fn fits_within(&self, frame_width: u32, frame_height: u32) -> bool {
        self.x + self.width <= frame_width && self.y + self.height <= frame_height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iou_of_offset_squares() {
        let a = BoundingBox::new(0.0, 0.0, 40.0, 40.0);
        let b = BoundingBox::new(20.0, 0.0, 40.0, 40.0);
        // 800 shared out of 2400
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(a.iou(&a), 1.0);
    }

    #[test]
    fn test_iou_of_touching_boxes_is_zero() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(10.0, 0.0, 10.0, 10.0);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn test_from_corners() {
        let bbox = BoundingBox::from_corners(4.0, 6.0, 10.0, 20.0);
        assert_eq!(bbox, BoundingBox::new(4.0, 6.0, 6.0, 14.0));
        assert_eq!(bbox.area(), 84.0);
    }

    #[test]
    fn test_to_pixel_rect_clips_negative_origin() {
        let rect = BoundingBox::new(-10.0, -5.0, 50.0, 40.0)
            .to_pixel_rect(100, 100)
            .unwrap();
        assert_eq!(rect, PixelRect::new(0, 0, 40, 35));
        assert!(rect.fits_within(100, 100));
    }

    #[test]
    fn test_to_pixel_rect_clips_far_edge() {
        let rect = BoundingBox::new(80.0, 90.0, 50.0, 50.0)
            .to_pixel_rect(100, 100)
            .unwrap();
        assert_eq!(rect, PixelRect::new(80, 90, 20, 10));
    }

    #[test]
    fn test_to_pixel_rect_outside_frame() {
        let bbox = BoundingBox::new(120.0, 10.0, 30.0, 30.0);
        assert!(bbox.to_pixel_rect(100, 100).is_none());
    }
}
