//! Face detector seam.

use facefind_models::BoundingBox;
use image::RgbImage;

use crate::error::VisionResult;

/// Channel order a detector expects its input in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelOrder {
    #[default]
    Rgb,
    Bgr,
}

/// One face reported by a detector, in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
    pub bbox: BoundingBox,
    /// Detector confidence (0.0-1.0)
    pub confidence: f64,
}

impl RawDetection {
    pub fn new(bbox: BoundingBox, confidence: f64) -> Self {
        Self { bbox, confidence }
    }
}

/// A face detector.
///
/// Implementations receive the image in the order given by
/// [`FaceDetector::channel_order`] and may return boxes that stick out of
/// the frame; the extractor clamps them.
pub trait FaceDetector: Send + Sync {
    fn detect(&self, image: &RgbImage) -> VisionResult<Vec<RawDetection>>;

    fn channel_order(&self) -> ChannelOrder {
        ChannelOrder::Rgb
    }

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Swap the red and blue channels in place.
pub fn swap_red_blue(image: &mut RgbImage) {
    for pixel in image.pixels_mut() {
        pixel.0.swap(0, 2);
    }
}

/// Greedy non-maximum suppression, highest confidence first.
pub fn non_max_suppression(mut detections: Vec<RawDetection>, iou_threshold: f64) -> Vec<RawDetection> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<RawDetection> = Vec::with_capacity(detections.len());
    for candidate in detections {
        if kept
            .iter()
            .all(|k| k.bbox.iou(&candidate.bbox) <= iou_threshold)
        {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_nms_keeps_best_of_overlapping() {
        let detections = vec![
            RawDetection::new(BoundingBox::new(0.0, 0.0, 100.0, 100.0), 0.85),
            RawDetection::new(BoundingBox::new(5.0, 5.0, 100.0, 100.0), 0.95),
            RawDetection::new(BoundingBox::new(300.0, 300.0, 50.0, 50.0), 0.9),
        ];

        let kept = non_max_suppression(detections, 0.3);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.95);
        assert_eq!(kept[1].confidence, 0.9);
    }

    #[test]
    fn test_swap_red_blue() {
        let mut image = RgbImage::from_pixel(1, 1, Rgb([10, 20, 30]));
        swap_red_blue(&mut image);
        assert_eq!(*image.get_pixel(0, 0), Rgb([30, 20, 10]));
    }
}
