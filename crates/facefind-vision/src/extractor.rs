//! Face extraction: detect, gate, expand, crop and resize.

use facefind_media::Frame;
use facefind_models::{BoundingBox, PixelRect};
use image::imageops::{self, FilterType};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::trace;

use crate::detector::{swap_red_blue, ChannelOrder, FaceDetector, RawDetection};
use crate::error::VisionResult;

/// Minimum detector confidence for a face to be kept.
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.8;
/// Context pixels added around a face, split evenly between both sides.
pub const DEFAULT_MARGIN: u32 = 44;
/// Side of the square crop handed to the classifier.
pub const DEFAULT_IMAGE_SIZE: u32 = 160;

/// Geometry and gating settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExtractorConfig {
    pub min_confidence: f64,
    pub margin: u32,
    pub image_size: u32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            margin: DEFAULT_MARGIN,
            image_size: DEFAULT_IMAGE_SIZE,
        }
    }
}

/// One accepted face.
#[derive(Debug, Clone)]
pub struct FaceRegion {
    /// Margin-expanded crop box, inside the frame
    pub bbox: PixelRect,
    /// Detector box clamped to the frame, used for overlays
    pub face_box: PixelRect,
    pub confidence: f64,
    /// `image_size` x `image_size` RGB crop
    pub crop: RgbImage,
}

/// Turns frames into normalized face crops.
#[derive(Clone)]
pub struct FaceExtractor {
    detector: Arc<dyn FaceDetector>,
    config: ExtractorConfig,
}

impl FaceExtractor {
    pub fn new(detector: Arc<dyn FaceDetector>, config: ExtractorConfig) -> Self {
        Self { detector, config }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    pub fn detector_name(&self) -> &'static str {
        self.detector.name()
    }

    /// Detect and crop every face passing the confidence gate.
    ///
    /// Regions come back in detector order. No faces is an empty vec.
    pub fn extract(&self, frame: &Frame) -> VisionResult<Vec<FaceRegion>> {
        let detections = match self.detector.channel_order() {
            ChannelOrder::Rgb => self.detector.detect(&frame.pixels)?,
            ChannelOrder::Bgr => {
                let mut bgr = frame.pixels.clone();
                swap_red_blue(&mut bgr);
                self.detector.detect(&bgr)?
            }
        };

        let raw_count = detections.len();
        let regions: Vec<FaceRegion> = detections
            .iter()
            .filter_map(|detection| self.region(&frame.pixels, detection))
            .collect();

        trace!(
            frame = frame.frame_number,
            detections = raw_count,
            accepted = regions.len(),
            "Extracted faces"
        );

        Ok(regions)
    }

    fn region(&self, pixels: &RgbImage, detection: &RawDetection) -> Option<FaceRegion> {
        // NaN never passes
        if !(detection.confidence >= self.config.min_confidence) {
            return None;
        }

        let (face_box, bbox) = face_geometry(
            &detection.bbox,
            self.config.margin,
            pixels.width(),
            pixels.height(),
        )?;

        let crop = imageops::crop_imm(pixels, bbox.x, bbox.y, bbox.width, bbox.height).to_image();
        let crop = imageops::resize(
            &crop,
            self.config.image_size,
            self.config.image_size,
            FilterType::Triangle,
        );

        Some(FaceRegion {
            bbox,
            face_box,
            confidence: detection.confidence,
            crop,
        })
    }
}

/// Move a negative detector origin onto the frame edge, keeping the box size,
/// then expand it by `margin / 2` per side and clamp both boxes to the frame.
///
/// Returns `(face_box, crop_box)`, or `None` when the box is degenerate once
/// clamped.
pub fn face_geometry(
    raw: &BoundingBox,
    margin: u32,
    frame_width: u32,
    frame_height: u32,
) -> Option<(PixelRect, PixelRect)> {
    let x1 = raw.x.max(0.0);
    let y1 = raw.y.max(0.0);
    let x2 = x1 + raw.width;
    let y2 = y1 + raw.height;

    let face_box = BoundingBox::from_corners(x1, y1, x2, y2).to_pixel_rect(frame_width, frame_height)?;

    let half = margin as f64 / 2.0;
    let crop_box = BoundingBox::from_corners(x1 - half, y1 - half, x2 + half, y2 + half)
        .to_pixel_rect(frame_width, frame_height)?;

    Some((face_box, crop_box))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VisionError;

    struct FixedDetector(Vec<RawDetection>);

    impl FaceDetector for FixedDetector {
        fn detect(&self, _image: &RgbImage) -> VisionResult<Vec<RawDetection>> {
            Ok(self.0.clone())
        }

        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    struct FailingDetector;

    impl FaceDetector for FailingDetector {
        fn detect(&self, _image: &RgbImage) -> VisionResult<Vec<RawDetection>> {
            Err(VisionError::detection("model crashed"))
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    fn frame(width: u32, height: u32) -> Frame {
        Frame::new(1, 30.0, RgbImage::new(width, height))
    }

    fn extractor(detections: Vec<RawDetection>) -> FaceExtractor {
        FaceExtractor::new(Arc::new(FixedDetector(detections)), ExtractorConfig::default())
    }

    #[test]
    fn test_geometry_expands_and_clamps() {
        let raw = BoundingBox::new(-10.0, 20.0, 60.0, 50.0);
        let (face_box, crop_box) = face_geometry(&raw, 44, 100, 80).unwrap();

        // Origin moves to x = 0 with the full 60px width kept
        assert_eq!(face_box, PixelRect::new(0, 20, 60, 50));
        // 22px each side, clamped to the frame
        assert_eq!(crop_box, PixelRect::new(0, 0, 82, 80));
        assert!(crop_box.fits_within(100, 80));
    }

    #[test]
    fn test_geometry_keeps_size_of_box_left_of_frame() {
        let raw = BoundingBox::new(-50.0, 10.0, 30.0, 30.0);
        let (face_box, _) = face_geometry(&raw, 44, 100, 100).unwrap();
        assert_eq!(face_box, PixelRect::new(0, 10, 30, 30));
    }

    #[test]
    fn test_geometry_rejects_degenerate_box() {
        let outside = BoundingBox::new(120.0, 10.0, 30.0, 30.0);
        assert!(face_geometry(&outside, 44, 100, 100).is_none());

        let flat = BoundingBox::new(10.0, 10.0, 30.0, 0.0);
        assert!(face_geometry(&flat, 44, 100, 100).is_none());
    }

    #[test]
    fn test_confidence_gate() {
        let extractor = extractor(vec![
            RawDetection::new(BoundingBox::new(10.0, 10.0, 40.0, 40.0), 0.79),
            RawDetection::new(BoundingBox::new(50.0, 10.0, 40.0, 40.0), 0.8),
            RawDetection::new(BoundingBox::new(50.0, 50.0, 40.0, 40.0), f64::NAN),
        ]);

        let regions = extractor.extract(&frame(200, 200)).unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].confidence, 0.8);
    }

    #[test]
    fn test_regions_are_normalized() {
        let extractor = extractor(vec![
            RawDetection::new(BoundingBox::new(150.0, 150.0, 80.0, 90.0), 0.99),
            RawDetection::new(BoundingBox::new(5.0, 5.0, 20.0, 20.0), 0.9),
        ]);

        let regions = extractor.extract(&frame(200, 180)).unwrap();
        assert_eq!(regions.len(), 2);
        for region in &regions {
            assert_eq!(region.crop.dimensions(), (160, 160));
            assert!(region.bbox.fits_within(200, 180));
            assert!(region.face_box.fits_within(200, 180));
        }
        // Detector order is kept
        assert_eq!(regions[0].face_box.x, 150);
    }

    #[test]
    fn test_no_faces_is_empty() {
        assert!(extractor(vec![]).extract(&frame(10, 10)).unwrap().is_empty());
    }

    #[test]
    fn test_detector_failure_propagates() {
        let extractor = FaceExtractor::new(Arc::new(FailingDetector), ExtractorConfig::default());
        assert!(matches!(
            extractor.extract(&frame(10, 10)),
            Err(VisionError::Detection(_))
        ));
    }
}
