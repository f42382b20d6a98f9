//! Per-run analysis session.
//!
//! Built once with the loaded detector and classifier, then shared by every
//! frame worker.

use facefind_media::Frame;
use facefind_models::{ClassificationResult, PixelRect};
use std::sync::Arc;
use tracing::debug;

use crate::classifier::FaceClassifier;
use crate::error::VisionError;
use crate::extractor::{FaceExtractor, FaceRegion};

/// A face with its identity guess.
#[derive(Debug, Clone)]
pub struct ClassifiedFace {
    pub face_box: PixelRect,
    pub bbox: PixelRect,
    pub confidence: f64,
    pub result: ClassificationResult,
}

/// Everything learned from one frame.
///
/// Per-frame and per-face failures are recorded here instead of failing the
/// frame.
#[derive(Debug, Default)]
pub struct FrameAnalysis {
    pub faces: Vec<ClassifiedFace>,
    /// Faces that passed the confidence gate
    pub faces_detected: usize,
    /// Set when the detector failed; the frame counts as faceless
    pub detection_error: Option<VisionError>,
    /// One entry per face the classifier failed on
    pub classification_errors: Vec<VisionError>,
}

/// Extractor and classifier for one run.
#[derive(Clone)]
pub struct AnalysisSession {
    extractor: FaceExtractor,
    classifier: Arc<dyn FaceClassifier>,
}

impl AnalysisSession {
    pub fn new(extractor: FaceExtractor, classifier: Arc<dyn FaceClassifier>) -> Self {
        Self {
            extractor,
            classifier,
        }
    }

    pub fn extractor(&self) -> &FaceExtractor {
        &self.extractor
    }

    /// Detect and classify every face in `frame`. Blocking.
    pub fn analyze(&self, frame: &Frame) -> FrameAnalysis {
        let regions = match self.extractor.extract(frame) {
            Ok(regions) => regions,
            Err(e) => {
                return FrameAnalysis {
                    detection_error: Some(e),
                    ..Default::default()
                }
            }
        };

        let mut analysis = FrameAnalysis {
            faces_detected: regions.len(),
            ..Default::default()
        };

        for region in regions {
            match self.classify(&region) {
                Ok(face) => analysis.faces.push(face),
                Err(e) => {
                    debug!(frame = frame.frame_number, error = %e, "Face skipped");
                    analysis.classification_errors.push(e);
                }
            }
        }

        analysis
    }

    fn classify(&self, region: &FaceRegion) -> Result<ClassifiedFace, VisionError> {
        let result = self.classifier.classify(region)?;
        Ok(ClassifiedFace {
            face_box: region.face_box,
            bbox: region.bbox,
            confidence: region.confidence,
            result,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::{FaceDetector, RawDetection};
    use crate::error::VisionResult;
    use crate::extractor::ExtractorConfig;
    use facefind_models::BoundingBox;
    use image::RgbImage;

    struct TwoFaces;

    impl FaceDetector for TwoFaces {
        fn detect(&self, _image: &RgbImage) -> VisionResult<Vec<RawDetection>> {
            Ok(vec![
                RawDetection::new(BoundingBox::new(0.0, 0.0, 20.0, 20.0), 0.9),
                RawDetection::new(BoundingBox::new(40.0, 0.0, 20.0, 20.0), 0.9),
            ])
        }

        fn name(&self) -> &'static str {
            "two"
        }
    }

    /// Fails on faces in the left half of the frame.
    struct RightOnly;

    impl FaceClassifier for RightOnly {
        fn classify(&self, face: &FaceRegion) -> VisionResult<ClassificationResult> {
            if face.face_box.x < 32 {
                return Err(VisionError::classification("bad face"));
            }
            Ok(ClassificationResult::new(0, "Alice", 0.9))
        }
    }

    #[test]
    fn test_face_failure_keeps_other_faces() {
        let extractor = FaceExtractor::new(Arc::new(TwoFaces), ExtractorConfig::default());
        let session = AnalysisSession::new(extractor, Arc::new(RightOnly));

        let analysis = session.analyze(&Frame::new(1, 1.0, RgbImage::new(64, 64)));
        assert_eq!(analysis.faces_detected, 2);
        assert_eq!(analysis.faces.len(), 1);
        assert_eq!(analysis.faces[0].face_box.x, 40);
        assert_eq!(analysis.classification_errors.len(), 1);
        assert!(analysis.detection_error.is_none());
    }
}
