//! OpenCV YuNet face detector.
//!
//! Exposed through OpenCV's `FaceDetectorYN`. Each output row is
//! `[x, y, w, h, 10 landmark coordinates, score]`; only the box and score
//! are used here.

use std::path::Path;

use crate::detector::{ChannelOrder, FaceDetector, RawDetection};
use crate::error::{VisionError, VisionResult};

/// Candidates below this are dropped inside OpenCV.
#[cfg_attr(not(feature = "opencv"), allow(dead_code))]
const SCORE_THRESHOLD: f32 = 0.5;
#[cfg_attr(not(feature = "opencv"), allow(dead_code))]
const NMS_THRESHOLD: f32 = 0.3;
#[cfg_attr(not(feature = "opencv"), allow(dead_code))]
const TOP_K: i32 = 50;

/// Minimum plausible size of a YuNet model file.
const MIN_MODEL_BYTES: u64 = 50_000;

fn check_model_file(model_path: &Path) -> VisionResult<()> {
    let metadata = std::fs::metadata(model_path)
        .map_err(|_| VisionError::ModelNotFound(model_path.to_path_buf()))?;

    if metadata.len() < MIN_MODEL_BYTES {
        return Err(VisionError::model_load(
            model_path,
            format!("YuNet model file appears corrupted (size: {} bytes)", metadata.len()),
        ));
    }
    Ok(())
}

#[cfg(feature = "opencv")]
pub use backend::YuNetDetector;

#[cfg(feature = "opencv")]
mod backend {
    use std::path::Path;
    use std::sync::Mutex;

    use facefind_models::BoundingBox;
    use image::RgbImage;
    use opencv::core::{Mat, Ptr, Size};
    use opencv::objdetect::FaceDetectorYN;
    use opencv::prelude::*;
    use tracing::{debug, info, warn};

    use super::*;

    pub struct YuNetDetector {
        detector: Mutex<Ptr<FaceDetectorYN>>,
    }

    // FaceDetectorYN is only touched behind the mutex
    unsafe impl Send for YuNetDetector {}
    unsafe impl Sync for YuNetDetector {}

    impl YuNetDetector {
        pub fn load(model_path: &Path) -> VisionResult<Self> {
            check_model_file(model_path)?;
            let path = model_path.to_string_lossy();

            use opencv::dnn::{DNN_BACKEND_DEFAULT, DNN_BACKEND_OPENCV, DNN_TARGET_CPU};
            let backends = [
                (DNN_BACKEND_DEFAULT, DNN_TARGET_CPU, "default"),
                (DNN_BACKEND_OPENCV, DNN_TARGET_CPU, "opencv"),
            ];

            let mut last_error = String::new();
            for (backend_id, target_id, backend_name) in backends {
                match FaceDetectorYN::create(
                    &path,
                    "",
                    Size::new(320, 320),
                    SCORE_THRESHOLD,
                    NMS_THRESHOLD,
                    TOP_K,
                    backend_id,
                    target_id,
                ) {
                    Ok(detector) => {
                        info!(model = %path, backend = backend_name, "YuNet detector initialized");
                        return Ok(Self {
                            detector: Mutex::new(detector),
                        });
                    }
                    Err(e) => {
                        warn!("YuNet {} backend failed: {}", backend_name, e);
                        last_error = e.to_string();
                    }
                }
            }

            Err(VisionError::model_load(
                model_path,
                format!("no usable OpenCV backend: {}", last_error),
            ))
        }
    }

    impl FaceDetector for YuNetDetector {
        fn detect(&self, image: &RgbImage) -> VisionResult<Vec<RawDetection>> {
            let (width, height) = image.dimensions();
            if width == 0 || height == 0 {
                return Ok(Vec::new());
            }

            let flat = Mat::from_slice(image.as_raw())
                .map_err(|e| VisionError::detection(format!("Mat from frame: {e}")))?;
            let shaped = flat
                .reshape(3, height as i32)
                .map_err(|e| VisionError::detection(format!("Mat reshape: {e}")))?;
            let frame = shaped
                .try_clone()
                .map_err(|e| VisionError::detection(format!("Mat clone: {e}")))?;

            let mut detector = self
                .detector
                .lock()
                .map_err(|_| VisionError::detection("YuNet detector poisoned"))?;

            detector
                .set_input_size(Size::new(width as i32, height as i32))
                .map_err(|e| VisionError::detection(format!("YuNet input size: {e}")))?;

            let mut faces = Mat::default();
            detector
                .detect(&frame, &mut faces)
                .map_err(|e| VisionError::detection(format!("YuNet detect: {e}")))?;

            let rows = faces.rows();
            if rows <= 0 {
                return Ok(Vec::new());
            }
            if faces.cols() < 15 {
                return Err(VisionError::detection(format!(
                    "YuNet output has {} columns, expected 15",
                    faces.cols()
                )));
            }

            let mut detections = Vec::with_capacity(rows as usize);
            for row in 0..rows {
                let value = |col: i32| -> VisionResult<f64> {
                    faces
                        .at_2d::<f32>(row, col)
                        .map(|v| *v as f64)
                        .map_err(|e| VisionError::detection(format!("YuNet row {row}: {e}")))
                };

                let bbox = BoundingBox::new(value(0)?, value(1)?, value(2)?, value(3)?);
                if bbox.width <= 0.0 || bbox.height <= 0.0 {
                    continue;
                }
                detections.push(RawDetection::new(bbox, value(14)?));
            }

            debug!(faces = detections.len(), candidates = rows, "YuNet detections");
            Ok(detections)
        }

        fn channel_order(&self) -> ChannelOrder {
            ChannelOrder::Bgr
        }

        fn name(&self) -> &'static str {
            "yunet"
        }
    }
}

/// Stub for when OpenCV is not available.
#[cfg(not(feature = "opencv"))]
pub struct YuNetDetector;

#[cfg(not(feature = "opencv"))]
impl YuNetDetector {
    pub fn load(model_path: &Path) -> VisionResult<Self> {
        check_model_file(model_path)?;
        Err(VisionError::Unavailable(
            "YuNet needs the opencv feature".to_string(),
        ))
    }
}

#[cfg(not(feature = "opencv"))]
impl FaceDetector for YuNetDetector {
    fn detect(&self, _image: &image::RgbImage) -> VisionResult<Vec<RawDetection>> {
        Err(VisionError::Unavailable(
            "YuNet needs the opencv feature".to_string(),
        ))
    }

    fn channel_order(&self) -> ChannelOrder {
        ChannelOrder::Bgr
    }

    fn name(&self) -> &'static str {
        "yunet"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_model() {
        assert!(matches!(
            YuNetDetector::load(Path::new("/nonexistent/yunet.onnx")),
            Err(VisionError::ModelNotFound(_))
        ));
    }

    #[test]
    fn test_truncated_model() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("yunet.onnx");
        std::fs::write(&path, b"not a model").unwrap();

        assert!(matches!(
            YuNetDetector::load(&path),
            Err(VisionError::ModelLoad { .. })
        ));
    }
}
