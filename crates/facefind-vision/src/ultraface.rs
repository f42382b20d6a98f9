//! UltraFace ONNX face detector.
//!
//! The RFB-320 variant takes a `[1, 3, 240, 320]` RGB tensor normalized as
//! `(p - 127) / 128` and returns:
//! - `scores`: `[1, N, 2]` background/face probabilities
//! - `boxes`: `[1, N, 4]` corner coordinates normalized to `[0, 1]`

use facefind_models::BoundingBox;
use image::imageops::{self, FilterType};
use image::RgbImage;
use std::path::Path;
use tracing::trace;

use crate::detector::{non_max_suppression, FaceDetector, RawDetection};
use crate::error::{VisionError, VisionResult};
use crate::model::OnnxModel;

const INPUT_WIDTH: u32 = 320;
const INPUT_HEIGHT: u32 = 240;
/// Candidates below this never reach NMS.
const CANDIDATE_THRESHOLD: f32 = 0.5;
const NMS_THRESHOLD: f64 = 0.3;

pub struct UltraFaceDetector {
    model: OnnxModel,
}

impl UltraFaceDetector {
    pub fn load(model_path: &Path) -> VisionResult<Self> {
        Ok(Self {
            model: OnnxModel::load(model_path)?,
        })
    }
}

impl FaceDetector for UltraFaceDetector {
    fn detect(&self, image: &RgbImage) -> VisionResult<Vec<RawDetection>> {
        if image.width() == 0 || image.height() == 0 {
            return Ok(Vec::new());
        }

        let input = preprocess(image);
        let shape = vec![1, 3, INPUT_HEIGHT as usize, INPUT_WIDTH as usize];

        let mut outputs = self
            .model
            .run_outputs(input, shape, &["scores", "boxes"])
            .map_err(|e| VisionError::detection(e.to_string()))?;
        let boxes = outputs.pop().unwrap_or_default();
        let scores = outputs.pop().unwrap_or_default();

        let detections = decode(&scores, &boxes, image.width(), image.height())?;
        trace!(faces = detections.len(), "UltraFace detections");
        Ok(detections)
    }

    fn name(&self) -> &'static str {
        "ultraface"
    }
}

/// Resize to the network input and lay out as normalized CHW.
fn preprocess(image: &RgbImage) -> Vec<f32> {
    let resized = imageops::resize(image, INPUT_WIDTH, INPUT_HEIGHT, FilterType::Triangle);
    let plane = (INPUT_WIDTH * INPUT_HEIGHT) as usize;

    let mut chw = vec![0f32; plane * 3];
    for (i, pixel) in resized.pixels().enumerate() {
        for c in 0..3 {
            chw[c * plane + i] = (pixel[c] as f32 - 127.0) / 128.0;
        }
    }
    chw
}

/// Turn raw network outputs into frame-space detections.
fn decode(scores: &[f32], boxes: &[f32], frame_width: u32, frame_height: u32) -> VisionResult<Vec<RawDetection>> {
    let candidates = scores.len() / 2;
    if scores.len() % 2 != 0 || boxes.len() != candidates * 4 {
        return Err(VisionError::detection(format!(
            "UltraFace output shape mismatch: {} scores, {} box values",
            scores.len(),
            boxes.len()
        )));
    }

    let fw = frame_width as f64;
    let fh = frame_height as f64;

    let detections = (0..candidates)
        .filter_map(|i| {
            let confidence = scores[i * 2 + 1];
            if confidence <= CANDIDATE_THRESHOLD {
                return None;
            }
            let b = &boxes[i * 4..i * 4 + 4];
            let bbox = BoundingBox::from_corners(
                b[0] as f64 * fw,
                b[1] as f64 * fh,
                b[2] as f64 * fw,
                b[3] as f64 * fh,
            );
            (bbox.width > 0.0 && bbox.height > 0.0)
                .then(|| RawDetection::new(bbox, confidence as f64))
        })
        .collect();

    Ok(non_max_suppression(detections, NMS_THRESHOLD))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preprocess_layout() {
        let image = RgbImage::from_pixel(640, 480, image::Rgb([255, 127, 0]));
        let chw = preprocess(&image);
        let plane = (INPUT_WIDTH * INPUT_HEIGHT) as usize;

        assert_eq!(chw.len(), plane * 3);
        assert!((chw[0] - 1.0).abs() < 0.01);
        assert!(chw[plane].abs() < 0.01);
        assert!((chw[2 * plane] + 127.0 / 128.0).abs() < 1e-6);
    }

    #[test]
    fn test_decode_scales_and_suppresses() {
        let scores = [0.9, 0.1, 0.05, 0.95, 0.1, 0.9];
        let boxes = [
            0.0, 0.0, 0.1, 0.1, // below threshold
            0.25, 0.25, 0.5, 0.5, // kept
            0.26, 0.26, 0.5, 0.5, // overlaps the kept box
        ];

        let detections = decode(&scores, &boxes, 400, 200).unwrap();
        assert_eq!(detections.len(), 1);
        let bbox = detections[0].bbox;
        assert!((bbox.x - 100.0).abs() < 1e-3);
        assert!((bbox.y - 50.0).abs() < 1e-3);
        assert!((bbox.width - 100.0).abs() < 1e-3);
        assert!((detections[0].confidence - 0.95).abs() < 1e-6);
    }

    #[test]
    fn test_decode_shape_mismatch() {
        assert!(matches!(
            decode(&[0.1, 0.9], &[0.0, 0.0], 10, 10),
            Err(VisionError::Detection(_))
        ));
    }
}
