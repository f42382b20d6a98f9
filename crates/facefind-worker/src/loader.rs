//! Model loading.
//!
//! Every model is loaded once per run, before the first frame is decoded.
//! Loading is blocking; call it from `spawn_blocking`.

use facefind_vision::{
    load_labels, AnalysisSession, ClassificationStrategy, FaceDetector, FaceExtractor,
    VisionError, VisionResult, YuNetDetector,
};
use std::sync::Arc;
use tracing::info;

use crate::config::{DetectorKind, RunConfig};
use crate::error::{WorkerError, WorkerResult};

/// Build the detector, classifier and label set named by `config`.
pub fn load_session(config: &RunConfig) -> WorkerResult<AnalysisSession> {
    let detector = load_detector(config).map_err(WorkerError::ModelLoad)?;
    let classifier = load_classifier(config).map_err(WorkerError::ModelLoad)?;

    info!(
        detector = detector.name(),
        classifier = classifier.name(),
        min_confidence = config.extractor.min_confidence,
        margin = config.extractor.margin,
        image_size = config.extractor.image_size,
        "Models loaded"
    );

    let extractor = FaceExtractor::new(detector, config.extractor);
    Ok(AnalysisSession::new(extractor, Arc::new(classifier)))
}

fn load_detector(config: &RunConfig) -> VisionResult<Arc<dyn FaceDetector>> {
    match config.detector {
        DetectorKind::Ultraface => load_ultraface(config),
        DetectorKind::Yunet => Ok(Arc::new(YuNetDetector::load(&config.detector_model)?)),
    }
}

#[cfg(feature = "onnx")]
fn load_ultraface(config: &RunConfig) -> VisionResult<Arc<dyn FaceDetector>> {
    Ok(Arc::new(facefind_vision::UltraFaceDetector::load(
        &config.detector_model,
    )?))
}

#[cfg(not(feature = "onnx"))]
fn load_ultraface(_config: &RunConfig) -> VisionResult<Arc<dyn FaceDetector>> {
    Err(VisionError::Unavailable(
        "UltraFace needs the onnx feature".to_string(),
    ))
}

#[cfg(feature = "onnx")]
fn load_classifier(config: &RunConfig) -> VisionResult<ClassificationStrategy> {
    use crate::config::ClassifierKind;
    use facefind_vision::{DirectClassifier, EmbeddingClassifier, OnnxModel};

    let labels = load_labels(&config.labels)?;
    let input_size = config.extractor.image_size;

    let with_output = |model: OnnxModel| match &config.classifier_output {
        Some(name) => model.with_output_name(name.clone()),
        None => model,
    };

    let strategy = match config.classifier {
        ClassifierKind::Direct => {
            let model = with_output(OnnxModel::load(&config.model)?);
            ClassificationStrategy::Direct(DirectClassifier::new(
                Arc::new(model),
                labels,
                input_size,
            ))
        }
        ClassifierKind::Embedding => {
            let classifier_path = config.classifier_model.as_ref().ok_or_else(|| {
                VisionError::Unavailable("embedding strategy without a classifier model".into())
            })?;
            let embedder = OnnxModel::load(&config.model)?;
            let classifier = with_output(OnnxModel::load(classifier_path)?);
            ClassificationStrategy::Embedding(EmbeddingClassifier::new(
                Arc::new(embedder),
                Arc::new(classifier),
                labels,
                input_size,
            ))
        }
    };

    Ok(strategy)
}

#[cfg(not(feature = "onnx"))]
fn load_classifier(config: &RunConfig) -> VisionResult<ClassificationStrategy> {
    // Labels are still checked so a bad label file is reported first
    load_labels(&config.labels)?;
    Err(VisionError::Unavailable(
        "classifier models need the onnx feature".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_detector_model_is_model_load_error() {
        let tmp = TempDir::new().unwrap();
        let labels = tmp.path().join("labels.txt");
        std::fs::write(&labels, "Alice\nBob\n").unwrap();

        let config = RunConfig {
            labels,
            model: tmp.path().join("model.onnx"),
            detector_model: tmp.path().join("missing.onnx"),
            ..Default::default()
        };

        let Err(err) = load_session(&config) else {
            panic!("missing detector model must fail to load");
        };
        assert_eq!(err.kind(), "model_load");
    }

    #[test]
    fn test_short_yunet_model_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let detector_model = tmp.path().join("yunet.onnx");
        std::fs::write(&detector_model, b"truncated").unwrap();

        let config = RunConfig {
            detector: DetectorKind::Yunet,
            detector_model,
            ..Default::default()
        };

        assert!(matches!(
            load_session(&config),
            Err(WorkerError::ModelLoad(_))
        ));
    }
}
