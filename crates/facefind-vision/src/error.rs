//! Error types for face extraction and classification.

use facefind_models::LabelError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for vision operations.
pub type VisionResult<T> = Result<T, VisionError>;

/// Errors raised by detectors, classifiers and their models.
#[derive(Debug, Error)]
pub enum VisionError {
    #[error("Model not found: {0}")]
    ModelNotFound(PathBuf),

    #[error("Model load failed for {path}: {message}")]
    ModelLoad { path: PathBuf, message: String },

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Face detection failed: {0}")]
    Detection(String),

    #[error("Face classification failed: {0}")]
    Classification(String),

    #[error("Invalid label set: {0}")]
    Labels(#[from] LabelError),

    #[error("Backend not available: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl VisionError {
    pub fn model_load(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ModelLoad {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn inference(message: impl Into<String>) -> Self {
        Self::Inference(message.into())
    }

    pub fn detection(message: impl Into<String>) -> Self {
        Self::Detection(message.into())
    }

    pub fn classification(message: impl Into<String>) -> Self {
        Self::Classification(message.into())
    }

    /// Whether this error happened while loading rather than running a model.
    pub fn is_setup(&self) -> bool {
        matches!(
            self,
            VisionError::ModelNotFound(_)
                | VisionError::ModelLoad { .. }
                | VisionError::Labels(_)
                | VisionError::Unavailable(_)
                | VisionError::Io(_)
        )
    }
}
