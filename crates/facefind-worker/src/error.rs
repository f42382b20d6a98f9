//! Worker error types.

use facefind_media::{ExportFailure, ExportStage, MediaError};
use facefind_vision::VisionError;
use std::path::PathBuf;
use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

/// Run-level failures. Every variant aborts the run, except that an
/// `Export` failure leaves the timeline log in place.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cannot create output directory {path}: {message}")]
    OutputDir { path: PathBuf, message: String },

    #[error("Cannot decode video: {0}")]
    Decode(#[source] MediaError),

    #[error("Model load failed: {0}")]
    ModelLoad(#[source] VisionError),

    #[error("Export failed at {stage}: {source}")]
    Export {
        stage: ExportStage,
        #[source]
        source: MediaError,
    },

    #[error("Run cancelled")]
    Cancelled,

    #[error("Frame task failed: {0}")]
    Task(String),

    #[error("Timeline log error: {0}")]
    Timeline(#[source] std::io::Error),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WorkerError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn output_dir(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::OutputDir {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Decode failure, unless the media layer was cancelled.
    pub fn decode(err: MediaError) -> Self {
        if err.is_cancelled() {
            Self::Cancelled
        } else {
            Self::Decode(err)
        }
    }

    pub fn task(msg: impl Into<String>) -> Self {
        Self::Task(msg.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, WorkerError::Cancelled)
    }

    /// Short stable name for logs and the run manifest.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerError::Config(_) => "config",
            WorkerError::OutputDir { .. } => "output_dir",
            WorkerError::Decode(_) => "decode",
            WorkerError::ModelLoad(_) => "model_load",
            WorkerError::Export { .. } => "export",
            WorkerError::Cancelled => "cancelled",
            WorkerError::Task(_) => "task",
            WorkerError::Timeline(_) => "timeline",
            WorkerError::Media(_) => "media",
            WorkerError::Io(_) => "io",
            WorkerError::Json(_) => "json",
        }
    }
}

impl From<ExportFailure> for WorkerError {
    fn from(failure: ExportFailure) -> Self {
        if failure.source.is_cancelled() {
            return Self::Cancelled;
        }
        Self::Export {
            stage: failure.stage,
            source: failure.source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_failure_names_stage() {
        let err: WorkerError = ExportFailure {
            stage: ExportStage::ExtractAudio,
            source: MediaError::ffmpeg_failed("no audio", None, Some(1)),
        }
        .into();

        assert_eq!(err.kind(), "export");
        assert!(err.to_string().contains("extract_audio"));
    }

    #[test]
    fn test_cancelled_media_is_cancelled_run() {
        assert!(WorkerError::decode(MediaError::Cancelled).is_cancelled());

        let err: WorkerError = ExportFailure {
            stage: ExportStage::EncodeFrames,
            source: MediaError::Cancelled,
        }
        .into();
        assert!(err.is_cancelled());
    }
}
