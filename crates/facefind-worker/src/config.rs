//! Run configuration.
//!
//! The command line is parsed with clap; every flag can also come from a
//! `FACEFIND_*` environment variable (or a `.env` file). The parsed flags
//! become an immutable [`RunConfig`], written to `run.json` with the run.

use clap::{Parser, ValueEnum};
use facefind_models::encoding::DEFAULT_OUTPUT_FPS;
use facefind_models::{ExportEncoding, SearchTarget};
use facefind_vision::extractor::{DEFAULT_IMAGE_SIZE, DEFAULT_MARGIN, DEFAULT_MIN_CONFIDENCE};
use facefind_vision::ExtractorConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{WorkerError, WorkerResult};

/// Upper bound on the default number of frame workers.
const MAX_DEFAULT_WORKERS: usize = 4;

/// Face detector backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    /// UltraFace over ONNX Runtime
    Ultraface,
    /// OpenCV YuNet (requires the `opencv` feature)
    Yunet,
}

/// Identity classification strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierKind {
    /// One model from face crop to label distribution
    Direct,
    /// Embedding model followed by a separate classifier model
    Embedding,
}

/// Find where known identities appear in a video.
#[derive(Debug, Parser)]
#[command(name = "facefind", version, about)]
pub struct Cli {
    /// Input video
    #[arg(env = "FACEFIND_INPUT")]
    pub input: PathBuf,

    /// Directory under which the timestamped run directory is created
    #[arg(env = "FACEFIND_OUTPUT")]
    pub output: PathBuf,

    /// Label file: JSON array or one label per line, in class-index order
    #[arg(long, env = "FACEFIND_LABELS")]
    pub labels: PathBuf,

    /// Classification strategy
    #[arg(long, value_enum, default_value_t = ClassifierKind::Direct, env = "FACEFIND_CLASSIFIER")]
    pub classifier: ClassifierKind,

    /// Direct classifier model, or the embedding model for `embedding`
    #[arg(long, env = "FACEFIND_MODEL")]
    pub model: PathBuf,

    /// Classifier applied to embeddings (required for `embedding`)
    #[arg(long, env = "FACEFIND_CLASSIFIER_MODEL")]
    pub classifier_model: Option<PathBuf>,

    /// Name of the probability output of the classifier model
    #[arg(long, env = "FACEFIND_CLASSIFIER_OUTPUT")]
    pub classifier_output: Option<String>,

    /// Face detector backend
    #[arg(long, value_enum, default_value_t = DetectorKind::Ultraface, env = "FACEFIND_DETECTOR")]
    pub detector: DetectorKind,

    /// Face detector model file
    #[arg(long, env = "FACEFIND_DETECTOR_MODEL")]
    pub detector_model: PathBuf,

    /// Write annotated frames and re-encode them into a video
    #[arg(long, env = "FACEFIND_EXPORT_VIDEO")]
    pub export_video: bool,

    /// Source frames between samples (0 = about one per second)
    #[arg(long, default_value_t = 0, env = "FACEFIND_FRAME_SKIP")]
    pub frame_skip: u64,

    /// Minimum classifier probability (exclusive)
    #[arg(long, default_value_t = 0.5, env = "FACEFIND_THRESHOLD")]
    pub threshold: f64,

    /// Class index to search for (-1 = any identity)
    #[arg(long, default_value_t = -1, allow_negative_numbers = true, env = "FACEFIND_ID")]
    pub id: i64,

    /// Minimum detector confidence for a face to be classified
    #[arg(long, default_value_t = DEFAULT_MIN_CONFIDENCE, env = "FACEFIND_MIN_CONFIDENCE")]
    pub min_confidence: f64,

    /// Context pixels added around each face before cropping
    #[arg(long, default_value_t = DEFAULT_MARGIN, env = "FACEFIND_MARGIN")]
    pub margin: u32,

    /// Side of the square face crop fed to the classifier
    #[arg(long, default_value_t = DEFAULT_IMAGE_SIZE, env = "FACEFIND_IMAGE_SIZE")]
    pub image_size: u32,

    /// Frame rate of the exported video
    #[arg(long, default_value_t = DEFAULT_OUTPUT_FPS, env = "FACEFIND_OUTPUT_FPS")]
    pub output_fps: u32,

    /// Frames analysed concurrently
    #[arg(long, env = "FACEFIND_WORKERS")]
    pub workers: Option<usize>,

    /// Seconds any single FFmpeg export step may run before it is killed
    #[arg(long, env = "FACEFIND_FFMPEG_TIMEOUT")]
    pub ffmpeg_timeout: Option<u64>,

    /// TrueType font for overlay captions (bundled DejaVu Sans when unset)
    #[arg(long, env = "FACEFIND_FONT")]
    pub font: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, env = "FACEFIND_VERBOSE")]
    pub verbose: bool,
}

/// Immutable settings for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub input: PathBuf,
    pub output_root: PathBuf,
    pub labels: PathBuf,
    pub classifier: ClassifierKind,
    pub model: PathBuf,
    pub classifier_model: Option<PathBuf>,
    pub classifier_output: Option<String>,
    pub detector: DetectorKind,
    pub detector_model: PathBuf,
    pub export_video: bool,
    /// 0 = derive from the frame rate
    pub frame_stride: u64,
    pub threshold: f64,
    pub target: SearchTarget,
    pub extractor: ExtractorConfig,
    pub encoding: ExportEncoding,
    pub workers: usize,
    /// Per-step limit for export FFmpeg commands, in seconds
    pub ffmpeg_timeout: Option<u64>,
    pub font: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::new(),
            output_root: PathBuf::new(),
            labels: PathBuf::new(),
            classifier: ClassifierKind::Direct,
            model: PathBuf::new(),
            classifier_model: None,
            classifier_output: None,
            detector: DetectorKind::Ultraface,
            detector_model: PathBuf::new(),
            export_video: false,
            frame_stride: 0,
            threshold: 0.5,
            target: SearchTarget::Any,
            extractor: ExtractorConfig::default(),
            encoding: ExportEncoding::default(),
            workers: default_workers(),
            ffmpeg_timeout: None,
            font: None,
        }
    }
}

impl From<Cli> for RunConfig {
    fn from(cli: Cli) -> Self {
        Self {
            input: cli.input,
            output_root: cli.output,
            labels: cli.labels,
            classifier: cli.classifier,
            model: cli.model,
            classifier_model: cli.classifier_model,
            classifier_output: cli.classifier_output,
            detector: cli.detector,
            detector_model: cli.detector_model,
            export_video: cli.export_video,
            frame_stride: cli.frame_skip,
            threshold: cli.threshold,
            target: SearchTarget::from_id(cli.id),
            extractor: ExtractorConfig {
                min_confidence: cli.min_confidence,
                margin: cli.margin,
                image_size: cli.image_size,
            },
            encoding: ExportEncoding::default().with_output_fps(cli.output_fps),
            workers: cli.workers.unwrap_or_else(default_workers),
            ffmpeg_timeout: cli.ffmpeg_timeout,
            font: cli.font,
        }
    }
}

impl RunConfig {
    /// Explicit stride, if one was requested.
    pub fn stride_override(&self) -> Option<u64> {
        (self.frame_stride > 0).then_some(self.frame_stride)
    }

    /// Reject settings that would make the run meaningless, before any
    /// processing starts.
    pub fn validate(&self) -> WorkerResult<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(WorkerError::config(format!(
                "threshold must be within [0, 1], got {}",
                self.threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.extractor.min_confidence) {
            return Err(WorkerError::config(format!(
                "min confidence must be within [0, 1], got {}",
                self.extractor.min_confidence
            )));
        }
        if self.extractor.image_size == 0 {
            return Err(WorkerError::config("image size must be positive"));
        }
        if self.encoding.output_fps == 0 {
            return Err(WorkerError::config("output fps must be positive"));
        }
        if self.workers == 0 {
            return Err(WorkerError::config("workers must be positive"));
        }
        if self.ffmpeg_timeout == Some(0) {
            return Err(WorkerError::config("ffmpeg timeout must be positive"));
        }

        require_file("input video", &self.input)?;
        require_file("label file", &self.labels)?;
        require_file("model", &self.model)?;
        require_file("detector model", &self.detector_model)?;

        match (self.classifier, &self.classifier_model) {
            (ClassifierKind::Embedding, None) => {
                return Err(WorkerError::config(
                    "the embedding strategy needs --classifier-model",
                ))
            }
            (ClassifierKind::Embedding, Some(path)) => require_file("classifier model", path)?,
            (ClassifierKind::Direct, _) => {}
        }

        if let Some(font) = &self.font {
            require_file("font", font)?;
        }

        Ok(())
    }
}

fn require_file(what: &str, path: &Path) -> WorkerResult<()> {
    if path.as_os_str().is_empty() {
        return Err(WorkerError::config(format!("{} path is empty", what)));
    }
    if !path.is_file() {
        return Err(WorkerError::config(format!(
            "{} not found: {}",
            what,
            path.display()
        )));
    }
    Ok(())
}

/// Available parallelism, capped.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(MAX_DEFAULT_WORKERS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"x").unwrap();
        path
    }

    fn valid_config(dir: &Path) -> RunConfig {
        RunConfig {
            input: touch(dir, "in.mp4"),
            output_root: dir.to_path_buf(),
            labels: touch(dir, "labels.txt"),
            model: touch(dir, "model.onnx"),
            detector_model: touch(dir, "detector.onnx"),
            ..Default::default()
        }
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from([
            "facefind",
            "in.mp4",
            "out",
            "--labels",
            "labels.txt",
            "--model",
            "model.onnx",
            "--detector-model",
            "detector.onnx",
        ])
        .unwrap();

        let config = RunConfig::from(cli);
        assert_eq!(config.target, SearchTarget::Any);
        assert_eq!(config.threshold, 0.5);
        assert_eq!(config.extractor.margin, 44);
        assert_eq!(config.extractor.image_size, 160);
        assert_eq!(config.encoding.output_fps, 30);
        assert!(config.stride_override().is_none());
        assert!(!config.export_video);
        assert!(config.workers >= 1 && config.workers <= MAX_DEFAULT_WORKERS);
        assert!(config.ffmpeg_timeout.is_none());
    }

    #[test]
    fn test_cli_target_and_stride() {
        let cli = Cli::try_parse_from([
            "facefind",
            "in.mp4",
            "out",
            "--labels",
            "l.txt",
            "--model",
            "m.onnx",
            "--detector-model",
            "d.onnx",
            "--id",
            "2",
            "--frame-skip",
            "15",
            "--export-video",
            "--ffmpeg-timeout",
            "600",
        ])
        .unwrap();

        let config = RunConfig::from(cli);
        assert_eq!(config.target, SearchTarget::Class(2));
        assert_eq!(config.stride_override(), Some(15));
        assert!(config.export_video);
        assert_eq!(config.ffmpeg_timeout, Some(600));
    }

    #[test]
    fn test_validate_accepts_complete_config() {
        let tmp = TempDir::new().unwrap();
        valid_config(tmp.path()).validate().unwrap();
    }

    #[test]
    fn test_validate_threshold_range() {
        let tmp = TempDir::new().unwrap();
        let config = RunConfig {
            threshold: 1.5,
            ..valid_config(tmp.path())
        };
        assert!(matches!(config.validate(), Err(WorkerError::Config(_))));
    }

    #[test]
    fn test_validate_zero_ffmpeg_timeout() {
        let tmp = TempDir::new().unwrap();
        let config = RunConfig {
            ffmpeg_timeout: Some(0),
            ..valid_config(tmp.path())
        };
        assert!(matches!(config.validate(), Err(WorkerError::Config(_))));
    }

    #[test]
    fn test_validate_missing_model() {
        let tmp = TempDir::new().unwrap();
        let config = RunConfig {
            model: tmp.path().join("missing.onnx"),
            ..valid_config(tmp.path())
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("model not found"));
    }

    #[test]
    fn test_validate_embedding_needs_classifier() {
        let tmp = TempDir::new().unwrap();
        let config = RunConfig {
            classifier: ClassifierKind::Embedding,
            ..valid_config(tmp.path())
        };
        assert!(matches!(config.validate(), Err(WorkerError::Config(_))));
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let config = RunConfig {
            target: SearchTarget::Class(3),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: RunConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
