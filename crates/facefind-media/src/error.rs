use std::path::PathBuf;
use thiserror::Error;

pub type MediaResult<T> = Result<T, MediaError>;

/// Failures from the FFmpeg tools and the frame files around them.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("ffmpeg binary is not on PATH")]
    FfmpegNotFound,

    #[error("ffprobe binary is not on PATH")]
    FfprobeNotFound,

    /// `stderr` holds the last diagnostic lines, when any were printed.
    #[error("ffmpeg failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("ffprobe failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("cannot decode video: {message}")]
    Decode {
        message: String,
        /// 1-based source frame the failure hit, when known
        frame_number: Option<u64>,
    },

    #[error("bad frame sequence: {0}")]
    FrameSequence(String),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error("cannot load font: {0}")]
    Font(String),

    #[error("no such file: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("cancelled")]
    Cancelled,

    #[error("timed out after {0}s")]
    Timeout(u64),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("unreadable ffprobe output: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("not a usable video: {0}")]
    InvalidVideo(String),

    #[error("{0}")]
    Internal(String),
}

impl MediaError {
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        let message = message.into();
        Self::FfmpegFailed {
            message,
            stderr,
            exit_code,
        }
    }

    pub fn decode(message: impl Into<String>, frame_number: Option<u64>) -> Self {
        let message = message.into();
        Self::Decode {
            message,
            frame_number,
        }
    }

    pub fn frame_sequence(message: impl Into<String>) -> Self {
        Self::FrameSequence(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
