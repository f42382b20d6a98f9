#![deny(unreachable_patterns)]
//! FFmpeg CLI wrapper for the facefind pipeline.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building
//! - Progress parsing from `-progress pipe:2`
//! - Cancellation support via tokio
//! - Frame Source: sampled raw RGB frame decoding with timestamps
//! - Annotated Frame Sink: overlay drawing and numbered frame persistence
//! - Reassembler: image sequence encoding and audio re-attachment

pub mod annotate;
pub mod command;
pub mod error;
pub mod frame;
pub mod frame_source;
pub mod frame_store;
pub mod probe;
pub mod progress;
pub mod reassemble;

pub use annotate::{Annotator, Overlay};
pub use command::{check_ffmpeg, check_ffprobe, is_cancelled, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use frame::{Frame, SamplingPlan};
pub use frame_source::{FfmpegFrameSource, FrameSource};
pub use frame_store::{FrameSequence, FrameStore};
pub use probe::{probe_video, VideoInfo};
pub use progress::{FfmpegProgress, ProgressLine, ProgressParser};
pub use reassemble::{ExportFailure, ExportOutput, ExportStage, Reassembler};
