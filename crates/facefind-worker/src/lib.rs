//! Identity search over a video.
//!
//! This crate provides:
//! - Run configuration from the command line and environment
//! - Timeline aggregation and the `list_faces.txt` writer
//! - Pipeline orchestration with an order-preserving frame worker pool
//! - Annotated video export
//! - Structured logging and metrics

pub mod config;
pub mod error;
pub mod loader;
pub mod logging;
pub mod metrics;
pub mod output;
pub mod pipeline;
pub mod timeline;

pub use config::{ClassifierKind, Cli, DetectorKind, RunConfig};
pub use error::{WorkerError, WorkerResult};
pub use loader::load_session;
pub use logging::{init_tracing, RunLogger};
pub use output::{ExportStatus, RunCounts, RunManifest};
pub use pipeline::{run, AnalysisSummary, Pipeline, RunReport};
pub use timeline::{FrameOutcome, Observation, TimelineAggregator, TimelineLog};
