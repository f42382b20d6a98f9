//! Shared data models for facefind.
//!
//! This crate provides Serde-serializable types for:
//! - Face geometry in source-frame pixel coordinates
//! - Frame-derived times of day and timeline log entries
//! - Search targets and classification results
//! - Label sets and export encoding settings

pub mod bbox;
pub mod classification;
pub mod encoding;
pub mod search;
pub mod time;
pub mod timeline;

// Re-export common types
pub use bbox::{BoundingBox, PixelRect};
pub use classification::{ClassificationResult, LabelError, Labels};
pub use encoding::ExportEncoding;
pub use search::SearchTarget;
pub use time::TimeOfDay;
pub use timeline::LogEntry;
