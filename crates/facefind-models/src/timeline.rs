//! Timeline log entries.
//!
//! One entry becomes one line of `list_faces.txt`:
//!
//! ```text
//! Time(00:00:09),Alice:93.21
//! Time(00:00:00-00:00:03),Alice
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::time::TimeOfDay;

/// File name of the per-run timeline log.
pub const TIMELINE_FILE_NAME: &str = "list_faces.txt";

/// A single emission of the timeline aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LogEntry {
    /// Target identity seen at one instant.
    Point {
        time: TimeOfDay,
        label: String,
        probability: f64,
    },
    /// Contiguous span attributed to one identity.
    Interval {
        label: String,
        start: TimeOfDay,
        end: TimeOfDay,
    },
}

impl LogEntry {
    /// Label this entry is attributed to.
    pub fn label(&self) -> &str {
        match self {
            LogEntry::Point { label, .. } | LogEntry::Interval { label, .. } => label,
        }
    }

    /// Time at which this entry starts.
    pub fn start(&self) -> TimeOfDay {
        match self {
            LogEntry::Point { time, .. } => *time,
            LogEntry::Interval { start, .. } => *start,
        }
    }

    /// Time at which this entry ends.
    pub fn end(&self) -> TimeOfDay {
        match self {
            LogEntry::Point { time, .. } => *time,
            LogEntry::Interval { end, .. } => *end,
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogEntry::Point {
                time,
                label,
                probability,
            } => write!(f, "Time({}),{}", time, format_label(label, *probability)),
            LogEntry::Interval { label, start, end } => {
                write!(f, "Time({}-{}),{}", start, end, label)
            }
        }
    }
}

/// Overlay and log text for a classified face: `label:percent`.
pub fn format_label(label: &str, probability: f64) -> String {
    format!("{}:{:.2}", label, probability * 100.0)
}
