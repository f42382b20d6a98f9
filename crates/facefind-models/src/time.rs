//! Frame-derived times of day.
//!
//! Frames are numbered from 1. Frame `n` is displayed over
//! `[(n - 1) / fps, n / fps)`; its start is the time reported for any
//! observation made on it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Wall-clock offset into a video, at whole-second resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct TimeOfDay {
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
}

impl TimeOfDay {
    pub fn new(hours: u32, minutes: u32, seconds: u32) -> Self {
        Self {
            hours,
            minutes,
            seconds,
        }
    }

    /// Convert an offset in seconds, rounding to the nearest whole second.
    ///
    /// Negative and non-finite inputs map to zero.
    pub fn from_seconds(total_secs: f64) -> Self {
        let whole = if total_secs.is_finite() && total_secs > 0.0 {
            total_secs.round() as u64
        } else {
            0
        };

        Self {
            hours: (whole / 3600) as u32,
            minutes: ((whole % 3600) / 60) as u32,
            seconds: (whole % 60) as u32,
        }
    }

    /// Time at which frame `frame_number` starts.
    pub fn frame_start(frame_number: u64, fps: f64) -> Self {
        Self::from_seconds(frame_start_seconds(frame_number, fps))
    }

    /// Time at which frame `frame_number` ends.
    pub fn frame_end(frame_number: u64, fps: f64) -> Self {
        Self::from_seconds(frame_end_seconds(frame_number, fps))
    }

    /// Total offset in seconds.
    pub fn total_seconds(&self) -> u64 {
        self.hours as u64 * 3600 + self.minutes as u64 * 60 + self.seconds as u64
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hours, self.minutes, self.seconds)
    }
}

/// Start of frame `frame_number` in seconds.
pub fn frame_start_seconds(frame_number: u64, fps: f64) -> f64 {
    if fps <= 0.0 {
        return 0.0;
    }
    frame_number.saturating_sub(1) as f64 / fps
}

/// End of frame `frame_number` in seconds.
pub fn frame_end_seconds(frame_number: u64, fps: f64) -> f64 {
    if fps <= 0.0 {
        return 0.0;
    }
    frame_number as f64 / fps
}
