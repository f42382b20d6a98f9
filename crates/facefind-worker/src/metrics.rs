//! Run metrics.
//!
//! Recorded through the `metrics` facade; nothing is exported unless the
//! embedding application installs a recorder.

use metrics::{counter, histogram};

/// Metric name constants for consistency.
pub mod names {
    /// Sampled frames that went through analysis.
    pub const FRAMES_PROCESSED_TOTAL: &str = "facefind_frames_processed_total";

    /// Faces that passed the detector confidence gate.
    pub const FACES_DETECTED_TOTAL: &str = "facefind_faces_detected_total";

    /// Faces the classifier produced a result for.
    pub const FACES_CLASSIFIED_TOTAL: &str = "facefind_faces_classified_total";

    /// Faces dropped because classification failed.
    pub const CLASSIFICATION_ERRORS_TOTAL: &str = "facefind_classification_errors_total";

    /// Frames treated as faceless because detection failed.
    pub const DETECTION_ERRORS_TOTAL: &str = "facefind_detection_errors_total";

    /// Lines appended to the timeline log, by kind.
    pub const LOG_ENTRIES_TOTAL: &str = "facefind_log_entries_total";

    /// Wall time of FFmpeg stages in seconds, by stage.
    pub const FFMPEG_DURATION_SECONDS: &str = "facefind_ffmpeg_duration_seconds";
}

/// Record the analysis of one frame.
pub fn record_frame(faces_detected: usize, faces_classified: usize, classification_errors: usize) {
    counter!(names::FRAMES_PROCESSED_TOTAL).increment(1);
    counter!(names::FACES_DETECTED_TOTAL).increment(faces_detected as u64);
    counter!(names::FACES_CLASSIFIED_TOTAL).increment(faces_classified as u64);
    if classification_errors > 0 {
        counter!(names::CLASSIFICATION_ERRORS_TOTAL).increment(classification_errors as u64);
    }
}

/// Record a detector failure on one frame.
pub fn record_detection_error(detector: &'static str) {
    counter!(names::DETECTION_ERRORS_TOTAL, "detector" => detector).increment(1);
}

/// Record one timeline line.
pub fn record_log_entry(kind: &'static str) {
    counter!(names::LOG_ENTRIES_TOTAL, "kind" => kind).increment(1);
}

/// Record how long an FFmpeg stage took.
pub fn record_ffmpeg_duration(stage: &'static str, seconds: f64) {
    histogram!(names::FFMPEG_DURATION_SECONDS, "stage" => stage).record(seconds);
}
