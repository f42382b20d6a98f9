//! Timeline aggregation and the `list_faces.txt` writer.
//!
//! The aggregator is the only order-sensitive state in a run: it must see
//! frames in increasing frame number order, one call per frame.
//!
//! Target search logs one point per accepted face. Open search tracks a
//! single running label across frames and closes its interval only when a
//! different accepted label shows up, or at the end of the run.

use facefind_models::{ClassificationResult, LogEntry, PixelRect, SearchTarget, TimeOfDay};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

/// One classified face offered to the aggregator.
#[derive(Debug, Clone)]
pub struct Observation {
    pub result: ClassificationResult,
    pub face_box: PixelRect,
}

/// What one frame produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameOutcome {
    /// Indices into the frame's observations that were accepted
    pub accepted: Vec<usize>,
    /// Log entries to append, in order
    pub entries: Vec<LogEntry>,
}

#[derive(Debug, Clone)]
struct OpenInterval {
    label: String,
    start: TimeOfDay,
}

/// Turns per-frame classifications into timeline entries.
#[derive(Debug, Clone)]
pub struct TimelineAggregator {
    target: SearchTarget,
    threshold: f64,
    current: Option<OpenInterval>,
    last_frame_end: Option<TimeOfDay>,
    last_frame_number: Option<u64>,
}

impl TimelineAggregator {
    pub fn new(target: SearchTarget, threshold: f64) -> Self {
        Self {
            target,
            threshold,
            current: None,
            last_frame_end: None,
            last_frame_number: None,
        }
    }

    /// Label of the open interval, if any.
    pub fn current_label(&self) -> Option<&str> {
        self.current.as_ref().map(|open| open.label.as_str())
    }

    /// Start of the open interval, if any.
    pub fn interval_start(&self) -> Option<TimeOfDay> {
        self.current.as_ref().map(|open| open.start)
    }

    /// Apply every classification of one frame.
    ///
    /// Frames without observations still count: they move the end time used
    /// by [`finish`](Self::finish) but never close an interval.
    pub fn observe_frame(
        &mut self,
        frame_number: u64,
        fps: f64,
        observations: &[Observation],
    ) -> FrameOutcome {
        debug_assert!(
            self.last_frame_number.map_or(true, |last| frame_number > last),
            "frames must arrive in increasing order"
        );
        self.last_frame_number = Some(frame_number);
        self.last_frame_end = Some(TimeOfDay::frame_end(frame_number, fps));

        let frame_time = TimeOfDay::frame_start(frame_number, fps);
        match self.target {
            SearchTarget::Class(class_index) => {
                self.observe_target(class_index, frame_time, observations)
            }
            SearchTarget::Any => self.observe_open(frame_time, observations),
        }
    }

    fn accepts(&self, result: &ClassificationResult) -> bool {
        result.probability > self.threshold
    }

    fn observe_target(
        &self,
        class_index: usize,
        frame_time: TimeOfDay,
        observations: &[Observation],
    ) -> FrameOutcome {
        let mut outcome = FrameOutcome::default();

        for (index, observation) in observations.iter().enumerate() {
            let result = &observation.result;
            if self.accepts(result) && result.class_index == class_index {
                outcome.accepted.push(index);
                outcome.entries.push(LogEntry::Point {
                    time: frame_time,
                    label: result.label.clone(),
                    probability: result.probability,
                });
            }
        }

        outcome
    }

    fn observe_open(&mut self, frame_time: TimeOfDay, observations: &[Observation]) -> FrameOutcome {
        let mut outcome = FrameOutcome::default();

        for index in reading_order(observations) {
            let result = &observations[index].result;
            if !self.accepts(result) {
                continue;
            }
            outcome.accepted.push(index);

            match &self.current {
                None => {
                    self.current = Some(OpenInterval {
                        label: result.label.clone(),
                        start: frame_time,
                    });
                }
                Some(open) if open.label != result.label => {
                    outcome.entries.push(LogEntry::Interval {
                        label: open.label.clone(),
                        start: open.start,
                        end: frame_time,
                    });
                    self.current = Some(OpenInterval {
                        label: result.label.clone(),
                        start: frame_time,
                    });
                }
                Some(_) => {}
            }
        }

        // Overlays follow input order
        outcome.accepted.sort_unstable();
        outcome
    }

    /// Close the open interval at the end of the last observed frame.
    pub fn finish(&mut self) -> Option<LogEntry> {
        let open = self.current.take()?;
        let end = self.last_frame_end.unwrap_or(open.start).max(open.start);
        Some(LogEntry::Interval {
            label: open.label,
            start: open.start,
            end,
        })
    }
}

/// Observation indices sorted top to bottom, then left to right, then by
/// input position.
fn reading_order(observations: &[Observation]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..observations.len()).collect();
    order.sort_by_key(|&i| (observations[i].face_box.y, observations[i].face_box.x, i));
    order
}

/// Append-only `list_faces.txt`, flushed after every line.
pub struct TimelineLog {
    path: PathBuf,
    file: File,
    lines: u64,
}

impl TimelineLog {
    /// Create the log, failing if it already exists.
    pub async fn create(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = tokio::fs::OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self {
            path,
            file,
            lines: 0,
        })
    }

    pub async fn append(&mut self, entry: &LogEntry) -> std::io::Result<()> {
        let line = format!("{}\n", entry);
        self.file.write_all(line.as_bytes()).await?;
        self.file.flush().await?;
        self.lines += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lines written so far.
    pub fn lines(&self) -> u64 {
        self.lines
    }
}
