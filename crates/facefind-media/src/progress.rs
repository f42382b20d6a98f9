//! `-progress pipe:2` parsing.
//!
//! FFmpeg writes `key=value` lines and closes each block with
//! `progress=continue` or `progress=end`. Everything else on stderr is a
//! diagnostic.

use serde::{Deserialize, Serialize};

/// Snapshot of one progress block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FfmpegProgress {
    /// Frames written to the output
    pub frame: u64,
    /// Encoder throughput
    pub fps: f64,
    /// Output position in milliseconds
    pub out_time_ms: i64,
    /// Multiple of realtime; 0 until FFmpeg reports one
    pub speed: f64,
    /// Set on the final block
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Share of `total_frames` written, capped at 100.
    pub fn frame_percentage(&self, total_frames: u64) -> f64 {
        if total_frames == 0 {
            return 0.0;
        }
        (self.frame as f64 * 100.0 / total_frames as f64).min(100.0)
    }
}

/// What one stderr line turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressLine {
    /// A block just closed
    Snapshot(FfmpegProgress),
    /// A field inside an open block
    Field,
    /// Anything FFmpeg logged on its own
    Diagnostic,
}

/// Accumulates fields until a block closes.
#[derive(Debug, Default)]
pub struct ProgressParser {
    current: FfmpegProgress,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, line: &str) -> ProgressLine {
        let Some((key, value)) = line.trim().split_once('=') else {
            return ProgressLine::Diagnostic;
        };
        if key.is_empty() || key.contains(char::is_whitespace) {
            return ProgressLine::Diagnostic;
        }

        match key {
            "frame" => {
                if let Ok(frame) = value.parse() {
                    self.current.frame = frame;
                }
            }
            "fps" => {
                if let Ok(fps) = value.parse() {
                    self.current.fps = fps;
                }
            }
            // Both carry microseconds
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.parse::<i64>() {
                    self.current.out_time_ms = us / 1000;
                }
            }
            "speed" => {
                if let Some(speed) = value.trim().strip_suffix('x').and_then(|s| s.parse().ok()) {
                    self.current.speed = speed;
                }
            }
            "progress" => {
                self.current.is_complete = value == "end";
                return ProgressLine::Snapshot(self.current.clone());
            }
            _ => {}
        }

        ProgressLine::Field
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_produces_snapshot() {
        let mut parser = ProgressParser::new();
        for line in ["frame=45", "fps=90.5", "out_time_us=1500000", "speed=3.0x"] {
            assert_eq!(parser.feed(line), ProgressLine::Field);
        }

        let ProgressLine::Snapshot(progress) = parser.feed("progress=continue") else {
            panic!("expected a snapshot");
        };
        assert_eq!(progress.frame, 45);
        assert_eq!(progress.out_time_ms, 1500);
        assert!((progress.speed - 3.0).abs() < 1e-9);
        assert!(!progress.is_complete);

        let ProgressLine::Snapshot(last) = parser.feed("progress=end") else {
            panic!("expected a snapshot");
        };
        assert!(last.is_complete);
    }

    #[test]
    fn test_unknown_speed_keeps_previous() {
        let mut parser = ProgressParser::new();
        parser.feed("speed=1.5x");
        parser.feed("speed=N/A");
        let ProgressLine::Snapshot(progress) = parser.feed("progress=continue") else {
            panic!("expected a snapshot");
        };
        assert!((progress.speed - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_diagnostics_are_not_fields() {
        let mut parser = ProgressParser::new();
        assert_eq!(parser.feed("stream_0_0_q=28.0"), ProgressLine::Field);
        assert_eq!(
            parser.feed("images/000001.jpg: No such file or directory"),
            ProgressLine::Diagnostic
        );
        assert_eq!(parser.feed("Error opening input file x = y"), ProgressLine::Diagnostic);
        assert_eq!(parser.feed(""), ProgressLine::Diagnostic);
    }

    #[test]
    fn test_frame_percentage() {
        let progress = FfmpegProgress {
            frame: 45,
            ..Default::default()
        };
        assert!((progress.frame_percentage(90) - 50.0).abs() < 1e-9);
        assert!((progress.frame_percentage(30) - 100.0).abs() < 1e-9);
        assert_eq!(progress.frame_percentage(0), 0.0);
    }
}
