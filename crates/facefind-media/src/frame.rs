//! Decoded frames and the sampling stride.

use facefind_models::time::{frame_end_seconds, frame_start_seconds};
use image::RgbImage;

/// One sampled frame of the source video.
///
/// Frames are numbered from 1 in source order, so with stride `S` the
/// sampled numbers are `1, S + 1, 2S + 1, ...`.
#[derive(Debug, Clone)]
pub struct Frame {
    /// 1-based source frame number
    pub frame_number: u64,
    /// Start of the frame in seconds
    pub timestamp_seconds: f64,
    /// RGB pixels
    pub pixels: RgbImage,
}

impl Frame {
    pub fn new(frame_number: u64, fps: f64, pixels: RgbImage) -> Self {
        Self {
            frame_number,
            timestamp_seconds: frame_start_seconds(frame_number, fps),
            pixels,
        }
    }

    /// End of the frame in seconds.
    pub fn end_seconds(&self, fps: f64) -> f64 {
        frame_end_seconds(self.frame_number, fps)
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }
}

/// How many source frames to advance between samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingPlan {
    pub stride: u64,
}

impl SamplingPlan {
    /// Every frame.
    pub const EVERY_FRAME: SamplingPlan = SamplingPlan { stride: 1 };

    /// Resolve the stride for a run.
    ///
    /// Exporting forces stride 1 so every frame reaches the reassembler.
    /// Otherwise an explicit override wins, and the fallback is about one
    /// sample per second of video.
    pub fn resolve(fps: f64, stride_override: Option<u64>, export_video: bool) -> Self {
        if export_video {
            return Self::EVERY_FRAME;
        }

        let stride = match stride_override {
            Some(stride) => stride.max(1),
            None if fps.is_finite() && fps > 0.0 => (fps.round() as u64).max(1),
            None => 1,
        };

        Self { stride }
    }

    /// Source frame number of the `index`-th sample (0-based).
    pub fn frame_number(&self, index: u64) -> u64 {
        index * self.stride + 1
    }

    /// Number of samples taken from a video of `total_frames` frames.
    pub fn sample_count(&self, total_frames: u64) -> u64 {
        total_frames.div_ceil(self.stride)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_forces_every_frame() {
        assert_eq!(SamplingPlan::resolve(30.0, Some(10), true).stride, 1);
    }

    #[test]
    fn test_default_stride_is_rounded_fps() {
        assert_eq!(SamplingPlan::resolve(29.97, None, false).stride, 30);
        assert_eq!(SamplingPlan::resolve(0.4, None, false).stride, 1);
        assert_eq!(SamplingPlan::resolve(f64::NAN, None, false).stride, 1);
    }

    #[test]
    fn test_override_stride() {
        assert_eq!(SamplingPlan::resolve(30.0, Some(5), false).stride, 5);
        assert_eq!(SamplingPlan::resolve(30.0, Some(0), false).stride, 1);
    }

    #[test]
    fn test_frame_numbers() {
        let plan = SamplingPlan { stride: 30 };
        assert_eq!(plan.frame_number(0), 1);
        assert_eq!(plan.frame_number(2), 61);
        assert_eq!(plan.sample_count(61), 3);
        assert_eq!(plan.sample_count(60), 2);
    }

    #[test]
    fn test_frame_timestamps() {
        let frame = Frame::new(4, 1.0, RgbImage::new(2, 2));
        assert_eq!(frame.timestamp_seconds, 3.0);
        assert_eq!(frame.end_seconds(1.0), 4.0);
    }
}
