//! Sampled frame decoding.
//!
//! FFmpeg decodes the source and writes raw `rgb24` frames to stdout; the
//! stride is applied inside FFmpeg with a `select` filter so skipped frames
//! never cross the pipe.

use async_trait::async_trait;
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::command::{check_ffmpeg, FfmpegCommand};
use crate::error::{MediaError, MediaResult};
use crate::frame::{Frame, SamplingPlan};
use crate::probe::VideoInfo;

/// A lazy, finite, non-restartable sequence of sampled frames.
#[async_trait]
pub trait FrameSource: Send {
    /// Next sampled frame, or `None` at end of stream.
    async fn next_frame(&mut self) -> MediaResult<Option<Frame>>;

    /// Source frame rate.
    fn fps(&self) -> f64;

    /// Sampling stride in effect.
    fn plan(&self) -> SamplingPlan;

    /// Expected number of samples, when the source length is known.
    fn estimated_samples(&self) -> Option<u64>;
}

/// Frame source backed by an FFmpeg decode process.
pub struct FfmpegFrameSource {
    path: PathBuf,
    child: Child,
    stdout: ChildStdout,
    stderr_task: Option<JoinHandle<String>>,
    width: u32,
    height: u32,
    fps: f64,
    plan: SamplingPlan,
    total_frames: Option<u64>,
    sample_index: u64,
    finished: bool,
}

impl FfmpegFrameSource {
    /// Start decoding `path` with the given sampling plan.
    pub fn open(path: impl AsRef<Path>, info: &VideoInfo, plan: SamplingPlan) -> MediaResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }
        if info.width == 0 || info.height == 0 {
            return Err(MediaError::InvalidVideo(format!(
                "{} has no frame dimensions",
                path.display()
            )));
        }

        check_ffmpeg()?;

        let args = decode_command(path, plan).build_args();
        debug!("Decoding frames: ffmpeg {}", args.join(" "));

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| MediaError::decode(format!("failed to start decoder: {}", e), None))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stderr not captured"))?;

        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut collected = Vec::new();
            while let Ok(Some(line)) = lines.next_line().await {
                if !line.trim().is_empty() {
                    collected.push(line);
                }
            }
            collected.join("\n")
        });

        Ok(Self {
            path: path.to_path_buf(),
            child,
            stdout,
            stderr_task: Some(stderr_task),
            width: info.width,
            height: info.height,
            fps: info.fps,
            plan,
            total_frames: info.estimated_frames(),
            sample_index: 0,
            finished: false,
        })
    }

    fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    /// Fill `buf` with one frame. Returns `false` on a clean end of stream.
    async fn read_frame(&mut self, buf: &mut [u8], frame_number: u64) -> MediaResult<bool> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self
                .stdout
                .read(&mut buf[filled..])
                .await
                .map_err(|e| MediaError::decode(e.to_string(), Some(frame_number)))?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        match filled {
            0 => Ok(false),
            n if n == buf.len() => Ok(true),
            n => Err(MediaError::decode(
                format!("truncated frame: {} of {} bytes", n, buf.len()),
                Some(frame_number),
            )),
        }
    }

    /// Reap the decoder after stdout closes; a failed exit is a decode error.
    async fn finish(&mut self) -> MediaResult<()> {
        self.finished = true;
        let status = self.child.wait().await?;
        let stderr = match self.stderr_task.take() {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if status.success() {
            debug!(
                path = %self.path.display(),
                samples = self.sample_index,
                "Decoder reached end of stream"
            );
            return Ok(());
        }

        let detail = if stderr.is_empty() {
            format!("decoder exited with {}", status)
        } else {
            stderr
        };
        Err(MediaError::decode(
            format!("cannot decode {}: {}", self.path.display(), detail),
            None,
        ))
    }
}

#[async_trait]
impl FrameSource for FfmpegFrameSource {
    async fn next_frame(&mut self) -> MediaResult<Option<Frame>> {
        if self.finished {
            return Ok(None);
        }

        let frame_number = self.plan.frame_number(self.sample_index);
        let mut buf = vec![0u8; self.frame_len()];

        let got_frame = match self.read_frame(&mut buf, frame_number).await {
            Ok(got_frame) => got_frame,
            Err(e) => {
                self.finished = true;
                let _ = self.child.kill().await;
                return Err(e);
            }
        };

        if !got_frame {
            self.finish().await?;
            return Ok(None);
        }

        let pixels = RgbImage::from_raw(self.width, self.height, buf).ok_or_else(|| {
            MediaError::decode("frame buffer size mismatch", Some(frame_number))
        })?;

        self.sample_index += 1;
        Ok(Some(Frame::new(frame_number, self.fps, pixels)))
    }

    fn fps(&self) -> f64 {
        self.fps
    }

    fn plan(&self) -> SamplingPlan {
        self.plan
    }

    fn estimated_samples(&self) -> Option<u64> {
        self.total_frames.map(|total| self.plan.sample_count(total))
    }
}

/// Build the decode command for a sampling plan.
fn decode_command(path: &Path, plan: SamplingPlan) -> FfmpegCommand {
    // Probe dimensions are pre-rotation, so keep the decoder in the same space
    let cmd = FfmpegCommand::new(path, "pipe:1")
        .without_progress()
        .input_arg("-noautorotate");

    let cmd = if plan.stride > 1 {
        cmd.video_filter(format!("select=not(mod(n\\,{}))", plan.stride))
            .output_args(["-fps_mode", "passthrough"])
    } else {
        cmd
    };

    cmd.no_audio()
        .output_args(["-sn", "-f", "rawvideo", "-pix_fmt", "rgb24"])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_command_every_frame() {
        let args = decode_command(Path::new("in.mp4"), SamplingPlan::EVERY_FRAME).build_args();
        assert!(!args.iter().any(|a| a.starts_with("select=")));
        assert!(args.contains(&"rgb24".to_string()));
        assert_eq!(args.last().unwrap(), "pipe:1");
    }

    #[test]
    fn test_decode_command_with_stride() {
        let args = decode_command(Path::new("in.mp4"), SamplingPlan { stride: 25 }).build_args();
        assert!(args.contains(&"select=not(mod(n\\,25))".to_string()));
        assert!(args.contains(&"passthrough".to_string()));
    }

    #[test]
    fn test_open_missing_file() {
        let info = VideoInfo {
            duration: 1.0,
            width: 4,
            height: 4,
            fps: 1.0,
            codec: "h264".to_string(),
            frame_count: Some(1),
            has_audio: false,
        };
        let result = FfmpegFrameSource::open("/nonexistent/video.mp4", &info, SamplingPlan::EVERY_FRAME);
        assert!(matches!(result, Err(MediaError::FileNotFound(_))));
    }
}
