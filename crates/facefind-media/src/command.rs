//! FFmpeg invocation.
//!
//! [`FfmpegCommand`] assembles the argument list. [`FfmpegRunner`] spawns it,
//! splits stderr into progress blocks and diagnostics, and stops the process
//! on cancellation or when its time limit runs out.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{MediaError, MediaResult};
use crate::progress::{FfmpegProgress, ProgressLine, ProgressParser};

/// Diagnostic lines kept for the error report of a failed command.
const DIAGNOSTIC_LINES: usize = 20;

/// FFmpeg `-v` level; only errors reach the diagnostic tail.
const VERBOSITY: &str = "error";

/// One `-i` and the options placed in front of it.
#[derive(Debug, Clone)]
struct InputSpec {
    options: Vec<String>,
    path: PathBuf,
}

impl InputSpec {
    fn new(path: &Path) -> Self {
        Self {
            options: Vec::new(),
            path: path.to_path_buf(),
        }
    }
}

/// FFmpeg argument builder.
///
/// Input options attach to the most recently added input, so an image
/// sequence and an audio file can carry different demuxer settings.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    inputs: Vec<InputSpec>,
    output_options: Vec<String>,
    output: PathBuf,
    report_progress: bool,
}

impl FfmpegCommand {
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            inputs: vec![InputSpec::new(input.as_ref())],
            output_options: Vec::new(),
            output: output.as_ref().to_path_buf(),
            report_progress: true,
        }
    }

    /// Read a further input, mapped as the next input index.
    pub fn add_input(mut self, input: impl AsRef<Path>) -> Self {
        self.inputs.push(InputSpec::new(input.as_ref()));
        self
    }

    /// Option for the last added input.
    pub fn input_arg(self, arg: impl Into<String>) -> Self {
        self.input_args([arg.into()])
    }

    pub fn input_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Some(input) = self.inputs.last_mut() {
            input.options.extend(args.into_iter().map(Into::into));
        }
        self
    }

    pub fn output_arg(self, arg: impl Into<String>) -> Self {
        self.output_args([arg.into()])
    }

    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_options.extend(args.into_iter().map(Into::into));
        self
    }

    fn output_option(self, flag: &str, value: impl Into<String>) -> Self {
        self.output_args([flag.to_string(), value.into()])
    }

    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_option("-vf", filter)
    }

    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_option("-c:v", codec)
    }

    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_option("-c:a", codec)
    }

    pub fn crf(self, crf: u8) -> Self {
        self.output_option("-crf", crf.to_string())
    }

    pub fn preset(self, preset: impl Into<String>) -> Self {
        self.output_option("-preset", preset)
    }

    /// `-vn`
    pub fn no_video(self) -> Self {
        self.output_arg("-vn")
    }

    /// `-an`
    pub fn no_audio(self) -> Self {
        self.output_arg("-an")
    }

    /// Skip `-progress pipe:2`, for commands whose stderr is read as plain
    /// diagnostics.
    pub fn without_progress(mut self) -> Self {
        self.report_progress = false;
        self
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Full argument list, without the program name.
    pub fn build_args(&self) -> Vec<String> {
        let mut args: Vec<String> = ["-nostdin", "-y", "-v", VERBOSITY]
            .into_iter()
            .map(String::from)
            .collect();

        if self.report_progress {
            args.extend(["-progress".to_string(), "pipe:2".to_string()]);
        }

        for input in &self.inputs {
            args.extend(input.options.iter().cloned());
            args.push("-i".to_string());
            args.push(input.path.to_string_lossy().into_owned());
        }

        args.extend(self.output_options.iter().cloned());
        args.push(self.output.to_string_lossy().into_owned());
        args
    }
}

/// Spawns FFmpeg commands under an optional cancel flag and time limit.
#[derive(Debug, Clone, Default)]
pub struct FfmpegRunner {
    cancel_rx: Option<watch::Receiver<bool>>,
    timeout_secs: Option<u64>,
}

impl FfmpegRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill the process once the flag turns true.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    /// Kill the process after `secs` seconds.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        self.run_with_progress(cmd, |_| {}).await
    }

    /// Run `cmd`, calling `on_progress` for every completed progress block.
    ///
    /// A failed exit carries the last diagnostic lines FFmpeg printed.
    pub async fn run_with_progress<F>(&self, cmd: &FfmpegCommand, on_progress: F) -> MediaResult<()>
    where
        F: Fn(FfmpegProgress) + Send + 'static,
    {
        check_ffmpeg()?;
        if self.cancel_rx.as_ref().is_some_and(is_cancelled) {
            return Err(MediaError::Cancelled);
        }

        let args = cmd.build_args();
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));
        let started = Instant::now();

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stderr not captured"))?;

        let stderr_reader = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut parser = ProgressParser::new();
            let mut diagnostics = VecDeque::with_capacity(DIAGNOSTIC_LINES);

            while let Ok(Some(line)) = lines.next_line().await {
                match parser.feed(&line) {
                    ProgressLine::Snapshot(progress) => on_progress(progress),
                    ProgressLine::Field => {}
                    ProgressLine::Diagnostic if line.trim().is_empty() => {}
                    ProgressLine::Diagnostic => {
                        if diagnostics.len() == DIAGNOSTIC_LINES {
                            diagnostics.pop_front();
                        }
                        diagnostics.push_back(line);
                    }
                }
            }

            Vec::from(diagnostics).join("\n")
        });

        let outcome = self.supervise(&mut child).await;
        let diagnostics = stderr_reader.await.unwrap_or_default();

        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            output = %cmd.output().display(),
            "FFmpeg finished"
        );

        match outcome {
            Err(MediaError::FfmpegFailed {
                message, exit_code, ..
            }) => Err(MediaError::ffmpeg_failed(
                message,
                (!diagnostics.is_empty()).then_some(diagnostics),
                exit_code,
            )),
            other => other,
        }
    }

    /// Wait for exit, cancellation or the time limit, whichever comes first.
    async fn supervise(&self, child: &mut Child) -> MediaResult<()> {
        tokio::select! {
            status = child.wait() => {
                let status = status?;
                if status.success() {
                    Ok(())
                } else {
                    Err(MediaError::ffmpeg_failed(
                        format!("FFmpeg exited with {}", status),
                        None,
                        status.code(),
                    ))
                }
            }
            _ = cancelled(self.cancel_rx.clone()) => {
                info!("FFmpeg cancelled, killing process");
                let _ = child.kill().await;
                Err(MediaError::Cancelled)
            }
            _ = deadline(self.timeout_secs) => {
                let secs = self.timeout_secs.unwrap_or_default();
                warn!("FFmpeg exceeded {} seconds, killing process", secs);
                let _ = child.kill().await;
                Err(MediaError::Timeout(secs))
            }
        }
    }
}

/// Whether the cancel flag is set.
pub fn is_cancelled(cancel_rx: &watch::Receiver<bool>) -> bool {
    *cancel_rx.borrow()
}

/// Resolves when the flag turns true. Pending forever without a channel, or
/// once the sender is gone.
async fn cancelled(cancel_rx: Option<watch::Receiver<bool>>) {
    if let Some(mut rx) = cancel_rx {
        if rx.wait_for(|&flag| flag).await.is_ok() {
            return;
        }
    }
    std::future::pending::<()>().await
}

async fn deadline(secs: Option<u64>) {
    match secs {
        Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
        None => std::future::pending::<()>().await,
    }
}

/// Path of the `ffmpeg` binary.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Path of the `ffprobe` binary.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}
