//! Rebuild a video from stored frames and re-attach the source audio.

use facefind_models::encoding::{
    AUDIO_FILE_NAME, FINAL_VIDEO_FILE_NAME, INTERMEDIATE_AUDIO_CODEC, SILENT_VIDEO_FILE_NAME,
};
use facefind_models::ExportEncoding;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaError;
use crate::frame_store::{FrameSequence, FrameStore};

/// Step of the export that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStage {
    ValidateFrames,
    ExtractAudio,
    EncodeFrames,
    Mux,
    Cleanup,
}

impl ExportStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportStage::ValidateFrames => "validate_frames",
            ExportStage::ExtractAudio => "extract_audio",
            ExportStage::EncodeFrames => "encode_frames",
            ExportStage::Mux => "mux",
            ExportStage::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for ExportStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An export step failure, naming the step.
#[derive(Debug, Error)]
#[error("export failed at {stage}: {source}")]
pub struct ExportFailure {
    pub stage: ExportStage,
    #[source]
    pub source: MediaError,
}

impl ExportFailure {
    fn at(stage: ExportStage) -> impl FnOnce(MediaError) -> Self {
        move |source| Self { stage, source }
    }

    fn io(stage: ExportStage) -> impl FnOnce(std::io::Error) -> Self {
        move |e| Self {
            stage,
            source: MediaError::Io(e),
        }
    }
}

/// Result of a successful export.
#[derive(Debug, Clone)]
pub struct ExportOutput {
    /// Final deliverable
    pub video_path: PathBuf,
    /// Frames encoded
    pub frame_count: u64,
    /// Whether source audio was re-attached
    pub with_audio: bool,
}

/// Encodes a stored frame sequence and muxes the source audio back in.
#[derive(Debug, Clone, Default)]
pub struct Reassembler {
    runner: FfmpegRunner,
    encoding: ExportEncoding,
}

impl Reassembler {
    pub fn new(encoding: ExportEncoding) -> Self {
        Self {
            runner: FfmpegRunner::new(),
            encoding,
        }
    }

    /// Use a runner carrying a cancellation signal or timeout.
    pub fn with_runner(mut self, runner: FfmpegRunner) -> Self {
        self.runner = runner;
        self
    }

    pub fn encoding(&self) -> &ExportEncoding {
        &self.encoding
    }

    /// Run the full export into `out_dir`.
    ///
    /// Leaves only the final video next to the frame directory. A source
    /// without audio yields the encoded video under the final name.
    pub async fn export(
        &self,
        source: &Path,
        has_audio: bool,
        store: &FrameStore,
        out_dir: &Path,
    ) -> Result<ExportOutput, ExportFailure> {
        let started_at = Instant::now();

        let sequence = store
            .sequence()
            .await
            .map_err(ExportFailure::at(ExportStage::ValidateFrames))?;

        let audio_path = out_dir.join(AUDIO_FILE_NAME);
        let silent_path = out_dir.join(SILENT_VIDEO_FILE_NAME);
        let final_path = out_dir.join(FINAL_VIDEO_FILE_NAME);

        if has_audio {
            self.extract_audio(source, &audio_path)
                .await
                .map_err(ExportFailure::at(ExportStage::ExtractAudio))?;
        }

        self.encode_frames(store, &sequence, &silent_path)
            .await
            .map_err(ExportFailure::at(ExportStage::EncodeFrames))?;

        if has_audio {
            self.mux(&silent_path, &audio_path, &final_path)
                .await
                .map_err(ExportFailure::at(ExportStage::Mux))?;

            for intermediate in [&silent_path, &audio_path] {
                tokio::fs::remove_file(intermediate)
                    .await
                    .map_err(ExportFailure::io(ExportStage::Cleanup))?;
            }
        } else {
            warn!("Source has no audio track, keeping encoded video as final output");
            tokio::fs::rename(&silent_path, &final_path)
                .await
                .map_err(ExportFailure::io(ExportStage::Cleanup))?;
        }

        info!(
            frames = sequence.count,
            with_audio = has_audio,
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            output = %final_path.display(),
            "Export complete"
        );

        Ok(ExportOutput {
            video_path: final_path,
            frame_count: sequence.count,
            with_audio: has_audio,
        })
    }

    /// Pull the audio track out as lossless PCM.
    pub async fn extract_audio(&self, source: &Path, audio_path: &Path) -> Result<(), MediaError> {
        let cmd = FfmpegCommand::new(source, audio_path)
            .no_video()
            .output_args(["-acodec", INTERMEDIATE_AUDIO_CODEC]);
        self.runner.run(&cmd).await
    }

    /// Encode frames `1..=N` at the output frame rate.
    pub async fn encode_frames(
        &self,
        store: &FrameStore,
        sequence: &FrameSequence,
        video_path: &Path,
    ) -> Result<(), MediaError> {
        let (width, height) = image::image_dimensions(&sequence.first_path)?;
        let (width, height) = even_dimensions(width, height);

        let cmd = FfmpegCommand::new(store.input_pattern(), video_path)
            .input_args([
                "-framerate".to_string(),
                self.encoding.output_fps.to_string(),
                "-start_number".to_string(),
                "1".to_string(),
            ])
            .video_filter(format!("scale={}:{}", width, height))
            .video_codec(self.encoding.codec.clone())
            .preset(self.encoding.preset.clone())
            .crf(self.encoding.crf)
            .output_args(["-pix_fmt", "yuv420p"])
            .output_args(["-frames:v".to_string(), sequence.count.to_string()]);

        let total = sequence.count;
        self.runner
            .run_with_progress(&cmd, move |progress| {
                debug!(
                    frame = progress.frame,
                    percent = progress.frame_percentage(total),
                    "Encoding frames"
                );
            })
            .await
    }

    /// Combine the silent video with the extracted audio.
    pub async fn mux(
        &self,
        video_path: &Path,
        audio_path: &Path,
        output_path: &Path,
    ) -> Result<(), MediaError> {
        let cmd = FfmpegCommand::new(video_path, output_path)
            .add_input(audio_path)
            .output_args(["-map", "0:v:0", "-map", "1:a:0"])
            .video_codec("copy")
            .audio_codec(self.encoding.audio_codec.clone());
        self.runner.run(&cmd).await
    }
}

/// yuv420p needs even dimensions; round down, never below 2.
fn even_dimensions(width: u32, height: u32) -> (u32, u32) {
    ((width & !1).max(2), (height & !1).max(2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use tempfile::TempDir;

    #[test]
    fn test_even_dimensions() {
        assert_eq!(even_dimensions(640, 360), (640, 360));
        assert_eq!(even_dimensions(641, 361), (640, 360));
        assert_eq!(even_dimensions(1, 1), (2, 2));
    }

    #[test]
    fn test_failure_names_stage() {
        let failure = ExportFailure {
            stage: ExportStage::Mux,
            source: MediaError::ffmpeg_failed("boom", None, Some(1)),
        };
        assert!(failure.to_string().starts_with("export failed at mux"));
    }

    #[tokio::test]
    async fn test_export_rejects_gapped_frames() {
        let tmp = TempDir::new().unwrap();
        let store = FrameStore::create(tmp.path().join("images")).await.unwrap();
        store.persist(2, RgbImage::new(4, 4)).await.unwrap();

        let failure = Reassembler::default()
            .export(Path::new("unused.mp4"), true, &store, tmp.path())
            .await
            .unwrap_err();
        assert_eq!(failure.stage, ExportStage::ValidateFrames);
    }

    #[tokio::test]
    #[ignore = "requires ffmpeg"]
    async fn test_round_trip_frame_count() {
        let tmp = TempDir::new().unwrap();
        let store = FrameStore::create(tmp.path().join("images")).await.unwrap();

        let n = 12;
        for i in 1..=n {
            let shade = (i * 20) as u8;
            let frame = RgbImage::from_pixel(64, 48, image::Rgb([shade, 0, 255 - shade]));
            store.persist(i, frame).await.unwrap();
        }

        let output = Reassembler::default()
            .export(Path::new("unused.mp4"), false, &store, tmp.path())
            .await
            .unwrap();
        assert_eq!(output.frame_count, n);
        assert!(!output.with_audio);

        let info = crate::probe::probe_video(&output.video_path).await.unwrap();
        assert_eq!(info.frame_count, Some(n));
        assert!(!tmp.path().join(SILENT_VIDEO_FILE_NAME).exists());
    }
}
