//! Export encoding configuration.

use serde::{Deserialize, Serialize};

pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
/// Lossless PCM for the audio track pulled out of the source
pub const INTERMEDIATE_AUDIO_CODEC: &str = "pcm_s16le";
pub const DEFAULT_PRESET: &str = "fast";
pub const DEFAULT_CRF: u8 = 18;
/// The annotated video is re-timed to this rate whatever the source rate was.
pub const DEFAULT_OUTPUT_FPS: u32 = 30;

/// Intermediate and final artifact names inside a run directory.
pub const AUDIO_FILE_NAME: &str = "audio.wav";
pub const SILENT_VIDEO_FILE_NAME: &str = "result_vid.mp4";
pub const FINAL_VIDEO_FILE_NAME: &str = "result_vid_with_audio.mp4";
pub const IMAGES_DIR_NAME: &str = "images";

/// How the annotated frames are turned back into a video.
///
/// Missing fields fall back to [`ExportEncoding::default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportEncoding {
    /// x264-style encoder name
    pub codec: String,
    pub preset: String,
    /// 0-51, lower keeps more detail
    pub crf: u8,
    /// Codec of the audio in the muxed deliverable
    pub audio_codec: String,
    pub output_fps: u32,
}

impl Default for ExportEncoding {
    fn default() -> Self {
        Self {
            codec: String::from(DEFAULT_VIDEO_CODEC),
            preset: String::from(DEFAULT_PRESET),
            crf: DEFAULT_CRF,
            audio_codec: String::from(DEFAULT_AUDIO_CODEC),
            output_fps: DEFAULT_OUTPUT_FPS,
        }
    }
}

impl ExportEncoding {
    pub fn with_output_fps(mut self, fps: u32) -> Self {
        self.output_fps = fps;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_json() {
        let encoding: ExportEncoding = serde_json::from_str("{}").unwrap();
        assert_eq!(encoding, ExportEncoding::default());
        assert_eq!(encoding.output_fps, 30);

        let encoding: ExportEncoding = serde_json::from_str(r#"{"crf": 23}"#).unwrap();
        assert_eq!(encoding.crf, 23);
        assert_eq!(encoding.codec, "libx264");
    }
}
