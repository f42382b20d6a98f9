//! Stream metadata via `ffprobe -show_streams`.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::command::check_ffprobe;
use crate::error::{MediaError, MediaResult};

/// Frame rate assumed when the container reports none.
const FALLBACK_FPS: f64 = 30.0;

/// What the pipeline needs to know about an input video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    /// Seconds
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub codec: String,
    /// Container frame count, or duration times fps
    pub frame_count: Option<u64>,
    pub has_audio: bool,
}

impl VideoInfo {
    pub fn estimated_frames(&self) -> Option<u64> {
        self.frame_count
            .or_else(|| frames_for(self.duration, self.fps))
    }
}

#[derive(Debug, Deserialize)]
struct ProbeReport {
    #[serde(default)]
    format: ProbeFormat,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
}

impl ProbeStream {
    fn is(&self, kind: &str) -> bool {
        self.codec_type == kind
    }

    /// Average rate first; variable-rate files report a misleading `r_frame_rate`.
    fn fps(&self) -> Option<f64> {
        [&self.avg_frame_rate, &self.r_frame_rate]
            .into_iter()
            .flatten()
            .find_map(|rate| rational(rate))
    }
}

/// Read dimensions, rate, duration and audio presence of `path`.
pub async fn probe_video(path: impl AsRef<Path>) -> MediaResult<VideoInfo> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }
    check_ffprobe()?;

    let output = Command::new("ffprobe")
        .args(["-v", "quiet", "-of", "json", "-show_format", "-show_streams"])
        .arg(path)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(MediaError::FfprobeFailed {
            message: format!("{} ({})", path.display(), output.status),
            stderr: (!stderr.is_empty()).then_some(stderr),
        });
    }

    video_info_from_probe(serde_json::from_slice(&output.stdout)?)
}

fn video_info_from_probe(report: ProbeReport) -> MediaResult<VideoInfo> {
    let video = report
        .streams
        .iter()
        .find(|s| s.is("video"))
        .ok_or_else(|| MediaError::InvalidVideo("no video stream".to_string()))?;

    let (width, height) = match (video.width, video.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => {
            return Err(MediaError::InvalidVideo(
                "video stream has no dimensions".to_string(),
            ))
        }
    };

    let duration = [&video.duration, &report.format.duration]
        .into_iter()
        .flatten()
        .find_map(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);
    let fps = video.fps().unwrap_or(FALLBACK_FPS);

    let frame_count = video
        .nb_frames
        .as_deref()
        .and_then(|n| n.parse::<u64>().ok())
        .filter(|&n| n > 0)
        .or_else(|| frames_for(duration, fps));

    Ok(VideoInfo {
        duration,
        width,
        height,
        fps,
        codec: video.codec_name.clone().unwrap_or_default(),
        frame_count,
        has_audio: report.streams.iter().any(|s| s.is("audio")),
    })
}

fn frames_for(duration: f64, fps: f64) -> Option<u64> {
    (duration > 0.0 && fps > 0.0).then(|| (duration * fps).round() as u64)
}

/// "30000/1001" or "25". Zero and malformed rates are `None`.
fn rational(rate: &str) -> Option<f64> {
    let value = match rate.split_once('/') {
        Some((num, den)) => {
            let den: f64 = den.parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num.parse::<f64>().ok()? / den
        }
        None => rate.parse().ok()?,
    };
    (value > 0.0 && value.is_finite()).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(json: &str) -> ProbeReport {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_rational() {
        assert_eq!(rational("25/1"), Some(25.0));
        assert!((rational("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(rational("12.5"), Some(12.5));
        assert_eq!(rational("0/0"), None);
        assert_eq!(rational("N/A"), None);
    }

    #[test]
    fn test_video_with_audio_track() {
        let info = video_info_from_probe(report(
            r#"{
                "format": {"duration": "10.0"},
                "streams": [
                    {"codec_type": "video", "codec_name": "h264", "width": 640, "height": 360,
                     "avg_frame_rate": "25/1", "r_frame_rate": "25/1", "nb_frames": "250"},
                    {"codec_type": "audio", "codec_name": "aac"}
                ]
            }"#,
        ))
        .unwrap();

        assert_eq!((info.width, info.height), (640, 360));
        assert_eq!(info.fps, 25.0);
        assert_eq!(info.frame_count, Some(250));
        assert_eq!(info.codec, "h264");
        assert!(info.has_audio);
    }

    #[test]
    fn test_missing_frame_count_is_estimated() {
        let info = video_info_from_probe(report(
            r#"{
                "format": {"duration": "4.0"},
                "streams": [
                    {"codec_type": "video", "width": 320, "height": 240,
                     "avg_frame_rate": "0/0", "r_frame_rate": "30/1"}
                ]
            }"#,
        ))
        .unwrap();

        assert_eq!(info.fps, 30.0);
        assert_eq!(info.frame_count, Some(120));
        assert!(!info.has_audio);
    }

    #[test]
    fn test_rejects_audio_only_and_zero_size() {
        let audio_only = report(r#"{"format": {}, "streams": [{"codec_type": "audio"}]}"#);
        assert!(matches!(
            video_info_from_probe(audio_only),
            Err(MediaError::InvalidVideo(_))
        ));

        let no_size = report(r#"{"streams": [{"codec_type": "video", "width": 0, "height": 0}]}"#);
        assert!(matches!(
            video_info_from_probe(no_size),
            Err(MediaError::InvalidVideo(_))
        ));
    }
}
