//! Run directory and run manifest.

use chrono::{DateTime, Local, TimeZone};
use facefind_media::VideoInfo;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::RunConfig;
use crate::error::{WorkerError, WorkerResult};

/// Manifest file written next to the timeline log.
pub const MANIFEST_FILE_NAME: &str = "run.json";

/// Run directory name format: day, month, year, hour, minute, second.
const RUN_DIR_FORMAT: &str = "%d%m%Y%H%M%S";

/// Name of the run directory for a start time.
pub fn run_dir_name<Tz: TimeZone>(started_at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    started_at.format(RUN_DIR_FORMAT).to_string()
}

/// Create `<root>/<DDMMYYYYHHMMSS>`; an existing directory is an error.
pub async fn create_run_dir(root: &Path, started_at: &DateTime<Local>) -> WorkerResult<PathBuf> {
    tokio::fs::create_dir_all(root)
        .await
        .map_err(|e| WorkerError::output_dir(root, e.to_string()))?;

    let run_dir = root.join(run_dir_name(started_at));
    tokio::fs::create_dir(&run_dir).await.map_err(|e| {
        let message = if e.kind() == std::io::ErrorKind::AlreadyExists {
            "run directory already exists".to_string()
        } else {
            e.to_string()
        };
        WorkerError::output_dir(&run_dir, message)
    })?;

    Ok(run_dir)
}

/// Counters accumulated over the frame loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    pub frames_sampled: u64,
    pub faces_detected: u64,
    pub faces_classified: u64,
    pub classification_errors: u64,
    pub detection_errors: u64,
    pub entries_emitted: u64,
}

/// Outcome of the export step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExportStatus {
    Disabled,
    Completed { video: PathBuf, frames: u64 },
    Failed { stage: String, error: String },
}

impl ExportStatus {
    /// Failed status for an export error, named by the export step when the
    /// error carries one.
    pub fn failed(err: &WorkerError) -> Self {
        let stage = match err {
            WorkerError::Export { stage, .. } => stage.to_string(),
            other => other.kind().to_string(),
        };
        ExportStatus::Failed {
            stage,
            error: err.to_string(),
        }
    }
}

/// Record of a finished (or failed) run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: String,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub config: RunConfig,
    pub video: Option<VideoInfo>,
    pub stride: u64,
    pub counts: RunCounts,
    pub export: ExportStatus,
    /// Set when the run ended in an error
    pub error: Option<String>,
}

impl RunManifest {
    pub async fn write(&self, run_dir: &Path) -> WorkerResult<PathBuf> {
        let path = run_dir.join(MANIFEST_FILE_NAME);
        let json = serde_json::to_vec_pretty(self)?;
        tokio::fs::write(&path, json).await?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facefind_media::{ExportStage, MediaError};
    use tempfile::TempDir;

    fn started_at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 7, 9, 5, 2).unwrap()
    }

    #[test]
    fn test_failed_status_names_export_step() {
        let err = WorkerError::Export {
            stage: ExportStage::Mux,
            source: MediaError::ffmpeg_failed("no audio stream", None, Some(1)),
        };
        let ExportStatus::Failed { stage, error } = ExportStatus::failed(&err) else {
            panic!("expected a failed status");
        };
        assert_eq!(stage, "mux");
        assert!(error.contains("no audio stream"));

        let status = ExportStatus::failed(&WorkerError::Cancelled);
        assert!(matches!(status, ExportStatus::Failed { ref stage, .. } if stage == "cancelled"));
    }

    #[test]
    fn test_run_dir_name() {
        assert_eq!(run_dir_name(&started_at()), "07032026090502");
    }

    #[tokio::test]
    async fn test_create_run_dir_once() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("out");

        let run_dir = tokio_test::assert_ok!(create_run_dir(&root, &started_at()).await);
        assert!(run_dir.is_dir());
        assert!(run_dir.ends_with("07032026090502"));

        let err = tokio_test::assert_err!(create_run_dir(&root, &started_at()).await);
        assert!(matches!(err, WorkerError::OutputDir { .. }));
    }

    #[tokio::test]
    async fn test_manifest_written() {
        let tmp = TempDir::new().unwrap();
        let manifest = RunManifest {
            run_id: "07032026090502".to_string(),
            started_at: started_at(),
            finished_at: started_at(),
            config: RunConfig::default(),
            video: None,
            stride: 30,
            counts: RunCounts {
                frames_sampled: 4,
                ..Default::default()
            },
            export: ExportStatus::Disabled,
            error: None,
        };

        let path = manifest.write(tmp.path()).await.unwrap();
        let value: serde_json::Value =
            serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!(value["stride"], 30);
        assert_eq!(value["counts"]["frames_sampled"], 4);
        assert_eq!(value["export"]["status"], "disabled");
    }
}
