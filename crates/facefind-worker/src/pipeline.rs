//! Run orchestration.
//!
//! One producer decodes sampled frames. Up to `workers` frames are analysed
//! at once on blocking threads, and results come back in frame order, so the
//! aggregator and the frame store see strictly increasing frame numbers.

use chrono::Local;
use facefind_media::{
    is_cancelled, probe_video, Annotator, ExportOutput, FfmpegFrameSource, FfmpegRunner, Frame,
    FrameSource, FrameStore, Overlay, Reassembler, SamplingPlan,
};
use facefind_models::encoding::IMAGES_DIR_NAME;
use facefind_models::timeline::{format_label, TIMELINE_FILE_NAME};
use facefind_models::LogEntry;
use facefind_vision::{AnalysisSession, FrameAnalysis};
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, info, warn, Instrument};

use crate::config::RunConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::loader::load_session;
use crate::logging::RunLogger;
use crate::metrics;
use crate::output::{create_run_dir, run_dir_name, ExportStatus, RunCounts, RunManifest};
use crate::timeline::{Observation, TimelineAggregator, TimelineLog};

/// Frames between two progress lines.
const HEARTBEAT_FRAMES: u64 = 100;

/// What the frame loop left behind.
#[derive(Debug)]
pub struct AnalysisSummary {
    pub timeline_path: PathBuf,
    /// Present when annotated frames were persisted for export
    pub frame_store: Option<FrameStore>,
    pub frames: u64,
    pub last_frame_number: Option<u64>,
}

/// A completed run.
#[derive(Debug)]
pub struct RunReport {
    pub run_dir: PathBuf,
    pub manifest: RunManifest,
}

/// Drives one run over a frame source.
pub struct Pipeline {
    config: RunConfig,
    cancel_rx: watch::Receiver<bool>,
    counts: RunCounts,
}

impl Pipeline {
    pub fn new(config: RunConfig, cancel_rx: watch::Receiver<bool>) -> Self {
        Self {
            config,
            cancel_rx,
            counts: RunCounts::default(),
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Counters so far, also valid after a failed run.
    pub fn counts(&self) -> RunCounts {
        self.counts
    }

    fn check_cancelled(&self) -> WorkerResult<()> {
        if is_cancelled(&self.cancel_rx) {
            return Err(WorkerError::Cancelled);
        }
        Ok(())
    }

    /// Run every sampled frame through detection, classification, the
    /// timeline and (when exporting) the frame store.
    ///
    /// `list_faces.txt` is written into `run_dir` as entries are produced.
    /// A decode error ends the run; detection and classification failures
    /// only cost the affected frame or face.
    pub async fn analyze(
        &mut self,
        source: Box<dyn FrameSource>,
        session: AnalysisSession,
        run_dir: &Path,
        logger: &RunLogger,
    ) -> WorkerResult<AnalysisSummary> {
        let fps = source.fps();
        let estimated = source.estimated_samples();
        let detector = session.extractor().detector_name();

        let timeline_path = run_dir.join(TIMELINE_FILE_NAME);
        let mut log = TimelineLog::create(&timeline_path)
            .await
            .map_err(WorkerError::Timeline)?;

        let frame_store = if self.config.export_video {
            Some(FrameStore::create(run_dir.join(IMAGES_DIR_NAME)).await?)
        } else {
            None
        };
        let annotator = match &self.config.font {
            Some(font) => Annotator::with_font_file(font)?,
            None => Annotator::new(),
        };

        let mut aggregator = TimelineAggregator::new(self.config.target, self.config.threshold);

        logger.log_start(&format!(
            "analysing {} at {:.3} fps, stride {}, {} workers",
            self.config.input.display(),
            fps,
            source.plan().stride,
            self.config.workers
        ));

        let mut frames = std::pin::pin!(analysed_frames(source, session, self.config.workers));
        let mut last_frame_number = None;

        while let Some(item) = frames.next().await {
            self.check_cancelled()?;
            let (frame, analysis) = item?;

            self.record_analysis(&frame, &analysis, detector);

            let observations: Vec<Observation> = analysis
                .faces
                .iter()
                .map(|face| Observation {
                    result: face.result.clone(),
                    face_box: face.face_box,
                })
                .collect();
            let outcome = aggregator.observe_frame(frame.frame_number, fps, &observations);

            for entry in &outcome.entries {
                self.append_entry(&mut log, entry).await?;
            }

            last_frame_number = Some(frame.frame_number);
            if let Some(store) = &frame_store {
                let overlays: Vec<Overlay> = outcome
                    .accepted
                    .iter()
                    .map(|&i| {
                        let face = &analysis.faces[i];
                        Overlay::new(
                            face.face_box,
                            format_label(&face.result.label, face.result.probability),
                        )
                    })
                    .collect();

                let frame_number = frame.frame_number;
                let mut pixels = frame.pixels;
                annotator.draw(&mut pixels, &overlays);
                store.persist(frame_number, pixels).await?;
            }

            let processed = self.counts.frames_sampled;
            if processed % HEARTBEAT_FRAMES == 0 {
                let message = match estimated {
                    Some(total) => format!("{}/{} frames, {} entries", processed, total, log.lines()),
                    None => format!("{} frames, {} entries", processed, log.lines()),
                };
                logger.log_progress(&message);
            }
        }

        if let Some(entry) = aggregator.finish() {
            self.append_entry(&mut log, &entry).await?;
        }

        logger.log_completion(&format!(
            "{} frames, {} faces detected, {} log entries",
            self.counts.frames_sampled,
            self.counts.faces_detected,
            log.lines()
        ));

        Ok(AnalysisSummary {
            timeline_path,
            frame_store,
            frames: self.counts.frames_sampled,
            last_frame_number,
        })
    }

    fn record_analysis(&mut self, frame: &Frame, analysis: &FrameAnalysis, detector: &'static str) {
        self.counts.frames_sampled += 1;
        self.counts.faces_detected += analysis.faces_detected as u64;
        self.counts.faces_classified += analysis.faces.len() as u64;
        self.counts.classification_errors += analysis.classification_errors.len() as u64;

        if let Some(err) = &analysis.detection_error {
            self.counts.detection_errors += 1;
            metrics::record_detection_error(detector);
            warn!(
                frame = frame.frame_number,
                detector = detector,
                error = %err,
                "Face detection failed, frame treated as faceless"
            );
        }
        for err in &analysis.classification_errors {
            warn!(frame = frame.frame_number, error = %err, "Face classification failed");
        }

        metrics::record_frame(
            analysis.faces_detected,
            analysis.faces.len(),
            analysis.classification_errors.len(),
        );
        debug!(
            frame = frame.frame_number,
            faces = analysis.faces_detected,
            classified = analysis.faces.len(),
            "Frame analysed"
        );
    }

    async fn append_entry(&mut self, log: &mut TimelineLog, entry: &LogEntry) -> WorkerResult<()> {
        log.append(entry).await.map_err(WorkerError::Timeline)?;
        self.counts.entries_emitted += 1;

        let kind = match entry {
            LogEntry::Point { .. } => "point",
            LogEntry::Interval { .. } => "interval",
        };
        metrics::record_log_entry(kind);
        debug!(line = %entry, "Timeline entry");
        Ok(())
    }

    /// Encode the stored frames and re-attach the source audio.
    pub async fn export(
        &self,
        store: &FrameStore,
        has_audio: bool,
        run_dir: &Path,
        logger: &RunLogger,
    ) -> WorkerResult<ExportOutput> {
        self.check_cancelled()?;

        let logger = logger.for_stage("export");
        logger.log_start(&format!("encoding frames from {}", store.dir().display()));

        let mut runner = FfmpegRunner::new().with_cancel(self.cancel_rx.clone());
        if let Some(secs) = self.config.ffmpeg_timeout {
            runner = runner.with_timeout(secs);
        }
        let reassembler = Reassembler::new(self.config.encoding.clone()).with_runner(runner);

        let started = Instant::now();
        let result = reassembler
            .export(&self.config.input, has_audio, store, run_dir)
            .await;
        metrics::record_ffmpeg_duration("export", started.elapsed().as_secs_f64());

        let output = result?;
        logger.log_completion(&format!(
            "{} frames into {}",
            output.frame_count,
            output.video_path.display()
        ));
        Ok(output)
    }

    /// Probe, load models, analyse and export. The manifest is filled in as
    /// stages complete.
    async fn execute(
        &mut self,
        run_dir: &Path,
        logger: &RunLogger,
        manifest: &mut RunManifest,
    ) -> WorkerResult<()> {
        let info = probe_video(&self.config.input)
            .await
            .map_err(WorkerError::decode)?;
        let plan = SamplingPlan::resolve(
            info.fps,
            self.config.stride_override(),
            self.config.export_video,
        );
        manifest.video = Some(info.clone());
        manifest.stride = plan.stride;

        info!(
            width = info.width,
            height = info.height,
            fps = info.fps,
            duration = info.duration,
            has_audio = info.has_audio,
            stride = plan.stride,
            "Video probed"
        );

        let config = self.config.clone();
        let session = tokio::task::spawn_blocking(move || load_session(&config))
            .await
            .map_err(|e| WorkerError::task(format!("model load task: {}", e)))??;

        self.check_cancelled()?;

        let source = FfmpegFrameSource::open(&self.config.input, &info, plan)
            .map_err(WorkerError::decode)?;
        let summary = self
            .analyze(Box::new(source), session, run_dir, logger)
            .await?;

        if let Some(store) = &summary.frame_store {
            match self.export(store, info.has_audio, run_dir, logger).await {
                Ok(output) => {
                    manifest.export = ExportStatus::Completed {
                        video: output.video_path,
                        frames: output.frame_count,
                    };
                }
                Err(e) => {
                    manifest.export = ExportStatus::failed(&e);
                    return Err(e);
                }
            }
        }

        Ok(())
    }
}

/// Frames paired with their analysis, in source order.
///
/// Decoding stops at the first error, which is yielded as the last item.
fn analysed_frames(
    source: Box<dyn FrameSource>,
    session: AnalysisSession,
    workers: usize,
) -> impl futures::Stream<Item = WorkerResult<(Frame, FrameAnalysis)>> {
    let decoded = stream::unfold(Some(source), |state| async move {
        let mut source = state?;
        match source.next_frame().await {
            Ok(Some(frame)) => Some((Ok(frame), Some(source))),
            Ok(None) => None,
            Err(e) => Some((Err(e), None)),
        }
    });

    decoded
        .map(move |decoded| {
            let session = session.clone();
            async move {
                let frame = decoded.map_err(WorkerError::decode)?;
                tokio::task::spawn_blocking(move || {
                    let analysis = session.analyze(&frame);
                    (frame, analysis)
                })
                .await
                .map_err(|e| WorkerError::task(format!("frame analysis task: {}", e)))
            }
        })
        .buffered(workers.max(1))
}

/// Execute a full run: validate, create the run directory, analyse, export
/// when enabled, and write `run.json`.
///
/// The manifest is written even when the run fails after the run directory
/// exists; the timeline log is never rolled back.
pub async fn run(config: RunConfig, cancel_rx: watch::Receiver<bool>) -> WorkerResult<RunReport> {
    config.validate()?;

    let started_at = Local::now();
    let run_dir = create_run_dir(&config.output_root, &started_at).await?;
    let run_id = run_dir_name(&started_at);
    let logger = RunLogger::new(run_id.clone(), "analyze");
    let span = logger.create_span();

    async move {
        info!(run_dir = %run_dir.display(), "Run started");

        let mut manifest = RunManifest {
            run_id,
            started_at,
            finished_at: started_at,
            config: config.clone(),
            video: None,
            stride: 0,
            counts: RunCounts::default(),
            export: ExportStatus::Disabled,
            error: None,
        };

        let mut pipeline = Pipeline::new(config, cancel_rx);
        let result = pipeline.execute(&run_dir, &logger, &mut manifest).await;

        manifest.counts = pipeline.counts();
        manifest.finished_at = Local::now();
        if let Err(e) = &result {
            logger.log_error(&e.to_string());
            manifest.error = Some(e.to_string());
        }

        if let Err(e) = manifest.write(&run_dir).await {
            logger.log_warning(&format!("failed to write run manifest: {}", e));
        }

        result.map(|()| RunReport { run_dir, manifest })
    }
    .instrument(span)
    .await
}
