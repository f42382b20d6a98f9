//! Structured logging.
//!
//! [`init_tracing`] installs the subscriber for the binary. [`RunLogger`]
//! tags run lifecycle events with the run id and stage.

use tracing::{error, info, warn, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber: ANSI text by default, JSON when
/// `LOG_FORMAT=json`. The `facefind` directive matches every crate of the
/// workspace by target prefix.
pub fn init_tracing(verbose: bool) -> anyhow::Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::from_default_env()
        .add_directive(format!("facefind={}", level).parse()?)
        .add_directive("ort=warn".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .try_init()?;
    }

    Ok(())
}

/// Run logger with the run id and current stage attached to every event.
#[derive(Debug, Clone)]
pub struct RunLogger {
    run_id: String,
    stage: String,
}

impl RunLogger {
    pub fn new(run_id: impl Into<String>, stage: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            stage: stage.into(),
        }
    }

    /// Same run, different stage.
    pub fn for_stage(&self, stage: impl Into<String>) -> Self {
        Self {
            run_id: self.run_id.clone(),
            stage: stage.into(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            run_id = %self.run_id,
            stage = %self.stage,
            "Stage started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            run_id = %self.run_id,
            stage = %self.stage,
            "Progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            run_id = %self.run_id,
            stage = %self.stage,
            "Warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            run_id = %self.run_id,
            stage = %self.stage,
            "Error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            run_id = %self.run_id,
            stage = %self.stage,
            "Stage completed: {}", message
        );
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// Span carrying the run id, for instrumenting whole stages.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "run",
            run_id = %self.run_id,
            stage = %self.stage
        )
    }
}
