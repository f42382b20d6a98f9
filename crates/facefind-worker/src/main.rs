//! `facefind` command-line entry point.

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};

use facefind_worker::{init_tracing, run, Cli, RunConfig};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    if let Err(e) = init_tracing(cli.verbose) {
        eprintln!("Failed to initialize logging: {:#}", e);
        std::process::exit(1);
    }

    info!("Starting facefind {}", env!("CARGO_PKG_VERSION"));

    let config = RunConfig::from(cli);

    // Ctrl-C cancels between frames and stops running FFmpeg processes
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received interrupt, cancelling run");
            let _ = cancel_tx.send(true);
        }
    });

    match run(config, cancel_rx).await {
        Ok(report) => {
            info!(
                run_dir = %report.run_dir.display(),
                frames = report.manifest.counts.frames_sampled,
                entries = report.manifest.counts.entries_emitted,
                "Run complete"
            );
        }
        Err(e) => {
            let e = anyhow::Error::new(e);
            error!("Run failed: {:#}", e);
            std::process::exit(1);
        }
    }
}
