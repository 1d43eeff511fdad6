//! asbuilt - as-built and GIS file request fulfillment.
//!
//! Meant to be run on a schedule. Each run processes every survey request
//! that has not been fulfilled yet.

use asbuilt::cli;
use asbuilt::utils::RunLog;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before anything else)
    let _ = dotenvy::dotenv();

    // Initialize logging based on verbosity
    let default_filter = if cli::is_verbose() {
        "asbuilt=debug"
    } else {
        "asbuilt=info"
    };

    // The run log file is opened once the config says where logs go.
    let run_log = RunLog::new();
    let file_writer = run_log.clone();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(move || file_writer.writer()),
        )
        .init();

    // Run CLI
    cli::run(run_log).await
}
