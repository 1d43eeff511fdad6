//! The scheduled run: wire up the layer and mailer, then hand off to `Run`.

use std::sync::Arc;

use anyhow::Context;
use chrono::Local;
use console::style;
use tracing::{info, warn};

use crate::cli::icons::{dim_arrow, error as error_icon, success, warn as warn_icon};
use crate::config::Config;
use crate::dispatch::{send_report, Run};
use crate::notify::{ErrorReport, GraphMailer, LogMailer, Mailer, Notifier};
use crate::processor::processors_from_config;
use crate::survey::{ArcGisLayer, FeatureLayer};
use crate::utils::RunLog;

/// Process every unfulfilled request.
pub async fn cmd_run(config: Config, run_log: &RunLog, dry_run: bool) -> anyhow::Result<()> {
    let log_dir = config.log_dir();
    match run_log.open(&log_dir, Local::now()) {
        Ok(path) => info!("Logging to {}", path.display()),
        Err(e) => warn!("Could not open log file in {}: {}", log_dir.display(), e),
    }
    info!("Starting as-built request run{}", if dry_run { " (dry run)" } else { "" });

    config.validate()?;
    let config = Arc::new(config);

    let mailer: Arc<dyn Mailer> = if dry_run {
        Arc::new(LogMailer)
    } else {
        Arc::new(GraphMailer::from_config(&config).context("Email is not set up")?)
    };

    let layer: Arc<dyn FeatureLayer> = match ArcGisLayer::from_config(&config) {
        Ok(layer) => Arc::new(layer),
        Err(e) => {
            let mut errors = ErrorReport::new();
            errors.push(format!("Could not set up survey layer client: {}", e));
            send_report(&Notifier::new(config.clone(), mailer), &errors, run_log).await;
            return Err(e.into());
        }
    };

    let summary = match Run::new(config.clone(), layer, processors_from_config(&config), mailer)
        .dry_run(dry_run)
        .execute(run_log)
        .await
    {
        Ok(summary) => summary,
        Err(e) => {
            eprintln!("{} Survey layer query failed: {}", error_icon(), e);
            return Err(e.into());
        }
    };

    if summary.requests == 0 {
        println!("{} No new requests", success());
    } else {
        println!(
            "{} {} request(s): {} fulfilled, {} failed, {} skipped",
            success(),
            summary.requests,
            style(summary.fulfilled).green(),
            style(summary.failed).red(),
            summary.skipped
        );
    }
    if !summary.errors.is_empty() {
        println!(
            "{} {} error(s); report sent to {}",
            warn_icon(),
            summary.errors.len(),
            config.admin_email
        );
    }
    if let Some(path) = run_log.path() {
        println!("  {} Log: {}", dim_arrow(), path.display());
    }

    Ok(())
}
