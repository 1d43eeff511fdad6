//! One scheduled run over the survey layer.

use std::sync::Arc;

use tracing::{error, info, warn};

use super::Dispatcher;
use crate::config::Config;
use crate::notify::{ErrorReport, Mailer, Notifier};
use crate::processor::ProcessorMap;
use crate::survey::{FeatureLayer, RequestScanner, SurveyError};
use crate::utils::{prune_old_logs, RunLog};

/// Counts and errors from a completed run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub requests: usize,
    pub fulfilled: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errors: ErrorReport,
}

/// Scans the layer, dispatches every new request, and reports errors.
pub struct Run {
    config: Arc<Config>,
    layer: Arc<dyn FeatureLayer>,
    processors: ProcessorMap,
    mailer: Arc<dyn Mailer>,
    dry_run: bool,
}

impl Run {
    pub fn new(
        config: Arc<Config>,
        layer: Arc<dyn FeatureLayer>,
        processors: ProcessorMap,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            config,
            layer,
            processors,
            mailer,
            dry_run: false,
        }
    }

    /// Leave the survey layer untouched. Exports still run.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Execute the run.
    ///
    /// Old logs are pruned first. A run that finds no requests and hit no
    /// errors deletes its own log file. If the layer cannot be queried the
    /// admin report is sent before the error is returned.
    pub async fn execute(self, run_log: &RunLog) -> Result<RunSummary, SurveyError> {
        let notifier = Notifier::new(self.config.clone(), self.mailer.clone());
        let mut summary = RunSummary::default();

        let log_dir = self.config.log_dir();
        let retention = self.config.log_retention_days;
        match prune_old_logs(&log_dir, retention) {
            Ok(0) => {}
            Ok(n) => info!("Removed {} log file(s) older than {} days", n, retention),
            Err(e) => summary
                .errors
                .push(format!("Failed to remove old log files in {}: {}", log_dir.display(), e)),
        }

        let requests = match RequestScanner::new(self.layer.clone()).scan().await {
            Ok(requests) => requests,
            Err(e) => {
                summary
                    .errors
                    .push(format!("Could not query survey layer: {}", e));
                send_report(&notifier, &summary.errors, run_log).await;
                return Err(e);
            }
        };
        summary.requests = requests.len();

        if requests.is_empty() {
            info!("No new requests");
            if summary.errors.is_empty() {
                if let Err(e) = run_log.discard() {
                    warn!("Could not remove empty-run log: {}", e);
                }
            } else {
                send_report(&notifier, &summary.errors, run_log).await;
            }
            return Ok(summary);
        }

        let dispatcher = Dispatcher::new(
            self.config.clone(),
            self.layer,
            self.processors,
            Notifier::new(self.config.clone(), self.mailer),
        )
        .dry_run(self.dry_run);
        let result = dispatcher.dispatch_all(&requests).await;

        info!(
            "Run complete: {} fulfilled, {} failed, {} skipped",
            result.fulfilled, result.failed, result.skipped
        );
        summary.fulfilled = result.fulfilled;
        summary.failed = result.failed;
        summary.skipped = result.skipped;
        summary.errors.extend(result.errors);

        send_report(&notifier, &summary.errors, run_log).await;
        Ok(summary)
    }
}

/// Email the error report, if there is anything in it. A failure here is only logged.
pub async fn send_report(notifier: &Notifier, errors: &ErrorReport, run_log: &RunLog) {
    let log_path = run_log.path();
    if let Err(e) = notifier.error_report(errors, log_path.as_deref()).await {
        error!("Failed to send error report: {}", e);
    }
}
