//! Output dispatch.
//!
//! Turns each pending request into processor runs, marks the survey layer,
//! and notifies. Errors are collected into an [`ErrorReport`]; one failing
//! request never stops the loop. [`Run`] wraps a whole scheduled pass.

mod folder;
mod run;

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::models::{OutputKind, Request};
use crate::notify::{Completion, Delivery, ErrorReport, Notifier};
use crate::processor::{ExportJob, ProcessingError, ProcessorMap};
use crate::survey::FeatureLayer;

pub use folder::{create_unique_dir, share_link};
pub use run::{send_report, Run, RunSummary};

/// Order outputs are produced in when a request asks for several.
const OUTPUT_ORDER: [OutputKind; 2] = [OutputKind::GisFiles, OutputKind::AsBuilts];

/// What happened to one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Every requested output was produced and the request was marked.
    Fulfilled {
        folder: String,
        delivery: Option<Delivery>,
    },
    /// Outputs were delivered by earlier runs; only `FulfilledDate` was set.
    AlreadyDelivered,
    /// At least one output failed. The request stays unfulfilled.
    Failed { folder: Option<String> },
    /// `desired_output` named nothing this tool produces.
    NoOutputs,
    /// `utilities` named no known utility.
    NoUtilities,
}

/// Result of dispatching a batch of requests.
#[derive(Debug, Default)]
pub struct DispatchResult {
    pub fulfilled: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errors: ErrorReport,
}

/// Runs the processors for each request and records the results.
pub struct Dispatcher {
    config: Arc<Config>,
    layer: Arc<dyn FeatureLayer>,
    processors: ProcessorMap,
    notifier: Notifier,
    dry_run: bool,
}

impl Dispatcher {
    pub fn new(
        config: Arc<Config>,
        layer: Arc<dyn FeatureLayer>,
        processors: ProcessorMap,
        notifier: Notifier,
    ) -> Self {
        Self {
            config,
            layer,
            processors,
            notifier,
            dry_run: false,
        }
    }

    /// Leave the survey layer untouched. Exports still run.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Dispatch every request in order.
    pub async fn dispatch_all(&self, requests: &[Request]) -> DispatchResult {
        let mut result = DispatchResult::default();
        for (i, request) in requests.iter().enumerate() {
            info!(
                "Processing request {}/{}: {} ({})",
                i + 1,
                requests.len(),
                request.global_id,
                request.folder()
            );
            match self.dispatch(request, &mut result.errors).await {
                RequestOutcome::Fulfilled { .. } | RequestOutcome::AlreadyDelivered => {
                    result.fulfilled += 1
                }
                RequestOutcome::Failed { .. } => result.failed += 1,
                RequestOutcome::NoOutputs | RequestOutcome::NoUtilities => result.skipped += 1,
            }
        }
        result
    }

    /// Dispatch one request. Errors are added to `errors`.
    pub async fn dispatch(&self, request: &Request, errors: &mut ErrorReport) -> RequestOutcome {
        let base_folder = request.folder();
        let requested = request.outputs();
        if requested.is_empty() {
            warn!(
                "Request {} has no recognised outputs in '{}'",
                request.global_id, request.desired_output
            );
            errors.push_for(
                request,
                &base_folder,
                format!(
                    "No recognised output in desired_output '{}'",
                    request.desired_output
                ),
            );
            return RequestOutcome::NoOutputs;
        }

        let utilities = match request.utility_set() {
            Some(utilities) => utilities,
            None => {
                warn!(
                    "Request {} has no recognised utilities in '{}'",
                    request.global_id, request.utilities
                );
                errors.push_for(
                    request,
                    &base_folder,
                    format!("No recognised utility in utilities '{}'", request.utilities),
                );
                return RequestOutcome::NoUtilities;
            }
        };

        let pending = request.pending_outputs();
        if pending.is_empty() {
            info!(
                "All outputs for {} were delivered earlier; marking fulfilled",
                request.global_id
            );
            if !self.mark_fulfilled(request, &base_folder, errors).await {
                return RequestOutcome::Failed { folder: None };
            }
            return RequestOutcome::AlreadyDelivered;
        }

        let (folder, target_dir) =
            match create_unique_dir(&self.config.output_dir(), &base_folder).await {
                Ok(created) => created,
                Err(e) => {
                    errors.push_for(
                        request,
                        &base_folder,
                        format!("Could not create output folder: {}", e),
                    );
                    return RequestOutcome::Failed { folder: None };
                }
            };
        if folder != base_folder {
            info!("Folder '{}' exists; using '{}'", base_folder, folder);
        }
        let link = share_link(&self.config, &folder, &target_dir);

        let mut produced = Vec::new();
        let mut as_built_files = None;
        let mut all_ok = true;

        for kind in OUTPUT_ORDER.into_iter().filter(|k| pending.contains(k)) {
            let job = ExportJob {
                kind,
                global_id: request.global_id.clone(),
                email: request.email.clone(),
                folder: folder.clone(),
                utilities: utilities.clone(),
                target_dir: target_dir.clone(),
                output_dir: target_dir.join(kind.subfolder()),
                link: link.clone(),
            };

            match self.export(&job).await {
                Ok(files) => {
                    info!("{} complete for {}", kind.label(), request.global_id);
                    if kind == OutputKind::AsBuilts {
                        as_built_files = files;
                    }
                    produced.push(kind);
                    if let Some(field) = self
                        .config
                        .fields
                        .output_fulfilled(kind)
                        .filter(|_| request.tracks(kind))
                    {
                        self.set_date(request, &folder, field, errors).await;
                    }
                }
                Err(e) => {
                    all_ok = false;
                    errors.push_for(request, &folder, format!("{} failed: {}", kind.label(), e));
                }
            }
        }

        if !all_ok {
            return RequestOutcome::Failed {
                folder: Some(folder),
            };
        }

        if !self.mark_fulfilled(request, &folder, errors).await {
            return RequestOutcome::Failed {
                folder: Some(folder),
            };
        }

        let completion = Completion {
            folder: folder.clone(),
            link,
            outputs: produced,
            as_built_files,
        };
        let delivery = match self.notifier.request_completed(request, &completion).await {
            Ok(delivery) => Some(delivery),
            Err(e) => {
                errors.push_for(request, &folder, format!("Failed to send completion email: {}", e));
                None
            }
        };

        RequestOutcome::Fulfilled { folder, delivery }
    }

    /// Run one export. Returns the file count the processor reported.
    async fn export(&self, job: &ExportJob) -> Result<Option<u64>, ProcessingError> {
        let processor = self
            .processors
            .get(&job.kind)
            .ok_or(ProcessingError::NotConfigured(job.kind))?;
        tokio::fs::create_dir_all(&job.output_dir).await?;
        debug!(
            "Running {} for {} with utilities {}",
            job.kind, job.global_id, job.utilities
        );
        let outcome = processor.export(job).await?;
        Ok(outcome.files)
    }

    async fn mark_fulfilled(
        &self,
        request: &Request,
        folder: &str,
        errors: &mut ErrorReport,
    ) -> bool {
        let field = self.config.fields.fulfilled_date.clone();
        self.set_date(request, folder, &field, errors).await
    }

    async fn set_date(
        &self,
        request: &Request,
        folder: &str,
        field: &str,
        errors: &mut ErrorReport,
    ) -> bool {
        if self.dry_run {
            info!("Dry run: not setting {} on {}", field, request.global_id);
            return true;
        }
        match self.layer.set_date(&request.global_id, field, Utc::now()).await {
            Ok(()) => {
                debug!("Set {} on {}", field, request.global_id);
                true
            }
            Err(e) => {
                errors.push_for(
                    request,
                    folder,
                    format!("Failed to set {}: {}", field, e),
                );
                false
            }
        }
    }
}
