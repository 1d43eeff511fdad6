//! Export processors.
//!
//! The as-built and GIS file exports are done by external tooling. A
//! [`Processor`] receives an [`ExportJob`] describing one request and reports
//! success or a [`ProcessingError`]. [`CommandProcessor`] is the shipped
//! implementation and runs a command from the config file.

mod command;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::Config;
use crate::models::{OutputKind, UtilitySet};

pub use command::{CommandConfig, CommandProcessor};

/// Processors keyed by the output they produce.
pub type ProcessorMap = BTreeMap<OutputKind, Arc<dyn Processor>>;

#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("No processor configured for {0}")]
    NotConfigured(OutputKind),
    #[error("Failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{command} failed (exit code {code:?}): {stderr}")]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("{command} timed out after {seconds}s")]
    Timeout { command: String, seconds: u64 },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything a processor needs to fulfil one output of one request.
#[derive(Debug, Clone)]
pub struct ExportJob {
    pub kind: OutputKind,
    pub global_id: String,
    pub email: String,
    /// Final folder name, after de-duplication.
    pub folder: String,
    pub utilities: UtilitySet,
    /// The request folder.
    pub target_dir: PathBuf,
    /// Subfolder of `target_dir` for this output; already created.
    pub output_dir: PathBuf,
    /// Link sent to the requester.
    pub link: String,
}

/// What a processor reports back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportOutcome {
    /// Number of files produced, when the processor reports it.
    pub files: Option<u64>,
}

#[async_trait]
pub trait Processor: Send + Sync {
    async fn export(&self, job: &ExportJob) -> Result<ExportOutcome, ProcessingError>;
}

/// Build command processors for every output configured in `processors`.
pub fn processors_from_config(config: &Config) -> ProcessorMap {
    let mut map: ProcessorMap = BTreeMap::new();
    for kind in [OutputKind::AsBuilts, OutputKind::GisFiles] {
        match config.processors.get(kind) {
            Some(command) => {
                map.insert(kind, Arc::new(CommandProcessor::new(command.clone(), config)));
            }
            None => tracing::warn!("No processor configured for {}", kind),
        }
    }
    map
}
