//! Shared utility functions.
//!
//! - `run_log`: the per-run log file and retention pruning

mod run_log;

pub use run_log::{log_file_name, prune_old_logs, RunLog, RunLogWriter};
