//! Per-run log files.
//!
//! Each run writes its log to `<log_dir>/<YYYY-MM-DD_HH.MM>.log`. The file is
//! opened after the config is loaded, so [`RunLog`] hands out a writer that
//! discards output until [`RunLog::open`] is called.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Local};

/// File name for a run started at `started`.
pub fn log_file_name(started: DateTime<Local>) -> String {
    format!("{}.log", started.format("%Y-%m-%d_%H.%M"))
}

#[derive(Default)]
struct Slot {
    file: Option<File>,
    path: Option<PathBuf>,
}

/// Shared handle to the current run's log file.
#[derive(Clone, Default)]
pub struct RunLog {
    slot: Arc<Mutex<Slot>>,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writer for a `tracing_subscriber::fmt` layer.
    pub fn writer(&self) -> RunLogWriter {
        RunLogWriter {
            slot: self.slot.clone(),
        }
    }

    /// Start writing to a new log file in `dir`. Appends if the file exists.
    pub fn open(&self, dir: &Path, started: DateTime<Local>) -> io::Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(log_file_name(started));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        let mut slot = self.lock()?;
        slot.file = Some(file);
        slot.path = Some(path.clone());
        Ok(path)
    }

    /// Path of the open log file, if any.
    pub fn path(&self) -> Option<PathBuf> {
        self.slot.lock().ok().and_then(|slot| slot.path.clone())
    }

    /// Stop logging to the file and delete it. Used when a run found nothing.
    pub fn discard(&self) -> io::Result<()> {
        let path = {
            let mut slot = self.lock()?;
            slot.file = None;
            slot.path.take()
        };
        match path {
            Some(path) => std::fs::remove_file(path),
            None => Ok(()),
        }
    }

    fn lock(&self) -> io::Result<std::sync::MutexGuard<'_, Slot>> {
        self.slot
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "run log lock poisoned"))
    }
}

/// `io::Write` side of [`RunLog`].
pub struct RunLogWriter {
    slot: Arc<Mutex<Slot>>,
}

impl Write for RunLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.slot.lock() {
            Ok(mut slot) => match slot.file.as_mut() {
                Some(file) => file.write(buf),
                None => Ok(buf.len()),
            },
            Err(_) => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.slot.lock() {
            Ok(mut slot) => match slot.file.as_mut() {
                Some(file) => file.flush(),
                None => Ok(()),
            },
            Err(_) => Ok(()),
        }
    }
}

/// Delete `.log` files in `dir` last modified more than `days` days ago.
///
/// Returns the number of files removed. A missing directory is not an error.
pub fn prune_old_logs(dir: &Path, days: u64) -> io::Result<usize> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let max_age = Duration::from_secs(days.saturating_mul(24 * 60 * 60));
    let now = SystemTime::now();
    let mut removed = 0;

    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("log") {
            continue;
        }
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }
        let age = now
            .duration_since(metadata.modified()?)
            .unwrap_or(Duration::ZERO);
        if age > max_age {
            std::fs::remove_file(&path)?;
            tracing::debug!("Removed old log {}", path.display());
            removed += 1;
        }
    }

    Ok(removed)
}
