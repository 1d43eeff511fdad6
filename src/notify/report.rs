//! Errors collected over one run.

use crate::models::Request;

/// One numbered error with the request it happened on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEntry {
    pub number: usize,
    pub global_id: String,
    pub folder: String,
    pub email: String,
    pub utilities: String,
    pub message: String,
}

/// Errors gathered during a run, sent to the admin at the end.
#[derive(Debug, Clone, Default)]
pub struct ErrorReport {
    entries: Vec<ReportEntry>,
}

impl ErrorReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error that is not tied to a request.
    pub fn push(&mut self, message: impl Into<String>) {
        self.push_entry(String::new(), String::new(), String::new(), String::new(), message.into());
    }

    /// Record an error raised while handling `request`.
    pub fn push_for(&mut self, request: &Request, folder: &str, message: impl Into<String>) {
        self.push_entry(
            request.global_id.clone(),
            folder.to_string(),
            request.email.clone(),
            request.utilities.clone(),
            message.into(),
        );
    }

    fn push_entry(
        &mut self,
        global_id: String,
        folder: String,
        email: String,
        utilities: String,
        message: String,
    ) {
        let number = self.entries.len() + 1;
        tracing::error!("Error {}: {}", number, message);
        self.entries.push(ReportEntry {
            number,
            global_id,
            folder,
            email,
            utilities,
            message,
        });
    }

    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Take entries from another report, renumbering them.
    pub fn extend(&mut self, other: ErrorReport) {
        for entry in other.entries {
            let number = self.entries.len() + 1;
            self.entries.push(ReportEntry { number, ..entry });
        }
    }
}
