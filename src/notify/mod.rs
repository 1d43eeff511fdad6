//! Requester and admin notifications.
//!
//! [`Notifier`] decides who hears about each outcome and builds the message;
//! delivery goes through a [`Mailer`]. The shipped transports are
//! [`GraphMailer`] and [`LogMailer`].

mod graph;
mod mailer;
mod report;
mod templates;

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{normalize_email, Config};
use crate::models::Request;

pub use graph::GraphMailer;
pub use mailer::{LogMailer, MailError, Mailer, OutgoingMail};
pub use report::{ErrorReport, ReportEntry};
pub use templates::{html_escape, html_table, Completion};

/// Who received the completion email.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The requester was approved and got the link.
    Requester,
    /// The requester is unknown; the admin got the link instead.
    AdminReview,
}

pub struct Notifier {
    config: Arc<Config>,
    mailer: Arc<dyn Mailer>,
}

impl Notifier {
    pub fn new(config: Arc<Config>, mailer: Arc<dyn Mailer>) -> Self {
        Self { config, mailer }
    }

    fn admin_email(&self) -> &str {
        self.config.admin_email.trim()
    }

    /// Tell the requester their files are ready, or the admin if the
    /// requester is not on the approved list.
    pub async fn request_completed(
        &self,
        request: &Request,
        completion: &Completion,
    ) -> Result<Delivery, MailError> {
        if self.config.is_approved(&request.email) {
            let (subject, body) = templates::requester_completed(request, completion);
            let mail = OutgoingMail::new(
                self.admin_email(),
                &normalize_email(&request.email),
                subject,
                body,
            );
            self.mailer.send(&mail).await?;
            info!("Notified requester {} for {}", request.email, request.global_id);
            Ok(Delivery::Requester)
        } else {
            warn!(
                "Requester {} is not approved; sending {} to admin for review",
                request.email, request.global_id
            );
            let (subject, body) = templates::unknown_requester(request, completion);
            let mail = OutgoingMail::new(self.admin_email(), self.admin_email(), subject, body);
            self.mailer.send(&mail).await?;
            Ok(Delivery::AdminReview)
        }
    }

    /// Send the run's errors to the admin. Does nothing for an empty report.
    pub async fn error_report(
        &self,
        report: &ErrorReport,
        log_file: Option<&Path>,
    ) -> Result<(), MailError> {
        if report.is_empty() {
            return Ok(());
        }
        let (subject, body) = templates::error_report(report, log_file);
        let mail = OutgoingMail::new(self.admin_email(), self.admin_email(), subject, body);
        self.mailer.send(&mail).await?;
        info!("Sent error report ({} error(s)) to {}", report.len(), self.admin_email());
        Ok(())
    }
}
