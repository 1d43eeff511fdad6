//! Mail transport seam.

use async_trait::async_trait;
use thiserror::Error;

/// Error type for email delivery failures.
#[derive(Debug, Error)]
pub enum MailError {
    /// HTTP transport failure (connection, timeout, TLS).
    #[error("Mail transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// The token endpoint refused the application credentials.
    #[error("Mail sign-in failed: {0}")]
    Auth(String),

    /// The mail service did not accept the message.
    #[error("Mail rejected (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    /// The message has no usable recipient or sender.
    #[error("Invalid address: {0}")]
    Address(String),

    #[error("Mail is not configured: {0}")]
    NotConfigured(String),
}

/// An HTML message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub from: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub subject: String,
    pub html_body: String,
}

impl OutgoingMail {
    pub fn new(from: &str, to: &str, subject: impl Into<String>, html_body: impl Into<String>) -> Self {
        Self {
            from: from.to_string(),
            to: vec![to.to_string()],
            cc: Vec::new(),
            subject: subject.into(),
            html_body: html_body.into(),
        }
    }

    /// Check sender and recipients look like addresses.
    pub fn validate(&self) -> Result<(), MailError> {
        let looks_valid = |a: &str| {
            let a = a.trim();
            a.len() > 2 && a.contains('@') && !a.starts_with('@') && !a.ends_with('@')
        };
        if !looks_valid(&self.from) {
            return Err(MailError::Address(format!("sender '{}'", self.from)));
        }
        if self.to.is_empty() {
            return Err(MailError::Address("no recipients".to_string()));
        }
        if let Some(bad) = self.to.iter().chain(&self.cc).find(|a| !looks_valid(a)) {
            return Err(MailError::Address(format!("recipient '{}'", bad)));
        }
        Ok(())
    }
}

/// Delivers outgoing mail.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError>;
}

/// Logs messages instead of sending them. Used for dry runs.
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        mail.validate()?;
        tracing::info!(
            from = %mail.from,
            to = %mail.to.join(", "),
            subject = %mail.subject,
            "Email not sent (dry run)"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_addresses() {
        let mail = OutgoingMail::new("gis@city.gov", "engineer@city.gov", "s", "b");
        mail.validate().unwrap();

        let bad_to = OutgoingMail::new("gis@city.gov", "", "s", "b");
        assert!(matches!(bad_to.validate(), Err(MailError::Address(_))));

        let bad_from = OutgoingMail::new("", "engineer@city.gov", "s", "b");
        assert!(matches!(bad_from.validate(), Err(MailError::Address(_))));
    }

    #[tokio::test]
    async fn test_log_mailer_accepts_valid_mail() {
        let mail = OutgoingMail::new("gis@city.gov", "engineer@city.gov", "s", "b");
        LogMailer.send(&mail).await.unwrap();
    }
}
