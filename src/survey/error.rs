//! Feature layer error types.

use thiserror::Error;

/// Failure talking to the survey feature layer.
///
/// Any variant returned by a query means the scan could not complete.
#[derive(Debug, Error)]
pub enum SurveyError {
    #[error("Feature layer unreachable: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Feature layer returned HTTP {status} for {url}")]
    Status { status: u16, url: String },
    #[error("ArcGIS error {code}: {message}")]
    Service { code: i64, message: String },
    #[error("Sign-in failed: {0}")]
    Auth(String),
    #[error("Unexpected response: {0}")]
    Decode(String),
    #[error("Failed to update {global_id}: {message}")]
    Edit { global_id: String, message: String },
    #[error("Invalid layer URL: {0}")]
    InvalidUrl(String),
}

impl SurveyError {
    /// ArcGIS codes for an expired or rejected token.
    pub fn is_token_error(&self) -> bool {
        matches!(self, Self::Service { code: 498 | 499, .. })
    }
}
