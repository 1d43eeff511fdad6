//! Survey feature layer access.
//!
//! [`FeatureLayer`] is the seam between the dispatcher and the layer that
//! holds the requests. [`ArcGisLayer`] talks to an ArcGIS REST feature
//! service; tests substitute an in-memory layer. [`RequestScanner`] sits on
//! top and yields only requests that still need work.

mod arcgis;
mod error;
mod scanner;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::Request;

pub use arcgis::{parse_edit_response, parse_query_page, ArcGisLayer, QueryPage};
pub use error::SurveyError;
pub use scanner::RequestScanner;

/// Read and update access to the survey results layer.
#[async_trait]
pub trait FeatureLayer: Send + Sync {
    /// Fetch features whose fulfilled date is null.
    ///
    /// Implementations filter on the server where they can; callers must
    /// not rely on it and go through [`RequestScanner`].
    async fn query_unfulfilled(&self) -> Result<Vec<Request>, SurveyError>;

    /// Set a date field on one feature.
    async fn set_date(
        &self,
        global_id: &str,
        field: &str,
        value: DateTime<Utc>,
    ) -> Result<(), SurveyError>;
}
