//! Finds requests that still need to be fulfilled.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info};

use super::{FeatureLayer, SurveyError};
use crate::models::Request;

/// Yields new requests from a feature layer, oldest first.
#[derive(Clone)]
pub struct RequestScanner {
    layer: Arc<dyn FeatureLayer>,
}

impl RequestScanner {
    pub fn new(layer: Arc<dyn FeatureLayer>) -> Self {
        Self { layer }
    }

    /// Query the layer for unfulfilled requests.
    ///
    /// Records with a fulfilled date are dropped even if the layer returned
    /// them. Duplicate GlobalIDs keep the first record. Requests are ordered
    /// by creation date; records without one go last.
    pub async fn scan(&self) -> Result<Vec<Request>, SurveyError> {
        let records = self.layer.query_unfulfilled().await?;
        let total = records.len();

        let mut seen = HashSet::new();
        let mut requests: Vec<Request> = records
            .into_iter()
            .filter(|r| {
                if !r.is_new() {
                    debug!("Skipping fulfilled request {}", r.global_id);
                    return false;
                }
                if r.global_id.is_empty() {
                    debug!("Skipping request without GlobalID");
                    return false;
                }
                seen.insert(r.global_id.to_ascii_lowercase())
            })
            .collect();

        // Stable sort keeps layer order for equal dates.
        requests.sort_by_key(|r| (r.creation_date.is_none(), r.creation_date));

        info!(
            "Found {} new request(s) ({} returned by layer)",
            requests.len(),
            total
        );
        Ok(requests)
    }
}
