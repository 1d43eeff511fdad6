//! In-memory stand-ins for the survey layer, processors, and mail transport.

#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use asbuilt::config::Config;
use asbuilt::models::{OutputKind, Request};
use asbuilt::notify::{MailError, Mailer, OutgoingMail};
use asbuilt::processor::{
    ExportJob, ExportOutcome, ProcessingError, Processor, ProcessorMap,
};
use asbuilt::survey::{FeatureLayer, SurveyError};

pub const ADMIN: &str = "gis-admin@city.gov";
pub const APPROVED: &str = "engineer@city.gov";

/// Survey layer held in memory. Records every accepted date edit.
#[derive(Default)]
pub struct MemoryLayer {
    pub requests: Vec<Request>,
    pub edits: Mutex<Vec<(String, String)>>,
    pub unreachable: bool,
    /// Editable fields. `None` accepts any field.
    pub fields: Option<Vec<String>>,
}

impl MemoryLayer {
    pub fn with(requests: Vec<Request>) -> Arc<Self> {
        Arc::new(Self {
            requests,
            ..Default::default()
        })
    }

    /// A layer that rejects edits to fields outside `fields`, as applyEdits does.
    pub fn with_fields(requests: Vec<Request>, fields: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            requests,
            fields: Some(fields.iter().map(|f| f.to_string()).collect()),
            ..Default::default()
        })
    }

    /// Fields set on a feature, in order.
    pub fn edits_for(&self, global_id: &str) -> Vec<String> {
        self.edits
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == global_id)
            .map(|(_, field)| field.clone())
            .collect()
    }
}

#[async_trait]
impl FeatureLayer for MemoryLayer {
    async fn query_unfulfilled(&self) -> Result<Vec<Request>, SurveyError> {
        if self.unreachable {
            return Err(SurveyError::Status {
                status: 503,
                url: "https://services.arcgis.com/x/FeatureServer/0/query".to_string(),
            });
        }
        Ok(self.requests.clone())
    }

    async fn set_date(
        &self,
        global_id: &str,
        field: &str,
        _value: DateTime<Utc>,
    ) -> Result<(), SurveyError> {
        if let Some(fields) = &self.fields {
            if !fields.iter().any(|f| f == field) {
                return Err(SurveyError::Edit {
                    global_id: global_id.to_string(),
                    message: format!("Field '{}' does not exist", field),
                });
            }
        }
        self.edits
            .lock()
            .unwrap()
            .push((global_id.to_string(), field.to_string()));
        Ok(())
    }
}

/// Processor that records its jobs and succeeds or fails on demand.
#[derive(Default)]
pub struct RecordingProcessor {
    pub jobs: Mutex<Vec<ExportJob>>,
    pub fail: bool,
    pub files: Option<u64>,
}

impl RecordingProcessor {
    pub fn ok(files: Option<u64>) -> Arc<Self> {
        Arc::new(Self {
            files,
            ..Default::default()
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Default::default()
        })
    }

    pub fn jobs(&self) -> Vec<ExportJob> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Processor for RecordingProcessor {
    async fn export(&self, job: &ExportJob) -> Result<ExportOutcome, ProcessingError> {
        self.jobs.lock().unwrap().push(job.clone());
        if self.fail {
            return Err(ProcessingError::Failed {
                command: "export".to_string(),
                code: Some(2),
                stderr: "no plan areas intersect the request".to_string(),
            });
        }
        Ok(ExportOutcome { files: self.files })
    }
}

/// Mailer that keeps every message it accepts.
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<OutgoingMail>>,
    /// Messages to this address are refused.
    pub reject: Option<String>,
}

impl RecordingMailer {
    pub fn rejecting(address: &str) -> Arc<Self> {
        Arc::new(Self {
            reject: Some(address.to_string()),
            ..Default::default()
        })
    }

    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, address: &str) -> Vec<OutgoingMail> {
        self.sent()
            .into_iter()
            .filter(|m| m.to.iter().any(|to| to == address))
            .collect()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        mail.validate()?;
        if let Some(reject) = &self.reject {
            if mail.to.iter().any(|to| to == reject) {
                return Err(MailError::Rejected {
                    status: 550,
                    body: "mailbox unavailable".to_string(),
                });
            }
        }
        self.sent.lock().unwrap().push(mail.clone());
        Ok(())
    }
}

pub fn config(output_dir: &Path) -> Config {
    Config {
        survey_path: "https://services.arcgis.com/x/FeatureServer/0".to_string(),
        admin_email: ADMIN.to_string(),
        approved_emails: vec![APPROVED.to_string()],
        output_directory: output_dir.display().to_string(),
        log_directory: Some(output_dir.join("Logs").display().to_string()),
        ..Default::default()
    }
}

pub fn request(global_id: &str, desired_output: &str, utilities: &str) -> Request {
    Request {
        global_id: global_id.to_string(),
        email: APPROVED.to_string(),
        folder_name: format!("Request {}", global_id.trim_matches(|c| c == '{' || c == '}')),
        desired_output: desired_output.to_string(),
        utilities: utilities.to_string(),
        creation_date: Some(Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()),
        ..Default::default()
    }
}

/// Mark both per-output tracking fields as present on the feature.
pub fn tracked(mut request: Request) -> Request {
    request.tracked_outputs = [OutputKind::AsBuilts, OutputKind::GisFiles].into();
    request
}

pub fn processors(
    as_builts: Option<Arc<RecordingProcessor>>,
    gis_files: Option<Arc<RecordingProcessor>>,
) -> ProcessorMap {
    let mut map = ProcessorMap::new();
    if let Some(p) = as_builts {
        map.insert(OutputKind::AsBuilts, p as Arc<dyn Processor>);
    }
    if let Some(p) = gis_files {
        map.insert(OutputKind::GisFiles, p as Arc<dyn Processor>);
    }
    map
}
