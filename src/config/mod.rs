//! Configuration for the request fulfillment tool.
//!
//! The config file is the JSON document written by the setup step. Keys keep
//! the names setup writes so an existing `config.json` loads unchanged; the
//! extra sections (`processors`, `fields`, logging) are optional.

mod fields;
mod loader;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::OutputKind;
use crate::processor::CommandConfig;

pub use fields::FieldNames;
pub use loader::{load_config, LoadOptions, CONFIG_FILENAME};

/// ArcGIS Online sign-in root.
pub const ARCGIS_ONLINE_URL: &str = "https://www.arcgis.com";

/// Default number of days log files are kept.
pub const DEFAULT_LOG_RETENTION_DAYS: u64 = 10;

/// Default HTTP request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT: u64 = 60;

/// Default log subdirectory, relative to the config file.
const LOGS_SUBDIR: &str = "Logs";

const REDACTED: &str = "********";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} not found. Run setup to generate it, or pass --config")]
    NotFound(String),
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// External processor commands, one per output kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessorsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_builts: Option<CommandConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gis_files: Option<CommandConfig>,
}

impl ProcessorsConfig {
    pub fn get(&self, kind: OutputKind) -> Option<&CommandConfig> {
        match kind {
            OutputKind::AsBuilts => self.as_builts.as_ref(),
            OutputKind::GisFiles => self.gis_files.as_ref(),
        }
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Sign in to ArcGIS Online (true) or an Enterprise portal (false).
    #[serde(default)]
    pub is_arcgis_online: bool,
    #[serde(default)]
    pub agol_username: String,
    #[serde(default)]
    pub agol_password: String,
    /// Enterprise portal root, e.g. `https://gis.city.gov/portal`.
    #[serde(default)]
    pub portal_url: String,
    #[serde(default)]
    pub portal_username: String,
    #[serde(default)]
    pub portal_password: String,
    /// Survey results layer URL (`.../FeatureServer/0`).
    #[serde(default)]
    pub survey_path: String,
    /// Plan areas layer marking the extent of each as-built.
    #[serde(default)]
    pub plan_areas_path: String,
    /// Requesters allowed to receive files directly.
    #[serde(default)]
    pub approved_emails: Vec<String>,
    /// Admin address. Used as the sender and for error reports.
    #[serde(default)]
    pub admin_email: String,
    /// Azure AD application used to send mail.
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub client_secret: String,
    /// Root folder for per-request output folders.
    #[serde(default)]
    pub output_directory: String,
    /// Output directory is synced to SharePoint through OneDrive.
    #[serde(default)]
    pub onedrive_synced: bool,
    /// SharePoint equivalent of `output_directory`, for email links.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sharepoint_url: Option<String>,
    /// Source folder of as-built PDFs.
    #[serde(default)]
    pub as_built_directory: String,
    #[serde(default)]
    pub processors: ProcessorsConfig,
    #[serde(default)]
    pub fields: FieldNames,
    /// Per-run log files go here. Defaults to `Logs` next to the config file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_directory: Option<String>,
    #[serde(default = "default_log_retention_days")]
    pub log_retention_days: u64,
    /// HTTP request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            is_arcgis_online: false,
            agol_username: String::new(),
            agol_password: String::new(),
            portal_url: String::new(),
            portal_username: String::new(),
            portal_password: String::new(),
            survey_path: String::new(),
            plan_areas_path: String::new(),
            approved_emails: Vec::new(),
            admin_email: String::new(),
            client_id: String::new(),
            tenant_id: String::new(),
            client_secret: String::new(),
            output_directory: String::new(),
            onedrive_synced: false,
            sharepoint_url: None,
            as_built_directory: String::new(),
            processors: ProcessorsConfig::default(),
            fields: FieldNames::default(),
            log_directory: None,
            log_retention_days: DEFAULT_LOG_RETENTION_DAYS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            source_path: None,
        }
    }
}

fn default_log_retention_days() -> u64 {
    DEFAULT_LOG_RETENTION_DAYS
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT
}

impl Config {
    /// Load configuration from a specific JSON file.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| match source.kind() {
                std::io::ErrorKind::NotFound => {
                    ConfigError::NotFound(path.display().to_string())
                }
                _ => ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                },
            })?;

        let mut config = Self::from_json(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.source_path = Some(path.to_path_buf());
        Ok(config.with_env_overrides())
    }

    pub fn from_json(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(contents)
    }

    /// Secrets may be kept out of the file and supplied through the environment.
    pub fn with_env_overrides(mut self) -> Self {
        let env = |key: &str| std::env::var(key).ok().filter(|s| !s.is_empty());
        if let Some(secret) = env("ASBUILT_CLIENT_SECRET") {
            self.client_secret = secret;
        }
        if let Some(password) = env("ASBUILT_AGOL_PASSWORD") {
            self.agol_password = password;
        }
        if let Some(password) = env("ASBUILT_PORTAL_PASSWORD") {
            self.portal_password = password;
        }
        self
    }

    /// Check the settings a run cannot do without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let survey = url::Url::parse(&self.survey_path).map_err(|e| {
            ConfigError::Invalid(format!(
                "survey_path '{}' is not a valid URL: {}",
                self.survey_path, e
            ))
        })?;
        if !matches!(survey.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid(format!(
                "survey_path must be an http(s) feature layer URL, got '{}'",
                self.survey_path
            )));
        }
        if self.admin_email.trim().is_empty() {
            return Err(ConfigError::Invalid("admin_email is not set".to_string()));
        }
        if self.output_directory.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "output_directory is not set".to_string(),
            ));
        }
        if !self.is_arcgis_online && !self.portal_username.is_empty() {
            url::Url::parse(&self.portal_url).map_err(|e| {
                ConfigError::Invalid(format!(
                    "portal_url '{}' is not a valid URL: {}",
                    self.portal_url, e
                ))
            })?;
        }
        if self.onedrive_synced
            && !self
                .sharepoint_url
                .as_deref()
                .is_some_and(|u| u.starts_with("http"))
        {
            return Err(ConfigError::Invalid(
                "onedrive_synced is set but sharepoint_url is missing or not an http(s) URL"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Get the base directory for resolving relative paths.
    /// Returns the config file's parent directory if available, otherwise None.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// - Absolute paths are returned as-is
    /// - Paths starting with ~ are expanded
    /// - Relative paths are resolved against the config file location, or the CWD
    pub fn resolve_path(&self, path_str: &str) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir()
                .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
                .join(path)
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.resolve_path(&self.output_directory)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.resolve_path(self.log_directory.as_deref().unwrap_or(LOGS_SUBDIR))
    }

    /// Root URL that issues tokens for the survey layer.
    pub fn portal_root(&self) -> &str {
        if self.is_arcgis_online {
            ARCGIS_ONLINE_URL
        } else {
            self.portal_url.trim_end_matches('/')
        }
    }

    /// Username and password for the active ArcGIS environment, if configured.
    pub fn arcgis_credentials(&self) -> Option<(&str, &str)> {
        let (user, pass) = if self.is_arcgis_online {
            (&self.agol_username, &self.agol_password)
        } else {
            (&self.portal_username, &self.portal_password)
        };
        if user.is_empty() || pass.is_empty() {
            None
        } else {
            Some((user.as_str(), pass.as_str()))
        }
    }

    /// Whether a requester may receive files directly.
    pub fn is_approved(&self, email: &str) -> bool {
        let email = normalize_email(email);
        !email.is_empty()
            && self
                .approved_emails
                .iter()
                .any(|approved| normalize_email(approved) == email)
    }

    /// Copy of this config with passwords and secrets masked, for display.
    pub fn redacted(&self) -> Self {
        let mask = |s: &str| {
            if s.is_empty() {
                String::new()
            } else {
                REDACTED.to_string()
            }
        };
        let mut config = self.clone();
        config.agol_password = mask(&self.agol_password);
        config.portal_password = mask(&self.portal_password);
        config.client_secret = mask(&self.client_secret);
        config
    }
}

/// Lowercase and strip whitespace and stray quotes from an address.
pub fn normalize_email(email: &str) -> String {
    email
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SETUP_JSON: &str = r#"{
        "is_arcgis_online": true,
        "agol_username": "gis_admin",
        "agol_password": "hunter2",
        "portal_url": "https://yourdomain.com/portal",
        "portal_username": "",
        "portal_password": "",
        "plan_areas_path": "https://services.arcgis.com/x/arcgis/rest/services/PlanAreas/FeatureServer/0",
        "approved_emails": ["Engineer@City.gov", " contractor@example.com "],
        "survey_path": "https://services2.arcgis.com/a9dgl29gs8dj/arcgis/rest/services/survey123_abc/FeatureServer/0",
        "admin_email": "gis@city.gov",
        "client_id": "cid",
        "tenant_id": "tid",
        "client_secret": "shh",
        "output_directory": "/srv/requests",
        "onedrive_synced": true,
        "sharepoint_url": "https://city.sharepoint.com/sites/GIS/Outputs",
        "as_built_directory": "/srv/asbuilts"
    }"#;

    #[test]
    fn test_parse_setup_config() {
        let config = Config::from_json(SETUP_JSON).unwrap();
        assert!(config.is_arcgis_online);
        assert_eq!(config.portal_root(), ARCGIS_ONLINE_URL);
        assert_eq!(config.arcgis_credentials(), Some(("gis_admin", "hunter2")));
        assert_eq!(config.log_retention_days, DEFAULT_LOG_RETENTION_DAYS);
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(config.fields, FieldNames::default());
        assert!(config.processors.as_builts.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_approved_emails_case_insensitive() {
        let config = Config::from_json(SETUP_JSON).unwrap();
        assert!(config.is_approved("engineer@city.gov"));
        assert!(config.is_approved("'Contractor@Example.com'"));
        assert!(!config.is_approved("stranger@example.com"));
    }

    #[test]
    fn test_validate_rejects_missing_survey() {
        let mut config = Config::from_json(SETUP_JSON).unwrap();
        config.survey_path = "UNDEFINED".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_sharepoint_without_url() {
        let mut config = Config::from_json(SETUP_JSON).unwrap();
        config.sharepoint_url = None;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_portal_root_enterprise() {
        let mut config = Config::from_json(SETUP_JSON).unwrap();
        config.is_arcgis_online = false;
        config.portal_url = "https://gis.city.gov/portal/".to_string();
        assert_eq!(config.portal_root(), "https://gis.city.gov/portal");
        assert_eq!(config.arcgis_credentials(), None);
    }

    #[test]
    fn test_redacted_masks_secrets() {
        let config = Config::from_json(SETUP_JSON).unwrap().redacted();
        assert_eq!(config.agol_password, REDACTED);
        assert_eq!(config.client_secret, REDACTED);
        assert_eq!(config.portal_password, "");
        assert_eq!(config.agol_username, "gis_admin");
    }

    #[test]
    fn test_relative_paths_follow_config_file() {
        let mut config = Config::from_json(SETUP_JSON).unwrap();
        config.source_path = Some(PathBuf::from("/opt/asbuilt/config.json"));
        config.output_directory = "outputs".to_string();
        assert_eq!(config.output_dir(), PathBuf::from("/opt/asbuilt/outputs"));
        assert_eq!(config.log_dir(), PathBuf::from("/opt/asbuilt/Logs"));
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load_from_path(&dir.path().join("config.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_load_sets_source_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, SETUP_JSON).unwrap();
        let config = Config::load_from_path(&path).await.unwrap();
        assert_eq!(config.source_path.as_deref(), Some(path.as_path()));
        assert_eq!(config.base_dir().as_deref(), Some(dir.path()));
    }
}
