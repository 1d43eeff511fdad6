//! Config file discovery.

use std::path::{Path, PathBuf};

use super::{Config, ConfigError};

/// File name written by the setup step.
pub const CONFIG_FILENAME: &str = "config.json";

/// Options for loading the config.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
}

/// Look for config.json in the working directory, then next to the executable.
fn find_config_file() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok().map(|d| d.join(CONFIG_FILENAME));
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|d| d.join(CONFIG_FILENAME)));

    [cwd, exe_dir].into_iter().flatten().find(|p| p.exists())
}

/// Load the config, in priority order:
/// 1. explicit `--config` path
/// 2. `config.json` in the working directory or next to the executable
/// 3. an `asbuilt` config found by prefer in its standard locations
pub async fn load_config(options: &LoadOptions) -> Result<Config, ConfigError> {
    if let Some(ref path) = options.config_path {
        return Config::load_from_path(path).await;
    }

    if let Some(path) = find_config_file() {
        tracing::debug!("Using config file: {}", path.display());
        return Config::load_from_path(&path).await;
    }

    match prefer::load("asbuilt").await {
        Ok(pref_config) => {
            if let Some(path) = pref_config.source_path() {
                tracing::debug!("Discovered config file: {}", Path::new(path).display());
                return Config::load_from_path(path).await;
            }
        }
        Err(_) => tracing::debug!("No asbuilt config discovered"),
    }

    Err(ConfigError::NotFound(CONFIG_FILENAME.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_explicit_path_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.json");
        std::fs::write(
            &path,
            r#"{"survey_path": "https://example.com/FeatureServer/0", "admin_email": "a@b.c"}"#,
        )
        .unwrap();

        let config = load_config(&LoadOptions {
            config_path: Some(path.clone()),
        })
        .await
        .unwrap();
        assert_eq!(config.admin_email, "a@b.c");
        assert_eq!(config.source_path, Some(path));
    }

    #[tokio::test]
    async fn test_explicit_missing_path_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(&LoadOptions {
            config_path: Some(dir.path().join("nope.json")),
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }
}
