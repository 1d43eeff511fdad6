//! External command processor.
//!
//! Runs a configured command for each export. Arguments may use these
//! placeholders, which are also exported as `ASBUILT_*` environment variables:
//!
//! | placeholder | value |
//! |---|---|
//! | `{global_id}` | request GlobalID |
//! | `{folder}` | request folder name |
//! | `{target_dir}` | request folder path |
//! | `{output_dir}` | output subfolder path |
//! | `{utilities}` | e.g. `Water,Storm` |
//! | `{email}` | requester address |
//! | `{link}` | link sent to the requester |
//! | `{survey_path}`, `{plan_areas_path}`, `{as_built_directory}` | from config |
//!
//! If the last non-empty stdout line is a JSON object with an integer `files`
//! field, that count is reported back.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info};

use super::{ExportJob, ExportOutcome, ProcessingError, Processor};
use crate::config::Config;

/// Lines of stderr kept in error messages.
const STDERR_LINES: usize = 5;

/// Command configuration from the config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CommandConfig {
    /// Command to execute.
    pub command: String,
    /// Arguments (may contain placeholders).
    #[serde(default)]
    pub args: Vec<String>,
    /// Timeout in seconds (default: 1800 = 30 minutes).
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_timeout() -> u64 {
    1800
}

/// Runs one configured command per export.
pub struct CommandProcessor {
    config: CommandConfig,
    survey_path: String,
    plan_areas_path: String,
    as_built_directory: String,
}

impl CommandProcessor {
    pub fn new(config: CommandConfig, app: &Config) -> Self {
        Self {
            config,
            survey_path: app.survey_path.clone(),
            plan_areas_path: app.plan_areas_path.clone(),
            as_built_directory: app
                .resolve_path(&app.as_built_directory)
                .to_string_lossy()
                .into_owned(),
        }
    }

    fn placeholders(&self, job: &ExportJob) -> Vec<(&'static str, String)> {
        vec![
            ("global_id", job.global_id.clone()),
            ("folder", job.folder.clone()),
            ("target_dir", job.target_dir.to_string_lossy().into_owned()),
            ("output_dir", job.output_dir.to_string_lossy().into_owned()),
            ("utilities", job.utilities.to_string()),
            ("email", job.email.clone()),
            ("link", job.link.clone()),
            ("survey_path", self.survey_path.clone()),
            ("plan_areas_path", self.plan_areas_path.clone()),
            ("as_built_directory", self.as_built_directory.clone()),
        ]
    }

    /// Replace placeholders in an argument string.
    fn expand_arg(arg: &str, values: &[(&'static str, String)]) -> String {
        values.iter().fold(arg.to_string(), |acc, (name, value)| {
            acc.replace(&format!("{{{}}}", name), value)
        })
    }

    fn build_command(&self, job: &ExportJob) -> Command {
        let values = self.placeholders(job);
        let mut cmd = Command::new(&self.config.command);
        cmd.args(
            self.config
                .args
                .iter()
                .map(|arg| Self::expand_arg(arg, &values)),
        );
        for (name, value) in &values {
            cmd.env(format!("ASBUILT_{}", name.to_ascii_uppercase()), value);
        }
        cmd.current_dir(&job.output_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Processor for CommandProcessor {
    async fn export(&self, job: &ExportJob) -> Result<ExportOutcome, ProcessingError> {
        let command = self.config.command.clone();
        info!("Running {} for {} ({})", command, job.global_id, job.kind);

        let child = self
            .build_command(job)
            .spawn()
            .map_err(|source| ProcessingError::Spawn {
                command: command.clone(),
                source,
            })?;

        let timeout = Duration::from_secs(self.config.timeout_seconds);
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                return Err(ProcessingError::Timeout {
                    command,
                    seconds: self.config.timeout_seconds,
                })
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
            debug!("[{}] {}", command, line);
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProcessingError::Failed {
                command,
                code: output.status.code(),
                stderr: stderr
                    .lines()
                    .take(STDERR_LINES)
                    .collect::<Vec<_>>()
                    .join("\n"),
            });
        }

        Ok(ExportOutcome {
            files: parse_file_count(&stdout),
        })
    }
}

/// Read `{"files": N}` from the last non-empty stdout line.
fn parse_file_count(stdout: &str) -> Option<u64> {
    let last = stdout.lines().rev().find(|l| !l.trim().is_empty())?;
    let value: serde_json::Value = serde_json::from_str(last.trim()).ok()?;
    value.get("files")?.as_u64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OutputKind, Utility, UtilitySet};
    use std::path::Path;

    fn job(dir: &Path) -> ExportJob {
        ExportJob {
            kind: OutputKind::AsBuilts,
            global_id: "{A1}".to_string(),
            email: "engineer@city.gov".to_string(),
            folder: "Elm Street".to_string(),
            utilities: UtilitySet::of(&[Utility::Water, Utility::Storm]),
            target_dir: dir.to_path_buf(),
            output_dir: dir.to_path_buf(),
            link: "https://city.sharepoint.com/Outputs/Elm%20Street".to_string(),
        }
    }

    fn processor(command: &str, args: &[&str], timeout_seconds: u64) -> CommandProcessor {
        let config = Config {
            survey_path: "https://example.com/FeatureServer/0".to_string(),
            as_built_directory: "/srv/asbuilts".to_string(),
            ..Default::default()
        };
        CommandProcessor::new(
            CommandConfig {
                command: command.to_string(),
                args: args.iter().map(|a| a.to_string()).collect(),
                timeout_seconds,
            },
            &config,
        )
    }

    #[test]
    fn test_expand_arg() {
        let dir = tempfile::tempdir().unwrap();
        let p = processor("export", &[], 5);
        let values = p.placeholders(&job(dir.path()));
        assert_eq!(
            CommandProcessor::expand_arg("--utilities={utilities} --id {global_id}", &values),
            "--utilities=Water,Storm --id {A1}"
        );
        assert_eq!(
            CommandProcessor::expand_arg("{as_built_directory}", &values),
            "/srv/asbuilts"
        );
        assert_eq!(CommandProcessor::expand_arg("{unknown}", &values), "{unknown}");
    }

    #[test]
    fn test_parse_file_count() {
        assert_eq!(parse_file_count("copying...\n{\"files\": 12}\n\n"), Some(12));
        assert_eq!(parse_file_count("done\n"), None);
        assert_eq!(parse_file_count("{\"files\": \"many\"}"), None);
        assert_eq!(parse_file_count(""), None);
    }

    #[test]
    fn test_command_config_defaults() {
        let config: CommandConfig =
            serde_json::from_str(r#"{"command": "python", "args": ["clip.py"]}"#).unwrap();
        assert_eq!(config.timeout_seconds, 1800);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_export_success_reports_files() {
        let dir = tempfile::tempdir().unwrap();
        let p = processor(
            "sh",
            &["-c", "test \"$ASBUILT_UTILITIES\" = {utilities} && echo '{\"files\": 3}'"],
            10,
        );
        let outcome = p.export(&job(dir.path())).await.unwrap();
        assert_eq!(outcome.files, Some(3));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_export_failure_captures_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let p = processor("sh", &["-c", "echo 'plan areas layer missing' >&2; exit 2"], 10);
        let err = p.export(&job(dir.path())).await.unwrap_err();
        match err {
            ProcessingError::Failed { code, stderr, .. } => {
                assert_eq!(code, Some(2));
                assert_eq!(stderr, "plan areas layer missing");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_export_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let p = processor("sleep", &["5"], 0);
        let err = p.export(&job(dir.path())).await.unwrap_err();
        assert!(matches!(err, ProcessingError::Timeout { seconds: 0, .. }));
    }

    #[tokio::test]
    async fn test_export_missing_command() {
        let dir = tempfile::tempdir().unwrap();
        let p = processor("asbuilt-no-such-command", &[], 10);
        let err = p.export(&job(dir.path())).await.unwrap_err();
        assert!(matches!(err, ProcessingError::Spawn { .. }));
    }
}
