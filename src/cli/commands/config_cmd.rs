//! Configuration inspection commands.

use console::style;

use crate::cli::icons::{dim_arrow, error, success, warn};
use crate::config::Config;
use crate::models::OutputKind;
use crate::notify::GraphMailer;

/// Print the loaded config as JSON with secrets masked.
pub fn cmd_config_show(config: &Config) -> anyhow::Result<()> {
    if let Some(path) = &config.source_path {
        eprintln!("{} Source: {}", dim_arrow(), path.display());
    }
    println!("{}", serde_json::to_string_pretty(&config.redacted())?);
    Ok(())
}

/// Validate the config and report on each part of the setup.
pub fn cmd_config_check(config: &Config) -> anyhow::Result<()> {
    if let Some(path) = &config.source_path {
        println!("{} Config: {}", dim_arrow(), path.display());
    }

    if let Err(e) = config.validate() {
        println!("{} {}", error(), e);
        anyhow::bail!("configuration is invalid");
    }
    println!("{} Required settings present", success());

    match config.arcgis_credentials() {
        Some((username, _)) => println!(
            "{} ArcGIS sign-in as {} at {}",
            success(),
            username,
            config.portal_root()
        ),
        None => println!("{} No ArcGIS credentials; the layer must be public", warn()),
    }

    match GraphMailer::from_config(config) {
        Ok(_) => println!("{} Graph mail configured, sending as {}", success(), config.admin_email),
        Err(e) => println!("{} {}", warn(), e),
    }

    if config.approved_emails.is_empty() {
        println!(
            "{} approved_emails is empty; every request goes to the admin",
            warn()
        );
    } else {
        println!(
            "{} {} approved requester(s)",
            success(),
            config.approved_emails.len()
        );
    }

    let output_dir = config.output_dir();
    if output_dir.is_dir() {
        println!("{} Output directory: {}", success(), output_dir.display());
    } else {
        println!(
            "{} Output directory does not exist yet: {}",
            warn(),
            output_dir.display()
        );
    }

    for kind in [OutputKind::GisFiles, OutputKind::AsBuilts] {
        match config.processors.get(kind) {
            Some(command) => println!(
                "{} {} processor: {} {}",
                success(),
                kind.label(),
                command.command,
                style(command.args.join(" ")).dim()
            ),
            None => println!(
                "{} No {} processor; requests for it will fail",
                warn(),
                kind.label()
            ),
        }
    }

    println!(
        "{} Logs: {} (kept {} days)",
        dim_arrow(),
        config.log_dir().display(),
        config.log_retention_days
    );

    Ok(())
}
