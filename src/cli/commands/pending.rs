//! List unfulfilled requests.

use std::sync::Arc;

use console::style;

use crate::cli::icons::{bullet, dim_arrow, success};
use crate::config::Config;
use crate::survey::{ArcGisLayer, RequestScanner};

pub async fn cmd_pending(config: &Config) -> anyhow::Result<()> {
    config.validate()?;
    let layer = ArcGisLayer::from_config(config)?;
    let requests = RequestScanner::new(Arc::new(layer)).scan().await?;

    if requests.is_empty() {
        println!("{} No new requests", success());
        return Ok(());
    }

    println!("{} new request(s):", style(requests.len()).bold());
    for request in &requests {
        let created = request
            .creation_date
            .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        let outputs: Vec<&str> = request.outputs().iter().map(|k| k.as_str()).collect();
        let approved = if config.is_approved(&request.email) {
            style("approved").green()
        } else {
            style("unknown").yellow()
        };

        println!(
            "{} {} {}",
            bullet(),
            style(request.folder()).bold(),
            style(&request.global_id).dim()
        );
        println!("  {} Created: {}", dim_arrow(), created);
        println!("  {} Requester: {} ({})", dim_arrow(), request.email, approved);
        println!(
            "  {} Outputs: {}",
            dim_arrow(),
            if outputs.is_empty() {
                style("none recognised".to_string()).red()
            } else {
                style(outputs.join(", "))
            }
        );
        match request.utility_set() {
            Some(utilities) => println!("  {} Utilities: {}", dim_arrow(), utilities),
            None => println!(
                "  {} Utilities: {}",
                dim_arrow(),
                style(format!("none recognised in '{}'", request.utilities)).red()
            ),
        }
    }

    Ok(())
}
