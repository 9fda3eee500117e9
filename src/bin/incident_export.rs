//! incident_export - dump the persisted incident index.
//!
//! Reads the incident index written by sentineld sessions and prints every
//! record, optionally filtered by category, as JSON lines or a plain table.

use anyhow::{anyhow, Result};
use clap::Parser;

use sentinel_kernel::record::list_incidents;
use sentinel_kernel::IncidentCategory;

#[derive(Parser, Debug)]
#[command(author, version, about = "Export persisted incidents")]
struct Args {
    /// Path to the incident index database.
    #[arg(long, env = "SENTINEL_DB_PATH", default_value = "sentinel.db")]
    db_path: String,

    /// Only export one category (e.g. "weapons", "female_distress").
    #[arg(long)]
    category: Option<String>,

    /// Emit JSON lines instead of the plain table.
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let category = args
        .category
        .as_deref()
        .map(|raw| {
            IncidentCategory::parse(raw).ok_or_else(|| anyhow!("unknown category '{}'", raw))
        })
        .transpose()?;

    let incidents = list_incidents(&args.db_path)?;
    let selected = incidents
        .into_iter()
        .filter(|incident| category.is_none_or(|c| incident.category == c));

    let mut count = 0usize;
    for incident in selected {
        count += 1;
        if args.json {
            println!("{}", serde_json::to_string(&incident)?);
        } else {
            println!(
                "{}\t{}\t{}\t{}",
                incident.timestamp, incident.category, incident.snapshot_path, incident.description
            );
        }
    }
    log::info!("exported {} incidents", count);
    Ok(())
}
