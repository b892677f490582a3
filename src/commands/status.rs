//! Status and listing commands

use crate::config::Config;
use crate::error::Result;
use crate::meta::{AllocationSummary, IndexCounts, MetaDb};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Status information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusInfo {
    pub config_path: String,
    pub db_path: String,
    pub host: String,
    pub counts: IndexCounts,
}

/// Get system status
pub async fn cmd_status(config: &Config, db: &MetaDb) -> Result<StatusInfo> {
    info!("Getting status");
    Ok(StatusInfo {
        config_path: config.paths.config_file.display().to_string(),
        db_path: config.paths.db_file.display().to_string(),
        host: config.host.clone(),
        counts: db.counts().await?,
    })
}

pub fn print_status(status: &StatusInfo) {
    println!("gbtim status");
    println!("  Config: {}", status.config_path);
    println!("  Database: {}", status.db_path);
    println!("  Host: {}", status.host);
    println!("  Allocations: {}", status.counts.allocations);
    println!("  Sessions: {}", status.counts.sessions);
    println!("  Scan sets: {}", status.counts.scan_sets);
    println!("  Scans: {}", status.counts.scans);
    println!("  Targets: {}", status.counts.targets);
    println!("  Files: {}", status.counts.files);
    println!("  Copies: {}", status.counts.copies);
    if status.counts.corrupt_copies > 0 {
        println!("  Corrupt copies: {}", status.counts.corrupt_copies);
    }
}

/// List allocations with aggregate counts
pub async fn cmd_list_allocations(db: &MetaDb) -> Result<Vec<AllocationSummary>> {
    info!("Listing allocations");
    db.allocation_summaries().await
}

pub fn print_allocations(allocations: &[AllocationSummary]) {
    if allocations.is_empty() {
        println!("No allocations indexed yet.");
        return;
    }
    println!("{:<16} {:>10} {:>8}", "ALLOCATION", "SESSIONS", "SCANS");
    for allocation in allocations {
        println!(
            "{:<16} {:>10} {:>8}",
            allocation.name, allocation.session_count, allocation.scan_count
        );
    }
}
