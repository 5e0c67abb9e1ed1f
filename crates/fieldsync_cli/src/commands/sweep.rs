//! Retention sweep for a server change log.

use fieldsync_protocol::now_millis;
use fieldsync_server::{ServerConfig, SyncService};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Drops change history older than the retention window.
pub fn run(
    path: &Path,
    retention_days: u64,
    dry_run: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if !path.join("changes.journal").exists() {
        return Err(format!("No server journal found at {:?}", path).into());
    }
    info!("Sweeping change log at {:?}", path);

    let retention = Duration::from_secs(retention_days * 24 * 60 * 60);
    let config = ServerConfig::default().with_retention(retention);
    let retention_ms = config.retention_millis();
    let service = SyncService::open_with_config(path, config)?;

    // The sweep removes the aged prefix of the log, so count the same way.
    let cutoff = now_millis().saturating_sub(retention_ms);
    let (all, _) = service.changes_since(0, usize::MAX);
    let expired = all.iter().take_while(|c| c.created_at < cutoff).count();

    println!("Retention window: {} days", retention_days);
    println!("  Retained records: {}", service.change_count());
    println!("  Expired records:  {}", expired);

    if dry_run {
        println!();
        println!("Dry run - would remove {} record(s).", expired);
        return Ok(());
    }

    if expired == 0 {
        println!();
        println!("Nothing to sweep; every record is inside the window");
        return Ok(());
    }

    let bytes_before = service.journal_size()?;
    println!();
    println!("Sweeping expired history...");
    let removed = service.sweep_retention()?;
    let bytes_after = service.journal_size()?;

    println!("  Removed records: {}", removed);
    println!("  Purged through:  version {}", service.purged_through());
    println!("  Before:          {} bytes", bytes_before);
    println!("  After:           {} bytes", bytes_after);
    println!("✓ Sweep complete");

    Ok(())
}
