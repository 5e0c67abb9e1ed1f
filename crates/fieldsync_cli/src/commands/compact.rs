//! Journal compaction for a local store.

use fieldsync_store::LocalStore;
use std::path::Path;
use tracing::info;

/// Rewrites the store journal down to live records and pending uploads.
pub fn run(path: &Path, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    if !path.join("store.journal").exists() {
        return Err(format!("No store journal found at {:?}", path).into());
    }
    info!("Compacting store at {:?}", path);

    let store = LocalStore::open(path)?;
    let bytes_before = store.journal_size()?;
    let outbox_total = store.outbox_entries().len();
    let pending = store.pending_count();

    println!("Store contents:");
    println!("  Cached records:       {}", record_count(&store));
    println!("  Pending outbox:       {}", pending);
    println!("  Acknowledged entries: {}", outbox_total - pending);
    println!("  Journal size:         {} bytes", bytes_before);

    if dry_run {
        println!();
        println!("Dry run - the journal would be rewritten in place.");
        return Ok(());
    }

    println!();
    println!("Rewriting journal...");
    store.compact()?;
    let bytes_after = store.journal_size()?;

    let reclaimed = bytes_before.saturating_sub(bytes_after);
    let percent = if bytes_before > 0 {
        (reclaimed as f64 / bytes_before as f64) * 100.0
    } else {
        0.0
    };
    println!("  Before:    {} bytes", bytes_before);
    println!("  After:     {} bytes", bytes_after);
    println!("  Reclaimed: {} bytes ({:.1}%)", reclaimed, percent);
    println!("✓ Journal rewritten");

    Ok(())
}

fn record_count(store: &LocalStore) -> usize {
    store.table_counts().iter().map(|(_, n)| n).sum()
}
