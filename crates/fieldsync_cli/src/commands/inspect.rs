//! Store and server directory inspection.

use fieldsync_protocol::SyncCursor;
use fieldsync_server::SyncService;
use fieldsync_store::{LocalStore, DEVICE_ID_KEY};
use serde::Serialize;
use std::path::Path;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct StoreInspection {
    /// Store path.
    pub path: String,
    /// Journal file size in bytes.
    pub journal_size: u64,
    /// Number of cached records across all tables.
    pub record_count: usize,
    /// Outbox entries awaiting acknowledgement.
    pub pending_outbox: usize,
    /// Total outbox entries, acknowledged included.
    pub outbox_total: usize,
    /// Device identifier, if one has been minted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    /// Mirrored sync cursor, if the store has ever synced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<CursorInfo>,
    /// Per-table record counts (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tables: Option<Vec<TableCount>>,
}

/// Server inspection result.
#[derive(Debug, Serialize)]
pub struct ServerInspection {
    /// Server path.
    pub path: String,
    /// Journal file size in bytes.
    pub journal_size: u64,
    /// Highest version in the change log.
    pub latest_version: u64,
    /// Retention purge watermark.
    pub purged_through: u64,
    /// Number of retained change records.
    pub change_count: usize,
    /// Device cursors known to the server.
    pub cursors: Vec<CursorInfo>,
}

/// Cursor fields for output.
#[derive(Debug, Serialize)]
pub struct CursorInfo {
    /// Device the cursor belongs to.
    pub device_id: String,
    /// Highest applied change-log version.
    pub version: u64,
    /// Unix-millisecond time of the last advancement.
    pub last_sync_at: u64,
}

impl From<SyncCursor> for CursorInfo {
    fn from(cursor: SyncCursor) -> Self {
        Self {
            device_id: cursor.device_id,
            version: cursor.version,
            last_sync_at: cursor.last_sync_at,
        }
    }
}

/// Record count for a single table.
#[derive(Debug, Serialize)]
pub struct TableCount {
    /// Table wire name.
    pub table: String,
    /// Number of cached records.
    pub records: usize,
}

/// Summarizes whichever directory kind sits at `path`.
///
/// The kind is detected from the journal file it holds: `changes.journal`
/// marks a server, `store.journal` a device store.
pub fn run(
    path: &Path,
    show_tables: bool,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if path.join("changes.journal").exists() {
        inspect_server(path, format)
    } else if path.join("store.journal").exists() {
        inspect_store(path, show_tables, format)
    } else {
        Err(format!("No fieldsync data found at {:?}", path).into())
    }
}

fn inspect_store(
    path: &Path,
    show_tables: bool,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = LocalStore::open(path)?;
    let counts = store.table_counts();

    let mut result = StoreInspection {
        path: path.display().to_string(),
        journal_size: store.journal_size()?,
        record_count: counts.iter().map(|(_, n)| n).sum(),
        pending_outbox: store.pending_count(),
        outbox_total: store.outbox_entries().len(),
        device_id: store.setting(DEVICE_ID_KEY),
        cursor: store.cursor().map(CursorInfo::from),
        tables: None,
    };

    if show_tables {
        result.tables = Some(
            counts
                .into_iter()
                .map(|(table, records)| TableCount {
                    table: table.to_string(),
                    records,
                })
                .collect(),
        );
    }

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_store_text(&result);
        }
    }

    Ok(())
}

fn inspect_server(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let service = SyncService::open(path)?;

    let mut cursors: Vec<CursorInfo> = service
        .cursors()
        .into_iter()
        .map(CursorInfo::from)
        .collect();
    cursors.sort_by(|a, b| a.device_id.cmp(&b.device_id));

    let result = ServerInspection {
        path: path.display().to_string(),
        journal_size: service.journal_size()?,
        latest_version: service.latest_version(),
        purged_through: service.purged_through(),
        change_count: service.change_count(),
        cursors,
    };

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_server_text(&result);
        }
    }

    Ok(())
}

fn print_store_text(result: &StoreInspection) {
    println!("Fieldsync Store Inspection");
    println!("==========================");
    println!();
    println!("Path:    {}", result.path);
    if let Some(device_id) = &result.device_id {
        println!("Device:  {}", device_id);
    }
    println!("Journal: {}", format_size(result.journal_size));
    println!();
    println!("Contents:");
    println!("  Cached records: {}", result.record_count);
    println!("  Pending outbox: {}", result.pending_outbox);
    println!("  Outbox total:   {}", result.outbox_total);

    match &result.cursor {
        Some(cursor) => {
            println!();
            println!("Cursor:");
            println!("  Version:      {}", cursor.version);
            println!("  Last sync at: {}", cursor.last_sync_at);
        }
        None => {
            println!();
            println!("Cursor: none (store has never synced)");
        }
    }

    if let Some(tables) = &result.tables {
        println!();
        println!("Tables:");
        for count in tables {
            println!("  {:14} {} records", count.table, count.records);
        }
    }
}

fn print_server_text(result: &ServerInspection) {
    println!("Fieldsync Server Inspection");
    println!("===========================");
    println!();
    println!("Path:    {}", result.path);
    println!("Journal: {}", format_size(result.journal_size));
    println!();
    println!("Change log:");
    println!("  Latest version:   {}", result.latest_version);
    println!("  Purged through:   {}", result.purged_through);
    println!("  Retained records: {}", result.change_count);

    println!();
    if result.cursors.is_empty() {
        println!("Cursors: none");
    } else {
        println!("Cursors:");
        for cursor in &result.cursors {
            println!(
                "  {} version={} last_sync_at={}",
                cursor.device_id, cursor.version, cursor.last_sync_at
            );
        }
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{} bytes", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = "KB";
    for next in ["MB", "GB"] {
        if value < 1024.0 {
            break;
        }
        value /= 1024.0;
        unit = next;
    }
    format!("{:.1} {}", value, unit)
}
