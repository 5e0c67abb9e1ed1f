//! Upload queue listing for a local store.

use fieldsync_protocol::OutboxEntry;
use fieldsync_store::LocalStore;
use serde::Serialize;
use std::path::Path;

/// One queued upload, flattened for display.
#[derive(Debug, Serialize)]
pub struct OutboxEntryInfo {
    /// Device-local queue id.
    pub local_id: u64,
    /// Table wire name.
    pub table: String,
    /// Record identifier.
    pub record_id: String,
    /// Operation wire name.
    pub operation: String,
    /// Unix-millisecond time the entry was queued.
    pub queued_at: u64,
    /// True once the server has accepted the entry.
    pub acknowledged: bool,
    /// Payload size in bytes (absent for deletes).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_bytes: Option<usize>,
}

impl From<&OutboxEntry> for OutboxEntryInfo {
    fn from(entry: &OutboxEntry) -> Self {
        Self {
            local_id: entry.local_id,
            table: entry.table.to_string(),
            record_id: entry.record_id.clone(),
            operation: entry.operation.to_string(),
            queued_at: entry.queued_at,
            acknowledged: entry.acknowledged,
            payload_bytes: entry.payload.as_ref().map(|p| p.to_string().len()),
        }
    }
}

/// Lists queued uploads, pending only unless `all` is set.
pub fn run(path: &Path, all: bool, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    if !path.join("store.journal").exists() {
        return Err(format!("No store journal found at {:?}", path).into());
    }

    let store = LocalStore::open(path)?;
    let entries = if all {
        store.outbox_entries()
    } else {
        store.pending()
    };
    let pending = entries.iter().filter(|e| !e.acknowledged).count();
    let records: Vec<OutboxEntryInfo> = entries.iter().map(OutboxEntryInfo::from).collect();

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        _ => {
            print_text_output(&records, pending);
        }
    }

    Ok(())
}

fn print_text_output(records: &[OutboxEntryInfo], pending: usize) {
    println!("Outbox Entries ({} shown, {} pending)", records.len(), pending);
    println!("==============");
    println!();

    for record in records {
        print!(
            "[{:06}] {:7} {}/{}",
            record.local_id, record.operation, record.table, record.record_id
        );
        print!(" queued_at={}", record.queued_at);
        if let Some(size) = record.payload_bytes {
            print!(" payload_bytes={}", size);
        }
        if record.acknowledged {
            print!(" acked");
        }
        println!();
    }
}
