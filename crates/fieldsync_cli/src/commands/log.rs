//! Change history listing for a server directory.

use fieldsync_protocol::ChangeRecord;
use fieldsync_server::SyncService;
use serde::Serialize;
use std::path::Path;

/// One change record, flattened for display.
#[derive(Debug, Serialize)]
pub struct ChangeInfo {
    /// Change-log version.
    pub version: u64,
    /// Table wire name.
    pub table: String,
    /// Record identifier.
    pub record_id: String,
    /// Operation wire name.
    pub operation: String,
    /// Unix-millisecond server time of the append.
    pub created_at: u64,
    /// Payload size in bytes (absent for deletes).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_bytes: Option<usize>,
}

impl From<&ChangeRecord> for ChangeInfo {
    fn from(change: &ChangeRecord) -> Self {
        Self {
            version: change.version,
            table: change.table.to_string(),
            record_id: change.record_id.clone(),
            operation: change.operation.to_string(),
            created_at: change.created_at,
            payload_bytes: change.payload.as_ref().map(|p| p.to_string().len()),
        }
    }
}

/// Prints server changes after `since`, oldest first.
pub fn run(
    path: &Path,
    since: u64,
    limit: Option<usize>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if !path.join("changes.journal").exists() {
        return Err(format!("No server journal found at {:?}", path).into());
    }

    let service = SyncService::open(path)?;
    let (changes, truncated) = service.changes_since(since, limit.unwrap_or(usize::MAX));
    let records: Vec<ChangeInfo> = changes.iter().map(ChangeInfo::from).collect();

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        _ => {
            print_text_output(&records, service.purged_through(), truncated);
        }
    }

    Ok(())
}

fn print_text_output(records: &[ChangeInfo], purged_through: u64, truncated: bool) {
    println!("Change Records ({} shown)", records.len());
    println!("==============");
    if purged_through > 0 {
        println!("(history through version {} has been purged)", purged_through);
    }
    println!();

    for record in records {
        print!(
            "[{:08}] {:7} {}/{}",
            record.version, record.operation, record.table, record.record_id
        );
        print!(" created_at={}", record.created_at);
        if let Some(size) = record.payload_bytes {
            print!(" payload_bytes={}", size);
        }
        println!();
    }

    if truncated {
        println!();
        println!("(more records retained past the limit)");
    }
}
