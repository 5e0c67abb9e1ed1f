//! Request and response messages for the sync endpoints.

use crate::change::{ChangeRecord, Operation};
use crate::error::{ProtocolError, ProtocolResult};
use crate::outbox::OutboxEntry;
use crate::table::Table;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Endpoint paths served by a sync server.
pub mod endpoints {
    /// `GET` pulls changes; `POST` pushes outbox entries.
    pub const CHANGES: &str = "/sync/changes";
    /// `POST` previews conflicts for proposed changes.
    pub const CONFLICTS: &str = "/sync/conflicts";
    /// `POST` repairs a device cursor to the latest version.
    pub const CURSOR: &str = "/sync/cursor";
}

/// Error prefix used in push receipts for conflict rejections.
pub const CONFLICT_ERROR_PREFIX: &str = "conflict:";

/// Parameters of a pull (`GET /sync/changes`).
///
/// Carried as query parameters rather than a body. Device ids are
/// URL-safe by construction (UUIDs), so no percent-encoding is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    /// The requesting device.
    pub device_id: String,
    /// The highest version the device has durably applied. When absent
    /// the server serves from the device's stored cursor.
    pub last_version: Option<u64>,
}

impl PullRequest {
    /// Creates a pull request carrying the device's applied version.
    pub fn new(device_id: impl Into<String>, last_version: u64) -> Self {
        Self {
            device_id: device_id.into(),
            last_version: Some(last_version),
        }
    }

    /// Renders the query string, without the leading `?`.
    #[must_use]
    pub fn to_query(&self) -> String {
        match self.last_version {
            Some(version) => format!("deviceId={}&lastVersion={version}", self.device_id),
            None => format!("deviceId={}", self.device_id),
        }
    }

    /// Parses a query string (with or without the leading `?`).
    ///
    /// `deviceId` is required; `lastVersion` may be omitted.
    pub fn from_query(query: &str) -> ProtocolResult<Self> {
        let query = query.strip_prefix('?').unwrap_or(query);

        let mut device_id = None;
        let mut last_version = None;

        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| ProtocolError::invalid_message(format!("malformed query pair: {pair}")))?;
            match key {
                "deviceId" => device_id = Some(value.to_string()),
                "lastVersion" => {
                    last_version = Some(value.parse().map_err(|_| {
                        ProtocolError::invalid_message(format!("lastVersion is not a number: {value}"))
                    })?);
                }
                _ => {}
            }
        }

        let device_id = device_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ProtocolError::invalid_message("missing deviceId"))?;

        Ok(Self {
            device_id,
            last_version,
        })
    }
}

/// One page of pulled changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResponse {
    /// Change records, ascending by version.
    pub changes: Vec<ChangeRecord>,
    /// Version high-water mark of this page, as a decimal string.
    pub cursor: String,
    /// True when more records exist beyond this page.
    pub has_more: bool,
    /// True when this page belongs to a full-resync snapshot.
    #[serde(default)]
    pub resync: bool,
}

impl PullResponse {
    /// Creates a page. `cursor` is the numeric high-water mark; it is
    /// rendered as a string on the wire.
    pub fn new(changes: Vec<ChangeRecord>, cursor: u64, has_more: bool, resync: bool) -> Self {
        Self {
            changes,
            cursor: cursor.to_string(),
            has_more,
            resync,
        }
    }

    /// Parses the page cursor back to a version number.
    pub fn cursor_version(&self) -> ProtocolResult<u64> {
        self.cursor.parse().map_err(|_| {
            ProtocolError::invalid_message(format!("cursor is not a number: {}", self.cursor))
        })
    }
}

/// A push (`POST /sync/changes`) submitting queued outbox entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    /// The submitting device.
    pub device_id: String,
    /// Outbox entries, in queue order.
    pub changes: Vec<OutboxEntry>,
}

impl PushRequest {
    /// Creates a push request.
    pub fn new(device_id: impl Into<String>, changes: Vec<OutboxEntry>) -> Self {
        Self {
            device_id: device_id.into(),
            changes,
        }
    }
}

/// Per-entry outcome of a push, in submission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushReceipt {
    /// `local_id` of the submitted entry.
    pub id: u64,
    /// True when the entry was appended (or had already been).
    pub success: bool,
    /// Failure reason when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PushReceipt {
    /// Creates a success receipt.
    pub fn accepted(id: u64) -> Self {
        Self {
            id,
            success: true,
            error: None,
        }
    }

    /// Creates a failure receipt.
    pub fn rejected(id: u64, error: impl Into<String>) -> Self {
        Self {
            id,
            success: false,
            error: Some(error.into()),
        }
    }

    /// True when this receipt reports a conflict rejection.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        self.error
            .as_deref()
            .is_some_and(|e| e.starts_with(CONFLICT_ERROR_PREFIX))
    }
}

/// A client-side change offered for conflict inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposedChange {
    /// The table the proposal targets.
    pub table: Table,
    /// Identifier of the target record.
    pub record_id: String,
    /// The proposed mutation kind.
    pub operation: Operation,
    /// Proposed post-mutation field set, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl From<&OutboxEntry> for ProposedChange {
    fn from(entry: &OutboxEntry) -> Self {
        Self {
            table: entry.table,
            record_id: entry.record_id.clone(),
            operation: entry.operation,
            payload: entry.payload.clone(),
        }
    }
}

/// A conflict preview (`POST /sync/conflicts`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictRequest {
    /// The asking device.
    pub device_id: String,
    /// Proposed changes to inspect.
    pub changes: Vec<ProposedChange>,
}

impl ConflictRequest {
    /// Creates a conflict preview request.
    pub fn new(device_id: impl Into<String>, changes: Vec<ProposedChange>) -> Self {
        Self {
            device_id: device_id.into(),
            changes,
        }
    }
}

/// One conflicting proposal with the server records it collides with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictReport {
    /// The proposal that conflicts.
    pub change: ProposedChange,
    /// Intervening server changes to the same record, ascending by version.
    pub server_changes: Vec<ChangeRecord>,
}

/// Admin repair of a device cursor (`POST /sync/cursor`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorRepairRequest {
    /// The device whose cursor is repaired.
    pub device_id: String,
}
