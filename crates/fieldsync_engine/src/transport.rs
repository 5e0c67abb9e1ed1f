//! Transport abstraction for talking to a sync server.

use crate::error::{EngineError, EngineResult};
use fieldsync_protocol::{
    ConflictReport, ConflictRequest, CursorRepairRequest, ProtocolError, PullRequest, PullResponse,
    PushReceipt, PushRequest, SyncCursor,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

/// A sync transport carries requests to the server and responses back.
///
/// This trait hides the network layer so the coordinator can run against
/// HTTP, a loopback server, or a mock.
pub trait SyncTransport: Send + Sync {
    /// Fetches a page of changes after the device's cursor.
    fn pull(&self, request: &PullRequest) -> EngineResult<PullResponse>;

    /// Submits outbox entries; one receipt comes back per entry.
    fn push(&self, request: &PushRequest) -> EngineResult<Vec<PushReceipt>>;

    /// Previews which proposed changes would conflict.
    fn conflicts(&self, request: &ConflictRequest) -> EngineResult<Vec<ConflictReport>>;

    /// Repairs the device's server-side cursor to the latest version.
    fn repair_cursor(&self, request: &CursorRepairRequest) -> EngineResult<SyncCursor>;

    /// True while the transport believes the server is reachable.
    fn is_connected(&self) -> bool;

    /// Tears the connection down; the transport reports disconnected afterwards.
    fn close(&self) -> EngineResult<()>;
}

/// A scripted transport for testing.
///
/// Responses are queues rather than single slots because one sync cycle can
/// issue several pulls when the server pages. Each call pops the next queued
/// response; an empty queue is a protocol error so a test fails loudly when
/// the script runs short. Requests are recorded for assertions.
#[derive(Default)]
pub struct MockTransport {
    connected: AtomicBool,
    pull_responses: Mutex<VecDeque<PullResponse>>,
    push_responses: Mutex<VecDeque<Vec<PushReceipt>>>,
    conflict_responses: Mutex<VecDeque<Vec<ConflictReport>>>,
    repair_responses: Mutex<VecDeque<SyncCursor>>,
    pull_requests: Mutex<Vec<PullRequest>>,
    push_requests: Mutex<Vec<PushRequest>>,
}

impl MockTransport {
    /// Creates a connected mock transport with empty scripts.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            ..Self::default()
        }
    }

    /// Queues the next pull response.
    pub fn queue_pull_response(&self, response: PullResponse) {
        self.pull_responses.lock().push_back(response);
    }

    /// Queues the next set of push receipts.
    pub fn queue_push_receipts(&self, receipts: Vec<PushReceipt>) {
        self.push_responses.lock().push_back(receipts);
    }

    /// Queues the next conflict preview.
    pub fn queue_conflict_reports(&self, reports: Vec<ConflictReport>) {
        self.conflict_responses.lock().push_back(reports);
    }

    /// Queues the next repaired cursor.
    pub fn queue_repaired_cursor(&self, cursor: SyncCursor) {
        self.repair_responses.lock().push_back(cursor);
    }

    /// Flips the scripted connectivity.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Returns every pull request seen so far.
    pub fn pull_requests(&self) -> Vec<PullRequest> {
        self.pull_requests.lock().clone()
    }

    /// Returns every push request seen so far.
    pub fn push_requests(&self) -> Vec<PushRequest> {
        self.push_requests.lock().clone()
    }

    fn next<T>(queue: &Mutex<VecDeque<T>>, what: &str) -> EngineResult<T> {
        queue.lock().pop_front().ok_or_else(|| {
            EngineError::Protocol(ProtocolError::invalid_message(format!(
                "no mock {what} response queued"
            )))
        })
    }
}

impl SyncTransport for MockTransport {
    fn pull(&self, request: &PullRequest) -> EngineResult<PullResponse> {
        if !self.is_connected() {
            return Err(EngineError::NotConnected);
        }
        self.pull_requests.lock().push(request.clone());
        Self::next(&self.pull_responses, "pull")
    }

    fn push(&self, request: &PushRequest) -> EngineResult<Vec<PushReceipt>> {
        if !self.is_connected() {
            return Err(EngineError::NotConnected);
        }
        self.push_requests.lock().push(request.clone());
        Self::next(&self.push_responses, "push")
    }

    fn conflicts(&self, _request: &ConflictRequest) -> EngineResult<Vec<ConflictReport>> {
        if !self.is_connected() {
            return Err(EngineError::NotConnected);
        }
        Self::next(&self.conflict_responses, "conflict")
    }

    fn repair_cursor(&self, _request: &CursorRepairRequest) -> EngineResult<SyncCursor> {
        if !self.is_connected() {
            return Err(EngineError::NotConnected);
        }
        Self::next(&self.repair_responses, "cursor repair")
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn close(&self) -> EngineResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_disconnects_even_after_reconnecting() {
        let transport = MockTransport::new();
        assert!(transport.is_connected());

        transport.set_connected(false);
        assert!(!transport.is_connected());

        transport.set_connected(true);
        transport.close().unwrap();
        assert!(!transport.is_connected());
    }

    #[test]
    fn disconnected_mock_refuses_requests() {
        let transport = MockTransport::new();
        transport.set_connected(false);

        let request = PullRequest::new("device-1", 0);
        let result = transport.pull(&request);
        assert!(matches!(result, Err(EngineError::NotConnected)));
    }

    #[test]
    fn responses_pop_in_queue_order() {
        let transport = MockTransport::new();
        transport.queue_pull_response(PullResponse::new(vec![], 1, true, false));
        transport.queue_pull_response(PullResponse::new(vec![], 2, false, false));

        let request = PullRequest::new("device-1", 0);
        assert_eq!(transport.pull(&request).unwrap().cursor, "1");
        assert_eq!(transport.pull(&request).unwrap().cursor, "2");
        assert!(transport.pull(&request).is_err());
        assert_eq!(transport.pull_requests().len(), 3);
    }
}
