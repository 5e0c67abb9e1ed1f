//! HTTP transport and the in-process loopback client.
//!
//! The actual HTTP client sits behind a trait so callers can plug in
//! whatever library they already ship (reqwest, ureq, a platform webview
//! bridge), or route requests straight into an in-process server.

use crate::error::{EngineError, EngineResult};
use crate::transport::SyncTransport;
use fieldsync_protocol::{
    endpoints, wire, ConflictReport, ConflictRequest, CursorRepairRequest, PullRequest,
    PullResponse, PushReceipt, PushRequest, SyncCursor,
};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};

/// The slice of an HTTP library the transport needs.
///
/// Implementations return the response body on success and a message on
/// failure; non-2xx statuses are failures.
pub trait HttpClient: Send + Sync {
    /// Issues a GET and returns the response body.
    fn get(&self, url: &str) -> Result<Vec<u8>, String>;

    /// Issues a POST carrying a JSON body and returns the response body.
    fn post(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>, String>;

    /// Whether the client believes it can reach the network right now.
    fn is_healthy(&self) -> bool;
}

/// HTTP-based sync transport speaking the JSON wire format.
///
/// `healthy` tracks the outcome of the most recent request. A failed
/// request flips it off and a later success flips it back on, so one bad
/// request does not strand the transport. Only [`close`](SyncTransport::close)
/// is terminal.
pub struct HttpTransport<C: HttpClient> {
    /// Server origin requests are issued against.
    base_url: String,
    /// Underlying HTTP library.
    client: C,
    /// Whether the most recent request succeeded.
    healthy: AtomicBool,
    /// Set once by `close`.
    closed: AtomicBool,
    /// Message of the most recent failure.
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Wraps `client` for the server at `base_url`.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into(),
            client,
            healthy: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            last_error: RwLock::new(None),
        }
    }

    /// Server origin this transport talks to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Most recent transport failure, if any.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn check_usable(&self) -> EngineResult<()> {
        if self.closed.load(Ordering::SeqCst) || !self.client.is_healthy() {
            return Err(EngineError::NotConnected);
        }
        Ok(())
    }

    fn settle(&self, sent: Result<Vec<u8>, String>) -> EngineResult<Vec<u8>> {
        match sent {
            Ok(body) => {
                self.healthy.store(true, Ordering::SeqCst);
                *self.last_error.write() = None;
                Ok(body)
            }
            Err(message) => {
                self.healthy.store(false, Ordering::SeqCst);
                *self.last_error.write() = Some(message.clone());
                Err(EngineError::transport_retryable(message))
            }
        }
    }

    fn get_json<Res: DeserializeOwned>(&self, path_and_query: &str) -> EngineResult<Res> {
        self.check_usable()?;
        let url = format!("{}{}", self.base_url, path_and_query);
        let body = self.settle(self.client.get(&url))?;
        Ok(wire::decode(&body)?)
    }

    fn post_json<Req, Res>(&self, endpoint: &str, request: &Req) -> EngineResult<Res>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        self.check_usable()?;
        let body = wire::encode(request)?;
        let url = format!("{}{}", self.base_url, endpoint);
        let response = self.settle(self.client.post(&url, body))?;
        Ok(wire::decode(&response)?)
    }
}

impl<C: HttpClient> SyncTransport for HttpTransport<C> {
    fn pull(&self, request: &PullRequest) -> EngineResult<PullResponse> {
        let path = format!("{}?{}", endpoints::CHANGES, request.to_query());
        self.get_json(&path)
    }

    fn push(&self, request: &PushRequest) -> EngineResult<Vec<PushReceipt>> {
        self.post_json(endpoints::CHANGES, request)
    }

    fn conflicts(&self, request: &ConflictRequest) -> EngineResult<Vec<ConflictReport>> {
        self.post_json(endpoints::CONFLICTS, request)
    }

    fn repair_cursor(&self, request: &CursorRepairRequest) -> EngineResult<SyncCursor> {
        self.post_json(endpoints::CURSOR, request)
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
            && self.client.is_healthy()
            && self.healthy.load(Ordering::SeqCst)
    }

    fn close(&self) -> EngineResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// A server that can answer loopback requests in-process.
///
/// The request shape matches the HTTP surface: a method, a path with an
/// optional query string, and a JSON body.
pub trait LoopbackServer: Send + Sync {
    /// Handles one request and returns the response body.
    fn handle_request(&self, method: &str, path_and_query: &str, body: &[u8])
        -> Result<Vec<u8>, String>;
}

/// An HTTP client that routes requests directly to a [`LoopbackServer`].
///
/// Useful for tests and for embedding client and server in one process.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
}

impl<S: LoopbackServer> LoopbackClient<S> {
    /// Routes every request into `server`.
    pub fn new(server: S) -> Self {
        Self { server }
    }
}

impl<S: LoopbackServer> HttpClient for LoopbackClient<S> {
    fn get(&self, url: &str) -> Result<Vec<u8>, String> {
        self.server.handle_request("GET", strip_origin(url), &[])
    }

    fn post(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>, String> {
        self.server.handle_request("POST", strip_origin(url), &body)
    }

    fn is_healthy(&self) -> bool {
        true
    }
}

/// Drops the scheme and host, leaving the path and query.
fn strip_origin(url: &str) -> &str {
    url.find("/sync/").map(|i| &url[i..]).unwrap_or(url)
}
