//! Failures raised while serving sync requests.

use thiserror::Error;

/// Result alias used across the server crate.
pub type ServerResult<T> = Result<T, ServerError>;

/// Ways a request or the server's own state can go wrong.
///
/// The split between client and server faults drives the HTTP status the
/// handler answers with, so every new variant must land in exactly one of
/// [`ServerError::is_client_error`] or [`ServerError::is_server_error`].
#[derive(Error, Debug)]
pub enum ServerError {
    /// The request is structurally fine but semantically unusable.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No handler for the requested method and path.
    #[error("no route for {method} {path}")]
    UnknownRoute {
        /// HTTP method of the request.
        method: String,
        /// Request path.
        path: String,
    },

    /// The request body did not decode as a sync message.
    #[error("protocol violation: {0}")]
    Protocol(#[from] fieldsync_protocol::ProtocolError),

    /// The journal backend failed underneath the change log.
    #[error("storage error: {0}")]
    Storage(#[from] fieldsync_storage::StorageError),

    /// The journal holds a record the server cannot interpret.
    #[error("journal corruption: {message}")]
    JournalCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// Another process holds the server directory.
    #[error("server locked: another process has exclusive access")]
    ServerLocked,

    /// The server directory is missing or malformed.
    #[error("invalid server layout: {message}")]
    InvalidLayout {
        /// Description of the layout issue.
        message: String,
    },

    /// An I/O operation outside the journal failed.
    #[error("server I/O: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Shorthand for [`ServerError::JournalCorruption`].
    pub fn journal_corruption(message: impl Into<String>) -> Self {
        Self::JournalCorruption {
            message: message.into(),
        }
    }

    /// Shorthand for [`ServerError::InvalidLayout`].
    pub fn invalid_layout(message: impl Into<String>) -> Self {
        Self::InvalidLayout {
            message: message.into(),
        }
    }

    /// Shorthand for [`ServerError::UnknownRoute`].
    pub fn unknown_route(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self::UnknownRoute {
            method: method.into(),
            path: path.into(),
        }
    }

    /// The caller sent something wrong; answered as 4xx.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::InvalidRequest(_)
                | ServerError::UnknownRoute { .. }
                | ServerError::Protocol(_)
        )
    }

    /// The server itself failed; answered as 5xx.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }
}
