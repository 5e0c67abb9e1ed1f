//! Failures a sync cycle can surface.

use fieldsync_protocol::ProtocolError;
use fieldsync_store::StoreError;
use thiserror::Error;

/// Result alias for coordinator and transport calls.
pub type EngineResult<T> = Result<T, EngineError>;

/// Everything that can stop a push or pull.
///
/// Transport failures carry a `retryable` flag so the retry loop can tell a
/// dropped connection from a rejection that will never succeed.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The request never completed, or the server answered with a failure
    /// status.
    #[error("transport failure: {message}")]
    Transport {
        /// Description of what went wrong.
        message: String,
        /// Whether a later attempt could succeed.
        retryable: bool,
    },

    /// The server answered, but with a body this client cannot decode.
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolError),

    /// The local store refused to queue or apply a change.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// No transport is reachable right now.
    #[error("device is offline")]
    NotConnected,
}

impl EngineError {
    /// Transport failure worth retrying, such as a timeout or reset.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Transport failure that retrying cannot fix.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Whether the retry loop should take another attempt at this.
    ///
    /// Being offline counts as retryable; the device may come back into
    /// coverage before the next attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Transport {
                retryable: true,
                ..
            } | EngineError::NotConnected
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_flag_drives_retryability() {
        assert!(EngineError::transport_retryable("timed out").is_retryable());
        assert!(!EngineError::transport_fatal("410 gone").is_retryable());
    }

    #[test]
    fn offline_is_retryable_but_bad_data_is_not() {
        assert!(EngineError::NotConnected.is_retryable());

        let undecodable = EngineError::Protocol(ProtocolError::invalid_message("bad cursor"));
        assert!(!undecodable.is_retryable());
    }
}
