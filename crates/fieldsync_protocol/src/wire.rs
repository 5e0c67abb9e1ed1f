//! JSON wire helpers shared by clients and servers.
//!
//! Every body on the wire is UTF-8 JSON. These helpers exist so that
//! callers deal in [`ProtocolError`] rather than raw `serde_json`
//! errors at each call site.

use crate::error::ProtocolResult;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encodes a message to JSON bytes.
pub fn encode<T: Serialize>(value: &T) -> ProtocolResult<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

/// Decodes a message from JSON bytes.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> ProtocolResult<T> {
    Ok(serde_json::from_slice(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::PushReceipt;

    #[test]
    fn round_trips_a_message() {
        let receipt = PushReceipt::accepted(1);
        let bytes = encode(&receipt).unwrap();
        let back: PushReceipt = decode(&bytes).unwrap();
        assert_eq!(back, receipt);
    }

    #[test]
    fn decode_rejects_malformed_bytes() {
        let result: ProtocolResult<PushReceipt> = decode(b"not json");
        assert!(result.is_err());
    }
}
