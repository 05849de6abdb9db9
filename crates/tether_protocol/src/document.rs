//! Patch documents and wire codecs.
//!
//! The HTTP-family wire payloads are plain JSON: a GET response body is the
//! full state object, a PATCH request body is an RFC 6902 array of
//! operations, and a PATCH response body is the server's counter-patch (an
//! empty array when the server has nothing to amend).

use json_patch::Patch;
use serde_json::Value;
use thiserror::Error;

/// An ordered RFC 6902 edit-operation document.
///
/// Produced by diffing two state snapshots or supplied by the remote peer.
pub type PatchDocument = Patch;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors raised while encoding or decoding wire payloads.
#[derive(Error, Debug)]
pub enum CodecError {
    /// The body was not valid JSON, or did not match the expected shape.
    #[error("invalid JSON body: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Returns a patch document with no operations.
pub fn empty_patch() -> PatchDocument {
    Patch(Vec::new())
}

/// Encodes a patch document as a JSON array of operations.
pub fn encode_patch(patch: &PatchDocument) -> CodecResult<Vec<u8>> {
    Ok(serde_json::to_vec(patch)?)
}

/// Decodes a JSON array of operations into a patch document.
pub fn decode_patch(bytes: &[u8]) -> CodecResult<PatchDocument> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Encodes a full state object as a JSON body.
pub fn encode_state(state: &Value) -> CodecResult<Vec<u8>> {
    Ok(serde_json::to_vec(state)?)
}

/// Decodes a JSON body into a full state object.
pub fn decode_state(bytes: &[u8]) -> CodecResult<Value> {
    Ok(serde_json::from_slice(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn patch_round_trip() {
        let patch: PatchDocument = serde_json::from_value(json!([
            {"op": "replace", "path": "/b", "value": "not b"},
            {"op": "remove", "path": "/c"},
        ]))
        .unwrap();

        let bytes = encode_patch(&patch).unwrap();
        let decoded = decode_patch(&bytes).unwrap();
        assert_eq!(decoded, patch);
        assert_eq!(decoded.0.len(), 2);
    }

    #[test]
    fn empty_counter_patch() {
        let decoded = decode_patch(b"[]").unwrap();
        assert!(decoded.0.is_empty());
        assert_eq!(decoded, empty_patch());
    }

    #[test]
    fn non_json_body_is_an_error() {
        assert!(decode_patch(b"<html>502</html>").is_err());
        assert!(decode_state(b"not json at all").is_err());
    }

    #[test]
    fn state_round_trip() {
        let state = decode_state(br#"{"a": 1, "b": [true, null]}"#).unwrap();
        assert_eq!(state, json!({"a": 1, "b": [true, null]}));

        let bytes = encode_state(&state).unwrap();
        assert_eq!(decode_state(&bytes).unwrap(), state);
    }
}
