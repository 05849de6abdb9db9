//! # Tether Sync Protocol
//!
//! Protocol types and JSON wire codecs for the tether sync engine.
//!
//! This crate provides:
//! - [`Change`] and [`SequenceOp`] for partial change requests
//! - [`PatchDocument`] (RFC 6902) re-exported from `json-patch`
//! - JSON encoding/decoding for the HTTP-family wire payloads
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change;
mod document;

pub use change::{Change, SequenceOp};
pub use document::{
    decode_patch, decode_state, empty_patch, encode_patch, encode_state, CodecError,
    CodecResult, PatchDocument,
};
