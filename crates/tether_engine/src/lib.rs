//! # Tether Sync Engine
//!
//! Client-side object synchronization engine for tether.
//!
//! This crate provides:
//! - [`SyncEngine`], the orchestrator owning the canonical state
//! - [`merge`], deep merge of partial change requests
//! - [`NotificationBus`], synchronous lifecycle pub/sub
//! - [`HistoryLedger`], an append-only log of applied patch documents
//! - [`Transport`], the remote-peer capability, with polling-HTTP,
//!   single-shot-HTTP, and socket variants built in
//!
//! ## Architecture
//!
//! The engine implements an **optimistic local mutation** model:
//! 1. A partial change request is deep-merged into a working copy of the
//!    canonical state
//! 2. The old and new snapshots are diffed into a patch document, which is
//!    appended to the history ledger and sent to the remote peer
//! 3. The peer's counter-patch is applied strictly after the local merge, so
//!    remote edits win at any path they touch
//!
//! ## Key Invariants
//!
//! - Canonical state is never aliased outside the engine; reads are clones
//! - History records client-intended patches even when the remote later
//!   amends state further
//! - Overlapping calls share their pre-call snapshot as the merge base and
//!   the last round-trip to resolve wins (no implicit serialization)

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bus;
mod config;
mod engine;
mod error;
mod history;
mod http;
pub mod merge;
mod socket;
mod transport;

pub use bus::{EventKind, EventSelector, NotificationBus, SubscriptionId};
pub use config::{
    PollingHttpConfig, SingleShotHttpConfig, SocketConfig, TransportConfig, TransportSpec,
};
pub use engine::{SyncEngine, SyncStats};
pub use error::{SyncError, SyncResult};
pub use history::HistoryLedger;
pub use http::{DefaultHttpClient, HttpClient, PollingHttpTransport, SingleShotHttpTransport};
pub use socket::{MessageSocket, SocketTransport};
pub use transport::{
    CacheMode, CredentialsMode, MockTransport, RedirectPolicy, RequestOptions, Transport,
    UpdateHook,
};

pub use tether_protocol::{empty_patch, Change, PatchDocument, SequenceOp};
