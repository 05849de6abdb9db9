//! Synchronous notification bus for engine lifecycle events.
//!
//! In-process pub/sub with no queuing and no cross-thread delivery: callbacks
//! run synchronously on the notifying task, in subscription order, each with
//! its own clone of the event data. A panicking callback is caught and logged
//! so siblings still run and the in-flight sync operation is unaffected.

use crate::error::{SyncError, SyncResult};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// The closed set of lifecycle events the engine emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A fetch round-trip is starting.
    GetStart,
    /// A fetch round-trip completed; data is the new state.
    GetEnd,
    /// A fetch round-trip failed; data is the error message.
    GetError,
    /// A change/patch round-trip is starting.
    PatchStart,
    /// A change/patch round-trip completed; data is the new state.
    PatchEnd,
    /// A change/patch round-trip failed; data is the error message.
    PatchError,
}

impl EventKind {
    /// The kinds a wildcard subscription expands to. The `:error` kinds are
    /// never registered implicitly.
    pub const WILDCARD: [EventKind; 4] = [
        EventKind::GetStart,
        EventKind::GetEnd,
        EventKind::PatchStart,
        EventKind::PatchEnd,
    ];

    /// The event's wire-style name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::GetStart => "get:start",
            EventKind::GetEnd => "get:end",
            EventKind::GetError => "get:error",
            EventKind::PatchStart => "patch:start",
            EventKind::PatchEnd => "patch:end",
            EventKind::PatchError => "patch:error",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = SyncError;

    fn from_str(s: &str) -> SyncResult<Self> {
        match s {
            "get:start" => Ok(EventKind::GetStart),
            "get:end" => Ok(EventKind::GetEnd),
            "get:error" => Ok(EventKind::GetError),
            "patch:start" => Ok(EventKind::PatchStart),
            "patch:end" => Ok(EventKind::PatchEnd),
            "patch:error" => Ok(EventKind::PatchError),
            other => Err(SyncError::UnknownEvent(other.to_string())),
        }
    }
}

/// Selects which events a subscription receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSelector {
    /// A single event kind.
    Kind(EventKind),
    /// All non-error kinds; expanded to per-kind registration at subscribe
    /// time.
    All,
}

impl EventSelector {
    pub(crate) fn kinds(self) -> Vec<EventKind> {
        match self {
            EventSelector::Kind(kind) => vec![kind],
            EventSelector::All => EventKind::WILDCARD.to_vec(),
        }
    }
}

impl From<EventKind> for EventSelector {
    fn from(kind: EventKind) -> Self {
        EventSelector::Kind(kind)
    }
}

/// Parses the string subscription surface: `*` is the wildcard, and a name
/// lacking a `:start`/`:end` suffix is shorthand for the `:end` kind.
impl FromStr for EventSelector {
    type Err = SyncError;

    fn from_str(s: &str) -> SyncResult<Self> {
        match s {
            "*" => Ok(EventSelector::All),
            "get" => Ok(EventSelector::Kind(EventKind::GetEnd)),
            "patch" => Ok(EventSelector::Kind(EventKind::PatchEnd)),
            other => other.parse::<EventKind>().map(EventSelector::Kind),
        }
    }
}

/// Identifies a subscription for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Arc<dyn Fn(Value) + Send + Sync>;

struct Subscriber {
    id: SubscriptionId,
    callback: Callback,
}

/// Synchronous pub/sub keyed by lifecycle event kind.
pub struct NotificationBus {
    channels: RwLock<HashMap<EventKind, Vec<Subscriber>>>,
    next_id: AtomicU64,
}

impl NotificationBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a callback for the selected events.
    ///
    /// A wildcard selector registers the callback against each non-error
    /// kind individually; the returned id removes all of them at once.
    pub fn subscribe<F>(&self, selector: EventSelector, callback: F) -> SubscriptionId
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let callback: Callback = Arc::new(callback);

        let mut channels = self.channels.write();
        for kind in selector.kinds() {
            channels.entry(kind).or_default().push(Subscriber {
                id,
                callback: Arc::clone(&callback),
            });
        }
        id
    }

    /// Removes a subscription everywhere it was registered. Returns true if
    /// anything was removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut removed = false;
        let mut channels = self.channels.write();
        for subscribers in channels.values_mut() {
            let before = subscribers.len();
            subscribers.retain(|s| s.id != id);
            removed |= subscribers.len() != before;
        }
        removed
    }

    /// Invokes the subscribers for `kind` synchronously, in subscription
    /// order, each receiving a clone of `data`.
    ///
    /// Callbacks run outside the bus lock, so a callback may subscribe or
    /// unsubscribe without deadlocking.
    pub fn notify(&self, kind: EventKind, data: &Value) {
        let callbacks: Vec<Callback> = {
            let channels = self.channels.read();
            channels
                .get(&kind)
                .map(|subs| subs.iter().map(|s| Arc::clone(&s.callback)).collect())
                .unwrap_or_default()
        };

        for callback in callbacks {
            let payload = data.clone();
            if catch_unwind(AssertUnwindSafe(|| callback(payload))).is_err() {
                warn!(event = kind.as_str(), "subscriber panicked during notification");
            }
        }
    }

    /// Returns the number of subscribers registered for `kind`.
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.channels
            .read()
            .get(&kind)
            .map(|subs| subs.len())
            .unwrap_or(0)
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}
