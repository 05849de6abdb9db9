//! The sync engine orchestrator.

use crate::bus::{EventKind, EventSelector, NotificationBus, SubscriptionId};
use crate::config::TransportSpec;
use crate::error::{SyncError, SyncResult};
use crate::history::HistoryLedger;
use crate::merge;
use crate::transport::{RequestOptions, Transport, UpdateHook};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::sync::Arc;
use tether_protocol::{Change, PatchDocument};
use tracing::debug;

/// Counters describing the engine's activity so far.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Completed `fetch()` round-trips.
    pub fetches: u64,
    /// Completed `change()`/`patch()` round-trips.
    pub changes_sent: u64,
    /// Counter-patch operations applied from the remote peer.
    pub remote_ops_applied: u64,
    /// Last failure message, cleared only by construction.
    pub last_error: Option<String>,
}

/// Client-side synchronization engine.
///
/// Owns the canonical state exclusively: reads return structural clones and
/// mutation happens only through [`change`](SyncEngine::change),
/// [`patch`](SyncEngine::patch), [`fetch`](SyncEngine::fetch), or the
/// polling lifecycle.
///
/// Overlapping calls are not serialized: each reads the same pre-call state
/// as its merge base, and whichever round-trip resolves last overwrites the
/// canonical state wholesale. Callers wanting stronger ordering await each
/// call before issuing the next.
pub struct SyncEngine {
    state: Arc<RwLock<Value>>,
    transport: Arc<dyn Transport>,
    bus: NotificationBus,
    history: HistoryLedger,
    stats: RwLock<SyncStats>,
}

impl SyncEngine {
    /// Creates an engine over `spec`, cloning `initial` as the starting
    /// canonical state.
    ///
    /// Fails with [`SyncError::Configuration`] when a tagged configuration
    /// is missing required parameters for its variant.
    pub fn new(spec: impl Into<TransportSpec>, initial: Value) -> SyncResult<Self> {
        let transport = spec.into().into_transport()?;
        Ok(Self {
            state: Arc::new(RwLock::new(initial)),
            transport,
            bus: NotificationBus::new(),
            history: HistoryLedger::new(),
            stats: RwLock::new(SyncStats::default()),
        })
    }

    /// Creates an engine starting from an empty object.
    pub fn with_empty_state(spec: impl Into<TransportSpec>) -> SyncResult<Self> {
        Self::new(spec, Value::Object(Map::new()))
    }

    /// Returns a clone of the canonical state. No I/O, no events.
    pub fn get(&self) -> Value {
        self.state.read().clone()
    }

    /// Fetches the full remote object and replaces the canonical state
    /// wholesale.
    ///
    /// Emits `get:start` before the round-trip and `get:end` with the new
    /// state after; on failure emits `get:error` and propagates. Never
    /// appends to history.
    pub async fn fetch(&self) -> SyncResult<Value> {
        self.bus.notify(EventKind::GetStart, &Value::Null);
        debug!("fetching remote state");
        match self.transport.get().await {
            Ok(remote) => {
                *self.state.write() = remote.clone();
                self.stats.write().fetches += 1;
                self.bus.notify(EventKind::GetEnd, &remote);
                Ok(remote)
            }
            Err(error) => {
                self.record_error(&error);
                self.bus
                    .notify(EventKind::GetError, &Value::String(error.to_string()));
                Err(error)
            }
        }
    }

    /// Applies a partial change request locally, sends the resulting diff,
    /// and reconciles the remote counter-patch.
    ///
    /// The local diff is appended to history before the round-trip and is
    /// never rolled back, even when the transport fails afterwards. The
    /// counter-patch is applied strictly after the local merge, so remote
    /// edits win at any path they touch while paths the remote left alone
    /// keep the caller's edit.
    pub async fn change(&self, change: &Change) -> SyncResult<Value> {
        self.bus.notify(EventKind::PatchStart, &Value::Null);
        let base = self.get();
        let mut next = base.clone();
        merge::apply(&mut next, change);
        let local = json_patch::diff(&base, &next);
        self.history.append(local.clone());
        debug!(operations = local.0.len(), "sending local change diff");
        self.finish(self.round_trip(local, next).await)
    }

    /// Moves the canonical state to a fully specified target object.
    ///
    /// Same protocol as [`change`](SyncEngine::change), except the diff is
    /// computed directly against `target` with no merge step.
    pub async fn patch(&self, target: Value) -> SyncResult<Value> {
        self.bus.notify(EventKind::PatchStart, &Value::Null);
        let base = self.get();
        let local = json_patch::diff(&base, &target);
        self.history.append(local.clone());
        debug!(operations = local.0.len(), "sending full-object diff");
        self.finish(self.round_trip(local, target).await)
    }

    async fn round_trip(&self, local: PatchDocument, mut next: Value) -> SyncResult<Value> {
        let counter = self.transport.patch(&local).await?;
        if !counter.0.is_empty() {
            debug!(operations = counter.0.len(), "applying remote counter-patch");
            json_patch::patch(&mut next, &counter)?;
        }
        {
            let mut stats = self.stats.write();
            stats.changes_sent += 1;
            stats.remote_ops_applied += counter.0.len() as u64;
        }
        *self.state.write() = next.clone();
        Ok(next)
    }

    fn finish(&self, result: SyncResult<Value>) -> SyncResult<Value> {
        match result {
            Ok(state) => {
                self.bus.notify(EventKind::PatchEnd, &state);
                Ok(state)
            }
            Err(error) => {
                self.record_error(&error);
                self.bus
                    .notify(EventKind::PatchError, &Value::String(error.to_string()));
                Err(error)
            }
        }
    }

    /// Subscribes a callback. Returns an identifier usable with
    /// [`off`](SyncEngine::off).
    ///
    /// Selectors parse from the string surface: `"get"` is shorthand for
    /// `get:end`, and `"*"` registers against exactly the four non-error
    /// kinds.
    pub fn on<S, F>(&self, selector: S, callback: F) -> SubscriptionId
    where
        S: Into<EventSelector>,
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.bus.subscribe(selector.into(), callback)
    }

    /// Removes a subscription. Returns true if anything was removed.
    pub fn off(&self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    /// Invokes the subscribers for `kind` synchronously, in subscription
    /// order, each receiving a clone of `data`.
    pub fn notify(&self, kind: EventKind, data: Value) {
        self.bus.notify(kind, &data);
    }

    /// Merges request options into the transport configuration.
    pub fn configure(&self, options: RequestOptions) {
        self.transport.configure(options);
    }

    /// Starts the transport's polling lifecycle, wiring each periodic
    /// `get()` result back into the canonical state. Returns false when the
    /// transport does not poll.
    pub fn start(&self) -> bool {
        let state = Arc::clone(&self.state);
        let hook: UpdateHook = Arc::new(move |value: Value| {
            *state.write() = value;
        });
        self.transport.start(hook)
    }

    /// Stops the transport's polling lifecycle.
    pub fn stop(&self) {
        self.transport.stop();
    }

    /// Returns the `n` most recent history entries, oldest first.
    pub fn history(&self, n: usize) -> Vec<PatchDocument> {
        self.history.recent(n)
    }

    /// Returns the whole history ledger, oldest first.
    pub fn history_all(&self) -> Vec<PatchDocument> {
        self.history.all()
    }

    /// Returns a snapshot of the activity counters.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    fn record_error(&self, error: &SyncError) {
        self.stats.write().last_error = Some(error.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use serde_json::json;

    fn engine_over(transport: Arc<MockTransport>, initial: Value) -> SyncEngine {
        let transport: Arc<dyn Transport> = transport;
        SyncEngine::new(TransportSpec::Instance(transport), initial).unwrap()
    }

    #[test]
    fn get_returns_a_clone() {
        let transport = Arc::new(MockTransport::new());
        let engine = engine_over(transport, json!({"a": [1, 2]}));

        let mut snapshot = engine.get();
        snapshot["a"] = json!("mutated");
        assert_eq!(engine.get(), json!({"a": [1, 2]}));
    }

    #[tokio::test]
    async fn fetch_replaces_state_wholesale() {
        let transport = Arc::new(MockTransport::new());
        transport.set_remote_state(json!({"fresh": true}));
        let engine = engine_over(Arc::clone(&transport), json!({"stale": 1, "extra": 2}));

        let state = engine.fetch().await.unwrap();
        assert_eq!(state, json!({"fresh": true}));
        assert_eq!(engine.get(), json!({"fresh": true}));
        assert!(engine.history_all().is_empty());
        assert_eq!(engine.stats().fetches, 1);
    }

    #[tokio::test]
    async fn change_merges_diffs_and_records_history() {
        let transport = Arc::new(MockTransport::new());
        let engine = engine_over(Arc::clone(&transport), json!({"a": "a", "b": "b"}));

        let state = engine
            .change(&Change::from(json!({"a": "not a"})))
            .await
            .unwrap();

        assert_eq!(state, json!({"a": "not a", "b": "b"}));
        assert_eq!(engine.history_all().len(), 1);
        assert_eq!(transport.sent_patches().len(), 1);
        // The diff touches only the changed path.
        let sent = serde_json::to_value(&transport.sent_patches()[0]).unwrap();
        assert_eq!(sent, json!([{"op": "replace", "path": "/a", "value": "not a"}]));
    }

    #[tokio::test]
    async fn remote_counter_patch_wins_where_it_touches() {
        let transport = Arc::new(MockTransport::new());
        transport.queue_counter_patch(
            serde_json::from_value(json!([{"op": "replace", "path": "/b", "value": "not b"}]))
                .unwrap(),
        );
        let engine = engine_over(
            Arc::clone(&transport),
            json!({"a": "a", "b": "b", "c": "c"}),
        );

        let state = engine
            .change(&Change::from(json!({"a": "not a"})))
            .await
            .unwrap();

        assert_eq!(state, json!({"a": "not a", "b": "not b", "c": "c"}));
        assert_eq!(engine.stats().remote_ops_applied, 1);
    }

    #[tokio::test]
    async fn patch_diffs_against_the_full_target() {
        let transport = Arc::new(MockTransport::new());
        let engine = engine_over(Arc::clone(&transport), json!({"a": 1, "b": 2}));

        let state = engine.patch(json!({"a": 1, "c": 3})).await.unwrap();
        assert_eq!(state, json!({"a": 1, "c": 3}));
        // Unlike change(), unmentioned keys do not survive: the target is
        // fully specified.
        assert!(state.get("b").is_none());
        assert_eq!(engine.history_all().len(), 1);
    }

    #[tokio::test]
    async fn transport_failure_keeps_the_history_entry() {
        let transport = Arc::new(MockTransport::new());
        transport.fail_next_request();
        let engine = engine_over(Arc::clone(&transport), json!({"a": 1}));

        let result = engine.change(&Change::from(json!({"a": 2}))).await;
        assert!(matches!(result, Err(SyncError::Transport(_))));
        assert_eq!(engine.history_all().len(), 1);
        // The failed round-trip never wrote back.
        assert_eq!(engine.get(), json!({"a": 1}));
        assert!(engine.stats().last_error.is_some());
    }

    #[tokio::test]
    async fn no_op_change_sends_an_empty_diff() {
        let transport = Arc::new(MockTransport::new());
        let engine = engine_over(Arc::clone(&transport), json!({"a": 1}));

        engine.change(&Change::from(json!({"a": 1}))).await.unwrap();
        assert!(transport.sent_patches()[0].0.is_empty());
        assert_eq!(engine.history_all().len(), 1);
    }

    #[tokio::test]
    async fn configure_reaches_the_transport() {
        let transport = Arc::new(MockTransport::new());
        let engine = engine_over(Arc::clone(&transport), json!({}));

        engine.configure(RequestOptions::new().with_header("X-Auth", "token"));
        assert_eq!(
            transport.configured_options().header("X-Auth"),
            Some("token")
        );
    }

    #[test]
    fn start_reports_non_polling_transports() {
        let transport = Arc::new(MockTransport::new());
        let engine = engine_over(transport, json!({}));
        assert!(!engine.start());
        engine.stop();
    }

    #[test]
    fn history_window() {
        let transport = Arc::new(MockTransport::new());
        let engine = engine_over(transport, json!({}));
        assert!(engine.history(5).is_empty());
        assert!(engine.history_all().is_empty());
    }
}
