//! Transport capability for talking to the remote peer.
//!
//! The trait abstracts the exchange protocol away from any concrete wire:
//! HTTP variants, a socket variant, and test doubles all implement the same
//! contract. Transport operations are asynchronous and never cancelled or
//! timed out by the engine itself.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tether_protocol::{empty_patch, PatchDocument};

/// Callback receiving each periodic `get()` result from a polling transport.
pub type UpdateHook = Arc<dyn Fn(Value) + Send + Sync>;

/// A remote peer the engine synchronizes against.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetches the full remote object.
    async fn get(&self) -> SyncResult<Value>;

    /// Sends a patch document and returns the peer's counter-patch (empty
    /// when the peer has nothing to amend).
    async fn patch(&self, patch: &PatchDocument) -> SyncResult<PatchDocument>;

    /// Merges request options into the transport's configuration.
    /// Recognized options are variant-specific; unrecognized ones are
    /// ignored.
    fn configure(&self, options: RequestOptions);

    /// Begins the periodic-polling lifecycle, invoking `on_update` with each
    /// interval's `get()` result. Returns false when the transport does not
    /// poll.
    fn start(&self, on_update: UpdateHook) -> bool {
        let _ = on_update;
        false
    }

    /// Ends the periodic-polling lifecycle.
    fn stop(&self) {}
}

/// Options applied to outgoing requests.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Header name/value pairs. A later value for the same name replaces
    /// the earlier one.
    pub headers: Vec<(String, String)>,
    /// Whether credentials accompany requests.
    pub credentials: Option<CredentialsMode>,
    /// Cache behavior requested from intermediaries.
    pub cache: Option<CacheMode>,
    /// How redirects are handled.
    pub redirect: Option<RedirectPolicy>,
    /// Referrer reported to the peer.
    pub referrer: Option<String>,
}

impl RequestOptions {
    /// Creates empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a header, replacing any existing value for the same name.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_header(name.into(), value.into());
        self
    }

    /// Sets the credentials mode.
    pub fn with_credentials(mut self, mode: CredentialsMode) -> Self {
        self.credentials = Some(mode);
        self
    }

    /// Sets the cache mode.
    pub fn with_cache(mut self, mode: CacheMode) -> Self {
        self.cache = Some(mode);
        self
    }

    /// Sets the redirect policy.
    pub fn with_redirect(mut self, policy: RedirectPolicy) -> Self {
        self.redirect = Some(policy);
        self
    }

    /// Sets the referrer.
    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }

    /// Looks up a header by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn set_header(&mut self, name: String, value: String) {
        if let Some(slot) = self
            .headers
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(&name))
        {
            slot.1 = value;
        } else {
            self.headers.push((name, value));
        }
    }

    /// Merges `update` into self: headers are set name-wise, other options
    /// override when present in the update.
    pub fn apply(&mut self, update: RequestOptions) {
        for (name, value) in update.headers {
            self.set_header(name, value);
        }
        if update.credentials.is_some() {
            self.credentials = update.credentials;
        }
        if update.cache.is_some() {
            self.cache = update.cache;
        }
        if update.redirect.is_some() {
            self.redirect = update.redirect;
        }
        if update.referrer.is_some() {
            self.referrer = update.referrer;
        }
    }
}

/// Whether credentials accompany outgoing requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialsMode {
    /// Never send credentials.
    Omit,
    /// Send credentials to same-origin peers only.
    SameOrigin,
    /// Always send credentials.
    Include,
}

/// Cache behavior requested from intermediaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    /// Standard caching.
    Standard,
    /// Bypass caches entirely.
    NoStore,
    /// Revalidate with the origin before using a cached response.
    NoCache,
    /// Prefer a cached response even when stale.
    ForceCache,
}

impl CacheMode {
    /// The `Cache-Control` header value for this mode, when one applies.
    pub fn cache_control(&self) -> Option<&'static str> {
        match self {
            CacheMode::Standard => None,
            CacheMode::NoStore => Some("no-store"),
            CacheMode::NoCache => Some("no-cache"),
            CacheMode::ForceCache => Some("only-if-cached"),
        }
    }
}

/// How redirects are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectPolicy {
    /// Follow redirects transparently.
    Follow,
    /// Treat any redirect as a request failure.
    Error,
}

/// A scripted transport for testing.
///
/// `get()` answers with the configured remote state; `patch()` records the
/// sent document and answers with the next queued counter-patch (empty when
/// none is queued). Failures and per-call delays can be injected.
#[derive(Default)]
pub struct MockTransport {
    remote_state: Mutex<Value>,
    counter_patches: Mutex<VecDeque<PatchDocument>>,
    sent: Mutex<Vec<PatchDocument>>,
    patch_delays: Mutex<VecDeque<Duration>>,
    fail_next: AtomicBool,
    options: Mutex<RequestOptions>,
}

impl MockTransport {
    /// Creates a mock with `null` remote state and no scripted responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the object `get()` returns.
    pub fn set_remote_state(&self, state: Value) {
        *self.remote_state.lock() = state;
    }

    /// Queues a counter-patch for the next unanswered `patch()` call.
    pub fn queue_counter_patch(&self, patch: PatchDocument) {
        self.counter_patches.lock().push_back(patch);
    }

    /// Queues a delay applied before the next `patch()` call answers.
    pub fn queue_patch_delay(&self, delay: Duration) {
        self.patch_delays.lock().push_back(delay);
    }

    /// Makes the next request fail with a transport error.
    pub fn fail_next_request(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Returns every patch document sent so far, in order.
    pub fn sent_patches(&self) -> Vec<PatchDocument> {
        self.sent.lock().clone()
    }

    /// Returns the options accumulated through `configure()`.
    pub fn configured_options(&self) -> RequestOptions {
        self.options.lock().clone()
    }

    fn take_failure(&self) -> SyncResult<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            Err(SyncError::transport("simulated connection failure"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self) -> SyncResult<Value> {
        self.take_failure()?;
        Ok(self.remote_state.lock().clone())
    }

    async fn patch(&self, patch: &PatchDocument) -> SyncResult<PatchDocument> {
        let delay = self.patch_delays.lock().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.take_failure()?;
        self.sent.lock().push(patch.clone());
        Ok(self
            .counter_patches
            .lock()
            .pop_front()
            .unwrap_or_else(empty_patch))
    }

    fn configure(&self, options: RequestOptions) {
        self.options.lock().apply(options);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tether_protocol::empty_patch;

    #[tokio::test]
    async fn mock_scripted_responses() {
        let transport = MockTransport::new();
        transport.set_remote_state(json!({"a": 1}));

        assert_eq!(transport.get().await.unwrap(), json!({"a": 1}));

        let counter: PatchDocument =
            serde_json::from_value(json!([{"op": "add", "path": "/b", "value": 2}])).unwrap();
        transport.queue_counter_patch(counter.clone());

        let sent = empty_patch();
        assert_eq!(transport.patch(&sent).await.unwrap(), counter);
        // Unqueued calls answer with an empty counter-patch.
        assert!(transport.patch(&sent).await.unwrap().0.is_empty());
        assert_eq!(transport.sent_patches().len(), 2);
    }

    #[tokio::test]
    async fn mock_failure_injection() {
        let transport = MockTransport::new();
        transport.fail_next_request();

        assert!(matches!(
            transport.get().await,
            Err(SyncError::Transport(_))
        ));
        // The failure is consumed.
        assert!(transport.get().await.is_ok());
    }

    #[test]
    fn options_merge() {
        let mut options = RequestOptions::new()
            .with_header("Content-Type", "application/json")
            .with_credentials(CredentialsMode::Omit);

        options.apply(
            RequestOptions::new()
                .with_header("content-type", "text/plain")
                .with_header("X-Custom", "1")
                .with_cache(CacheMode::NoStore),
        );

        assert_eq!(options.header("Content-Type"), Some("text/plain"));
        assert_eq!(options.header("x-custom"), Some("1"));
        assert_eq!(options.credentials, Some(CredentialsMode::Omit));
        assert_eq!(options.cache, Some(CacheMode::NoStore));
        assert_eq!(options.headers.len(), 2);
    }
}
