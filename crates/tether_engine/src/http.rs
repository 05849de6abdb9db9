//! HTTP transport variants.
//!
//! The actual HTTP client is abstracted via a trait to allow different
//! implementations (reqwest, loopback test clients, etc.). Both variants
//! speak the same wire protocol: a GET response body is the full state
//! object, a PATCH request body is a JSON array of operations, and a PATCH
//! response body is the counter-patch (empty array when none).

use crate::error::{SyncError, SyncResult};
use crate::transport::{RedirectPolicy, RequestOptions, Transport, UpdateHook};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tether_protocol::{decode_patch, decode_state, encode_patch, PatchDocument};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport. This allows
/// using different HTTP libraries, or loopback clients that answer without a
/// network.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a GET request and returns the raw response body. A status of
    /// 400 or above must surface as [`SyncError::Status`].
    async fn get(&self, url: &str, options: &RequestOptions) -> SyncResult<Vec<u8>>;

    /// Sends `body` as a PATCH request and returns the raw response body.
    /// The same status rule applies.
    async fn patch(&self, url: &str, body: Vec<u8>, options: &RequestOptions)
        -> SyncResult<Vec<u8>>;
}

/// A reqwest-backed [`HttpClient`].
#[derive(Debug)]
pub struct DefaultHttpClient {
    client: reqwest::Client,
}

impl DefaultHttpClient {
    /// Creates a client that follows redirects.
    pub fn new() -> SyncResult<Self> {
        Self::with_redirect(RedirectPolicy::Follow)
    }

    /// Creates a client with an explicit redirect policy.
    pub fn with_redirect(policy: RedirectPolicy) -> SyncResult<Self> {
        let builder = match policy {
            RedirectPolicy::Follow => reqwest::Client::builder(),
            RedirectPolicy::Error => {
                reqwest::Client::builder().redirect(reqwest::redirect::Policy::none())
            }
        };
        let client = builder
            .build()
            .map_err(|e| SyncError::configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    fn prepare(
        mut request: reqwest::RequestBuilder,
        options: &RequestOptions,
    ) -> reqwest::RequestBuilder {
        for (name, value) in &options.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(referrer) = &options.referrer {
            request = request.header("Referer", referrer.as_str());
        }
        if let Some(value) = options.cache.and_then(|c| c.cache_control()) {
            request = request.header("Cache-Control", value);
        }
        request
    }

    async fn execute(request: reqwest::RequestBuilder) -> SyncResult<Vec<u8>> {
        let response = request
            .send()
            .await
            .map_err(|e| SyncError::transport(e.to_string()))?;
        let status = response.status().as_u16();
        if status >= 400 {
            return Err(SyncError::Status(status));
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| SyncError::transport(e.to_string()))?;
        Ok(body.to_vec())
    }
}

#[async_trait]
impl HttpClient for DefaultHttpClient {
    async fn get(&self, url: &str, options: &RequestOptions) -> SyncResult<Vec<u8>> {
        Self::execute(Self::prepare(self.client.get(url), options)).await
    }

    async fn patch(
        &self,
        url: &str,
        body: Vec<u8>,
        options: &RequestOptions,
    ) -> SyncResult<Vec<u8>> {
        Self::execute(Self::prepare(self.client.patch(url), options).body(body)).await
    }
}

async fn fetch_state<C>(
    client: &C,
    url: &str,
    options: &RwLock<RequestOptions>,
) -> SyncResult<Value>
where
    C: HttpClient + ?Sized,
{
    let snapshot = options.read().clone();
    let body = client.get(url, &snapshot).await?;
    Ok(decode_state(&body)?)
}

async fn send_patch<C>(
    client: &C,
    url: &str,
    patch: &PatchDocument,
    options: &RwLock<RequestOptions>,
) -> SyncResult<PatchDocument>
where
    C: HttpClient + ?Sized,
{
    let body = encode_patch(patch)?;
    let snapshot = options.read().clone();
    let reply = client.patch(url, body, &snapshot).await?;
    Ok(decode_patch(&reply)?)
}

/// HTTP transport that periodically re-fetches the remote object.
///
/// `start()` spawns a tokio task polling `get_url` on the configured
/// interval; it must be called from within a tokio runtime. The first poll
/// happens one interval after `start()`.
#[derive(Debug)]
pub struct PollingHttpTransport<C: HttpClient> {
    get_url: String,
    patch_url: String,
    interval: Duration,
    client: Arc<C>,
    options: Arc<RwLock<RequestOptions>>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl<C: HttpClient> PollingHttpTransport<C> {
    /// Creates a polling transport over `client`.
    pub fn new(
        get_url: impl Into<String>,
        patch_url: impl Into<String>,
        interval: Duration,
        client: C,
    ) -> Self {
        let options = RequestOptions::new().with_header("Content-Type", "application/json");
        Self {
            get_url: get_url.into(),
            patch_url: patch_url.into(),
            interval,
            client: Arc::new(client),
            options: Arc::new(RwLock::new(options)),
            poller: Mutex::new(None),
        }
    }

    /// Returns the polling interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns true while the polling task is running.
    pub fn is_polling(&self) -> bool {
        self.poller.lock().is_some()
    }
}

#[async_trait]
impl<C: HttpClient + 'static> Transport for PollingHttpTransport<C> {
    async fn get(&self) -> SyncResult<Value> {
        fetch_state(self.client.as_ref(), &self.get_url, &self.options).await
    }

    async fn patch(&self, patch: &PatchDocument) -> SyncResult<PatchDocument> {
        send_patch(self.client.as_ref(), &self.patch_url, patch, &self.options).await
    }

    fn configure(&self, options: RequestOptions) {
        self.options.write().apply(options);
    }

    fn start(&self, on_update: UpdateHook) -> bool {
        let mut poller = self.poller.lock();
        if poller.is_some() {
            return true;
        }

        let client = Arc::clone(&self.client);
        let options = Arc::clone(&self.options);
        let url = self.get_url.clone();
        let interval = self.interval;
        debug!(%url, ?interval, "starting polling lifecycle");

        *poller = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick of a tokio interval completes immediately;
            // consume it so polling starts one interval from now.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match fetch_state(client.as_ref(), &url, &options).await {
                    Ok(state) => on_update(state),
                    Err(error) => warn!(%error, "periodic fetch failed"),
                }
            }
        }));
        true
    }

    fn stop(&self) {
        if let Some(handle) = self.poller.lock().take() {
            handle.abort();
            debug!("polling lifecycle stopped");
        }
    }
}

impl<C: HttpClient> Drop for PollingHttpTransport<C> {
    fn drop(&mut self) {
        if let Some(handle) = self.poller.lock().take() {
            handle.abort();
        }
    }
}

/// HTTP transport for one-shot exchanges, with no polling lifecycle.
///
/// Credentials are on by default. The `interval` parameter is accepted for
/// parity with the polling variant but unused.
#[derive(Debug)]
pub struct SingleShotHttpTransport<C: HttpClient> {
    get_url: String,
    patch_url: String,
    interval: Duration,
    client: C,
    options: RwLock<RequestOptions>,
}

impl<C: HttpClient> SingleShotHttpTransport<C> {
    /// Creates a single-shot transport over `client`.
    pub fn new(
        get_url: impl Into<String>,
        patch_url: impl Into<String>,
        interval: Duration,
        client: C,
    ) -> Self {
        let options = RequestOptions::new()
            .with_header("Content-Type", "application/json")
            .with_credentials(crate::transport::CredentialsMode::Include);
        Self {
            get_url: get_url.into(),
            patch_url: patch_url.into(),
            interval,
            client,
            options: RwLock::new(options),
        }
    }

    /// Returns the configured interval (unused by this variant).
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

#[async_trait]
impl<C: HttpClient + 'static> Transport for SingleShotHttpTransport<C> {
    async fn get(&self) -> SyncResult<Value> {
        fetch_state(&self.client, &self.get_url, &self.options).await
    }

    async fn patch(&self, patch: &PatchDocument) -> SyncResult<PatchDocument> {
        send_patch(&self.client, &self.patch_url, patch, &self.options).await
    }

    fn configure(&self, options: RequestOptions) {
        self.options.write().apply(options);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::CredentialsMode;
    use serde_json::json;
    use tether_protocol::empty_patch;

    /// Answers without a network; records every request it sees.
    #[derive(Default)]
    struct LoopbackClient {
        get_body: Mutex<Vec<u8>>,
        patch_body: Mutex<Vec<u8>>,
        fail_status: Mutex<Option<u16>>,
        requests: Mutex<Vec<(String, String, RequestOptions)>>,
    }

    impl LoopbackClient {
        fn new(get_body: &str, patch_body: &str) -> Self {
            Self {
                get_body: Mutex::new(get_body.as_bytes().to_vec()),
                patch_body: Mutex::new(patch_body.as_bytes().to_vec()),
                ..Self::default()
            }
        }

        fn fail_with_status(&self, status: u16) {
            *self.fail_status.lock() = Some(status);
        }

        fn check_status(&self) -> SyncResult<()> {
            match self.fail_status.lock().take() {
                Some(status) => Err(SyncError::Status(status)),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl HttpClient for LoopbackClient {
        async fn get(&self, url: &str, options: &RequestOptions) -> SyncResult<Vec<u8>> {
            self.requests
                .lock()
                .push(("GET".into(), url.into(), options.clone()));
            self.check_status()?;
            Ok(self.get_body.lock().clone())
        }

        async fn patch(
            &self,
            url: &str,
            _body: Vec<u8>,
            options: &RequestOptions,
        ) -> SyncResult<Vec<u8>> {
            self.requests
                .lock()
                .push(("PATCH".into(), url.into(), options.clone()));
            self.check_status()?;
            Ok(self.patch_body.lock().clone())
        }
    }

    fn single_shot(client: LoopbackClient) -> SingleShotHttpTransport<LoopbackClient> {
        SingleShotHttpTransport::new(
            "http://peer/state",
            "http://peer/patch",
            Duration::from_secs(30),
            client,
        )
    }

    #[tokio::test]
    async fn get_decodes_the_state_body() {
        let transport = single_shot(LoopbackClient::new(r#"{"a": 1}"#, "[]"));
        assert_eq!(transport.get().await.unwrap(), json!({"a": 1}));
    }

    #[tokio::test]
    async fn patch_decodes_the_counter_patch() {
        let transport = single_shot(LoopbackClient::new(
            "{}",
            r#"[{"op": "replace", "path": "/b", "value": "not b"}]"#,
        ));
        let counter = transport.patch(&empty_patch()).await.unwrap();
        assert_eq!(counter.0.len(), 1);
    }

    #[tokio::test]
    async fn non_json_body_is_a_codec_error() {
        let transport = single_shot(LoopbackClient::new("<html>oops</html>", "[]"));
        assert!(matches!(transport.get().await, Err(SyncError::Codec(_))));
    }

    #[tokio::test]
    async fn status_400_and_above_fails_the_request() {
        let client = LoopbackClient::new("{}", "[]");
        client.fail_with_status(502);
        let transport = single_shot(client);
        assert!(matches!(
            transport.get().await,
            Err(SyncError::Status(502))
        ));
    }

    #[tokio::test]
    async fn default_options_reach_the_client() {
        let transport = single_shot(LoopbackClient::new("{}", "[]"));
        transport.configure(RequestOptions::new().with_header("X-Auth", "token"));
        transport.get().await.unwrap();

        let requests = transport.client.requests.lock();
        let (_, _, options) = &requests[0];
        assert_eq!(options.header("Content-Type"), Some("application/json"));
        assert_eq!(options.header("X-Auth"), Some("token"));
        assert_eq!(options.credentials, Some(CredentialsMode::Include));
    }

    #[tokio::test(start_paused = true)]
    async fn polling_wires_updates_until_stopped() {
        let transport = PollingHttpTransport::new(
            "http://peer/state",
            "http://peer/patch",
            Duration::from_secs(30),
            LoopbackClient::new(r#"{"tick": true}"#, "[]"),
        );

        let seen = Arc::new(Mutex::new(Vec::new()));
        let hook: UpdateHook = {
            let seen = Arc::clone(&seen);
            Arc::new(move |state| seen.lock().push(state))
        };

        assert!(transport.start(hook));
        assert!(transport.is_polling());

        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_secs(31)).await;
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert_eq!(seen.lock().as_slice(), &[json!({"tick": true})]);

        transport.stop();
        assert!(!transport.is_polling());
        tokio::time::advance(Duration::from_secs(60)).await;
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert_eq!(seen.lock().len(), 1);
    }
}
