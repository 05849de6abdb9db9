//! Transport configuration.
//!
//! A [`TransportSpec`] selects the remote peer at engine construction:
//! either a ready transport instance, or a tagged [`TransportConfig`]
//! choosing a built-in variant. Missing required parameters and
//! unrecognized variant tags are configuration errors, raised synchronously
//! before any I/O happens.

use crate::error::{SyncError, SyncResult};
use crate::http::{DefaultHttpClient, PollingHttpTransport, SingleShotHttpTransport};
use crate::socket::{MessageSocket, SocketTransport};
use crate::transport::Transport;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default polling interval in milliseconds.
pub const DEFAULT_INTERVAL_MS: u64 = 30_000;

/// Selects the transport an engine talks through.
pub enum TransportSpec {
    /// A tagged configuration for a built-in variant.
    Config(TransportConfig),
    /// A ready transport instance.
    Instance(Arc<dyn Transport>),
}

impl TransportSpec {
    pub(crate) fn into_transport(self) -> SyncResult<Arc<dyn Transport>> {
        match self {
            TransportSpec::Config(config) => config.build(),
            TransportSpec::Instance(transport) => Ok(transport),
        }
    }
}

impl From<TransportConfig> for TransportSpec {
    fn from(config: TransportConfig) -> Self {
        TransportSpec::Config(config)
    }
}

impl From<Arc<dyn Transport>> for TransportSpec {
    fn from(transport: Arc<dyn Transport>) -> Self {
        TransportSpec::Instance(transport)
    }
}

impl fmt::Debug for TransportSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportSpec::Config(config) => f.debug_tuple("Config").field(config).finish(),
            TransportSpec::Instance(_) => f.write_str("Instance(..)"),
        }
    }
}

/// Tagged configuration selecting a built-in transport variant.
///
/// The JSON surface uses a `variant` tag:
/// `{"variant": "polling-http", "get_url": ..., "patch_url": ...}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "variant", rename_all = "kebab-case")]
pub enum TransportConfig {
    /// Periodic-polling HTTP.
    PollingHttp(PollingHttpConfig),
    /// One-shot HTTP, no polling lifecycle.
    SingleShotHttp(SingleShotHttpConfig),
    /// Named messages over an embedder-supplied socket session.
    Socket(SocketConfig),
}

impl TransportConfig {
    /// Parses the tagged JSON surface. An unrecognized variant tag or a
    /// malformed body is a configuration error.
    pub fn from_json(value: Value) -> SyncResult<Self> {
        serde_json::from_value(value)
            .map_err(|e| SyncError::configuration(format!("invalid transport configuration: {e}")))
    }

    /// Validates parameters and constructs the transport.
    pub fn build(self) -> SyncResult<Arc<dyn Transport>> {
        match self {
            TransportConfig::PollingHttp(config) => config.build().map(into_dyn),
            TransportConfig::SingleShotHttp(config) => config.build().map(into_dyn),
            TransportConfig::Socket(config) => config.build().map(into_dyn),
        }
    }
}

fn into_dyn<T: Transport + 'static>(transport: T) -> Arc<dyn Transport> {
    Arc::new(transport)
}

/// Parameters for the polling-HTTP variant.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PollingHttpConfig {
    get_url: Option<String>,
    patch_url: Option<String>,
    /// Polling interval in milliseconds.
    interval: Option<u64>,
}

impl PollingHttpConfig {
    /// Creates an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the URL the full state is fetched from.
    pub fn with_get_url(mut self, url: impl Into<String>) -> Self {
        self.get_url = Some(url.into());
        self
    }

    /// Sets the URL patch documents are sent to.
    pub fn with_patch_url(mut self, url: impl Into<String>) -> Self {
        self.patch_url = Some(url.into());
        self
    }

    /// Sets the polling interval (default 30 seconds).
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval.as_millis() as u64);
        self
    }

    /// Validates parameters and constructs the transport.
    pub fn build(self) -> SyncResult<PollingHttpTransport<DefaultHttpClient>> {
        let get_url = self
            .get_url
            .ok_or_else(|| SyncError::configuration("polling-http transport requires get_url"))?;
        let patch_url = self
            .patch_url
            .ok_or_else(|| SyncError::configuration("polling-http transport requires patch_url"))?;
        let interval = Duration::from_millis(self.interval.unwrap_or(DEFAULT_INTERVAL_MS));
        Ok(PollingHttpTransport::new(
            get_url,
            patch_url,
            interval,
            DefaultHttpClient::new()?,
        ))
    }
}

/// Parameters for the single-shot-HTTP variant.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SingleShotHttpConfig {
    get_url: Option<String>,
    patch_url: Option<String>,
    /// Accepted for parity with the polling variant; this variant never
    /// polls.
    interval: Option<u64>,
}

impl SingleShotHttpConfig {
    /// Creates an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the URL the full state is fetched from.
    pub fn with_get_url(mut self, url: impl Into<String>) -> Self {
        self.get_url = Some(url.into());
        self
    }

    /// Sets the URL patch documents are sent to.
    pub fn with_patch_url(mut self, url: impl Into<String>) -> Self {
        self.patch_url = Some(url.into());
        self
    }

    /// Sets the interval parameter (accepted, unused).
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval.as_millis() as u64);
        self
    }

    /// Validates parameters and constructs the transport.
    pub fn build(self) -> SyncResult<SingleShotHttpTransport<DefaultHttpClient>> {
        let get_url = self.get_url.ok_or_else(|| {
            SyncError::configuration("single-shot-http transport requires get_url")
        })?;
        let patch_url = self.patch_url.ok_or_else(|| {
            SyncError::configuration("single-shot-http transport requires patch_url")
        })?;
        let interval = Duration::from_millis(self.interval.unwrap_or(DEFAULT_INTERVAL_MS));
        Ok(SingleShotHttpTransport::new(
            get_url,
            patch_url,
            interval,
            DefaultHttpClient::new()?,
        ))
    }
}

/// Parameters for the socket variant.
///
/// Connection establishment and framing are the embedder's concern: the
/// configuration must carry a connected [`MessageSocket`] alongside the url
/// and message names.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct SocketConfig {
    socket_url: Option<String>,
    get_message_name: Option<String>,
    patch_message_name: Option<String>,
    #[serde(skip)]
    link: Option<Arc<dyn MessageSocket>>,
}

impl SocketConfig {
    /// Creates an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the peer URL.
    pub fn with_socket_url(mut self, url: impl Into<String>) -> Self {
        self.socket_url = Some(url.into());
        self
    }

    /// Sets the message name used for full-state requests.
    pub fn with_get_message_name(mut self, name: impl Into<String>) -> Self {
        self.get_message_name = Some(name.into());
        self
    }

    /// Sets the message name used for patch exchanges.
    pub fn with_patch_message_name(mut self, name: impl Into<String>) -> Self {
        self.patch_message_name = Some(name.into());
        self
    }

    /// Attaches the connected session the transport routes messages over.
    pub fn with_socket(mut self, link: Arc<dyn MessageSocket>) -> Self {
        self.link = Some(link);
        self
    }

    /// Validates parameters and constructs the transport.
    pub fn build(self) -> SyncResult<SocketTransport> {
        let socket_url = self
            .socket_url
            .ok_or_else(|| SyncError::configuration("socket transport requires socket_url"))?;
        let get_message_name = self.get_message_name.ok_or_else(|| {
            SyncError::configuration("socket transport requires get_message_name")
        })?;
        let patch_message_name = self.patch_message_name.ok_or_else(|| {
            SyncError::configuration("socket transport requires patch_message_name")
        })?;
        let link = self.link.ok_or_else(|| {
            SyncError::configuration("socket transport requires an attached message socket")
        })?;
        Ok(SocketTransport::new(
            socket_url,
            get_message_name,
            patch_message_name,
            link,
        ))
    }
}

impl fmt::Debug for SocketConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketConfig")
            .field("socket_url", &self.socket_url)
            .field("get_message_name", &self.get_message_name)
            .field("patch_message_name", &self.patch_message_name)
            .field("link", &self.link.as_ref().map(|_| "attached"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct NullSocket;

    #[async_trait]
    impl MessageSocket for NullSocket {
        async fn request(&self, _: &str, _: Value) -> SyncResult<Value> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn polling_defaults_to_thirty_seconds() {
        let transport = PollingHttpConfig::new()
            .with_get_url("http://peer/state")
            .with_patch_url("http://peer/patch")
            .build()
            .unwrap();
        assert_eq!(transport.interval(), Duration::from_secs(30));
    }

    #[test]
    fn polling_requires_both_urls() {
        let err = PollingHttpConfig::new()
            .with_patch_url("http://peer/patch")
            .build()
            .unwrap_err();
        assert!(matches!(err, SyncError::Configuration(_)));
        assert!(err.to_string().contains("get_url"));

        let err = PollingHttpConfig::new()
            .with_get_url("http://peer/state")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("patch_url"));
    }

    #[test]
    fn single_shot_requires_both_urls() {
        let err = SingleShotHttpConfig::new().build().unwrap_err();
        assert!(matches!(err, SyncError::Configuration(_)));
    }

    #[test]
    fn socket_requires_names_and_session() {
        let err = SocketConfig::new()
            .with_socket_url("wss://peer/sync")
            .with_get_message_name("state")
            .with_patch_message_name("apply")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("message socket"));

        let transport = SocketConfig::new()
            .with_socket_url("wss://peer/sync")
            .with_get_message_name("state")
            .with_patch_message_name("apply")
            .with_socket(Arc::new(NullSocket))
            .build()
            .unwrap();
        assert_eq!(transport.socket_url(), "wss://peer/sync");
    }

    #[test]
    fn tagged_json_surface() {
        let config = TransportConfig::from_json(json!({
            "variant": "polling-http",
            "get_url": "http://peer/state",
            "patch_url": "http://peer/patch",
            "interval": 5000,
        }))
        .unwrap();

        let TransportConfig::PollingHttp(config) = config else {
            panic!("expected polling-http variant");
        };
        assert_eq!(
            config.build().unwrap().interval(),
            Duration::from_millis(5000)
        );
    }

    #[test]
    fn unrecognized_variant_tag_is_rejected() {
        let err = TransportConfig::from_json(json!({
            "variant": "carrier-pigeon",
            "get_url": "coop",
        }))
        .unwrap_err();
        assert!(matches!(err, SyncError::Configuration(_)));
    }

    #[test]
    fn missing_tag_is_rejected() {
        let err = TransportConfig::from_json(json!({"get_url": "http://peer"})).unwrap_err();
        assert!(matches!(err, SyncError::Configuration(_)));
    }
}
