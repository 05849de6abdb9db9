//! Socket transport variant.
//!
//! The engine does not open sockets or define message framing; the embedder
//! supplies a connected bidirectional session through the [`MessageSocket`]
//! capability and the transport routes named get/patch messages over it.

use crate::error::{SyncError, SyncResult};
use crate::transport::{RequestOptions, Transport};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tether_protocol::PatchDocument;
use tracing::debug;

/// A connected bidirectional message channel to the remote peer.
///
/// Implementations own connection state, reconnection, and framing; the
/// engine only issues named request/reply exchanges with JSON payloads.
#[async_trait]
pub trait MessageSocket: Send + Sync {
    /// Sends a named message carrying `payload` and returns the peer's JSON
    /// reply.
    async fn request(&self, message_name: &str, payload: Value) -> SyncResult<Value>;
}

/// Transport routing the exchange protocol over a message socket.
pub struct SocketTransport {
    socket_url: String,
    get_message_name: String,
    patch_message_name: String,
    link: Arc<dyn MessageSocket>,
}

impl std::fmt::Debug for SocketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketTransport")
            .field("socket_url", &self.socket_url)
            .field("get_message_name", &self.get_message_name)
            .field("patch_message_name", &self.patch_message_name)
            .field("link", &"<dyn MessageSocket>")
            .finish()
    }
}

impl SocketTransport {
    /// Creates a socket transport over the connected `link`.
    pub fn new(
        socket_url: impl Into<String>,
        get_message_name: impl Into<String>,
        patch_message_name: impl Into<String>,
        link: Arc<dyn MessageSocket>,
    ) -> Self {
        Self {
            socket_url: socket_url.into(),
            get_message_name: get_message_name.into(),
            patch_message_name: patch_message_name.into(),
            link,
        }
    }

    /// Returns the peer URL this transport was configured with.
    pub fn socket_url(&self) -> &str {
        &self.socket_url
    }
}

#[async_trait]
impl Transport for SocketTransport {
    async fn get(&self) -> SyncResult<Value> {
        self.link.request(&self.get_message_name, Value::Null).await
    }

    async fn patch(&self, patch: &PatchDocument) -> SyncResult<PatchDocument> {
        let payload =
            serde_json::to_value(patch).map_err(|e| SyncError::codec(e.to_string()))?;
        let reply = self.link.request(&self.patch_message_name, payload).await?;
        serde_json::from_value(reply).map_err(|e| SyncError::codec(e.to_string()))
    }

    fn configure(&self, _options: RequestOptions) {
        // HTTP request options have no socket counterpart.
        debug!("socket transport has no recognized request options");
    }
}
