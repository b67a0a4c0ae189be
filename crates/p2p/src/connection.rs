//! Reusable peer connections.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, trace};
use tsscore_core::{PeerClient, PeerDialer, TransportError, TransportResult};
use tsscore_types::SubmitRequest;

/// One client per peer address, dialed lazily and dropped on failure.
pub struct ConnectionCache {
    dialer: Arc<dyn PeerDialer>,
    clients: RwLock<HashMap<String, Arc<dyn PeerClient>>>,
    timeout: Duration,
}

impl ConnectionCache {
    /// Create a cache. `timeout` bounds each dial and each request.
    pub fn new(dialer: Arc<dyn PeerDialer>, timeout: Duration) -> Self {
        Self {
            dialer,
            clients: RwLock::new(HashMap::new()),
            timeout,
        }
    }

    /// Cached client for `address`, dialing if needed.
    pub async fn client(&self, address: &str) -> TransportResult<Arc<dyn PeerClient>> {
        let cached = self.clients.read().get(address).cloned();
        if let Some(client) = cached {
            return Ok(client);
        }

        let client = tokio::time::timeout(self.timeout, self.dialer.dial(address))
            .await
            .map_err(|_| TransportError::Timeout(format!("dial {address}")))??;
        debug!(%address, "connected to peer");

        // Another task may have dialed concurrently; keep the first.
        let mut clients = self.clients.write();
        Ok(clients
            .entry(address.to_string())
            .or_insert(client)
            .clone())
    }

    /// Forget the client for `address`.
    pub fn invalidate(&self, address: &str) {
        if self.clients.write().remove(address).is_some() {
            trace!(%address, "dropped peer connection");
        }
    }

    /// Deliver `request` to `address`.
    ///
    /// Connection-level failures drop the cached client so the next attempt redials.
    pub async fn submit(&self, address: &str, request: &SubmitRequest) -> TransportResult<()> {
        let client = self.client(address).await?;
        let result = tokio::time::timeout(self.timeout, client.submit(request))
            .await
            .map_err(|_| TransportError::Timeout(format!("submit to {address}")))
            .and_then(|r| r);

        match &result {
            Err(TransportError::Rejected(_)) | Ok(()) => {}
            Err(_) => self.invalidate(address),
        }
        result
    }

    /// Number of cached clients.
    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    /// Returns true if no client is cached.
    pub fn is_empty(&self) -> bool {
        self.clients.read().is_empty()
    }
}
