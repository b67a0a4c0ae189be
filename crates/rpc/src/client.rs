//! HTTP transport to other nodes' `tss_submit`.

use crate::api::TssApiClient;
use async_trait::async_trait;
use jsonrpsee::core::client::Error as ClientError;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;
use tsscore_core::{PeerClient, PeerDialer, TransportError, TransportResult};
use tsscore_types::SubmitRequest;

/// Dials peers over HTTP JSON-RPC.
///
/// Peer addresses are `host:port`; a scheme is added when missing.
#[derive(Debug, Clone)]
pub struct HttpPeerDialer {
    request_timeout: Duration,
    max_request_size: u32,
}

impl HttpPeerDialer {
    /// Create a dialer whose clients time out after `request_timeout`.
    pub fn new(request_timeout: Duration) -> Self {
        Self {
            request_timeout,
            max_request_size: 10 * 1024 * 1024,
        }
    }

    /// Cap the encoded size of an outgoing request.
    pub fn with_max_request_size(mut self, max: u32) -> Self {
        self.max_request_size = max;
        self
    }
}

fn endpoint(address: &str) -> String {
    if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{address}")
    }
}

#[async_trait]
impl PeerDialer for HttpPeerDialer {
    async fn dial(&self, address: &str) -> TransportResult<Arc<dyn PeerClient>> {
        let client = HttpClientBuilder::default()
            .request_timeout(self.request_timeout)
            .max_request_size(self.max_request_size)
            .build(endpoint(address))
            .map_err(|e| TransportError::ConnectionFailed(format!("{address}: {e}")))?;
        Ok(Arc::new(HttpPeerClient {
            client,
            address: address.to_string(),
        }))
    }
}

/// One peer reached over HTTP.
pub struct HttpPeerClient {
    client: HttpClient,
    address: String,
}

impl HttpPeerClient {
    /// Peer address.
    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl PeerClient for HttpPeerClient {
    async fn submit(&self, request: &SubmitRequest) -> TransportResult<()> {
        trace!(address = %self.address, session_id = request.session_id, "submitting to peer");
        TssApiClient::submit(&self.client, request.clone())
            .await
            .map_err(|e| match e {
                ClientError::Call(obj) => TransportError::Rejected(obj.message().to_string()),
                ClientError::RequestTimeout => TransportError::Timeout(self.address.clone()),
                ClientError::Transport(e) => {
                    TransportError::SendFailed(format!("{}: {e}", self.address))
                }
                other => TransportError::SendFailed(format!("{}: {other}", self.address)),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_adds_scheme() {
        assert_eq!(endpoint("10.0.0.1:26660"), "http://10.0.0.1:26660");
        assert_eq!(endpoint("https://peer.example"), "https://peer.example");
    }

    #[tokio::test]
    async fn test_dial_rejects_malformed_address() {
        let dialer = HttpPeerDialer::new(Duration::from_secs(1));
        assert!(matches!(
            dialer.dial("not a url").await,
            Err(TransportError::ConnectionFailed(_))
        ));
    }
}
