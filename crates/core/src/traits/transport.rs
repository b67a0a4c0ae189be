//! Peer transport traits.
//!
//! Requests are delivered point to point: a [`PeerDialer`] opens a
//! [`PeerClient`] for a party's network address and the client pushes signed
//! [`SubmitRequest`]s to the remote node, which hands them to its
//! [`SubmitHandler`].

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tsscore_types::SubmitRequest;

/// Errors that can occur during network operations.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// Connection to peer failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The message could not be sent.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// The peer answered with an error.
    #[error("rejected by peer: {0}")]
    Rejected(String),

    /// Network timeout.
    #[error("timeout: {0}")]
    Timeout(String),
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Connection to one peer.
#[async_trait]
pub trait PeerClient: Send + Sync {
    /// Deliver a signed request.
    async fn submit(&self, request: &SubmitRequest) -> TransportResult<()>;
}

/// Opens connections to peers by network address.
#[async_trait]
pub trait PeerDialer: Send + Sync + 'static {
    /// Connect to `address`.
    async fn dial(&self, address: &str) -> TransportResult<Arc<dyn PeerClient>>;
}

/// Receiving side of [`PeerClient::submit`].
#[async_trait]
pub trait SubmitHandler: Send + Sync + 'static {
    /// Handle an inbound request. Errors are reported back to the sender.
    async fn handle_submit(&self, request: SubmitRequest) -> Result<(), String>;
}
