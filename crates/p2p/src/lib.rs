//! # tsscore P2P
//!
//! Everything between a controller and the peers it talks to.
//!
//! This crate provides:
//! - **AuthGate** - recovers the sender of a request and finds it on the roster
//! - **RequestSigner** - signs outgoing requests with the local key
//! - **ConnectionCache** - one reusable client per peer address
//! - **BroadcastConnector** - concurrent fan-out with a single retry pass
//! - **SubmitConnector** - targeted delivery retried until the phase ends
//!
//! ## Delivery semantics
//!
//! A broadcast tries every peer once, then retries the failed subset exactly
//! once. Peers still failing are returned as unreachable so the session can
//! report them. A peer that answers with an error was reached and is not
//! retried. Targeted messages are retried at a fixed interval until delivered
//! or until the phase is cancelled.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod auth;
pub mod connection;
pub mod connector;
pub mod signer;

pub use auth::{AuthError, AuthGate};
pub use connection::ConnectionCache;
pub use connector::{BroadcastConnector, Delivery, SubmitConnector};
pub use signer::RequestSigner;

use tsscore_core::TransportError;
use tsscore_crypto::CryptoError;

/// Result type alias for p2p operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the p2p layer
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Signing failed
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Payload encoding failed
    #[error("codec error: {0}")]
    Codec(#[from] tsscore_types::Error),

    /// Delivery failed
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}
