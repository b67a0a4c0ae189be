//! # tsscore RPC
//!
//! JSON-RPC boundary of a tsscore node.
//!
//! This crate provides:
//! - the `tss_*` API served to peers and operators (`submit`, `addOperation`,
//!   `info`, `session`)
//! - an HTTP server wrapping that API
//! - an HTTP [`PeerDialer`](tsscore_core::PeerDialer) so the connectors can
//!   reach other nodes through the same API
//!
//! ## Example
//!
//! ```rust,ignore
//! use tsscore_rpc::{RpcServer, RpcServerConfig, SessionBackend};
//!
//! let backend = SessionBackend::new(manager, pool, account, pub_key);
//! let mut server = RpcServer::new(RpcServerConfig::default(), Arc::new(backend));
//! server.start().await?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod api;
pub mod client;
pub mod server;
pub mod types;

pub use api::{NodeBackend, SessionBackend, TssApiClient, TssApiImpl, TssApiServer};
pub use client::{HttpPeerClient, HttpPeerDialer};
pub use server::{RpcServer, RpcServerBuilder, RpcServerConfig};
pub use types::NodeInfo;

use tsscore_pool::PoolError;
use tsscore_session::{ErrorClass, SessionError};

/// Result type alias for RPC operations
pub type Result<T> = std::result::Result<T, RpcError>;

/// Error code for unknown sessions and operations.
pub const NOT_FOUND_CODE: i32 = -32001;

/// RPC error types
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// Invalid parameters, failed authentication or a protocol violation
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// Unknown session or operation
    #[error("not found: {0}")]
    NotFound(String),

    /// Storage, chain or other infrastructure failure
    #[error("internal error")]
    Internal(String),
}

impl From<SessionError> for RpcError {
    fn from(err: SessionError) -> Self {
        match err.class() {
            ErrorClass::InvalidArgument => RpcError::InvalidParams(err.to_string()),
            ErrorClass::NotFound => RpcError::NotFound(err.to_string()),
            ErrorClass::Internal => RpcError::Internal(err.to_string()),
        }
    }
}

impl From<PoolError> for RpcError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::OperationNotApprovable(_) => RpcError::InvalidParams(err.to_string()),
            PoolError::Chain(tsscore_core::ChainError::NotFound(index)) => {
                RpcError::NotFound(format!("operation {index}"))
            }
            other => RpcError::Internal(other.to_string()),
        }
    }
}

impl From<RpcError> for jsonrpsee::types::ErrorObjectOwned {
    fn from(err: RpcError) -> Self {
        let code = match &err {
            RpcError::InvalidParams(_) => jsonrpsee::types::error::INVALID_PARAMS_CODE,
            RpcError::NotFound(_) => NOT_FOUND_CODE,
            RpcError::Internal(detail) => {
                tracing::warn!(%detail, "internal error served to caller");
                jsonrpsee::types::error::INTERNAL_ERROR_CODE
            }
        };
        jsonrpsee::types::ErrorObjectOwned::owned(code, err.to_string(), None::<()>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonrpsee::types::ErrorObjectOwned;
    use tsscore_core::{ChainError, StoreError};
    use tsscore_p2p::AuthError;
    use tsscore_types::SessionType;

    fn code(err: impl Into<RpcError>) -> i32 {
        ErrorObjectOwned::from(err.into()).code()
    }

    #[test]
    fn test_session_error_codes() {
        assert_eq!(code(SessionError::Auth(AuthError::SignerNotAParty)), -32602);
        assert_eq!(code(SessionError::ProtocolViolation("x".into())), -32602);
        assert_eq!(
            code(SessionError::NotFound {
                session_type: SessionType::Default,
                id: 3
            }),
            -32001
        );
        assert_eq!(code(SessionError::Store(StoreError::Io("disk".into()))), -32603);
    }

    #[test]
    fn test_internal_detail_not_exposed() {
        let obj = ErrorObjectOwned::from(RpcError::from(SessionError::Store(StoreError::Io(
            "/var/lib/secret".into(),
        ))));
        assert_eq!(obj.message(), "internal error");
    }

    #[test]
    fn test_pool_error_codes() {
        assert_eq!(code(PoolError::OperationNotApprovable("op".into())), -32602);
        assert_eq!(code(PoolError::Chain(ChainError::NotFound("op".into()))), -32001);
        assert_eq!(code(PoolError::Chain(ChainError::Rpc("down".into()))), -32603);
        assert_eq!(code(PoolError::Closed), -32603);
    }
}
