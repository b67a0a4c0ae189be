//! The `tss_*` JSON-RPC methods.
//!
//! `tss_submit` is the peer endpoint every other node's connectors call.
//! The remaining methods serve operators: feeding operation ids to the pool
//! and inspecting sessions.

use crate::types::NodeInfo;
use crate::RpcError;
use async_trait::async_trait;
use jsonrpsee::core::RpcResult;
use jsonrpsee::proc_macros::rpc;
use std::sync::Arc;
use tracing::{debug, instrument};
use tsscore_pool::Pool;
use tsscore_session::SessionManager;
use tsscore_types::{SessionRecord, SessionType, SubmitRequest};

// ============================================================================
// API Definition
// ============================================================================

/// tsscore node API.
#[rpc(server, client, namespace = "tss")]
pub trait TssApi {
    /// Delivers a signed peer request to the addressed session.
    ///
    /// Fails with invalid params when the signature does not belong to a
    /// roster party or the request breaks the session protocol, and with
    /// not found when no such session is live.
    #[method(name = "submit")]
    async fn submit(&self, request: SubmitRequest) -> RpcResult<()>;

    /// Validates an operation id against chain and queues it for signing.
    ///
    /// # Returns
    /// `false` if the id was already queued.
    #[method(name = "addOperation")]
    async fn add_operation(&self, index: String) -> RpcResult<bool>;

    /// Returns the local identity and the live sessions.
    #[method(name = "info")]
    async fn info(&self) -> RpcResult<NodeInfo>;

    /// Returns the record of a live or past session.
    #[method(name = "session")]
    async fn session(&self, session_type: SessionType, id: u64) -> RpcResult<SessionRecord>;
}

// ============================================================================
// Backend Trait
// ============================================================================

/// What the API needs from a node.
#[async_trait]
pub trait NodeBackend: Send + Sync {
    /// Route a peer request.
    async fn submit(&self, request: SubmitRequest) -> Result<(), RpcError>;

    /// Queue an operation id.
    async fn add_operation(&self, index: &str) -> Result<bool, RpcError>;

    /// Identity and live sessions.
    async fn info(&self) -> Result<NodeInfo, RpcError>;

    /// A session record.
    async fn session(&self, session_type: SessionType, id: u64) -> Result<SessionRecord, RpcError>;
}

/// [`NodeBackend`] over a session manager and its pool.
pub struct SessionBackend {
    manager: Arc<SessionManager>,
    pool: Arc<Pool>,
    account: String,
    pub_key: String,
}

impl SessionBackend {
    /// Create a backend.
    pub fn new(
        manager: Arc<SessionManager>,
        pool: Arc<Pool>,
        account: impl Into<String>,
        pub_key: impl Into<String>,
    ) -> Self {
        Self {
            manager,
            pool,
            account: account.into(),
            pub_key: pub_key.into(),
        }
    }
}

#[async_trait]
impl NodeBackend for SessionBackend {
    async fn submit(&self, request: SubmitRequest) -> Result<(), RpcError> {
        Ok(self.manager.receive(request).await?)
    }

    async fn add_operation(&self, index: &str) -> Result<bool, RpcError> {
        Ok(self.pool.add(index).await?)
    }

    async fn info(&self) -> Result<NodeInfo, RpcError> {
        Ok(NodeInfo {
            account: self.account.clone(),
            pub_key: self.pub_key.clone(),
            sessions: self.manager.info().await,
        })
    }

    async fn session(&self, session_type: SessionType, id: u64) -> Result<SessionRecord, RpcError> {
        Ok(self.manager.session(session_type, id).await?)
    }
}

// ============================================================================
// API Implementation
// ============================================================================

fn rpc_err(e: RpcError) -> jsonrpsee::types::ErrorObjectOwned {
    e.into()
}

/// Implementation of the tsscore RPC API.
pub struct TssApiImpl<B> {
    backend: Arc<B>,
}

impl<B> TssApiImpl<B>
where
    B: NodeBackend,
{
    /// Create the API over `backend`.
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl<B> TssApiServer for TssApiImpl<B>
where
    B: NodeBackend + 'static,
{
    #[instrument(skip(self, request), fields(
        session_type = %request.session_type,
        session_id = request.session_id,
        request_type = %request.request_type,
    ), level = "debug")]
    async fn submit(&self, request: SubmitRequest) -> RpcResult<()> {
        self.backend.submit(request).await.map_err(|e| {
            debug!(error = %e, "tss_submit rejected");
            rpc_err(e)
        })
    }

    #[instrument(skip(self), level = "debug")]
    async fn add_operation(&self, index: String) -> RpcResult<bool> {
        let added = self.backend.add_operation(&index).await.map_err(rpc_err)?;
        debug!(%index, added, "tss_addOperation");
        Ok(added)
    }

    #[instrument(skip(self), level = "debug")]
    async fn info(&self) -> RpcResult<NodeInfo> {
        let info = self.backend.info().await.map_err(rpc_err)?;
        debug!(sessions = info.sessions.len(), "tss_info");
        Ok(info)
    }

    #[instrument(skip(self), level = "debug")]
    async fn session(&self, session_type: SessionType, id: u64) -> RpcResult<SessionRecord> {
        self.backend.session(session_type, id).await.map_err(rpc_err)
    }
}
