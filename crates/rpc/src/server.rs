//! RPC server implementation.
//!
//! Serves the `tss_*` API over HTTP. Peers and operators share one listener.

use crate::api::{NodeBackend, TssApiImpl, TssApiServer};
use crate::RpcError;
use jsonrpsee::server::{BatchRequestConfig, ServerBuilder, ServerHandle};
use jsonrpsee::RpcModule;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

// ============================================================================
// Server Configuration
// ============================================================================

/// Configuration for the RPC server.
#[derive(Debug, Clone)]
pub struct RpcServerConfig {
    /// Listen address.
    pub listen_addr: SocketAddr,
    /// Maximum number of connections.
    pub max_connections: u32,
    /// Maximum request body size (bytes).
    pub max_request_size: u32,
    /// Maximum response body size (bytes).
    pub max_response_size: u32,
    /// Batch request limit.
    pub batch_request_limit: u32,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 26660)),
            max_connections: 100,
            max_request_size: 10 * 1024 * 1024,  // 10 MB
            max_response_size: 10 * 1024 * 1024, // 10 MB
            batch_request_limit: 50,
        }
    }
}

// ============================================================================
// RPC Server
// ============================================================================

/// The node's RPC server.
pub struct RpcServer<B> {
    config: RpcServerConfig,
    backend: Arc<B>,
    handle: Option<ServerHandle>,
    local_addr: Option<SocketAddr>,
}

impl<B> RpcServer<B>
where
    B: NodeBackend + 'static,
{
    /// Create a server over `backend`.
    pub fn new(config: RpcServerConfig, backend: Arc<B>) -> Self {
        Self {
            config,
            backend,
            handle: None,
            local_addr: None,
        }
    }

    /// Build the RPC module with all methods.
    fn build_rpc_module(&self) -> Result<RpcModule<()>, RpcError> {
        let mut module = RpcModule::new(());
        let api = TssApiImpl::new(self.backend.clone());
        module
            .merge(api.into_rpc())
            .map_err(|e| RpcError::Internal(format!("Failed to merge tss API: {}", e)))?;
        Ok(module)
    }

    /// Bind and start serving.
    pub async fn start(&mut self) -> Result<(), RpcError> {
        let module = self.build_rpc_module()?;

        let server = ServerBuilder::default()
            .max_connections(self.config.max_connections)
            .max_request_body_size(self.config.max_request_size)
            .max_response_body_size(self.config.max_response_size)
            .set_batch_request_config(BatchRequestConfig::Limit(self.config.batch_request_limit))
            .build(self.config.listen_addr)
            .await
            .map_err(|e| RpcError::Internal(format!("Failed to build RPC server: {}", e)))?;

        let local_addr = server
            .local_addr()
            .map_err(|e| RpcError::Internal(format!("Failed to read local address: {}", e)))?;
        self.handle = Some(server.start(module));
        self.local_addr = Some(local_addr);

        info!(addr = %local_addr, "RPC server started");
        Ok(())
    }

    /// Bound address, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Stop the server.
    pub async fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.stop().ok();
            handle.stopped().await;
            info!("RPC server stopped");
        }
    }

    /// Wait for the server to finish.
    pub async fn wait(&self) {
        if let Some(ref handle) = self.handle {
            handle.clone().stopped().await;
        }
    }
}

// ============================================================================
// Server Builder
// ============================================================================

/// Builder for creating RPC servers with custom configuration.
pub struct RpcServerBuilder<B> {
    config: RpcServerConfig,
    backend: Option<Arc<B>>,
}

impl<B> Default for RpcServerBuilder<B>
where
    B: NodeBackend + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<B> RpcServerBuilder<B>
where
    B: NodeBackend + 'static,
{
    /// Create a new server builder.
    pub fn new() -> Self {
        Self {
            config: RpcServerConfig::default(),
            backend: None,
        }
    }

    /// Set the listen address.
    pub fn listen_addr(mut self, addr: SocketAddr) -> Self {
        self.config.listen_addr = addr;
        self
    }

    /// Set the backend.
    pub fn backend(mut self, backend: Arc<B>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Set the maximum number of connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.config.max_connections = max;
        self
    }

    /// Set the maximum request size.
    pub fn max_request_size(mut self, max: u32) -> Self {
        self.config.max_request_size = max;
        self
    }

    /// Set the maximum response size.
    pub fn max_response_size(mut self, max: u32) -> Self {
        self.config.max_response_size = max;
        self
    }

    /// Build the server.
    pub fn build(self) -> Result<RpcServer<B>, RpcError> {
        let backend = self
            .backend
            .ok_or_else(|| RpcError::Internal("RPC backend not set".to_string()))?;
        Ok(RpcServer::new(self.config, backend))
    }
}
