//! Node runtime.
//!
//! This module wires a node together:
//! - Building the pool, connectors and session manager from configuration
//! - Serving the `tss_*` RPC API
//! - Scanning chain operations into the pool once at startup
//! - Feeding block heights to the session manager
//! - Stopping on shutdown requests and fatal session errors

use anyhow::{Context, Result};
use futures::{Stream, StreamExt};
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use tsscore_config::Config;
use tsscore_core::{ChainClient, EngineFactory, PeerDialer, SecretStore, SessionStore};
use tsscore_crypto::PrivateKey;
use tsscore_p2p::{BroadcastConnector, ConnectionCache, RequestSigner, SubmitConnector};
use tsscore_pool::{CatchupScanner, Pool};
use tsscore_rpc::{RpcServer, RpcServerConfig, SessionBackend};
use tsscore_session::{SessionEnv, SessionManager, SessionSettings};
use tsscore_types::SessionType;

/// Node status representing the current state of the node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    /// Node is starting up
    Starting,
    /// Node is processing blocks
    Running,
    /// Node is shutting down
    ShuttingDown,
    /// Node has stopped
    Stopped,
}

/// Events emitted by the node for external monitoring
#[derive(Debug, Clone)]
pub enum NodeEvent {
    /// Node status changed
    StatusChanged(NodeStatus),
    /// A block height was processed
    BlockProcessed(u64),
    /// Catch-up scan finished
    CatchupFinished {
        /// Operation ids queued by the scan
        added: usize,
    },
    /// A session failed in a way the node cannot recover from
    Fatal(String),
}

/// Externally provided collaborators.
#[derive(Clone)]
pub struct Collaborators {
    /// Chain access
    pub chain: Arc<dyn ChainClient>,
    /// MPC engine factory
    pub engines: Arc<dyn EngineFactory>,
    /// Local key share
    pub secrets: Arc<dyn SecretStore>,
    /// Session records
    pub store: Arc<dyn SessionStore>,
    /// Peer transport
    pub dialer: Arc<dyn PeerDialer>,
}

/// A tsscore node.
pub struct Node {
    config: Arc<Config>,
    status: Arc<RwLock<NodeStatus>>,
    chain: Arc<dyn ChainClient>,
    pool: Arc<Pool>,
    manager: Arc<SessionManager>,
    pub_key: String,
    rpc: Option<RpcServer<SessionBackend>>,
    catchup: Option<JoinHandle<()>>,
    event_tx: broadcast::Sender<NodeEvent>,
    shutdown_tx: broadcast::Sender<()>,
}

/// Session types a node runs for its configuration.
pub fn session_types(config: &Config) -> Vec<SessionType> {
    if config.session.keygen {
        vec![SessionType::Keygen]
    } else {
        vec![SessionType::Default, SessionType::Reshare]
    }
}

impl Node {
    /// Build a node whose first block will be `height`.
    ///
    /// Reads chain parameters to bootstrap the first session of every
    /// configured type.
    pub async fn new(
        config: Config,
        key: PrivateKey,
        collaborators: Collaborators,
        height: u64,
    ) -> Result<Self> {
        config.validate().context("invalid configuration")?;

        let Collaborators {
            chain,
            engines,
            secrets,
            store,
            dialer,
        } = collaborators;

        let account = config.node.account.clone();
        let pub_key = key.public_key().to_hex();
        let cache = Arc::new(ConnectionCache::new(dialer, config.network.request_timeout()));
        let pool = Arc::new(Pool::new(chain.clone(), config.pool.capacity));

        let env = SessionEnv {
            chain: chain.clone(),
            engines,
            secrets,
            store,
            pool: pool.clone(),
            broadcaster: BroadcastConnector::new(cache.clone(), account.clone()),
            submitter: SubmitConnector::new(cache, config.network.retry_interval()),
            signer: Arc::new(RequestSigner::new(key)),
            settings: SessionSettings {
                local_account: account.clone(),
                seed_signature: config.session.start_signature.clone(),
                max_operations_per_proposal: config.session.max_operations_per_proposal,
                mailbox_capacity: config.session.mailbox_capacity,
            },
        };

        let manager = SessionManager::bootstrap(
            Arc::new(env),
            &session_types(&config),
            config.session.start_block,
            height,
        )
        .await
        .context("failed to bootstrap sessions")?;

        info!(%account, %pub_key, height, "node created");

        let (event_tx, _) = broadcast::channel(1000);
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config: Arc::new(config),
            status: Arc::new(RwLock::new(NodeStatus::Starting)),
            chain,
            pool,
            manager: Arc::new(manager),
            pub_key,
            rpc: None,
            catchup: None,
            event_tx,
            shutdown_tx,
        })
    }

    /// Build a node using the key named by `config.node.key_file`.
    pub async fn from_config(config: Config, collaborators: Collaborators, height: u64) -> Result<Self> {
        let hex = config.node.read_private_key()?;
        let key = PrivateKey::from_hex(&hex).context("invalid private key")?;
        Self::new(config, key, collaborators, height).await
    }

    /// Run until the block stream ends, a shutdown is requested or a session
    /// fails fatally.
    pub async fn run(&mut self, blocks: impl Stream<Item = u64>) -> Result<()> {
        info!("Starting tsscore node");
        self.set_status(NodeStatus::Starting);

        self.start_rpc().await?;
        if self.config.pool.catchup {
            self.start_catchup();
        }
        self.set_status(NodeStatus::Running);

        let outcome = self.process_blocks(blocks).await;
        self.shutdown().await;
        outcome
    }

    async fn process_blocks(&self, blocks: impl Stream<Item = u64>) -> Result<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        futures::pin_mut!(blocks);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Shutdown requested");
                    return Ok(());
                }
                next = blocks.next() => {
                    let Some(height) = next else {
                        info!("Block stream ended");
                        return Ok(());
                    };
                    match self.manager.new_block(height).await {
                        Ok(()) => {
                            debug!(height, "block processed");
                            let _ = self.event_tx.send(NodeEvent::BlockProcessed(height));
                        }
                        Err(e) if e.is_fatal() => {
                            error!(height, error = %e, "fatal session error");
                            let _ = self.event_tx.send(NodeEvent::Fatal(e.to_string()));
                            return Err(e.into());
                        }
                        Err(e) => warn!(height, error = %e, "block processing failed"),
                    }
                }
            }
        }
    }

    /// Start the RPC server if it is not running.
    pub async fn start_rpc(&mut self) -> Result<SocketAddr> {
        if let Some(addr) = self.rpc_addr() {
            return Ok(addr);
        }

        let listen_addr = self
            .config
            .network
            .listen_addr
            .parse()
            .context("invalid listen address")?;
        let rpc_config = RpcServerConfig {
            listen_addr,
            max_connections: self.config.network.max_connections,
            ..Default::default()
        };
        let backend = SessionBackend::new(
            self.manager.clone(),
            self.pool.clone(),
            self.config.node.account.clone(),
            self.pub_key.clone(),
        );
        let mut server = RpcServer::new(rpc_config, Arc::new(backend));
        server.start().await?;
        let addr = server
            .local_addr()
            .context("RPC server did not report its address")?;
        self.rpc = Some(server);
        Ok(addr)
    }

    fn start_catchup(&mut self) {
        let scanner = CatchupScanner::new(self.chain.clone(), self.pool.clone());
        let event_tx = self.event_tx.clone();
        self.catchup = Some(tokio::spawn(async move {
            match scanner.run().await {
                Ok(added) => {
                    info!(added, "catch-up scan finished");
                    let _ = event_tx.send(NodeEvent::CatchupFinished { added });
                }
                Err(e) => warn!(error = %e, "catch-up scan failed"),
            }
        }));
    }

    /// Stop sessions, the RPC server and the catch-up scan.
    pub async fn shutdown(&mut self) {
        if self.status() == NodeStatus::Stopped {
            return;
        }
        info!("Shutting down node");
        self.set_status(NodeStatus::ShuttingDown);

        self.manager.shutdown().await;

        if let Some(mut server) = self.rpc.take() {
            server.stop().await;
        }

        if let Some(handle) = self.catchup.take() {
            handle.abort();
            match tokio::time::timeout(Duration::from_secs(5), handle).await {
                Ok(_) => debug!("Catch-up scan stopped"),
                Err(_) => warn!("Catch-up scan shutdown timed out"),
            }
        }

        self.set_status(NodeStatus::Stopped);
        info!("Node shutdown complete");
    }

    fn set_status(&self, status: NodeStatus) {
        *self.status.write() = status;
        let _ = self.event_tx.send(NodeEvent::StatusChanged(status));
    }

    /// Get node status
    pub fn status(&self) -> NodeStatus {
        *self.status.read()
    }

    /// Session manager, for registering the node with a transport.
    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    /// Pending operation pool.
    pub fn pool(&self) -> &Arc<Pool> {
        &self.pool
    }

    /// Compressed public key of the request signing key (hex).
    pub fn pub_key(&self) -> &str {
        &self.pub_key
    }

    /// RPC address, once the server is running.
    pub fn rpc_addr(&self) -> Option<SocketAddr> {
        self.rpc.as_ref().and_then(|s| s.local_addr())
    }

    /// Subscribe to node events
    pub fn subscribe_events(&self) -> broadcast::Receiver<NodeEvent> {
        self.event_tx.subscribe()
    }

    /// Handle that stops [`Node::run`] when triggered.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
        }
    }

    /// Request node shutdown
    pub fn request_shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// Requests shutdown of a running node from another task.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: broadcast::Sender<()>,
}

impl ShutdownHandle {
    /// Request shutdown.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_types() {
        let mut config = Config::default();
        assert_eq!(
            session_types(&config),
            vec![SessionType::Default, SessionType::Reshare]
        );
        config.session.keygen = true;
        assert_eq!(session_types(&config), vec![SessionType::Keygen]);
    }

    #[test]
    fn test_node_event_clone() {
        let event = NodeEvent::StatusChanged(NodeStatus::Running);
        match (event.clone(), event) {
            (NodeEvent::StatusChanged(a), NodeEvent::StatusChanged(b)) => assert_eq!(a, b),
            _ => panic!("events should match"),
        }
    }
}
