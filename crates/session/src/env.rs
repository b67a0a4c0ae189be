//! Collaborators shared by every session of a node.

use std::sync::Arc;

use tsscore_core::{ChainClient, EngineFactory, SecretStore, SessionStore};
use tsscore_p2p::{BroadcastConnector, RequestSigner, SubmitConnector};
use tsscore_pool::Pool;

/// Per-node session limits.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Local account
    pub local_account: String,
    /// Seed used for proposer election until the chain has a signature
    pub seed_signature: String,
    /// Upper bound of operation ids per proposal
    pub max_operations_per_proposal: usize,
    /// Capacity of early-message mailboxes
    pub mailbox_capacity: usize,
}

/// Typed environment handed to sessions and controllers.
#[derive(Clone)]
pub struct SessionEnv {
    /// Chain access
    pub chain: Arc<dyn ChainClient>,
    /// MPC engine factory
    pub engines: Arc<dyn EngineFactory>,
    /// Local key share
    pub secrets: Arc<dyn SecretStore>,
    /// Session records
    pub store: Arc<dyn SessionStore>,
    /// Pending operations
    pub pool: Arc<Pool>,
    /// Fan-out delivery
    pub broadcaster: BroadcastConnector,
    /// Targeted delivery
    pub submitter: SubmitConnector,
    /// Outgoing request signer
    pub signer: Arc<RequestSigner>,
    /// Limits
    pub settings: SessionSettings,
}

impl std::fmt::Debug for SessionEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionEnv")
            .field("settings", &self.settings)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}
