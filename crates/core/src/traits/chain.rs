//! Chain client trait.

use async_trait::async_trait;
use thiserror::Error;
use tsscore_types::{ChainMsg, ChainParams, Operation, OperationsPage};

/// Errors returned by the chain client.
#[derive(Error, Debug, Clone)]
pub enum ChainError {
    /// The requested operation does not exist.
    #[error("operation not found: {0}")]
    NotFound(String),

    /// The node could not be reached or answered with an error.
    #[error("chain rpc error: {0}")]
    Rpc(String),

    /// Simulation or submission of a transaction was rejected.
    #[error("transaction rejected: {0}")]
    Rejected(String),
}

/// Result type for chain operations.
pub type ChainResult<T> = Result<T, ChainError>;

/// Read and write access to the chain the engine serves.
#[async_trait]
pub trait ChainClient: Send + Sync + 'static {
    /// Fetch a single operation.
    async fn operation(&self, index: &str) -> ChainResult<Operation>;

    /// Fetch one page of all operations, starting at `cursor` (empty for the first page).
    async fn operations(&self, cursor: &[u8]) -> ChainResult<OperationsPage>;

    /// Fetch the current roster and parameters.
    async fn params(&self) -> ChainResult<ChainParams>;

    /// Simulate and then broadcast a transaction carrying `msgs`.
    async fn submit(&self, msgs: Vec<ChainMsg>) -> ChainResult<()>;
}
