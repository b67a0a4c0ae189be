//! Session record and secret share storage.

use async_trait::async_trait;
use thiserror::Error;
use tsscore_types::{SessionRecord, SessionType};

/// Errors that can occur during storage operations.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// Stored bytes could not be decoded.
    #[error("corrupted value: {0}")]
    Corrupted(String),

    /// Backend I/O failed.
    #[error("storage I/O error: {0}")]
    Io(String),
}

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Persisted session records, one per (type, id). Introspection only.
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    /// Insert or replace a record.
    async fn put(&self, record: &SessionRecord) -> StoreResult<()>;

    /// Look up a record.
    async fn get(&self, session_type: SessionType, id: u64) -> StoreResult<Option<SessionRecord>>;
}

/// Local key share vault.
#[async_trait]
pub trait SecretStore: Send + Sync + 'static {
    /// Current local share, if any.
    async fn share(&self) -> StoreResult<Option<Vec<u8>>>;

    /// Replace the local share.
    async fn set_share(&self, share: Vec<u8>) -> StoreResult<()>;
}
