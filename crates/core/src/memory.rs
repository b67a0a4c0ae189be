//! In-process stores.

use crate::{SecretStore, SessionStore, StoreResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use tsscore_types::{SessionRecord, SessionType};

/// Session records kept in memory.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    records: RwLock<BTreeMap<(SessionType, u64), SessionRecord>>,
}

impl MemorySessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Highest stored id for a session type.
    pub fn latest(&self, session_type: SessionType) -> Option<SessionRecord> {
        self.records
            .read()
            .range((session_type, 0)..=(session_type, u64::MAX))
            .next_back()
            .map(|(_, r)| r.clone())
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn put(&self, record: &SessionRecord) -> StoreResult<()> {
        self.records
            .write()
            .insert((record.session_type, record.id), record.clone());
        Ok(())
    }

    async fn get(&self, session_type: SessionType, id: u64) -> StoreResult<Option<SessionRecord>> {
        Ok(self.records.read().get(&(session_type, id)).cloned())
    }
}

/// Key share kept in memory.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    share: RwLock<Option<Vec<u8>>>,
}

impl MemorySecretStore {
    /// Create a store, optionally pre-seeded with a share.
    pub fn new(share: Option<Vec<u8>>) -> Self {
        Self {
            share: RwLock::new(share),
        }
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn share(&self) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.share.read().clone())
    }

    async fn set_share(&self, share: Vec<u8>) -> StoreResult<()> {
        *self.share.write() = Some(share);
        Ok(())
    }
}
