//! Deduplicating FIFO of pending operation ids.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};
use tsscore_core::{ChainClient, ChainError};
use tsscore_types::Operation;

use crate::{PoolError, Result};

/// Default capacity of the FIFO.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Pending operation pool.
///
/// The dedup set tracks ids that are currently queued; an id leaves the set
/// when it is dequeued, so it can be added again later (for example after a
/// failed session hands it back).
pub struct Pool {
    chain: Arc<dyn ChainClient>,
    queued: Mutex<HashSet<String>>,
    tx: async_channel::Sender<String>,
    rx: async_channel::Receiver<String>,
}

impl Pool {
    /// Create a pool whose FIFO holds at most `capacity` ids.
    pub fn new(chain: Arc<dyn ChainClient>, capacity: usize) -> Self {
        let (tx, rx) = async_channel::bounded(capacity.max(1));
        Self {
            chain,
            queued: Mutex::new(HashSet::new()),
            tx,
            rx,
        }
    }

    /// Validate `id` against chain and enqueue it.
    ///
    /// Returns `Ok(false)` if the id is already queued. Waits while the FIFO is full.
    pub async fn add(&self, id: &str) -> Result<bool> {
        let op = self.chain.operation(id).await?;
        self.add_operation(&op).await
    }

    /// Enqueue an operation that was already fetched from chain.
    pub async fn add_operation(&self, op: &Operation) -> Result<bool> {
        if !op.is_signable() {
            return Err(PoolError::OperationNotApprovable(op.index.clone()));
        }
        self.enqueue(op.index.clone()).await
    }

    async fn enqueue(&self, id: String) -> Result<bool> {
        if !self.queued.lock().insert(id.clone()) {
            trace!(index = %id, "operation already queued");
            return Ok(false);
        }

        if self.tx.send(id.clone()).await.is_err() {
            self.queued.lock().remove(&id);
            return Err(PoolError::Closed);
        }
        debug!(index = %id, queued = self.rx.len(), "operation added to pool");
        Ok(true)
    }

    /// Pop up to `n` ids that are still approved.
    ///
    /// Never waits for new ids. Ids that are no longer approved are dropped.
    /// If chain validation fails transiently, the id goes back to the tail
    /// and the batch collected so far is returned.
    pub async fn get_next(&self, n: usize) -> Vec<String> {
        let mut batch = Vec::with_capacity(n.min(self.rx.len()));

        while batch.len() < n {
            let id = match self.rx.try_recv() {
                Ok(id) => id,
                Err(_) => break,
            };
            self.queued.lock().remove(&id);

            match self.chain.operation(&id).await {
                Ok(op) if op.is_signable() => batch.push(id),
                Ok(_) | Err(ChainError::NotFound(_)) => {
                    debug!(index = %id, "dropping operation that is no longer approvable");
                }
                Err(e) => {
                    warn!(index = %id, error = %e, "operation validation failed, re-queueing");
                    self.push_back(id);
                    break;
                }
            }
        }

        batch
    }

    /// Hand ids back after a failed session. Ids that are no longer approvable are skipped.
    ///
    /// Never waits for room: ids that do not fit in the FIFO are dropped with
    /// a warning and picked up again by the next catch-up scan or `add`.
    pub async fn requeue(&self, ids: &[String]) -> usize {
        let mut added = 0;
        for id in ids {
            match self.chain.operation(id).await {
                Ok(op) if op.is_signable() => {
                    if self.push_back(id.clone()) {
                        added += 1;
                    }
                }
                Ok(_) => debug!(index = %id, "not re-queueing unapprovable operation"),
                Err(e) => debug!(index = %id, error = %e, "not re-queueing operation"),
            }
        }
        added
    }

    fn push_back(&self, id: String) -> bool {
        if !self.queued.lock().insert(id.clone()) {
            return false;
        }
        if let Err(e) = self.tx.try_send(id.clone()) {
            self.queued.lock().remove(&id);
            warn!(index = %id, error = %e, "could not re-queue operation");
            return false;
        }
        true
    }

    /// Number of queued ids.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Whether `id` is currently queued.
    pub fn contains(&self, id: &str) -> bool {
        self.queued.lock().contains(id)
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("queued", &self.rx.len())
            .field("capacity", &self.tx.capacity())
            .finish()
    }
}
