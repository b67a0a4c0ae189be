//! Startup scan over all chain operations.

use std::sync::Arc;

use tracing::{debug, info};
use tsscore_core::ChainClient;

use crate::{Pool, Result};

/// Walks every page of chain operations once and queues the signable ones.
pub struct CatchupScanner {
    chain: Arc<dyn ChainClient>,
    pool: Arc<Pool>,
}

impl CatchupScanner {
    /// Create a scanner.
    pub fn new(chain: Arc<dyn ChainClient>, pool: Arc<Pool>) -> Self {
        Self { chain, pool }
    }

    /// Scan until the chain returns an empty cursor. Returns the number of ids queued.
    pub async fn run(&self) -> Result<usize> {
        let mut cursor = Vec::new();
        let mut pages = 0usize;
        let mut added = 0usize;

        loop {
            let page = self.chain.operations(&cursor).await?;
            pages += 1;

            for op in page.operations.iter().filter(|op| op.is_signable()) {
                match self.pool.add_operation(op).await {
                    Ok(true) => added += 1,
                    Ok(false) => {}
                    Err(e) => debug!(index = %op.index, error = %e, "skipping operation"),
                }
            }

            if page.next_key.is_empty() {
                break;
            }
            cursor = page.next_key;
        }

        info!(pages, added, "operation catch-up finished");
        Ok(added)
    }
}
