//! Broadcast and targeted delivery of signed requests.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tsscore_core::TransportError;
use tsscore_types::{Party, SubmitRequest};

use crate::ConnectionCache;

/// Outcome of a broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Accounts that accepted the request
    pub delivered: Vec<String>,
    /// Accounts that were reached but refused the request
    pub rejected: Vec<String>,
    /// Parties that could not be reached after the retry pass
    pub unreachable: Vec<Party>,
}

impl Delivery {
    /// True if every peer was reached.
    pub fn is_complete(&self) -> bool {
        self.unreachable.is_empty()
    }
}

/// Sends one request to every party except the local one.
#[derive(Clone)]
pub struct BroadcastConnector {
    cache: Arc<ConnectionCache>,
    local_account: String,
}

impl BroadcastConnector {
    /// Create a connector that skips `local_account` when fanning out.
    pub fn new(cache: Arc<ConnectionCache>, local_account: impl Into<String>) -> Self {
        Self {
            cache,
            local_account: local_account.into(),
        }
    }

    /// Fan `request` out concurrently, then retry the failed subset once.
    pub async fn broadcast(&self, parties: &[Party], request: &SubmitRequest) -> Delivery {
        let targets: Vec<&Party> = parties
            .iter()
            .filter(|p| p.account != self.local_account)
            .collect();

        let mut delivery = Delivery::default();
        let failed = self.send_all(&targets, request, &mut delivery).await;
        if failed.is_empty() {
            return delivery;
        }

        debug!(
            session_id = request.session_id,
            failed = failed.len(),
            "retrying broadcast to unreachable peers"
        );
        let still_failed = self.send_all(&failed, request, &mut delivery).await;
        for party in still_failed {
            warn!(
                session_id = request.session_id,
                peer = %party.account,
                "peer unreachable after retry"
            );
            delivery.unreachable.push(party.clone());
        }
        delivery
    }

    async fn send_all<'p>(
        &self,
        targets: &[&'p Party],
        request: &SubmitRequest,
        delivery: &mut Delivery,
    ) -> Vec<&'p Party> {
        let results = join_all(
            targets
                .iter()
                .map(|p| self.cache.submit(&p.address, request)),
        )
        .await;

        let mut failed = Vec::new();
        for (party, result) in targets.iter().zip(results) {
            match result {
                Ok(()) => delivery.delivered.push(party.account.clone()),
                Err(TransportError::Rejected(reason)) => {
                    debug!(peer = %party.account, %reason, "peer rejected request");
                    delivery.rejected.push(party.account.clone());
                }
                Err(e) => {
                    debug!(peer = %party.account, error = %e, "broadcast delivery failed");
                    failed.push(*party);
                }
            }
        }
        failed
    }
}

/// Sends a request to one party, retrying until it lands or the phase ends.
#[derive(Clone)]
pub struct SubmitConnector {
    cache: Arc<ConnectionCache>,
    retry_interval: Duration,
}

impl SubmitConnector {
    /// Create a connector pausing `retry_interval` between attempts.
    pub fn new(cache: Arc<ConnectionCache>, retry_interval: Duration) -> Self {
        Self {
            cache,
            retry_interval,
        }
    }

    /// Deliver `request` to `party`. Returns false if `cancel` fired first.
    pub async fn submit(
        &self,
        party: &Party,
        request: &SubmitRequest,
        cancel: &CancellationToken,
    ) -> bool {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let attempt = tokio::select! {
                _ = cancel.cancelled() => return false,
                r = self.cache.submit(&party.address, request) => r,
            };
            match attempt {
                Ok(()) => return true,
                Err(e) => debug!(peer = %party.account, attempts, error = %e, "submit failed, retrying"),
            }

            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = tokio::time::sleep(self.retry_interval) => {}
            }
        }
    }
}
