//! Mutable session state and the context controllers share.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};
use tsscore_p2p::Delivery;
use tsscore_types::{
    InputSet, Party, Payload, RequestType, SessionRecord, SessionStatus, SessionType,
    SubmitRequest,
};

use crate::{BoundsManager, SessionEnv, SessionResult, SessionStrategy};

/// State written by controllers as the session advances.
#[derive(Debug, Clone, Default)]
pub struct SessionData {
    /// Lifecycle status
    pub status: SessionStatus,
    /// Whether a proposal from the elected proposer was decided on
    pub decided: bool,
    /// Whether the session has work to do
    pub processing: bool,
    /// Agreed root (hex)
    pub root: Option<String>,
    /// Proposed operation ids
    pub indexes: Vec<String>,
    /// Reshare target roster
    pub new_parties: Vec<Party>,
    /// Accounts that sent a valid acceptance
    pub accepted: HashSet<String>,
    /// Selected signers, roster order
    pub signers: Vec<Party>,
    /// Account to reason
    pub offenders: BTreeMap<String, String>,
    /// Senders of proposals while not being the proposer, held until a
    /// valid proposal from the real proposer arrives
    pub suspects: BTreeMap<String, String>,
    /// Group signature (hex)
    pub signature: Option<String>,
    /// New shared key (hex)
    pub new_key: Option<String>,
    /// New local share, stored at finish
    pub new_share: Option<Vec<u8>>,
    /// Why the session failed
    pub failure: Option<String>,
    /// Unrecoverable local error raised by a controller task
    pub fatal: Option<String>,
}

impl SessionData {
    /// Record an offender. The first reason is kept.
    pub fn add_offender(&mut self, account: &str, reason: impl Into<String>) {
        self.offenders
            .entry(account.to_string())
            .or_insert_with(|| reason.into());
    }

    /// Mark the session failed. The first reason is kept.
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.processing = false;
        if self.failure.is_none() {
            self.failure = Some(reason.into());
        }
    }
}

/// Everything a controller needs, cheap to clone.
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Session id
    pub id: u64,
    /// Session type
    pub session_type: SessionType,
    /// Roster snapshot
    pub input: Arc<InputSet>,
    /// Node collaborators
    pub env: Arc<SessionEnv>,
    /// Elected proposer
    pub proposer: Party,
    /// Type-specific behavior
    pub strategy: SessionStrategy,
    /// Phase windows
    pub bounds: Arc<BoundsManager>,
    /// Shared mutable state
    pub data: Arc<Mutex<SessionData>>,
}

impl SessionContext {
    /// Local account.
    pub fn local_account(&self) -> &str {
        &self.input.local_account
    }

    /// Whether the local party is the elected proposer.
    pub fn is_proposer(&self) -> bool {
        self.proposer.account == self.input.local_account
    }

    /// Record an offender. The local account is never recorded.
    pub fn add_offender(&self, account: &str, reason: impl Into<String>) {
        if account == self.local_account() {
            return;
        }
        let reason = reason.into();
        debug!(
            session_type = %self.session_type,
            session_id = self.id,
            offender = account,
            %reason,
            "offender recorded"
        );
        self.data.lock().add_offender(account, reason);
    }

    /// Build a signed request for this session.
    pub fn request(
        &self,
        request_type: RequestType,
        is_broadcast: bool,
        payload: &Payload,
    ) -> SessionResult<SubmitRequest> {
        Ok(self.env.signer.build(
            self.id,
            self.session_type,
            request_type,
            is_broadcast,
            payload,
        )?)
    }

    /// Broadcast a payload to `targets`. Unreachable peers become offenders.
    pub async fn broadcast(
        &self,
        request_type: RequestType,
        payload: &Payload,
        targets: &[Party],
    ) -> SessionResult<Delivery> {
        let request = self.request(request_type, true, payload)?;
        let delivery = self.env.broadcaster.broadcast(targets, &request).await;
        for party in &delivery.unreachable {
            self.add_offender(&party.account, format!("unreachable during {request_type}"));
        }
        Ok(delivery)
    }

    /// Snapshot of the session for the record store.
    pub fn record(&self) -> SessionRecord {
        let data = self.data.lock();
        let mut record = SessionRecord::new(
            self.session_type,
            self.id,
            self.bounds.session_start(),
            self.bounds.session_end(),
        );
        record.status = data.status;
        record.parties = self.input.parties.iter().map(|p| p.account.clone()).collect();
        record.proposer = Some(self.proposer.account.clone());
        record.indexes = data.indexes.clone();
        record.root = data.root.clone();
        record.accepted = self
            .input
            .parties
            .iter()
            .filter(|p| data.accepted.contains(&p.account))
            .map(|p| p.account.clone())
            .collect();
        record.signers = data.signers.iter().map(|p| p.account.clone()).collect();
        record.offenders = data.offenders.keys().cloned().collect();
        record.signature = data.signature.clone();
        record.new_key = data.new_key.clone();
        record
    }

    /// Write the current record. Store failures are logged, not propagated.
    pub async fn persist(&self) {
        let record = self.record();
        if let Err(e) = self.env.store.put(&record).await {
            warn!(
                session_type = %self.session_type,
                session_id = self.id,
                error = %e,
                "failed to persist session record"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_reason_kept() {
        let mut data = SessionData::default();
        data.add_offender("a", "first");
        data.add_offender("a", "second");
        assert_eq!(data.offenders["a"], "first");

        data.processing = true;
        data.fail("quorum");
        data.fail("other");
        assert!(!data.processing);
        assert_eq!(data.failure.as_deref(), Some("quorum"));
    }
}
