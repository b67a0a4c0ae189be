//! Session-type specific behavior.
//!
//! Controllers are shared by every session type; what differs is what gets
//! proposed, how a proposal is validated, what is signed and what is
//! submitted at the end. [`SessionStrategy`] holds those differences.

use std::collections::HashSet;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tsscore_crypto::{decode_hex, keccak256, merkle_root_hex, Hash};
use tsscore_types::{
    roster_digest, ChainMsg, ControllerKind, Party, Payload, SessionType,
};

use crate::{SessionContext, SessionData, SessionError, SessionResult};

/// What a decided proposal commits the session to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProposalOutcome {
    /// Whether there is work to do
    pub processing: bool,
    /// Root every party must accept (hex)
    pub root: Option<String>,
    /// Operation ids (default sessions)
    pub indexes: Vec<String>,
    /// Target roster (reshare sessions)
    pub new_parties: Vec<Party>,
}

impl ProposalOutcome {
    /// Store the outcome in the session state.
    pub fn apply(self, data: &mut SessionData) {
        data.decided = true;
        data.processing = self.processing;
        data.root = self.root;
        data.indexes = self.indexes;
        data.new_parties = self.new_parties;
        if data.processing {
            data.status = tsscore_types::SessionStatus::Processing;
        }
    }
}

/// Per-type session behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStrategy {
    /// Sign batches of pending operations
    Default,
    /// Move the key to a new roster
    Reshare,
    /// Generate the first key
    Keygen,
}

impl SessionStrategy {
    /// Strategy for a session type.
    pub fn for_type(session_type: SessionType) -> Self {
        match session_type {
            SessionType::Default => SessionStrategy::Default,
            SessionType::Reshare => SessionStrategy::Reshare,
            SessionType::Keygen => SessionStrategy::Keygen,
        }
    }

    /// Build the local proposal. Only the elected proposer calls this.
    pub async fn make_proposal(
        &self,
        ctx: &SessionContext,
    ) -> SessionResult<(Payload, ProposalOutcome)> {
        match self {
            SessionStrategy::Default => {
                let env = &ctx.env;
                let ids = env
                    .pool
                    .get_next(env.settings.max_operations_per_proposal)
                    .await;

                let mut indexes = Vec::with_capacity(ids.len());
                let mut contents = Vec::with_capacity(ids.len());
                for id in ids {
                    match env.chain.operation(&id).await {
                        Ok(op) if op.is_signable() => {
                            indexes.push(id);
                            contents.push(op.content);
                        }
                        Ok(_) => debug!(index = %id, "operation no longer signable"),
                        Err(e) => {
                            warn!(index = %id, error = %e, "failed to fetch operation, requeueing");
                            env.pool.requeue(&[id]).await;
                        }
                    }
                }

                if indexes.is_empty() {
                    let payload = Payload::DefaultProposal {
                        indexes: Vec::new(),
                        root: String::new(),
                    };
                    return Ok((payload, ProposalOutcome::default()));
                }

                let root = merkle_root_hex(&contents);
                let payload = Payload::DefaultProposal {
                    indexes: indexes.clone(),
                    root: root.clone(),
                };
                let outcome = ProposalOutcome {
                    processing: true,
                    root: Some(root),
                    indexes,
                    new_parties: Vec::new(),
                };
                Ok((payload, outcome))
            }
            SessionStrategy::Reshare => {
                let parties = ctx.input.reshare_target();
                let outcome = reshare_outcome(parties.clone());
                Ok((Payload::ReshareProposal { parties }, outcome))
            }
            SessionStrategy::Keygen => Err(SessionError::ProtocolViolation(
                "keygen sessions have no proposal".into(),
            )),
        }
    }

    /// Check a proposal received from the elected proposer.
    ///
    /// A [`SessionError::ProtocolViolation`] means the proposal itself is bad;
    /// any other error means it could not be checked.
    pub async fn validate_proposal(
        &self,
        ctx: &SessionContext,
        payload: &Payload,
    ) -> SessionResult<ProposalOutcome> {
        match (self, payload) {
            (SessionStrategy::Default, Payload::DefaultProposal { indexes, root }) => {
                if indexes.is_empty() {
                    return Ok(ProposalOutcome::default());
                }
                let max = ctx.env.settings.max_operations_per_proposal;
                if indexes.len() > max {
                    return Err(SessionError::ProtocolViolation(format!(
                        "proposal carries {} operations, limit is {max}",
                        indexes.len()
                    )));
                }
                let unique: HashSet<&String> = indexes.iter().collect();
                if unique.len() != indexes.len() {
                    return Err(SessionError::ProtocolViolation(
                        "duplicate operation in proposal".into(),
                    ));
                }

                let mut contents = Vec::with_capacity(indexes.len());
                for id in indexes {
                    let op = match ctx.env.chain.operation(id).await {
                        Ok(op) => op,
                        Err(tsscore_core::ChainError::NotFound(_)) => {
                            return Err(SessionError::ProtocolViolation(format!(
                                "unknown operation {id}"
                            )))
                        }
                        Err(e) => return Err(e.into()),
                    };
                    if !op.is_signable() {
                        return Err(SessionError::ProtocolViolation(format!(
                            "operation {id} is not signable"
                        )));
                    }
                    contents.push(op.content);
                }

                let local_root = merkle_root_hex(&contents);
                if !local_root.eq_ignore_ascii_case(root.trim_start_matches("0x")) {
                    return Err(SessionError::ProtocolViolation(format!(
                        "root mismatch: proposed {root}, computed {local_root}"
                    )));
                }
                Ok(ProposalOutcome {
                    processing: true,
                    root: Some(local_root),
                    indexes: indexes.clone(),
                    new_parties: Vec::new(),
                })
            }
            (SessionStrategy::Reshare, Payload::ReshareProposal { parties }) => {
                let expected = ctx.input.reshare_target();
                if *parties != expected {
                    return Err(SessionError::ProtocolViolation(
                        "proposed roster differs from the active parties".into(),
                    ));
                }
                Ok(reshare_outcome(expected))
            }
            _ => Err(SessionError::ProtocolViolation(format!(
                "unexpected proposal payload for {self:?} session"
            ))),
        }
    }

    /// Root parties accept: the decided proposal's root while processing.
    pub fn acceptance_root(&self, data: &SessionData) -> Option<String> {
        match self {
            SessionStrategy::Keygen => None,
            _ => data.root.clone().filter(|_| data.processing),
        }
    }

    /// Phase that follows a successful acceptance.
    pub fn after_acceptance(&self) -> ControllerKind {
        match self {
            SessionStrategy::Reshare => ControllerKind::Reshare,
            _ => ControllerKind::Sign,
        }
    }

    /// Digest the sign phase signs.
    pub fn sign_digest(&self, data: &SessionData) -> SessionResult<Hash> {
        match self {
            SessionStrategy::Default => {
                let root = data
                    .root
                    .as_deref()
                    .ok_or_else(|| SessionError::ProtocolViolation("no agreed root".into()))?;
                let bytes = decode_hex(root)?;
                let digest: Hash = bytes.as_slice().try_into().map_err(|_| {
                    SessionError::ProtocolViolation(format!("root is {} bytes", bytes.len()))
                })?;
                Ok(digest)
            }
            SessionStrategy::Reshare => {
                let key = data
                    .new_key
                    .as_deref()
                    .ok_or_else(|| SessionError::ProtocolViolation("no new key".into()))?;
                Ok(keccak256(&decode_hex(key)?))
            }
            SessionStrategy::Keygen => Err(SessionError::ProtocolViolation(
                "keygen sessions do not sign".into(),
            )),
        }
    }

    /// Submit the session result or return its work to the pool.
    pub async fn finish(&self, ctx: &SessionContext, cancel: &CancellationToken) -> SessionResult<()> {
        let data = ctx.data.lock().clone();
        let local = ctx.local_account();

        match self {
            SessionStrategy::Default => match &data.signature {
                Some(signature) if data.failure.is_none() => {
                    if !is_designated(&data.signers, local) {
                        // Already signed ids are skipped, so only ids whose
                        // confirmation never lands come back.
                        requeue(ctx, &data.indexes).await;
                        return Ok(());
                    }
                    let root = data.root.clone().unwrap_or_default();
                    info!(
                        session_id = ctx.id,
                        operations = data.indexes.len(),
                        %root,
                        "submitting confirmation"
                    );
                    let submitted = submit(
                        ctx,
                        cancel,
                        vec![ChainMsg::Confirmation {
                            indexes: data.indexes.clone(),
                            root,
                            signature: signature.clone(),
                        }],
                    )
                    .await;
                    if submitted.is_err() {
                        requeue(ctx, &data.indexes).await;
                    }
                    submitted
                }
                _ => {
                    requeue(ctx, &data.indexes).await;
                    Ok(())
                }
            },
            SessionStrategy::Reshare => {
                let (Some(new_key), Some(signature)) = (&data.new_key, &data.signature) else {
                    return Ok(());
                };
                if data.failure.is_some() || !is_designated(&data.signers, local) {
                    return Ok(());
                }
                info!(
                    session_id = ctx.id,
                    parties = data.new_parties.len(),
                    %new_key,
                    "submitting roster change"
                );
                submit(
                    ctx,
                    cancel,
                    vec![ChainMsg::ChangeParties {
                        parties: data.new_parties.clone(),
                        new_key: new_key.clone(),
                        signature: signature.clone(),
                    }],
                )
                .await
            }
            SessionStrategy::Keygen => {
                let Some(new_key) = &data.new_key else {
                    return Ok(());
                };
                if let Some(share) = &data.new_share {
                    ctx.env
                        .secrets
                        .set_share(share.clone())
                        .await
                        .map_err(|e| SessionError::Fatal(format!("failed to store key share: {e}")))?;
                }
                if !is_designated(&ctx.input.verified_parties, local) {
                    return Ok(());
                }
                info!(session_id = ctx.id, %new_key, "submitting initial key");
                submit(
                    ctx,
                    cancel,
                    vec![ChainMsg::SetupInitial {
                        new_key: new_key.clone(),
                        parties: ctx.input.verified_parties.clone(),
                    }],
                )
                .await
            }
        }
    }
}

fn reshare_outcome(parties: Vec<Party>) -> ProposalOutcome {
    if parties.is_empty() {
        return ProposalOutcome::default();
    }
    ProposalOutcome {
        processing: true,
        root: Some(hex::encode(roster_digest(&parties))),
        indexes: Vec::new(),
        new_parties: parties,
    }
}

/// The first party in roster order submits on behalf of the group.
fn is_designated(holders: &[Party], local: &str) -> bool {
    holders.first().map(|p| p.account == local).unwrap_or(false)
}

async fn requeue(ctx: &SessionContext, indexes: &[String]) {
    if indexes.is_empty() {
        return;
    }
    let requeued = ctx.env.pool.requeue(indexes).await;
    debug!(session_id = ctx.id, requeued, "returned operations to pool");
}

/// Submit `msgs`, giving up when the session ends first.
async fn submit(
    ctx: &SessionContext,
    cancel: &CancellationToken,
    msgs: Vec<ChainMsg>,
) -> SessionResult<()> {
    tokio::select! {
        _ = cancel.cancelled() => {
            warn!(session_id = ctx.id, "session ended before submission completed");
            Err(SessionError::SessionEnded)
        }
        r = ctx.env.chain.submit(msgs) => r.map_err(SessionError::from),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_after_acceptance() {
        assert_eq!(SessionStrategy::Default.after_acceptance(), ControllerKind::Sign);
        assert_eq!(SessionStrategy::Reshare.after_acceptance(), ControllerKind::Reshare);
    }

    #[test]
    fn test_acceptance_root_requires_processing() {
        let mut data = SessionData {
            root: Some("ab".into()),
            ..SessionData::default()
        };
        assert_eq!(SessionStrategy::Default.acceptance_root(&data), None);
        data.processing = true;
        assert_eq!(
            SessionStrategy::Default.acceptance_root(&data).as_deref(),
            Some("ab")
        );
        assert_eq!(SessionStrategy::Keygen.acceptance_root(&data), None);
    }

    #[test]
    fn test_reshare_digest_signs_new_key() {
        let data = SessionData {
            new_key: Some("02aabb".into()),
            ..SessionData::default()
        };
        let digest = SessionStrategy::Reshare.sign_digest(&data).unwrap();
        assert_eq!(digest, keccak256(&[0x02, 0xaa, 0xbb]));
    }

    #[test]
    fn test_default_digest_is_root() {
        let root = [9u8; 32];
        let data = SessionData {
            root: Some(hex::encode(root)),
            ..SessionData::default()
        };
        assert_eq!(SessionStrategy::Default.sign_digest(&data).unwrap(), root);
        assert!(SessionStrategy::Default
            .sign_digest(&SessionData::default())
            .is_err());
    }

    #[test]
    fn test_empty_reshare_target_is_idle() {
        assert_eq!(reshare_outcome(Vec::new()), ProposalOutcome::default());
        let outcome = reshare_outcome(vec![Party::new("a", "pk", "addr")]);
        assert!(outcome.processing);
        assert!(outcome.root.is_some());
    }

    #[test]
    fn test_designated_submitter() {
        let parties = vec![Party::new("a", "pk", "x"), Party::new("b", "pk", "y")];
        assert!(is_designated(&parties, "a"));
        assert!(!is_designated(&parties, "b"));
        assert!(!is_designated(&[], "a"));
    }
}
