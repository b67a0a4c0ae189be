//! Session rotation and inbound request routing.
//!
//! The manager keeps one live session per configured type. On each block it
//! ticks every live session; when one ends it fetches fresh chain
//! parameters and creates the next session of that type, starting on the
//! block after the previous one ended. If the parameters cannot be fetched
//! the ended session stays in place and rotation is retried on the next
//! block.
//!
//! Inbound requests are authenticated against the roster of the session
//! they address. Requests for the session that follows the live one are
//! authenticated against the live roster, held until the next session
//! exists and replayed only if the sender is still on its roster.
//!
//! A reshare produces a new key share before the chain has accepted the
//! new key. The share is parked and only written to the secret store once
//! a later parameter snapshot reports the new key.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};
use tsscore_core::SubmitHandler;
use tsscore_p2p::AuthGate;
use tsscore_types::{
    ChainParams, InputSet, Party, SessionRecord, SessionSummary, SessionType, SubmitRequest,
};

use crate::{Mailbox, Session, SessionEnv, SessionError, SessionResult, Tick};

/// First session id and start block for a node whose first block is `height`.
///
/// Assumes every session since `start_block` had the current span, which
/// holds while phase durations are unchanged on chain.
pub fn schedule(start_block: u64, height: u64, span: u64) -> (u64, u64) {
    if height <= start_block {
        return (0, start_block);
    }
    let period = span + 1;
    let id = (height - start_block) / period;
    (id, start_block + id * period)
}

/// Owns the live sessions of a node.
pub struct SessionManager {
    env: Arc<SessionEnv>,
    sessions: RwLock<HashMap<SessionType, Arc<Session>>>,
    upcoming: Mutex<HashMap<SessionType, Mailbox<(Party, SubmitRequest)>>>,
    pending_share: Mutex<Option<(String, Vec<u8>)>>,
}

impl SessionManager {
    /// Create the first session of every type in `types`.
    ///
    /// Keygen runs alone: combining it with other types is refused.
    pub async fn bootstrap(
        env: Arc<SessionEnv>,
        types: &[SessionType],
        start_block: u64,
        height: u64,
    ) -> SessionResult<Self> {
        if types.is_empty() {
            return Err(SessionError::Fatal("no session types configured".into()));
        }
        if types.contains(&SessionType::Keygen) && types.len() > 1 {
            return Err(SessionError::Fatal(
                "keygen cannot run alongside other session types".into(),
            ));
        }

        let params = env.chain.params().await?;
        let input = InputSet::from_params(
            &params,
            &env.settings.local_account,
            &env.settings.seed_signature,
        )?;

        let mut sessions = HashMap::new();
        for session_type in types {
            let span = input.durations.total(*session_type);
            let (id, start) = schedule(start_block, height, span);
            let session = Session::new(*session_type, id, input.clone(), env.clone(), start)?;
            info!(
                %session_type,
                session_id = id,
                start,
                end = session.end(),
                parties = input.n,
                threshold = input.t,
                active = input.is_active,
                "session bootstrapped"
            );
            sessions.insert(*session_type, Arc::new(session));
        }

        Ok(Self {
            env,
            sessions: RwLock::new(sessions),
            upcoming: Mutex::new(HashMap::new()),
            pending_share: Mutex::new(None),
        })
    }

    /// Tick every live session and rotate the ones that ended.
    pub async fn new_block(&self, height: u64) -> SessionResult<()> {
        let live: Vec<Arc<Session>> = self.sessions.read().values().cloned().collect();
        for session in live {
            if session.new_block(height).await? == Tick::Ended {
                self.rotate(session, height).await?;
            }
        }
        Ok(())
    }

    async fn rotate(&self, ended: Arc<Session>, height: u64) -> SessionResult<()> {
        let session_type = ended.session_type();
        if session_type == SessionType::Keygen {
            self.sessions.write().remove(&session_type);
            info!(
                session_id = ended.id(),
                succeeded = ended.succeeded(),
                "keygen session complete"
            );
            return Ok(());
        }

        if session_type == SessionType::Reshare {
            let data = ended.data();
            if let (Some(key), Some(share), None) = (data.new_key, data.new_share, data.failure) {
                if !share.is_empty() {
                    debug!(session_id = ended.id(), %key, "parking reshared key share");
                    *self.pending_share.lock() = Some((key, share));
                }
            }
        }

        let params = match self.env.chain.params().await {
            Ok(params) => params,
            Err(e) => {
                warn!(
                    %session_type,
                    session_id = ended.id(),
                    error = %e,
                    "chain parameters unavailable, retrying rotation next block"
                );
                return Ok(());
            }
        };
        self.commit_pending_share(&params).await?;

        let input = match InputSet::from_params(
            &params,
            &self.env.settings.local_account,
            &self.env.settings.seed_signature,
        ) {
            Ok(input) => input,
            Err(e) => {
                warn!(%session_type, error = %e, "unusable chain parameters, retrying rotation next block");
                return Ok(());
            }
        };

        let next = Arc::new(Session::new(
            session_type,
            ended.id() + 1,
            input,
            self.env.clone(),
            ended.end() + 1,
        )?);
        self.sessions.write().insert(session_type, next.clone());
        debug!(
            %session_type,
            session_id = next.id(),
            start = next.start(),
            end = next.end(),
            "session rotated"
        );

        let held = self
            .upcoming
            .lock()
            .get_mut(&session_type)
            .map(|mb| mb.take_all())
            .unwrap_or_default();
        for (sender, request) in held {
            if request.session_id != next.id() {
                continue;
            }
            let Some(party) = next
                .input()
                .parties
                .iter()
                .find(|p| p.account == sender.account && p.pub_key.eq_ignore_ascii_case(&sender.pub_key))
                .cloned()
            else {
                debug!(session_id = next.id(), peer = %sender.account, "held request from a party that left the roster");
                continue;
            };
            if let Err(e) = next.receive(party, request).await {
                debug!(session_id = next.id(), error = %e, "held request rejected");
            }
        }

        if height >= next.start() {
            next.new_block(height).await?;
        }
        Ok(())
    }

    async fn commit_pending_share(&self, params: &ChainParams) -> SessionResult<()> {
        let confirmed = {
            let pending = self.pending_share.lock();
            match (&*pending, &params.global_pub_key) {
                (Some((key, _)), Some(chain_key)) => key.eq_ignore_ascii_case(chain_key),
                _ => false,
            }
        };
        if !confirmed {
            return Ok(());
        }
        let Some((key, share)) = self.pending_share.lock().take() else {
            return Ok(());
        };
        self.env
            .secrets
            .set_share(share)
            .await
            .map_err(|e| SessionError::Fatal(format!("failed to store key share: {e}")))?;
        info!(%key, "reshared key confirmed on chain, share stored");
        Ok(())
    }

    async fn deliver(&self, session: &Session, request: SubmitRequest) -> SessionResult<()> {
        let sender = AuthGate::new(&session.input().parties).auth(&request)?;
        session.receive(sender, request).await
    }

    /// Authenticate and route an inbound request.
    pub async fn receive(&self, request: SubmitRequest) -> SessionResult<()> {
        let session_type = request.session_type;
        let session = self
            .sessions
            .read()
            .get(&session_type)
            .cloned()
            .ok_or(SessionError::NotFound {
                session_type,
                id: request.session_id,
            })?;

        if request.session_id == session.id() + 1 {
            let sender = AuthGate::new(&session.input().parties).auth(&request)?;
            let capacity = self.env.settings.mailbox_capacity;
            let mut upcoming = self.upcoming.lock();
            let mailbox = upcoming
                .entry(session_type)
                .or_insert_with(|| Mailbox::new(capacity));
            if !mailbox.push((sender, request)) {
                return Err(SessionError::MailboxFull);
            }
            return Ok(());
        }
        if request.session_id != session.id() {
            return Err(SessionError::NotFound {
                session_type,
                id: request.session_id,
            });
        }

        self.deliver(&session, request).await
    }

    /// Summaries of the live sessions, ordered by type.
    pub async fn info(&self) -> Vec<SessionSummary> {
        let mut live: Vec<Arc<Session>> = self.sessions.read().values().cloned().collect();
        live.sort_by_key(|s| s.session_type());
        let mut out = Vec::with_capacity(live.len());
        for session in live {
            out.push(session.summary().await);
        }
        out
    }

    /// Record of a live or past session.
    pub async fn session(&self, session_type: SessionType, id: u64) -> SessionResult<SessionRecord> {
        let live = self.sessions.read().get(&session_type).cloned();
        if let Some(session) = live.filter(|s| s.id() == id) {
            return Ok(session.context().record());
        }
        self.env
            .store
            .get(session_type, id)
            .await?
            .ok_or(SessionError::NotFound { session_type, id })
    }

    /// Live session of a type.
    pub fn live(&self, session_type: SessionType) -> Option<Arc<Session>> {
        self.sessions.read().get(&session_type).cloned()
    }

    /// Stop every live session.
    pub async fn shutdown(&self) {
        let live: Vec<Arc<Session>> = self.sessions.read().values().cloned().collect();
        for session in live {
            session.stop().await;
        }
    }
}

#[async_trait]
impl SubmitHandler for SessionManager {
    async fn handle_submit(&self, request: SubmitRequest) -> Result<(), String> {
        self.receive(request).await.map_err(|e| e.to_string())
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("sessions", &self.sessions.read().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_before_start() {
        assert_eq!(schedule(100, 50, 19), (0, 100));
        assert_eq!(schedule(100, 100, 19), (0, 100));
    }

    #[test]
    fn test_schedule_late_join() {
        // period 20: sessions start at 100, 120, 140, ...
        assert_eq!(schedule(100, 119, 19), (0, 100));
        assert_eq!(schedule(100, 120, 19), (1, 120));
        assert_eq!(schedule(100, 175, 19), (3, 160));
    }
}
