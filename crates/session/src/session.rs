//! A single session: its phase sequence and the block tick that drives it.

use std::sync::Arc;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tsscore_types::{
    ControllerKind, InputSet, Party, SessionStatus, SessionSummary, SessionType, SubmitRequest,
};

use crate::controller::{self, Controller};
use crate::{
    BoundsManager, Mailbox, ProposerProvider, SessionContext, SessionData, SessionEnv,
    SessionError, SessionResult, SessionStrategy,
};

/// What a block tick did to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// The session has not started yet
    Pending,
    /// The session is in the given phase
    Running(ControllerKind),
    /// The session is over
    Ended,
}

struct State {
    current: Option<Box<dyn Controller>>,
    started: bool,
    cancel: CancellationToken,
    early: Mailbox<(Party, SubmitRequest)>,
    ended: bool,
}

/// One session of one type.
pub struct Session {
    ctx: SessionContext,
    state: Mutex<State>,
}

impl Session {
    /// Create a session starting at block `start`.
    pub fn new(
        session_type: SessionType,
        id: u64,
        input: InputSet,
        env: Arc<SessionEnv>,
        start: u64,
    ) -> SessionResult<Self> {
        let proposer = ProposerProvider::new(input.parties.clone(), input.last_signature_bytes())
            .next_proposer(id)?
            .clone();
        let bounds = Arc::new(BoundsManager::new(start, input.durations, session_type));
        let capacity = env.settings.mailbox_capacity;

        let ctx = SessionContext {
            id,
            session_type,
            input: Arc::new(input),
            env,
            proposer,
            strategy: SessionStrategy::for_type(session_type),
            bounds,
            data: Arc::new(SyncMutex::new(SessionData::default())),
        };
        let first = controller::build(session_type.first_phase(), ctx.clone());

        debug!(
            %session_type,
            session_id = id,
            start,
            end = ctx.bounds.session_end(),
            proposer = %ctx.proposer.account,
            "session created"
        );

        Ok(Self {
            ctx,
            state: Mutex::new(State {
                current: Some(first),
                started: false,
                cancel: CancellationToken::new(),
                early: Mailbox::new(capacity),
                ended: false,
            }),
        })
    }

    /// Session id.
    pub fn id(&self) -> u64 {
        self.ctx.id
    }

    /// Session type.
    pub fn session_type(&self) -> SessionType {
        self.ctx.session_type
    }

    /// First block.
    pub fn start(&self) -> u64 {
        self.ctx.bounds.session_start()
    }

    /// Last block.
    pub fn end(&self) -> u64 {
        self.ctx.bounds.session_end()
    }

    /// Roster snapshot the session was built on.
    pub fn input(&self) -> &InputSet {
        &self.ctx.input
    }

    /// Shared context.
    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    /// Copy of the session state.
    pub fn data(&self) -> SessionData {
        self.ctx.data.lock().clone()
    }

    /// Advance the session to block `height`.
    ///
    /// Starts the current phase if it has not started, and stops it and
    /// moves on once its window has elapsed. At or past the session end the
    /// running phase is stopped and the session is over.
    pub async fn new_block(&self, height: u64) -> SessionResult<Tick> {
        let mut state = self.state.lock().await;
        if state.ended {
            return Ok(Tick::Ended);
        }
        if height < self.start() {
            return Ok(Tick::Pending);
        }

        let Some(current) = state.current.take() else {
            state.ended = true;
            return Ok(Tick::Ended);
        };
        let kind = current.kind();

        if !state.started {
            let bounds = self.ctx.bounds.next_controller(kind);
            state.cancel = CancellationToken::new();
            current.run(state.cancel.clone());
            state.started = true;
            info!(
                session_type = %self.ctx.session_type,
                session_id = self.ctx.id,
                phase = %kind,
                start = bounds.start,
                end = bounds.end,
                "phase started"
            );

            let early = state
                .early
                .take_where(|(_, r)| r.request_type.controller() == kind);
            for (sender, request) in early {
                if let Err(e) = current.receive(&sender, &request).await {
                    debug!(peer = %sender.account, phase = %kind, error = %e, "queued request rejected");
                }
            }
            self.ctx.persist().await;
        }

        if height >= self.end() {
            state.cancel.cancel();
            current.wait_for().await;
            state.ended = true;
            state.early.take_all();
            self.ctx.persist().await;
            self.check_fatal()?;
            info!(
                session_type = %self.ctx.session_type,
                session_id = self.ctx.id,
                status = ?self.ctx.data.lock().status,
                "session ended"
            );
            return Ok(Tick::Ended);
        }

        let elapsed = self
            .ctx
            .bounds
            .current()
            .map(|b| b.elapsed(height))
            .unwrap_or(false);
        if !elapsed {
            state.current = Some(current);
            return Ok(Tick::Running(kind));
        }

        state.cancel.cancel();
        current.wait_for().await;
        state.current = current.next();
        state.started = false;
        self.ctx.persist().await;
        self.check_fatal()?;
        debug!(
            session_id = self.ctx.id,
            phase = %kind,
            next = ?state.current.as_ref().map(|c| c.kind()),
            "phase stopped"
        );
        Ok(Tick::Running(kind))
    }

    /// Route an authenticated request to the phase it is addressed to.
    ///
    /// Requests for a later phase, or for the current phase before it has
    /// started, are held and replayed when that phase starts.
    pub async fn receive(&self, sender: Party, request: SubmitRequest) -> SessionResult<()> {
        let mut state = self.state.lock().await;
        if state.ended {
            return Err(SessionError::SessionEnded);
        }

        let target = request.request_type.controller();
        let phases = self.ctx.session_type.phases();
        let Some(target_pos) = phases.iter().position(|k| *k == target) else {
            return Err(SessionError::ProtocolViolation(format!(
                "{} requests do not belong to {} sessions",
                request.request_type, self.ctx.session_type
            )));
        };
        let Some(current_kind) = state.current.as_ref().map(|c| c.kind()) else {
            return Err(SessionError::SessionEnded);
        };
        let current_pos = phases
            .iter()
            .position(|k| *k == current_kind)
            .unwrap_or(phases.len());

        if target_pos > current_pos || (target_pos == current_pos && !state.started) {
            if !state.early.push((sender, request)) {
                warn!(session_id = self.ctx.id, phase = %target, "early mailbox full");
                return Err(SessionError::MailboxFull);
            }
            return Ok(());
        }
        if target_pos < current_pos {
            return Err(SessionError::PhaseClosed(target));
        }

        match state.current.as_ref() {
            Some(current) => current.receive(&sender, &request).await,
            None => Err(SessionError::SessionEnded),
        }
    }

    /// Stop the running phase without finishing the session.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        state.cancel.cancel();
        if let Some(current) = state.current.as_ref() {
            current.wait_for().await;
        }
        state.ended = true;
    }

    /// Summary for `Info`.
    pub async fn summary(&self) -> SessionSummary {
        let phase = {
            let state = self.state.lock().await;
            state
                .current
                .as_ref()
                .filter(|_| state.started && !state.ended)
                .map(|c| c.kind())
        };
        SessionSummary {
            session_type: self.ctx.session_type,
            id: self.ctx.id,
            start: self.start(),
            end: self.end(),
            status: self.ctx.data.lock().status,
            phase,
        }
    }

    /// Whether the session finished with a result.
    pub fn succeeded(&self) -> bool {
        self.ctx.data.lock().status == SessionStatus::Finished
    }

    fn check_fatal(&self) -> SessionResult<()> {
        match self.ctx.data.lock().fatal.take() {
            Some(reason) => Err(SessionError::Fatal(reason)),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("session_type", &self.ctx.session_type)
            .field("id", &self.ctx.id)
            .field("start", &self.start())
            .field("end", &self.end())
            .finish()
    }
}
