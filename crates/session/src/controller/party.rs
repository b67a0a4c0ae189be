//! Engine-backed phases: keygen, sign and reshare.
//!
//! The controller creates the MPC engine for the local party, relays its
//! outbound messages to the other participants and feeds peer messages back
//! in. Peer messages that arrive before the engine exists are queued in a
//! bounded mailbox and replayed once it is running. When the phase window
//! closes the result channel is read without blocking.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot::error::TryRecvError;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tsscore_core::{
    EngineChannels, EngineKind, EngineMessage, EngineOutput, EngineParams, PartyEngine,
};
use tsscore_types::{ControllerKind, Party, Payload, RequestType, SubmitRequest};

use super::{build, Controller, TaskSlot};
use crate::{Mailbox, SessionContext, SessionData, SessionError, SessionResult};

type Pending = (String, bool, Vec<u8>);

struct Inbox {
    engine: Option<Arc<dyn PartyEngine>>,
    waiting: Mailbox<Pending>,
    closed: bool,
}

/// Drives one engine run.
pub struct PartyController {
    ctx: SessionContext,
    kind: ControllerKind,
    inbox: Arc<Mutex<Inbox>>,
    task: TaskSlot,
}

impl PartyController {
    /// Create a controller for an engine-backed phase.
    pub fn new(ctx: SessionContext, kind: ControllerKind) -> Self {
        let capacity = ctx.env.settings.mailbox_capacity;
        Self {
            ctx,
            kind,
            inbox: Arc::new(Mutex::new(Inbox {
                engine: None,
                waiting: Mailbox::new(capacity),
                closed: false,
            })),
            task: TaskSlot::default(),
        }
    }
}

/// Parties that run the engine for `kind`, roster order.
fn participants(ctx: &SessionContext, kind: ControllerKind, data: &SessionData) -> Vec<Party> {
    match kind {
        ControllerKind::Sign => data.signers.clone(),
        ControllerKind::Reshare => ctx
            .input
            .parties
            .iter()
            .filter(|p| {
                data.signers.iter().any(|s| s.account == p.account)
                    || data.new_parties.iter().any(|n| n.account == p.account)
            })
            .cloned()
            .collect(),
        _ => ctx.input.verified_parties.clone(),
    }
}

fn engine_kind(ctx: &SessionContext, kind: ControllerKind, data: &SessionData) -> SessionResult<EngineKind> {
    match kind {
        ControllerKind::Sign => Ok(EngineKind::Sign {
            digest: ctx.strategy.sign_digest(data)?,
        }),
        ControllerKind::Reshare => Ok(EngineKind::Reshare {
            new_parties: data.new_parties.clone(),
        }),
        ControllerKind::Keygen => Ok(EngineKind::Keygen),
        other => Err(SessionError::ProtocolViolation(format!(
            "{other} is not an engine phase"
        ))),
    }
}

fn apply_output(ctx: &SessionContext, kind: ControllerKind, output: EngineOutput) {
    let mut data = ctx.data.lock();
    match (kind, output) {
        (ControllerKind::Sign, EngineOutput::Signature(signature)) => {
            info!(session_id = ctx.id, %signature, "group signature produced");
            data.signature = Some(signature);
        }
        (ControllerKind::Reshare | ControllerKind::Keygen, EngineOutput::Key { global_pub_key, share }) => {
            info!(session_id = ctx.id, phase = %kind, key = %global_pub_key, "new key produced");
            data.new_key = Some(global_pub_key);
            data.new_share = Some(share);
        }
        (kind, _) => data.fail(format!("{kind} engine returned an unexpected output")),
    }
}

struct Run {
    ctx: SessionContext,
    kind: ControllerKind,
    inbox: Arc<Mutex<Inbox>>,
}

impl Run {
    fn fail(&self, reason: String) {
        warn!(
            session_type = %self.ctx.session_type,
            session_id = self.ctx.id,
            phase = %self.kind,
            %reason,
            "engine phase failed"
        );
        self.ctx.data.lock().fail(reason);
    }

    fn close(&self) {
        let mut inbox = self.inbox.lock();
        inbox.closed = true;
        inbox.engine = None;
        inbox.waiting.take_all();
    }

    async fn start(&self) -> Option<(Arc<dyn PartyEngine>, Vec<Party>)> {
        let ctx = &self.ctx;
        let (participants, kind) = {
            let data = ctx.data.lock();
            (participants(ctx, self.kind, &data), engine_kind(ctx, self.kind, &data))
        };
        let engine_kind = match kind {
            Ok(k) => k,
            Err(e) => {
                self.fail(e.to_string());
                return None;
            }
        };
        if !participants.iter().any(|p| p.account == ctx.local_account()) {
            debug!(session_id = ctx.id, phase = %self.kind, "local party does not participate");
            return None;
        }

        let share = if self.kind == ControllerKind::Keygen {
            None
        } else {
            match ctx.env.secrets.share().await {
                Ok(Some(share)) => Some(share),
                Ok(None) if self.kind == ControllerKind::Reshare => None,
                Ok(None) => {
                    self.fail("no local key share".into());
                    return None;
                }
                Err(e) => {
                    ctx.data.lock().fatal = Some(format!("failed to read key share: {e}"));
                    return None;
                }
            }
        };

        let params = EngineParams {
            session_id: ctx.id,
            local_account: ctx.local_account().to_string(),
            participants: participants.clone(),
            threshold: ctx.input.t,
            share,
        };
        match ctx.env.engines.create(engine_kind, params) {
            Ok(engine) => Some((engine, participants)),
            Err(e) => {
                self.fail(format!("failed to create {} engine: {e}", self.kind));
                None
            }
        }
    }

    async fn drive(self, cancel: CancellationToken) {
        let Some((engine, participants)) = self.start().await else {
            self.close();
            return;
        };

        let engine_cancel = cancel.child_token();
        let EngineChannels {
            mut outbound,
            mut result,
        } = match engine.start(engine_cancel.clone()) {
            Ok(channels) => channels,
            Err(e) => {
                self.fail(format!("failed to start {} engine: {e}", self.kind));
                self.close();
                return;
            }
        };

        let backlog = {
            let mut inbox = self.inbox.lock();
            inbox.engine = Some(engine.clone());
            inbox.waiting.take_all()
        };
        for (sender, is_broadcast, data) in backlog {
            if let Err(e) = engine.receive(&sender, is_broadcast, &data).await {
                debug!(peer = %sender, error = %e, "queued engine message rejected");
            }
        }

        let mut deliveries = JoinSet::new();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                msg = outbound.recv() => match msg {
                    Some(msg) => self.route(&engine, &participants, msg, &cancel, &mut deliveries).await,
                    None => {
                        cancel.cancelled().await;
                        break;
                    }
                },
            }
        }

        engine_cancel.cancel();
        while deliveries.join_next().await.is_some() {}
        self.close();

        match result.try_recv() {
            Ok(Ok(output)) => apply_output(&self.ctx, self.kind, output),
            Ok(Err(e)) => self.fail(format!("{} engine failed: {e}", self.kind)),
            Err(TryRecvError::Closed) => self.fail(format!("{} engine stopped without a result", self.kind)),
            Err(TryRecvError::Empty) => self.fail(format!("{} engine did not finish in time", self.kind)),
        }
    }

    async fn route(
        &self,
        engine: &Arc<dyn PartyEngine>,
        participants: &[Party],
        msg: EngineMessage,
        cancel: &CancellationToken,
        deliveries: &mut JoinSet<()>,
    ) {
        let ctx = &self.ctx;
        let Some(request_type) = RequestType::for_controller(self.kind) else {
            return;
        };
        let payload = Payload::Party { data: msg.data.clone() };

        if msg.is_broadcast {
            tokio::select! {
                _ = cancel.cancelled() => {}
                r = ctx.broadcast(request_type, &payload, participants) => {
                    if let Err(e) = r {
                        warn!(session_id = ctx.id, error = %e, "engine broadcast failed");
                    }
                }
            }
            return;
        }

        let request = match ctx.request(request_type, false, &payload) {
            Ok(r) => r,
            Err(e) => {
                warn!(session_id = ctx.id, error = %e, "failed to sign engine message");
                return;
            }
        };
        for account in msg.to {
            if account == ctx.local_account() {
                if let Err(e) = engine.receive(&account, false, &msg.data).await {
                    debug!(error = %e, "engine rejected its own message");
                }
                continue;
            }
            let Some(party) = participants.iter().find(|p| p.account == account).cloned() else {
                warn!(session_id = ctx.id, recipient = %account, "engine addressed a non-participant");
                continue;
            };
            let submitter = ctx.env.submitter.clone();
            let request = request.clone();
            let cancel = cancel.clone();
            deliveries.spawn(async move {
                if !submitter.submit(&party, &request, &cancel).await {
                    debug!(peer = %party.account, "delivery abandoned at phase end");
                }
            });
        }
    }
}

#[async_trait]
impl Controller for PartyController {
    fn kind(&self) -> ControllerKind {
        self.kind
    }

    async fn receive(&self, sender: &Party, request: &SubmitRequest) -> SessionResult<()> {
        let Payload::Party { data } = request.decode_payload()? else {
            return Err(SessionError::ProtocolViolation("expected engine payload".into()));
        };

        let engine = {
            let mut inbox = self.inbox.lock();
            if inbox.closed {
                return Err(SessionError::PhaseClosed(self.kind));
            }
            match &inbox.engine {
                Some(engine) => engine.clone(),
                None => {
                    if !inbox
                        .waiting
                        .push((sender.account.clone(), request.is_broadcast, data))
                    {
                        return Err(SessionError::MailboxFull);
                    }
                    return Ok(());
                }
            }
        };
        engine
            .receive(&sender.account, request.is_broadcast, &data)
            .await
            .map_err(SessionError::from)
    }

    fn run(&self, cancel: CancellationToken) {
        let run = Run {
            ctx: self.ctx.clone(),
            kind: self.kind,
            inbox: self.inbox.clone(),
        };
        self.task.set(tokio::spawn(run.drive(cancel)));
    }

    async fn wait_for(&self) {
        self.task.join(self.kind).await;
    }

    fn next(&self) -> Option<Box<dyn Controller>> {
        let next = match self.kind {
            ControllerKind::Reshare => {
                let data = self.ctx.data.lock();
                if data.new_key.is_some() && data.failure.is_none() {
                    ControllerKind::Sign
                } else {
                    ControllerKind::Finish
                }
            }
            _ => ControllerKind::Finish,
        };
        Some(build(next, self.ctx.clone()))
    }
}
