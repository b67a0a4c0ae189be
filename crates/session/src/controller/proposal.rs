//! Proposal phase.
//!
//! The elected proposer builds the session's work item and broadcasts it.
//! Everyone else waits for it and validates it against chain state.
//! Proposals from anyone else are noted as suspect; those senders are
//! recorded as offenders only once a valid proposal from the real proposer
//! has been decided, so a node that merely computed a different proposer
//! is not punished for it on a session that never got going.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tsscore_types::{ControllerKind, Party, RequestType, SubmitRequest};

use super::{build, Controller, TaskSlot};
use crate::{ProposalOutcome, SessionContext, SessionError, SessionResult};

/// Drives the proposal phase.
pub struct ProposalController {
    ctx: SessionContext,
    task: TaskSlot,
}

impl ProposalController {
    /// Create the controller.
    pub fn new(ctx: SessionContext) -> Self {
        Self {
            ctx,
            task: TaskSlot::default(),
        }
    }
}

/// Store a decided proposal and confirm suspects. Returns false if the
/// session had already decided.
fn decide(ctx: &SessionContext, outcome: ProposalOutcome) -> bool {
    let mut data = ctx.data.lock();
    if data.decided {
        return false;
    }
    outcome.apply(&mut data);
    let suspects = std::mem::take(&mut data.suspects);
    for (account, reason) in suspects {
        data.add_offender(&account, reason);
    }
    true
}

async fn propose(ctx: &SessionContext, cancel: &CancellationToken) -> SessionResult<()> {
    let (payload, outcome) = ctx.strategy.make_proposal(ctx).await?;
    let processing = outcome.processing;
    if !decide(ctx, outcome) {
        return Ok(());
    }
    info!(
        session_type = %ctx.session_type,
        session_id = ctx.id,
        processing,
        "broadcasting proposal"
    );

    tokio::select! {
        _ = cancel.cancelled() => {
            warn!(session_id = ctx.id, "proposal phase closed during broadcast");
        }
        r = ctx.broadcast(RequestType::Proposal, &payload, &ctx.input.parties) => {
            r?;
        }
    }
    Ok(())
}

#[async_trait]
impl Controller for ProposalController {
    fn kind(&self) -> ControllerKind {
        ControllerKind::Proposal
    }

    async fn receive(&self, sender: &Party, request: &SubmitRequest) -> SessionResult<()> {
        let ctx = &self.ctx;
        let payload = request.decode_payload()?;

        if sender.account != ctx.proposer.account {
            let reason = "proposal from a party that is not the proposer";
            let mut data = ctx.data.lock();
            if data.decided {
                data.add_offender(&sender.account, reason);
            } else {
                data.suspects
                    .entry(sender.account.clone())
                    .or_insert_with(|| reason.to_string());
            }
            drop(data);
            return Err(SessionError::ProtocolViolation(format!(
                "{} is not the proposer of session {}",
                sender.account, ctx.id
            )));
        }

        if ctx.data.lock().decided {
            debug!(session_id = ctx.id, "duplicate proposal ignored");
            return Ok(());
        }

        match ctx.strategy.validate_proposal(ctx, &payload).await {
            Ok(outcome) => {
                let processing = outcome.processing;
                if decide(ctx, outcome) {
                    info!(
                        session_type = %ctx.session_type,
                        session_id = ctx.id,
                        proposer = %sender.account,
                        processing,
                        "proposal accepted"
                    );
                }
                Ok(())
            }
            Err(SessionError::ProtocolViolation(reason)) => {
                warn!(
                    session_id = ctx.id,
                    proposer = %sender.account,
                    %reason,
                    "invalid proposal"
                );
                ctx.add_offender(&sender.account, format!("invalid proposal: {reason}"));
                Err(SessionError::ProtocolViolation(reason))
            }
            Err(e) => Err(e),
        }
    }

    fn run(&self, cancel: CancellationToken) {
        let ctx = self.ctx.clone();
        let handle = tokio::spawn(async move {
            if !(ctx.is_proposer() && ctx.input.is_active) {
                return;
            }
            if let Err(e) = propose(&ctx, &cancel).await {
                warn!(session_id = ctx.id, error = %e, "failed to propose");
                if e.is_fatal() {
                    ctx.data.lock().fatal = Some(e.to_string());
                }
            }
        });
        self.task.set(handle);
    }

    async fn wait_for(&self) {
        self.task.join(self.kind()).await;
    }

    fn next(&self) -> Option<Box<dyn Controller>> {
        let next = {
            let mut data = self.ctx.data.lock();
            if !data.decided {
                data.fail("no valid proposal received");
                ControllerKind::Finish
            } else if data.processing {
                ControllerKind::Acceptance
            } else {
                ControllerKind::Finish
            }
        };
        Some(build(next, self.ctx.clone()))
    }
}
