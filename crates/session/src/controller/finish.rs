//! Finish phase.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tsscore_types::{ChainMsg, ControllerKind, Party, SessionStatus, SubmitRequest};

use super::{Controller, TaskSlot};
use crate::{SessionContext, SessionError, SessionResult};

/// Reports offenders and hands the session result to the chain.
pub struct FinishController {
    ctx: SessionContext,
    task: TaskSlot,
}

impl FinishController {
    /// Create the controller.
    pub fn new(ctx: SessionContext) -> Self {
        Self {
            ctx,
            task: TaskSlot::default(),
        }
    }
}

async fn report_offenders(ctx: &SessionContext, cancel: &CancellationToken) {
    let offenders = ctx.data.lock().offenders.clone();
    if offenders.is_empty() || !ctx.input.is_active {
        return;
    }
    let msgs: Vec<ChainMsg> = offenders
        .into_iter()
        .map(|(offender, reason)| ChainMsg::ViolationReport {
            session_type: ctx.session_type,
            session_id: ctx.id,
            offender,
            reason,
        })
        .collect();
    info!(
        session_type = %ctx.session_type,
        session_id = ctx.id,
        count = msgs.len(),
        "reporting violations"
    );
    tokio::select! {
        _ = cancel.cancelled() => {}
        r = ctx.env.chain.submit(msgs) => {
            if let Err(e) = r {
                warn!(session_id = ctx.id, error = %e, "failed to report violations");
            }
        }
    }
}

#[async_trait]
impl Controller for FinishController {
    fn kind(&self) -> ControllerKind {
        ControllerKind::Finish
    }

    async fn receive(&self, _sender: &Party, _request: &SubmitRequest) -> SessionResult<()> {
        Err(SessionError::ProtocolViolation(
            "finish phase accepts no requests".into(),
        ))
    }

    fn run(&self, cancel: CancellationToken) {
        let ctx = self.ctx.clone();
        let handle = tokio::spawn(async move {
            report_offenders(&ctx, &cancel).await;

            if let Err(e) = ctx.strategy.finish(&ctx, &cancel).await {
                warn!(
                    session_type = %ctx.session_type,
                    session_id = ctx.id,
                    error = %e,
                    "failed to finish session"
                );
                let mut data = ctx.data.lock();
                if e.is_fatal() {
                    data.fatal = Some(e.to_string());
                }
                data.fail(e.to_string());
            }

            let mut data = ctx.data.lock();
            data.status = if data.failure.is_some() {
                SessionStatus::Failed
            } else {
                SessionStatus::Finished
            };
            info!(
                session_type = %ctx.session_type,
                session_id = ctx.id,
                status = ?data.status,
                failure = data.failure.as_deref().unwrap_or(""),
                "session finished"
            );
        });
        self.task.set(handle);
    }

    async fn wait_for(&self) {
        self.task.join(self.kind()).await;
    }

    fn next(&self) -> Option<Box<dyn Controller>> {
        None
    }
}
