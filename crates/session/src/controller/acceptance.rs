//! Acceptance phase.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tsscore_types::{ControllerKind, Party, Payload, RequestType, SubmitRequest};

use super::{build, Controller, TaskSlot};
use crate::{get_signers_set, SessionContext, SessionError, SessionResult};

/// Collects acceptances of the agreed root and picks the signers.
pub struct AcceptanceController {
    ctx: SessionContext,
    task: TaskSlot,
}

impl AcceptanceController {
    /// Create the controller.
    pub fn new(ctx: SessionContext) -> Self {
        Self {
            ctx,
            task: TaskSlot::default(),
        }
    }
}

fn same_root(a: &str, b: &str) -> bool {
    a.trim_start_matches("0x")
        .eq_ignore_ascii_case(b.trim_start_matches("0x"))
}

/// Count acceptances once the window has closed.
fn evaluate(ctx: &SessionContext) {
    let mut data = ctx.data.lock();
    if !data.processing {
        return;
    }
    if ctx.input.is_active {
        data.accepted.insert(ctx.local_account().to_string());
    }

    match get_signers_set(
        &ctx.input.parties,
        &data.accepted,
        ctx.input.t,
        &ctx.input.last_signature_bytes(),
        ctx.id,
    ) {
        Ok(signers) => {
            for party in &ctx.input.verified_parties {
                if !data.accepted.contains(&party.account) && party.account != ctx.local_account() {
                    data.add_offender(&party.account, "did not accept");
                }
            }
            info!(
                session_type = %ctx.session_type,
                session_id = ctx.id,
                accepted = data.accepted.len(),
                signers = ?signers.iter().map(|p| p.account.as_str()).collect::<Vec<_>>(),
                "acceptance quorum reached"
            );
            data.signers = signers;
        }
        Err(e) => {
            warn!(
                session_type = %ctx.session_type,
                session_id = ctx.id,
                threshold = ctx.input.t,
                error = %e,
                "acceptance failed"
            );
            data.fail(e.to_string());
        }
    }
}

#[async_trait]
impl Controller for AcceptanceController {
    fn kind(&self) -> ControllerKind {
        ControllerKind::Acceptance
    }

    async fn receive(&self, sender: &Party, request: &SubmitRequest) -> SessionResult<()> {
        let ctx = &self.ctx;
        let Payload::Acceptance { root } = request.decode_payload()? else {
            return Err(SessionError::ProtocolViolation("expected acceptance".into()));
        };
        if !ctx.input.is_verified(&sender.account) {
            return Err(SessionError::ProtocolViolation(format!(
                "{} is not an active party",
                sender.account
            )));
        }

        let mut data = ctx.data.lock();
        let Some(expected) = ctx.strategy.acceptance_root(&data) else {
            return Err(SessionError::ProtocolViolation(
                "no proposal accepted locally".into(),
            ));
        };
        if !same_root(&expected, &root) {
            data.add_offender(&sender.account, "accepted a different root");
            return Err(SessionError::ProtocolViolation(format!(
                "root mismatch: expected {expected}, got {root}"
            )));
        }
        data.accepted.insert(sender.account.clone());
        Ok(())
    }

    fn run(&self, cancel: CancellationToken) {
        let ctx = self.ctx.clone();
        let handle = tokio::spawn(async move {
            let root = ctx.strategy.acceptance_root(&ctx.data.lock());
            if let (Some(root), true) = (root, ctx.input.is_active) {
                let payload = Payload::Acceptance { root };
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    r = ctx.broadcast(RequestType::Acceptance, &payload, &ctx.input.parties) => {
                        if let Err(e) = r {
                            warn!(session_id = ctx.id, error = %e, "failed to broadcast acceptance");
                        }
                    }
                }
            }
            cancel.cancelled().await;
            evaluate(&ctx);
        });
        self.task.set(handle);
    }

    async fn wait_for(&self) {
        self.task.join(self.kind()).await;
    }

    fn next(&self) -> Option<Box<dyn Controller>> {
        let processing = self.ctx.data.lock().processing;
        let next = if processing {
            self.ctx.strategy.after_acceptance()
        } else {
            ControllerKind::Finish
        };
        Some(build(next, self.ctx.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::same_root;

    #[test]
    fn test_same_root_ignores_case_and_prefix() {
        assert!(same_root("abCD", "0xABcd"));
        assert!(!same_root("ab", "cd"));
    }
}
