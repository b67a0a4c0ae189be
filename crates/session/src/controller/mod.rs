//! Phase controllers.
//!
//! Each phase of a session is driven by one [`Controller`]. The session
//! starts it with [`Controller::run`], forwards matching peer requests to
//! [`Controller::receive`], cancels it when its block window closes, waits
//! for its task with [`Controller::wait_for`] and asks [`Controller::next`]
//! for the following phase.
//!
//! Controller tasks race every network await against the phase token, so
//! `wait_for` returns promptly once the phase is cancelled.

mod acceptance;
mod finish;
mod party;
mod proposal;

pub use acceptance::AcceptanceController;
pub use finish::FinishController;
pub use party::PartyController;
pub use proposal::ProposalController;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tsscore_types::{ControllerKind, Party, SubmitRequest};

use crate::{SessionContext, SessionResult};

/// One phase of a session.
#[async_trait]
pub trait Controller: Send + Sync {
    /// Phase this controller drives.
    fn kind(&self) -> ControllerKind;

    /// Handle an authenticated peer request addressed to this phase.
    async fn receive(&self, sender: &Party, request: &SubmitRequest) -> SessionResult<()>;

    /// Start the phase. Must not block.
    fn run(&self, cancel: CancellationToken);

    /// Wait until the phase task has exited.
    async fn wait_for(&self);

    /// Controller of the following phase, `None` after `Finish`.
    fn next(&self) -> Option<Box<dyn Controller>>;
}

/// Build the controller for `kind`.
pub fn build(kind: ControllerKind, ctx: SessionContext) -> Box<dyn Controller> {
    match kind {
        ControllerKind::Proposal => Box::new(ProposalController::new(ctx)),
        ControllerKind::Acceptance => Box::new(AcceptanceController::new(ctx)),
        ControllerKind::Sign | ControllerKind::Reshare | ControllerKind::Keygen => {
            Box::new(PartyController::new(ctx, kind))
        }
        ControllerKind::Finish => Box::new(FinishController::new(ctx)),
    }
}

/// Handle of a controller's background task.
#[derive(Default)]
pub(crate) struct TaskSlot {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TaskSlot {
    pub(crate) fn set(&self, handle: JoinHandle<()>) {
        *self.handle.lock() = Some(handle);
    }

    pub(crate) async fn join(&self, kind: ControllerKind) {
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(phase = %kind, error = %e, "controller task failed");
            }
        }
    }
}
