//! Opaque MPC party engine.
//!
//! The engine performs the actual keygen, signing or resharing math. The
//! session layer only relays its messages and reads its result:
//!
//! 1. [`EngineFactory::create`] builds an engine for one phase.
//! 2. [`PartyEngine::start`] spawns it and hands back its outbound channel
//!    and a one-shot result channel.
//! 3. [`PartyEngine::receive`] feeds peer messages in.
//! 4. On phase cancellation the caller checks the result channel without
//!    blocking: a value is success, a closed channel is a hard failure and an
//!    empty channel means the engine did not finish in time.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tsscore_crypto::Hash;
use tsscore_types::Party;

/// Errors produced by an engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The local party is not among the engine's participants.
    #[error("local party does not participate")]
    NotParticipant,

    /// A message could not be processed.
    #[error("engine protocol error: {0}")]
    Protocol(String),

    /// The engine was started twice or used before start.
    #[error("invalid engine state: {0}")]
    InvalidState(String),

    /// The engine gave up.
    #[error("engine aborted: {0}")]
    Aborted(String),
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Outbound message emitted by an engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineMessage {
    /// Recipient accounts; ignored when `is_broadcast` is set.
    pub to: Vec<String>,
    /// Whether every other participant should receive it.
    pub is_broadcast: bool,
    /// Opaque engine bytes.
    pub data: Vec<u8>,
}

/// Final value of an engine run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineOutput {
    /// Threshold signature (hex).
    Signature(String),
    /// New shared key and the local share of it.
    Key {
        /// Shared public key (hex).
        global_pub_key: String,
        /// Local secret share, to be kept in the secret store.
        share: Vec<u8>,
    },
}

/// Channels returned by [`PartyEngine::start`].
#[derive(Debug)]
pub struct EngineChannels {
    /// Messages the engine wants delivered.
    pub outbound: mpsc::Receiver<EngineMessage>,
    /// Single final result.
    pub result: oneshot::Receiver<EngineResult<EngineOutput>>,
}

/// What an engine is asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineKind {
    /// Sign a 32-byte digest with the current key.
    Sign {
        /// Digest to sign.
        digest: Hash,
    },
    /// Move the current key to `new_parties`.
    Reshare {
        /// Target roster.
        new_parties: Vec<Party>,
    },
    /// Generate a fresh key.
    Keygen,
}

/// Inputs shared by every engine kind.
#[derive(Debug, Clone)]
pub struct EngineParams {
    /// Session id, for logging and domain separation.
    pub session_id: u64,
    /// Local account.
    pub local_account: String,
    /// Parties taking part, roster order.
    pub participants: Vec<Party>,
    /// Threshold T.
    pub threshold: usize,
    /// Local key share, when one exists.
    pub share: Option<Vec<u8>>,
}

/// A running MPC party.
#[async_trait]
pub trait PartyEngine: Send + Sync {
    /// Spawn the engine. Must not block.
    fn start(&self, cancel: CancellationToken) -> EngineResult<EngineChannels>;

    /// Deliver a peer message.
    async fn receive(&self, sender: &str, is_broadcast: bool, data: &[u8]) -> EngineResult<()>;
}

/// Builds engines for a phase.
pub trait EngineFactory: Send + Sync + 'static {
    /// Create an engine of the requested kind.
    fn create(&self, kind: EngineKind, params: EngineParams) -> EngineResult<Arc<dyn PartyEngine>>;
}
