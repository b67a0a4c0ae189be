//! # tsscore Session
//!
//! Block-driven orchestration of threshold-signature sessions.
//!
//! A session is a fixed block window carved into phases. Every party ticks
//! its sessions on each new block, so phase boundaries line up across the
//! network without any extra coordination messages.
//!
//! ## Session Flow
//!
//! ```text
//! Default session, id i, blocks [start, end]:
//!
//! ┌──────────────┐
//! │   PROPOSAL   │  proposer = parties[keccak(lastSig ‖ be64(i))[31] % N]
//! │              │  proposer broadcasts {indexes, merkle root}
//! └──────┬───────┘  empty proposal ─────────────────────────────┐
//!        │                                                      │
//!        ▼                                                      │
//! ┌──────────────┐                                              │
//! │  ACCEPTANCE  │  every verified party broadcasts {root}      │
//! │              │  <= T accepted: fail ──────────────────────┐ │
//! └──────┬───────┘  > T+1 accepted: LCG-select T+1 signers    │ │
//!        │                                                    │ │
//!        ▼                                                    │ │
//! ┌──────────────┐                                            │ │
//! │     SIGN     │  engine signs the root with the signers    │ │
//! └──────┬───────┘                                            │ │
//!        │                                                    │ │
//!        ▼                                                    ▼ ▼
//! ┌──────────────┐
//! │    FINISH    │  report offenders, submit confirmation or requeue
//! └──────────────┘
//! ```
//!
//! Reshare sessions insert a `RESHARE` phase before `SIGN` and sign
//! `keccak256(new_key)` with the old key. Keygen sessions run `KEYGEN` then
//! `FINISH`, once.
//!
//! ## Components
//!
//! - [`proposer`] - proposer election and signer subset selection
//! - [`bounds`] - phase block windows
//! - [`controller`] - one controller per phase
//! - [`session`] - the per-session tick loop
//! - [`manager`] - session rotation and inbound request routing

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod bounds;
pub mod controller;
pub mod data;
pub mod env;
pub mod mailbox;
pub mod manager;
pub mod proposer;
pub mod session;
pub mod strategy;

pub use bounds::{Bounds, BoundsManager};
pub use controller::Controller;
pub use data::{SessionContext, SessionData};
pub use env::{SessionEnv, SessionSettings};
pub use mailbox::Mailbox;
pub use manager::SessionManager;
pub use proposer::{get_signers_set, Lcg, ProposerProvider};
pub use session::{Session, Tick};
pub use strategy::{ProposalOutcome, SessionStrategy};

use thiserror::Error;
use tsscore_core::{ChainError, EngineError, StoreError};
use tsscore_p2p::AuthError;
use tsscore_pool::PoolError;
use tsscore_types::SessionType;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors raised by sessions and the session manager.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Request failed authentication.
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// A peer broke the protocol.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Request is for a phase that already closed.
    #[error("{0} phase already closed")]
    PhaseClosed(tsscore_types::ControllerKind),

    /// No live session of this type and id.
    #[error("no {session_type} session with id {id}")]
    NotFound {
        /// Session type
        session_type: SessionType,
        /// Session id
        id: u64,
    },

    /// Session has already ended.
    #[error("session ended")]
    SessionEnded,

    /// Mailbox overflow.
    #[error("mailbox full")]
    MailboxFull,

    /// Fewer than `required` parties accepted.
    #[error("quorum not reached: {accepted} accepted, {required} required")]
    QuorumNotReached {
        /// Accepted count
        accepted: usize,
        /// Required count
        required: usize,
    },

    /// Roster is empty.
    #[error("empty roster")]
    EmptyRoster,

    /// Message could not be decoded.
    #[error("codec error: {0}")]
    Codec(#[from] tsscore_types::Error),

    /// Hex or key material could not be decoded.
    #[error("crypto error: {0}")]
    Crypto(#[from] tsscore_crypto::CryptoError),

    /// Chain client failure.
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    /// Pool failure.
    #[error("pool error: {0}")]
    Pool(#[from] PoolError),

    /// Engine failure.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// Storage failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Request signing or delivery failure.
    #[error("p2p error: {0}")]
    P2p(#[from] tsscore_p2p::Error),

    /// Unrecoverable local failure. The node must stop.
    #[error("fatal: {0}")]
    Fatal(String),
}

/// Coarse error classes exposed to peers and RPC callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Caller sent something unacceptable.
    InvalidArgument,
    /// Addressed session does not exist.
    NotFound,
    /// Local failure.
    Internal,
}

impl SessionError {
    /// Classify for transport.
    pub fn class(&self) -> ErrorClass {
        match self {
            SessionError::Auth(_)
            | SessionError::ProtocolViolation(_)
            | SessionError::PhaseClosed(_)
            | SessionError::SessionEnded
            | SessionError::MailboxFull
            | SessionError::Codec(_) => ErrorClass::InvalidArgument,
            SessionError::NotFound { .. } => ErrorClass::NotFound,
            _ => ErrorClass::Internal,
        }
    }

    /// Whether the node must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SessionError::Fatal(_))
    }
}
