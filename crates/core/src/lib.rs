//! # tsscore Core Abstractions
//!
//! Traits for everything the session engine consumes but does not own:
//!
//! - **Chain**: operation lookup, parameter snapshots and message submission
//! - **Engine**: the opaque MPC party that runs keygen, signing and resharing
//! - **Store**: session records and the local key share
//! - **Transport**: dialing peers and delivering signed requests
//!
//! Sessions receive these as injected trait objects, never as globals.
//! [`memory`] holds in-process stores. `mock`, behind the `test-utils`
//! feature, holds deterministic chain, engine and network doubles used by
//! tests across the workspace.
//!
//! | Concern | Trait | In-process impl |
//! |---------|-------|-----------------|
//! | Chain | `ChainClient` | `mock::MockChain` |
//! | MPC | `EngineFactory` / `PartyEngine` | `mock::MockEngineFactory` |
//! | Records | `SessionStore` | `memory::MemorySessionStore` |
//! | Key share | `SecretStore` | `memory::MemorySecretStore` |
//! | Peers | `PeerDialer` / `PeerClient` | `mock::LoopbackNetwork` |

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]

pub mod memory;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
pub mod traits;

pub use traits::{
    // Chain
    ChainClient, ChainError, ChainResult,
    // Engine
    EngineChannels, EngineError, EngineFactory, EngineKind, EngineMessage, EngineOutput,
    EngineParams, EngineResult, PartyEngine,
    // Store
    SecretStore, SessionStore, StoreError, StoreResult,
    // Transport
    PeerClient, PeerDialer, SubmitHandler, TransportError, TransportResult,
};
