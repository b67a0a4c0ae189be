//! # tsscore Types
//!
//! Shared data model for the session engine:
//! - [`Party`] and [`InputSet`] - the per-session roster snapshot
//! - [`SessionType`], [`ControllerKind`], [`PhaseDurations`] - session shape
//! - [`SubmitRequest`] and [`Payload`] - the signed peer message and its body
//! - [`Operation`], [`ChainParams`], [`ChainMsg`] - the chain-facing view
//!
//! ## Example
//!
//! ```rust
//! use tsscore_types::{Payload, RequestType, SessionType, SubmitRequest};
//!
//! let payload = Payload::Acceptance { root: "ab".into() };
//! let request = SubmitRequest::new(7, SessionType::Default, RequestType::Acceptance, true, payload.to_bytes().unwrap());
//!
//! let decoded = SubmitRequest::decode(&request.encode().unwrap()).unwrap();
//! assert_eq!(decoded.payload, request.payload);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod chain;
pub mod message;
pub mod party;
pub mod session;

pub use chain::{ChainMsg, ChainParams, Operation, OperationStatus, OperationType, OperationsPage};
pub use message::{Payload, RequestType, SubmitRequest};
pub use party::{roster_digest, InputSet, Party, PartyStatus};
pub use session::{
    ControllerKind, PhaseDurations, SessionRecord, SessionStatus, SessionSummary, SessionType,
};

/// Result type alias for type-level operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building or decoding shared types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid hex string
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// JSON encoding or decoding failed
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// Chain parameters cannot form a valid roster
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    /// Payload variant does not fit the request it arrived in
    #[error("unexpected payload for {0} request")]
    UnexpectedPayload(RequestType),
}

/// Hex (de)serialization for byte vectors.
pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize bytes as a lowercase hex string.
    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    /// Deserialize a hex string, with or without `0x`.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        let s = s.strip_prefix("0x").unwrap_or(&s);
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}
