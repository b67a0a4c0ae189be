//! # tsscore Crypto
//!
//! Cryptographic primitives shared by the session engine.
//!
//! This crate provides:
//! - **Keccak256 hashing** - digests for payload signing, proposer election and seeds
//! - **Recoverable ECDSA** - secp256k1 signatures used to authenticate peer requests
//! - **Merkle roots** - the keccak tree committing to a batch of proposed operations
//!
//! ## Example
//!
//! ```rust
//! use tsscore_crypto::{keccak256, ecdsa::PrivateKey};
//!
//! let key = PrivateKey::random();
//! let digest = keccak256(b"payload");
//! let signature = key.sign_prehash(&digest).unwrap();
//!
//! let recovered = signature.recover_prehash(&digest).unwrap();
//! assert_eq!(recovered, key.public_key());
//! ```

pub mod ecdsa;
pub mod hash;
pub mod merkle;

pub use ecdsa::{PrivateKey, PublicKey, Signature};
pub use hash::{keccak256, keccak256_concat, Hash};
pub use merkle::{merkle_root, merkle_root_hex, MerkleTree};

/// Error types for cryptographic operations
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Invalid private key bytes
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    /// Invalid public key bytes
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Invalid signature bytes
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// Failed to recover public key from signature
    #[error("failed to recover public key: {0}")]
    RecoveryFailed(String),

    /// Invalid input length
    #[error("invalid input length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Hex decoding error
    #[error("hex decoding error: {0}")]
    HexError(String),
}

impl From<hex::FromHexError> for CryptoError {
    fn from(e: hex::FromHexError) -> Self {
        CryptoError::HexError(e.to_string())
    }
}

/// Result type for cryptographic operations
pub type Result<T> = std::result::Result<T, CryptoError>;

/// Decode a hex string that may carry a `0x` prefix.
pub fn decode_hex(value: &str) -> Result<Vec<u8>> {
    let value = value.strip_prefix("0x").unwrap_or(value);
    Ok(hex::decode(value)?)
}
