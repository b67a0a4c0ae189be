//! # Keccak256 Hashing
//!
//! Every digest in the engine is Keccak256: the payload digest a peer signs,
//! the proposer election hash, the signer-selection seed and Merkle nodes.

use sha3::{Digest, Keccak256};

/// 32-byte Keccak256 digest
pub type Hash = [u8; 32];

/// Compute the Keccak256 hash of the input data.
///
/// # Example
///
/// ```rust
/// use tsscore_crypto::keccak256;
///
/// let hash = keccak256(b"hello");
/// assert_eq!(hash.len(), 32);
/// ```
#[inline]
pub fn keccak256(data: &[u8]) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Compute the Keccak256 hash of several inputs as if they were concatenated.
///
/// # Arguments
///
/// * `parts` - Byte slices hashed in order
#[inline]
pub fn keccak256_concat(parts: &[&[u8]]) -> Hash {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}
