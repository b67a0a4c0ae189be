//! # Recoverable ECDSA over secp256k1
//!
//! Peers authenticate every request by signing `keccak256(payload)` with
//! their registered key. Signatures are carried as 65-byte `r || s || v`
//! hex strings so that the receiver can recover the signer's public key
//! and look it up in the session roster without knowing the sender ahead
//! of time.
//!
//! ## Example
//!
//! ```rust
//! use tsscore_crypto::ecdsa::{PrivateKey, Signature};
//!
//! let key = PrivateKey::random();
//! let signature = key.sign(b"payload").unwrap();
//!
//! let wire = signature.to_hex();
//! let parsed = Signature::from_hex(&wire).unwrap();
//! assert_eq!(parsed.recover(b"payload").unwrap(), key.public_key());
//! ```

use crate::{decode_hex, keccak256, CryptoError, Hash, Result};
use k256::{
    ecdsa::{RecoveryId, Signature as K256Signature, SigningKey, VerifyingKey},
    SecretKey,
};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

/// secp256k1 private key used to sign outgoing requests.
#[derive(Clone)]
pub struct PrivateKey {
    inner: SigningKey,
}

impl PrivateKey {
    /// Generate a random private key using the OS RNG.
    pub fn random() -> Self {
        Self {
            inner: SigningKey::from(SecretKey::random(&mut OsRng)),
        }
    }

    /// Create a private key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid scalar.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self> {
        let secret_key = SecretKey::from_bytes(bytes.into())
            .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))?;
        Ok(Self {
            inner: SigningKey::from(secret_key),
        })
    }

    /// Create a private key from a hex string (with or without 0x prefix).
    pub fn from_hex(hex: &str) -> Result<Self> {
        let bytes = decode_hex(hex.trim())?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            })?;
        Self::from_bytes(&arr)
    }

    /// Hex encoding of the secret scalar.
    pub fn to_hex(&self) -> String {
        let bytes: [u8; 32] = self.inner.to_bytes().into();
        hex::encode(bytes)
    }

    /// Derive the public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            inner: *self.inner.verifying_key(),
        }
    }

    /// Hash `data` with Keccak256 and sign the digest.
    pub fn sign(&self, data: &[u8]) -> Result<Signature> {
        self.sign_prehash(&keccak256(data))
    }

    /// Sign a 32-byte digest, producing a recoverable signature.
    pub fn sign_prehash(&self, hash: &Hash) -> Result<Signature> {
        let (sig, recovery_id) = self
            .inner
            .sign_prehash_recoverable(hash)
            .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;

        Ok(Signature {
            r: sig.r().to_bytes().into(),
            s: sig.s().to_bytes().into(),
            v: recovery_id.to_byte(),
        })
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKey")
            .field("public_key", &self.public_key().to_hex())
            .finish()
    }
}

/// secp256k1 public key. Rosters carry it as compressed SEC1 hex.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey {
    inner: VerifyingKey,
}

impl PublicKey {
    /// Parse SEC1 bytes, compressed (33) or uncompressed (65).
    pub fn from_sec1_bytes(bytes: &[u8]) -> Result<Self> {
        let inner = VerifyingKey::from_sec1_bytes(bytes)
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Parse a hex-encoded SEC1 key.
    pub fn from_hex(hex: &str) -> Result<Self> {
        Self::from_sec1_bytes(&decode_hex(hex.trim())?)
    }

    /// Compressed SEC1 encoding (33 bytes).
    pub fn to_compressed(&self) -> [u8; 33] {
        let point = self.inner.to_encoded_point(true);
        let mut result = [0u8; 33];
        result.copy_from_slice(point.as_bytes());
        result
    }

    /// Hex of the compressed encoding. This is the roster representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_compressed())
    }

    /// Whether this key matches a roster entry given as hex.
    ///
    /// Entries that fail to parse never match.
    pub fn matches_hex(&self, hex: &str) -> bool {
        PublicKey::from_hex(hex).map(|k| k == *self).unwrap_or(false)
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PublicKey").field(&self.to_hex()).finish()
    }
}

impl Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        PublicKey::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Recoverable ECDSA signature (`r || s || v`, 65 bytes).
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    /// The r component
    pub r: [u8; 32],
    /// The s component
    pub s: [u8; 32],
    /// Recovery id (0/1, or legacy 27/28)
    pub v: u8,
}

impl Signature {
    /// Length of the wire encoding.
    pub const LEN: usize = 65;

    /// Build from the 65-byte `r || s || v` encoding.
    pub fn from_bytes(bytes: &[u8; 65]) -> Self {
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[0..32]);
        s.copy_from_slice(&bytes[32..64]);
        Self { r, s, v: bytes[64] }
    }

    /// Parse a hex string of exactly 65 bytes.
    pub fn from_hex(hex: &str) -> Result<Self> {
        let bytes = decode_hex(hex.trim())?;
        let arr: [u8; 65] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidLength {
                expected: Self::LEN,
                actual: bytes.len(),
            })?;
        Ok(Self::from_bytes(&arr))
    }

    /// The 65-byte wire encoding.
    pub fn to_bytes(&self) -> [u8; 65] {
        let mut bytes = [0u8; 65];
        bytes[0..32].copy_from_slice(&self.r);
        bytes[32..64].copy_from_slice(&self.s);
        bytes[64] = self.v;
        bytes
    }

    /// Hex of the wire encoding.
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Recovery id normalised to 0 or 1.
    pub fn v_normalized(&self) -> u8 {
        if self.v >= 27 {
            self.v - 27
        } else {
            self.v
        }
    }

    fn to_k256_signature(&self) -> Result<K256Signature> {
        let mut bytes = [0u8; 64];
        bytes[0..32].copy_from_slice(&self.r);
        bytes[32..64].copy_from_slice(&self.s);
        K256Signature::from_bytes((&bytes).into())
            .map_err(|e| CryptoError::InvalidSignature(e.to_string()))
    }

    /// Recover the signer's public key from a 32-byte digest.
    pub fn recover_prehash(&self, hash: &Hash) -> Result<PublicKey> {
        let sig = self.to_k256_signature()?;
        let recovery_id = RecoveryId::from_byte(self.v_normalized())
            .ok_or_else(|| CryptoError::RecoveryFailed("invalid recovery id".to_string()))?;

        let inner = VerifyingKey::recover_from_prehash(hash, &sig, recovery_id)
            .map_err(|e| CryptoError::RecoveryFailed(e.to_string()))?;
        Ok(PublicKey { inner })
    }

    /// Recover the signer's public key from raw data (hashed with Keccak256).
    pub fn recover(&self, data: &[u8]) -> Result<PublicKey> {
        self.recover_prehash(&keccak256(data))
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Signature").field(&self.to_hex()).finish()
    }
}
