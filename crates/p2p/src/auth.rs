//! Request authentication.

use thiserror::Error;
use tsscore_crypto::{keccak256, Signature};
use tsscore_types::{Party, SubmitRequest};

/// Why a request was refused at ingress.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Signature could not be decoded or no key could be recovered.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// The recovered key belongs to nobody on the roster.
    #[error("signer is not a party")]
    SignerNotAParty,
}

/// Maps a request to the roster party that signed it.
#[derive(Debug, Clone, Copy)]
pub struct AuthGate<'a> {
    parties: &'a [Party],
}

impl<'a> AuthGate<'a> {
    /// Gate over an ordered roster.
    pub fn new(parties: &'a [Party]) -> Self {
        Self { parties }
    }

    /// Recover the signer of `keccak256(payload)` and find it on the roster.
    pub fn auth(&self, request: &SubmitRequest) -> Result<Party, AuthError> {
        let signature = Signature::from_hex(&request.signature)
            .map_err(|e| AuthError::InvalidSignature(e.to_string()))?;
        let key = signature
            .recover_prehash(&keccak256(&request.payload))
            .map_err(|e| AuthError::InvalidSignature(e.to_string()))?;

        self.parties
            .iter()
            .find(|p| key.matches_hex(&p.pub_key))
            .cloned()
            .ok_or(AuthError::SignerNotAParty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RequestSigner;
    use tsscore_crypto::PrivateKey;
    use tsscore_types::{Payload, RequestType, SessionType};

    fn signed(key: &PrivateKey) -> SubmitRequest {
        RequestSigner::new(key.clone())
            .build(
                3,
                SessionType::Default,
                RequestType::Acceptance,
                true,
                &Payload::Acceptance { root: "ab".into() },
            )
            .unwrap()
    }

    #[test]
    fn test_auth_finds_signer() {
        let keys: Vec<PrivateKey> = (0..3).map(|_| PrivateKey::random()).collect();
        let parties: Vec<Party> = keys
            .iter()
            .enumerate()
            .map(|(i, k)| Party::new(format!("node{i}"), k.public_key().to_hex(), ""))
            .collect();

        let party = AuthGate::new(&parties).auth(&signed(&keys[2])).unwrap();
        assert_eq!(party.account, "node2");
    }

    #[test]
    fn test_auth_rejects_stranger() {
        let member = PrivateKey::random();
        let parties = vec![Party::new("node0", member.public_key().to_hex(), "")];
        let result = AuthGate::new(&parties).auth(&signed(&PrivateKey::random()));
        assert_eq!(result, Err(AuthError::SignerNotAParty));
    }

    #[test]
    fn test_auth_rejects_bad_signature() {
        let key = PrivateKey::random();
        let parties = vec![Party::new("node0", key.public_key().to_hex(), "")];

        let mut request = signed(&key);
        request.signature = "0xdead".into();
        assert!(matches!(
            AuthGate::new(&parties).auth(&request),
            Err(AuthError::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_tampered_payload_recovers_other_key() {
        let key = PrivateKey::random();
        let parties = vec![Party::new("node0", key.public_key().to_hex(), "")];

        let mut request = signed(&key);
        request.payload.push(b' ');
        assert!(AuthGate::new(&parties).auth(&request).is_err());
    }
}
