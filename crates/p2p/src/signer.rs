//! Outgoing request signing.

use crate::Result;
use tsscore_crypto::{keccak256, PrivateKey, PublicKey};
use tsscore_types::{Payload, RequestType, SessionType, SubmitRequest};

/// Signs requests with the local party key.
#[derive(Debug, Clone)]
pub struct RequestSigner {
    key: PrivateKey,
}

impl RequestSigner {
    /// Wrap a private key.
    pub fn new(key: PrivateKey) -> Self {
        Self { key }
    }

    /// Local public key.
    pub fn public_key(&self) -> PublicKey {
        self.key.public_key()
    }

    /// Sign `keccak256(payload)` and store the hex signature on the request.
    pub fn sign(&self, request: &mut SubmitRequest) -> Result<()> {
        let signature = self.key.sign_prehash(&keccak256(&request.payload))?;
        request.signature = signature.to_hex();
        Ok(())
    }

    /// Encode `payload` into a signed request.
    pub fn build(
        &self,
        session_id: u64,
        session_type: SessionType,
        request_type: RequestType,
        is_broadcast: bool,
        payload: &Payload,
    ) -> Result<SubmitRequest> {
        let mut request = SubmitRequest::new(
            session_id,
            session_type,
            request_type,
            is_broadcast,
            payload.to_bytes()?,
        );
        self.sign(&mut request)?;
        Ok(request)
    }
}
