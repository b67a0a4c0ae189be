//! Signed peer messages.
//!
//! A [`SubmitRequest`] is what travels between parties. Its `payload` is the
//! JSON encoding of a [`Payload`]; the `signature` covers `keccak256(payload)`
//! and lets the receiver identify the sender through the session roster.

use crate::{hex_bytes, ControllerKind, Error, Party, Result, SessionType};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase a request is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    /// Proposal of the session work item
    Proposal,
    /// Acceptance of the agreed root
    Acceptance,
    /// Signing engine traffic
    Sign,
    /// Reshare engine traffic
    Reshare,
    /// Keygen engine traffic
    Keygen,
}

impl RequestType {
    /// Controller that handles requests of this type.
    pub fn controller(&self) -> ControllerKind {
        match self {
            RequestType::Proposal => ControllerKind::Proposal,
            RequestType::Acceptance => ControllerKind::Acceptance,
            RequestType::Sign => ControllerKind::Sign,
            RequestType::Reshare => ControllerKind::Reshare,
            RequestType::Keygen => ControllerKind::Keygen,
        }
    }

    /// Request type produced by a controller, if it talks to peers.
    pub fn for_controller(kind: ControllerKind) -> Option<Self> {
        match kind {
            ControllerKind::Proposal => Some(RequestType::Proposal),
            ControllerKind::Acceptance => Some(RequestType::Acceptance),
            ControllerKind::Sign => Some(RequestType::Sign),
            ControllerKind::Reshare => Some(RequestType::Reshare),
            ControllerKind::Keygen => Some(RequestType::Keygen),
            ControllerKind::Finish => None,
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.controller().fmt(f)
    }
}

/// Typed message body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Payload {
    /// Default session proposal: operation ids and their Merkle root
    DefaultProposal {
        /// Proposed operation ids, in proposal order
        indexes: Vec<String>,
        /// Hex Merkle root over operation contents
        root: String,
    },
    /// Reshare session proposal: the target party set
    ReshareProposal {
        /// New roster; empty means nothing to do
        parties: Vec<Party>,
    },
    /// Acceptance of the agreed root
    Acceptance {
        /// Hex root being accepted
        root: String,
    },
    /// Opaque engine message
    Party {
        /// Engine bytes
        #[serde(with = "hex_bytes")]
        data: Vec<u8>,
    },
}

impl Payload {
    /// Encode for signing and transport.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode from transport bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Whether this payload can legally appear in a request of `request_type`.
    pub fn fits(&self, request_type: RequestType) -> bool {
        matches!(
            (self, request_type),
            (Payload::DefaultProposal { .. }, RequestType::Proposal)
                | (Payload::ReshareProposal { .. }, RequestType::Proposal)
                | (Payload::Acceptance { .. }, RequestType::Acceptance)
                | (Payload::Party { .. }, RequestType::Sign)
                | (Payload::Party { .. }, RequestType::Reshare)
                | (Payload::Party { .. }, RequestType::Keygen)
        )
    }
}

/// Signed message exchanged between parties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    /// Target session id
    pub session_id: u64,
    /// Target session type
    pub session_type: SessionType,
    /// Target phase
    pub request_type: RequestType,
    /// Whether the message was sent to every party
    pub is_broadcast: bool,
    /// Hex signature over `keccak256(payload)`
    pub signature: String,
    /// Encoded [`Payload`]
    #[serde(with = "hex_bytes")]
    pub payload: Vec<u8>,
}

impl SubmitRequest {
    /// Build an unsigned request.
    pub fn new(
        session_id: u64,
        session_type: SessionType,
        request_type: RequestType,
        is_broadcast: bool,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            session_id,
            session_type,
            request_type,
            is_broadcast,
            signature: String::new(),
            payload,
        }
    }

    /// Decode the payload and check it fits the request type.
    pub fn decode_payload(&self) -> Result<Payload> {
        let payload = Payload::from_bytes(&self.payload)?;
        if !payload.fits(self.request_type) {
            return Err(Error::UnexpectedPayload(self.request_type));
        }
        Ok(payload)
    }

    /// Wire encoding.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode from the wire encoding.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_fits() {
        let p = Payload::Acceptance { root: "ab".into() };
        assert!(p.fits(RequestType::Acceptance));
        assert!(!p.fits(RequestType::Proposal));
        let e = Payload::Party { data: vec![1] };
        assert!(e.fits(RequestType::Sign));
        assert!(!e.fits(RequestType::Acceptance));
    }

    #[test]
    fn test_decode_payload_rejects_mismatch() {
        let body = Payload::Acceptance { root: "ab".into() }.to_bytes().unwrap();
        let req = SubmitRequest::new(1, SessionType::Default, RequestType::Sign, true, body);
        assert!(matches!(
            req.decode_payload(),
            Err(Error::UnexpectedPayload(RequestType::Sign))
        ));
    }

    #[test]
    fn test_request_type_controller_mapping() {
        for kind in [
            ControllerKind::Proposal,
            ControllerKind::Acceptance,
            ControllerKind::Sign,
            ControllerKind::Reshare,
            ControllerKind::Keygen,
        ] {
            let rt = RequestType::for_controller(kind).unwrap();
            assert_eq!(rt.controller(), kind);
        }
        assert!(RequestType::for_controller(ControllerKind::Finish).is_none());
    }
}
