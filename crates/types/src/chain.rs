//! Chain-facing view: operations, parameter snapshots and outgoing messages.

use crate::{Party, PhaseDurations, SessionType};
use serde::{Deserialize, Serialize};

/// Approval status of an operation on chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    /// Waiting for approval
    Initialized,
    /// Approved and eligible for signing
    Approved,
    /// Rejected by the chain
    NotApproved,
}

/// Operation kinds known to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    /// Cross-chain transfer
    Transfer,
    /// Fee update
    ChangeFee,
    /// Contract upgrade
    Upgrade,
    /// Any kind this node does not sign
    #[serde(other)]
    Unsupported,
}

impl OperationType {
    /// Whether the engine signs operations of this kind.
    pub fn is_supported(&self) -> bool {
        !matches!(self, OperationType::Unsupported)
    }
}

/// Chain-side unit of work awaiting a threshold signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    /// Operation id
    pub index: String,
    /// Whether a signature was already recorded
    pub signed: bool,
    /// Approval status
    pub status: OperationStatus,
    /// Kind
    pub operation_type: OperationType,
    /// Content committed to by the Merkle root
    #[serde(with = "crate::hex_bytes")]
    pub content: Vec<u8>,
}

impl Operation {
    /// Approved, unsigned and of a supported type.
    pub fn is_signable(&self) -> bool {
        self.status == OperationStatus::Approved && !self.signed && self.operation_type.is_supported()
    }
}

/// One page of the all-operations scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationsPage {
    /// Operations on this page
    pub operations: Vec<Operation>,
    /// Cursor of the next page; empty when this is the last page
    pub next_key: Vec<u8>,
}

/// Party and parameter snapshot from chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainParams {
    /// Ordered roster
    pub parties: Vec<Party>,
    /// Threshold T
    pub threshold: usize,
    /// Current shared key
    pub global_pub_key: Option<String>,
    /// Last recorded group signature (hex)
    pub last_signature: Option<String>,
    /// Roster change pending
    pub is_update_required: bool,
    /// Phase durations in blocks
    pub durations: PhaseDurations,
}

/// Messages this engine submits to chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainMsg {
    /// Signature over a batch of operations
    Confirmation {
        /// Signed operation ids
        indexes: Vec<String>,
        /// Merkle root that was signed
        root: String,
        /// Group signature (hex)
        signature: String,
    },
    /// Protocol violation by a party
    ViolationReport {
        /// Session type
        session_type: SessionType,
        /// Session id
        session_id: u64,
        /// Offending account
        offender: String,
        /// Reason
        reason: String,
    },
    /// New roster and key after a reshare
    ChangeParties {
        /// New roster
        parties: Vec<Party>,
        /// New shared key
        new_key: String,
        /// Old-key signature over `keccak256(new_key)`
        signature: String,
    },
    /// Initial key after keygen
    SetupInitial {
        /// New shared key
        new_key: String,
        /// Roster that holds it
        parties: Vec<Party>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_operation_type_is_unsupported() {
        let op: OperationType = serde_json::from_str("\"mint_nft\"").unwrap();
        assert_eq!(op, OperationType::Unsupported);
        assert!(!op.is_supported());
    }

    #[test]
    fn test_is_signable() {
        let mut op = Operation {
            index: "op1".into(),
            signed: false,
            status: OperationStatus::Approved,
            operation_type: OperationType::Transfer,
            content: vec![1, 2, 3],
        };
        assert!(op.is_signable());
        op.signed = true;
        assert!(!op.is_signable());
        op.signed = false;
        op.status = OperationStatus::Initialized;
        assert!(!op.is_signable());
    }
}
