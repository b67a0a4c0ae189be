//! Party roster and the per-session input set.

use crate::{ChainParams, Error, PhaseDurations, Result};
use serde::{Deserialize, Serialize};
use tsscore_crypto::{decode_hex, keccak256_concat, Hash, PublicKey};

/// Membership status of a party as reported by the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PartyStatus {
    /// Party takes part in proposals, acceptance and signing
    #[default]
    Active,
    /// Party is registered but excluded from quorum
    Inactive,
}

/// One participating node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Party {
    /// Account identity on chain
    pub account: String,
    /// Compressed secp256k1 public key, hex
    pub pub_key: String,
    /// Network address peers dial to reach this party
    pub address: String,
    /// Current membership status
    #[serde(default)]
    pub status: PartyStatus,
}

impl Party {
    /// Create an active party.
    pub fn new(
        account: impl Into<String>,
        pub_key: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            account: account.into(),
            pub_key: pub_key.into(),
            address: address.into(),
            status: PartyStatus::Active,
        }
    }

    /// Returns true if the party is active.
    pub fn is_active(&self) -> bool {
        self.status == PartyStatus::Active
    }
}

/// Digest committing to an ordered party set.
///
/// Used as the acceptance root of a reshare session so that every party
/// accepts exactly the same target roster.
pub fn roster_digest(parties: &[Party]) -> Hash {
    let mut parts: Vec<&[u8]> = Vec::with_capacity(parties.len() * 3);
    for party in parties {
        parts.push(party.account.as_bytes());
        parts.push(party.pub_key.as_bytes());
        parts.push(party.address.as_bytes());
    }
    keccak256_concat(&parts)
}

/// Read-only roster snapshot a session is built on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputSet {
    /// Number of parties
    pub n: usize,
    /// Threshold; `t + 1` parties are needed to sign
    pub t: usize,
    /// Ordered roster
    pub parties: Vec<Party>,
    /// Active subset, roster order
    pub verified_parties: Vec<Party>,
    /// Inactive subset, roster order
    pub unverified_parties: Vec<Party>,
    /// Whether the local party is an active member
    pub is_active: bool,
    /// Current shared public key, if keygen has happened
    pub global_pub_key: Option<String>,
    /// Last signature produced by the group (hex), or the bootstrap seed
    pub last_signature: String,
    /// Local account
    pub local_account: String,
    /// Phase durations in blocks
    pub durations: PhaseDurations,
    /// Whether the chain asks for a roster change
    pub is_update_required: bool,
}

impl InputSet {
    /// Build an input set from a chain snapshot.
    ///
    /// `seed_signature` is used when the chain has not recorded a signature yet.
    pub fn from_params(
        params: &ChainParams,
        local_account: &str,
        seed_signature: &str,
    ) -> Result<Self> {
        let n = params.parties.len();
        if n == 0 {
            return Err(Error::InvalidParams("empty party set".into()));
        }
        if params.threshold >= n {
            return Err(Error::InvalidParams(format!(
                "threshold {} must be below party count {}",
                params.threshold, n
            )));
        }

        let (verified, unverified): (Vec<Party>, Vec<Party>) =
            params.parties.iter().cloned().partition(Party::is_active);
        let is_active = verified.iter().any(|p| p.account == local_account);
        let last_signature = params
            .last_signature
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| seed_signature.to_string());

        Ok(Self {
            n,
            t: params.threshold,
            parties: params.parties.clone(),
            verified_parties: verified,
            unverified_parties: unverified,
            is_active,
            global_pub_key: params.global_pub_key.clone(),
            last_signature,
            local_account: local_account.to_string(),
            durations: params.durations,
            is_update_required: params.is_update_required,
        })
    }

    /// Look up a party by account.
    pub fn party(&self, account: &str) -> Option<&Party> {
        self.parties.iter().find(|p| p.account == account)
    }

    /// Roster position of an account.
    pub fn index_of(&self, account: &str) -> Option<usize> {
        self.parties.iter().position(|p| p.account == account)
    }

    /// Find the party registered under `key`.
    pub fn find_by_pub_key(&self, key: &PublicKey) -> Option<&Party> {
        self.parties.iter().find(|p| key.matches_hex(&p.pub_key))
    }

    /// Whether `account` is an active member.
    pub fn is_verified(&self, account: &str) -> bool {
        self.verified_parties.iter().any(|p| p.account == account)
    }

    /// The local party entry, if the local account is on the roster.
    pub fn local_party(&self) -> Option<&Party> {
        self.party(&self.local_account)
    }

    /// Bytes of the last signature used to seed proposer election.
    ///
    /// Hex values are decoded; anything else is taken as raw bytes so that a
    /// free-form bootstrap seed is still usable.
    pub fn last_signature_bytes(&self) -> Vec<u8> {
        decode_hex(&self.last_signature)
            .unwrap_or_else(|_| self.last_signature.as_bytes().to_vec())
    }

    /// Target roster of a reshare: the active parties when an update is required.
    pub fn reshare_target(&self) -> Vec<Party> {
        if self.is_update_required {
            self.verified_parties.clone()
        } else {
            Vec::new()
        }
    }
}
