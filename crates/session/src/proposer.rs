//! Proposer election and signer subset selection.
//!
//! Both choices are deterministic functions of shared inputs, so every
//! honest party computes the same result without exchanging messages.
//!
//! ## How It Works
//!
//! ```text
//! proposer(id) = parties[ keccak256(lastSig ‖ be64(id))[31] mod N ]
//!
//! signers(accepted, id):
//!   candidates = accepted, roster order
//!   |candidates| == T+1  → candidates
//!   |candidates| >  T+1  → T+1 draws without replacement driven by
//!                          LCG(a=75, c=74, m=65537) seeded from
//!                          be64(keccak256(seed ‖ be64(id))[..8]) mod m
//! ```
//!
//! The selected signers are returned in roster order.

use std::collections::HashSet;

use tracing::debug;
use tsscore_crypto::keccak256_concat;
use tsscore_types::Party;

use crate::{SessionError, SessionResult};

/// Elects the proposer of a session from the roster and the last group signature.
#[derive(Debug, Clone)]
pub struct ProposerProvider {
    parties: Vec<Party>,
    last_signature: Vec<u8>,
}

impl ProposerProvider {
    /// Create a provider over an ordered roster.
    pub fn new(parties: Vec<Party>, last_signature: Vec<u8>) -> Self {
        Self {
            parties,
            last_signature,
        }
    }

    /// Proposer of session `session_id`.
    pub fn next_proposer(&self, session_id: u64) -> SessionResult<&Party> {
        if self.parties.is_empty() {
            return Err(SessionError::EmptyRoster);
        }
        let hash = keccak256_concat(&[
            self.last_signature.as_slice(),
            &session_id.to_be_bytes(),
        ]);
        let index = hash[31] as usize % self.parties.len();
        Ok(&self.parties[index])
    }
}

/// Linear congruential generator used for signer selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lcg {
    state: u64,
}

impl Lcg {
    /// Multiplier
    pub const A: u64 = 75;
    /// Increment
    pub const C: u64 = 74;
    /// Modulus
    pub const M: u64 = 65_537;

    /// Seed the generator. The seed is reduced modulo `M`.
    pub fn new(seed: u64) -> Self {
        Self {
            state: seed % Self::M,
        }
    }

    /// Seed derived from `keccak256(seed ‖ be64(session_id))`.
    pub fn for_session(seed: &[u8], session_id: u64) -> Self {
        let hash = keccak256_concat(&[seed, &session_id.to_be_bytes()]);
        let mut head = [0u8; 8];
        head.copy_from_slice(&hash[..8]);
        Self::new(u64::from_be_bytes(head))
    }

    /// Advance and return the new state.
    pub fn next_value(&mut self) -> u64 {
        self.state = (Self::A * self.state + Self::C) % Self::M;
        self.state
    }
}

/// Pick the `t + 1` signers of a session from the parties that accepted.
///
/// `accepted` is a set of accounts; its iteration order does not matter
/// because candidates are taken from `parties` in roster order.
pub fn get_signers_set(
    parties: &[Party],
    accepted: &HashSet<String>,
    t: usize,
    seed: &[u8],
    session_id: u64,
) -> SessionResult<Vec<Party>> {
    let required = t + 1;
    let mut candidates: Vec<Party> = parties
        .iter()
        .filter(|p| accepted.contains(&p.account))
        .cloned()
        .collect();

    if candidates.len() < required {
        return Err(SessionError::QuorumNotReached {
            accepted: candidates.len(),
            required,
        });
    }
    if candidates.len() == required {
        return Ok(candidates);
    }

    let mut rng = Lcg::for_session(seed, session_id);
    let mut selected = Vec::with_capacity(required);
    while selected.len() < required {
        let index = (rng.next_value() % candidates.len() as u64) as usize;
        selected.push(candidates.remove(index));
    }

    selected.sort_by_key(|s| parties.iter().position(|p| p.account == s.account));
    debug!(
        session_id,
        candidates = accepted.len(),
        selected = selected.len(),
        "signer subset selected"
    );
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster(n: usize) -> Vec<Party> {
        (0..n)
            .map(|i| Party::new(format!("acc{i}"), format!("pk{i}"), format!("addr{i}")))
            .collect()
    }

    #[test]
    fn test_lcg_sequence() {
        let mut rng = Lcg::new(1);
        assert_eq!(rng.next_value(), 149);
        assert_eq!(rng.next_value(), (75 * 149 + 74) % 65_537);
    }

    #[test]
    fn test_lcg_seed_reduced() {
        assert_eq!(Lcg::new(65_537 + 5), Lcg::new(5));
    }

    #[test]
    fn test_proposer_empty_roster() {
        let provider = ProposerProvider::new(Vec::new(), vec![1, 2, 3]);
        assert!(matches!(
            provider.next_proposer(0),
            Err(SessionError::EmptyRoster)
        ));
    }

    #[test]
    fn test_proposer_matches_formula() {
        let parties = roster(4);
        let sig = vec![7u8; 65];
        let provider = ProposerProvider::new(parties.clone(), sig.clone());
        for id in 0..16u64 {
            let hash = keccak256_concat(&[sig.as_slice(), &id.to_be_bytes()]);
            let expected = &parties[hash[31] as usize % 4];
            assert_eq!(provider.next_proposer(id).unwrap(), expected);
        }
    }
}
