//! Integration tests for proposer election and signer selection.

use std::collections::HashSet;

use tsscore_crypto::keccak256_concat;
use tsscore_session::{get_signers_set, Lcg, ProposerProvider, SessionError};
use tsscore_types::Party;

fn make_parties(n: usize) -> Vec<Party> {
    (0..n)
        .map(|i| Party::new(format!("acc{i}"), format!("pk{i}"), format!("addr{i}")))
        .collect()
}

fn accepted(parties: &[Party], indexes: &[usize]) -> HashSet<String> {
    indexes.iter().map(|i| parties[*i].account.clone()).collect()
}

fn seed() -> Vec<u8> {
    let mut seed = vec![0u8; 65];
    seed[0] = 0x42;
    seed[64] = 0x1b;
    seed
}

#[test]
fn test_proposer_is_deterministic() {
    let parties = make_parties(7);
    let a = ProposerProvider::new(parties.clone(), seed());
    let b = ProposerProvider::new(parties, seed());
    for id in 0..50 {
        assert_eq!(a.next_proposer(id).unwrap(), b.next_proposer(id).unwrap());
    }
}

#[test]
fn test_proposer_uses_last_byte_of_hash() {
    let parties = make_parties(5);
    let provider = ProposerProvider::new(parties.clone(), seed());
    let hash = keccak256_concat(&[seed().as_slice(), &9u64.to_be_bytes()]);
    assert_eq!(
        provider.next_proposer(9).unwrap(),
        &parties[hash[31] as usize % 5]
    );
}

#[test]
fn test_proposer_changes_with_signature() {
    let parties = make_parties(16);
    let a = ProposerProvider::new(parties.clone(), vec![1u8; 65]);
    let b = ProposerProvider::new(parties, vec![2u8; 65]);
    let differs = (0..32).any(|id| a.next_proposer(id).unwrap() != b.next_proposer(id).unwrap());
    assert!(differs);
}

#[test]
fn test_single_party_always_proposes() {
    let parties = make_parties(1);
    let provider = ProposerProvider::new(parties.clone(), seed());
    for id in 0..10 {
        assert_eq!(provider.next_proposer(id).unwrap(), &parties[0]);
    }
}

#[test]
fn test_signers_below_quorum() {
    let parties = make_parties(4);
    let result = get_signers_set(&parties, &accepted(&parties, &[0]), 1, &seed(), 3);
    assert!(matches!(
        result,
        Err(SessionError::QuorumNotReached {
            accepted: 1,
            required: 2
        })
    ));
}

#[test]
fn test_signers_exact_quorum_returns_all() {
    let parties = make_parties(4);
    let signers = get_signers_set(&parties, &accepted(&parties, &[3, 1]), 1, &seed(), 3).unwrap();
    assert_eq!(signers, vec![parties[1].clone(), parties[3].clone()]);
}

#[test]
fn test_signers_subset_size_and_order() {
    let parties = make_parties(10);
    let all: Vec<usize> = (0..10).collect();
    let set = accepted(&parties, &all);
    for id in 0..20 {
        let signers = get_signers_set(&parties, &set, 3, &seed(), id).unwrap();
        assert_eq!(signers.len(), 4);

        let positions: Vec<usize> = signers
            .iter()
            .map(|s| parties.iter().position(|p| p == s).unwrap())
            .collect();
        let mut sorted = positions.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(positions, sorted, "signers must be distinct and in roster order");
    }
}

#[test]
fn test_signers_ignore_non_roster_accounts() {
    let parties = make_parties(4);
    let mut set = accepted(&parties, &[0]);
    set.insert("stranger".to_string());
    assert!(get_signers_set(&parties, &set, 1, &seed(), 0).is_err());
}

#[test]
fn test_signers_deterministic_across_calls() {
    let parties = make_parties(8);
    let set = accepted(&parties, &[0, 2, 3, 5, 6, 7]);
    let a = get_signers_set(&parties, &set, 2, &seed(), 11).unwrap();
    let b = get_signers_set(&parties, &set.clone(), 2, &seed(), 11).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_signers_follow_lcg_draws() {
    let parties = make_parties(5);
    let set = accepted(&parties, &[0, 1, 2, 3, 4]);
    let signers = get_signers_set(&parties, &set, 1, &seed(), 4).unwrap();

    let mut rng = Lcg::for_session(&seed(), 4);
    let mut candidates = parties.clone();
    let first = candidates.remove((rng.next_value() % 5) as usize);
    let second = candidates.remove((rng.next_value() % 4) as usize);
    let mut expected = vec![first, second];
    expected.sort_by_key(|s| parties.iter().position(|p| p == s));

    assert_eq!(signers, expected);
}
