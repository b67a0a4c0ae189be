//! Keccak Merkle tree over operation contents.
//!
//! Leaves are `keccak256(content)`. Sibling pairs are hashed in sorted order
//! (`keccak256(min || max)`) so that proofs do not need position bits; an odd
//! node at the end of a level is promoted unchanged. The same contents in the
//! same order always produce the same root on every node.

use crate::{keccak256, keccak256_concat, Hash};

/// Merkle tree holding every level, leaves first.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    levels: Vec<Vec<Hash>>,
}

impl MerkleTree {
    /// Build a tree from raw leaf contents.
    pub fn from_contents<T: AsRef<[u8]>>(contents: &[T]) -> Self {
        let leaves = contents.iter().map(|c| keccak256(c.as_ref())).collect();
        Self::from_leaves(leaves)
    }

    /// Build a tree from already-hashed leaves.
    pub fn from_leaves(leaves: Vec<Hash>) -> Self {
        let mut levels = vec![leaves];
        while levels.last().map(|l| l.len() > 1).unwrap_or(false) {
            let prev = &levels[levels.len() - 1];
            let next = prev
                .chunks(2)
                .map(|pair| match pair {
                    [a, b] => hash_pair(a, b),
                    [single, ..] => *single,
                    [] => [0u8; 32],
                })
                .collect();
            levels.push(next);
        }
        Self { levels }
    }

    /// Root of the tree. The empty tree has an all-zero root.
    pub fn root(&self) -> Hash {
        self.levels
            .last()
            .and_then(|l| l.first().copied())
            .unwrap_or([0u8; 32])
    }

    /// Number of leaves.
    pub fn len(&self) -> usize {
        self.levels.first().map(Vec::len).unwrap_or(0)
    }

    /// True if there are no leaves.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sibling path for the leaf at `index`.
    pub fn proof(&self, index: usize) -> Option<Vec<Hash>> {
        if index >= self.len() {
            return None;
        }
        let mut proof = Vec::new();
        let mut idx = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling = idx ^ 1;
            if sibling < level.len() {
                proof.push(level[sibling]);
            }
            idx /= 2;
        }
        Some(proof)
    }
}

/// Verify a sibling path produced by [`MerkleTree::proof`].
pub fn verify_proof(leaf: &Hash, proof: &[Hash], root: &Hash) -> bool {
    let computed = proof.iter().fold(*leaf, |acc, sibling| hash_pair(&acc, sibling));
    &computed == root
}

fn hash_pair(a: &Hash, b: &Hash) -> Hash {
    if a <= b {
        keccak256_concat(&[a.as_slice(), b.as_slice()])
    } else {
        keccak256_concat(&[b.as_slice(), a.as_slice()])
    }
}

/// Merkle root of raw contents.
pub fn merkle_root<T: AsRef<[u8]>>(contents: &[T]) -> Hash {
    MerkleTree::from_contents(contents).root()
}

/// Hex-encoded Merkle root of raw contents, as carried in proposals.
pub fn merkle_root_hex<T: AsRef<[u8]>>(contents: &[T]) -> String {
    hex::encode(merkle_root(contents))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_leaf_root_is_leaf_hash() {
        assert_eq!(merkle_root(&["op"]), keccak256(b"op"));
    }

    #[test]
    fn test_empty_root_is_zero() {
        let empty: [&[u8]; 0] = [];
        assert_eq!(merkle_root(&empty), [0u8; 32]);
    }

    #[test]
    fn test_pair_hash_is_order_independent() {
        let a = keccak256(b"a");
        let b = keccak256(b"b");
        assert_eq!(hash_pair(&a, &b), hash_pair(&b, &a));
    }

    #[test]
    fn test_odd_leaf_promoted() {
        let tree = MerkleTree::from_contents(&["a", "b", "c"]);
        let ab = hash_pair(&keccak256(b"a"), &keccak256(b"b"));
        assert_eq!(tree.root(), hash_pair(&ab, &keccak256(b"c")));
    }

    #[test]
    fn test_proofs_verify() {
        let contents = ["op1", "op2", "op3", "op4", "op5"];
        let tree = MerkleTree::from_contents(&contents);
        for (i, c) in contents.iter().enumerate() {
            let proof = tree.proof(i).unwrap();
            assert!(verify_proof(&keccak256(c.as_bytes()), &proof, &tree.root()));
        }
        assert!(tree.proof(5).is_none());
    }
}
