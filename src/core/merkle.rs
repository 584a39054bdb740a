use crate::error::{BlockchainError, Result};
use crate::utils::sha256_digest;

/// Merkle tree over the transaction ids of a block.
///
/// Leaves are SHA-256 of the id bytes; inner nodes hash the concatenation of
/// their children. A level with an odd number of nodes duplicates its last
/// entry, as Bitcoin does.
pub struct MerkleTree {
    root: Vec<u8>,
}

impl MerkleTree {
    pub fn new(leaves: &[Vec<u8>]) -> Result<MerkleTree> {
        Ok(MerkleTree {
            root: Self::calculate_merkle_root(leaves)?,
        })
    }

    pub fn get_root_hash(&self) -> &[u8] {
        self.root.as_slice()
    }

    /// Reduces a list of transaction ids to its Merkle root.
    pub fn calculate_merkle_root(leaves: &[Vec<u8>]) -> Result<Vec<u8>> {
        if leaves.is_empty() {
            return Err(BlockchainError::InvalidBlock(
                "Cannot build a Merkle tree from an empty transaction list".to_string(),
            ));
        }

        let mut level: Vec<Vec<u8>> = leaves
            .iter()
            .map(|leaf| sha256_digest(leaf.as_slice()))
            .collect();

        while level.len() > 1 {
            if level.len() & 1 != 0 {
                if let Some(last) = level.last().cloned() {
                    level.push(last);
                }
            }

            let mut next_level = Vec::with_capacity(level.len() / 2);
            for pair in level.chunks(2) {
                let mut combined = pair[0].clone();
                combined.extend_from_slice(pair[1].as_slice());
                next_level.push(sha256_digest(combined.as_slice()));
            }
            level = next_level;
        }

        Ok(level.remove(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_leaf_root_is_leaf_hash() {
        let leaf = b"txid-0".to_vec();
        let root = MerkleTree::calculate_merkle_root(&[leaf.clone()]).unwrap();
        assert_eq!(root, sha256_digest(&leaf));
    }

    #[test]
    fn test_two_leaves() {
        let a = b"txid-a".to_vec();
        let b = b"txid-b".to_vec();
        let root = MerkleTree::calculate_merkle_root(&[a.clone(), b.clone()]).unwrap();

        let mut combined = sha256_digest(&a);
        combined.extend(sha256_digest(&b));
        assert_eq!(root, sha256_digest(&combined));
    }

    #[test]
    fn test_odd_list_duplicates_last_entry() {
        let a = b"txid-a".to_vec();
        let b = b"txid-b".to_vec();
        let c = b"txid-c".to_vec();

        let root_odd = MerkleTree::calculate_merkle_root(&[a.clone(), b.clone(), c.clone()])
            .unwrap();
        let root_even =
            MerkleTree::calculate_merkle_root(&[a, b, c.clone(), c]).unwrap();

        assert_eq!(root_odd, root_even);
    }

    #[test]
    fn test_root_depends_on_order() {
        let a = b"txid-a".to_vec();
        let b = b"txid-b".to_vec();

        let root_ab = MerkleTree::calculate_merkle_root(&[a.clone(), b.clone()]).unwrap();
        let root_ba = MerkleTree::calculate_merkle_root(&[b, a]).unwrap();

        assert_ne!(root_ab, root_ba);
    }

    #[test]
    fn test_empty_list_is_rejected() {
        assert!(MerkleTree::calculate_merkle_root(&[]).is_err());
    }

    #[test]
    fn test_tree_exposes_root() {
        let leaves = vec![b"txid-a".to_vec(), b"txid-b".to_vec()];
        let tree = MerkleTree::new(&leaves).unwrap();
        assert_eq!(
            tree.get_root_hash(),
            MerkleTree::calculate_merkle_root(&leaves).unwrap().as_slice()
        );
    }
}
