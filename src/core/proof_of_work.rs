use crate::core::Block;
use crate::error::Result;
use crate::utils::sha256_digest;
use data_encoding::HEXLOWER;
use log::info;
use num_bigint::{BigInt, Sign};
use std::ops::ShlAssign;

/// Number of leading zero bits required in a block hash. Fixed for the
/// lifetime of the chain; there is no retargeting.
pub const TARGET_BITS: u32 = 24;

const MAX_NONCE: i64 = i64::MAX;

pub struct ProofOfWork {
    block: Block,
    target: BigInt,
}

impl ProofOfWork {
    pub fn new_proof_of_work(block: Block) -> ProofOfWork {
        let mut target = BigInt::from(1);
        target.shl_assign(256 - TARGET_BITS);
        ProofOfWork { block, target }
    }

    /// Recomputes the hash for the stored nonce and checks it against the
    /// target. A malformed block (no transactions) never validates.
    pub fn validate(block: &Block) -> bool {
        let pow = ProofOfWork::new_proof_of_work(block.clone());
        let merkle_root = match pow.block.hash_transactions() {
            Ok(root) => root,
            Err(_) => return false,
        };
        let data = pow.assemble_data(&merkle_root, block.get_nonce());
        let hash = sha256_digest(data.as_slice());
        let hash_int = BigInt::from_bytes_be(Sign::Plus, hash.as_slice());

        hash_int < pow.target
    }

    /// Candidate bytes for a nonce: previous hash, Merkle root, then the
    /// timestamp, target bits and nonce as unpadded lowercase hex ASCII.
    fn assemble_data(&self, merkle_root: &[u8], nonce: i64) -> Vec<u8> {
        let mut data_bytes = vec![];
        data_bytes.extend(self.block.get_prev_block_hash());
        data_bytes.extend(merkle_root);
        data_bytes.extend(format!("{:x}", self.block.get_timestamp()).into_bytes());
        data_bytes.extend(format!("{:x}", TARGET_BITS).into_bytes());
        data_bytes.extend(format!("{nonce:x}").into_bytes());
        data_bytes
    }

    #[cfg(test)]
    fn prepare_data(&self, nonce: i64) -> Result<Vec<u8>> {
        let merkle_root = self.block.hash_transactions()?;
        Ok(self.assemble_data(&merkle_root, nonce))
    }

    /// Searches nonces from zero upward until the hash drops below the
    /// target. CPU-bound and non-preemptive.
    pub fn run(&self) -> Result<(i64, Vec<u8>)> {
        let merkle_root = self.block.hash_transactions()?;
        let mut nonce = 0;
        let mut hash = Vec::new();
        info!(
            "Mining block with {} transactions",
            self.block.get_transactions().len()
        );
        while nonce < MAX_NONCE {
            let data = self.assemble_data(&merkle_root, nonce);
            hash = sha256_digest(data.as_slice());
            let hash_int = BigInt::from_bytes_be(Sign::Plus, hash.as_slice());

            if hash_int < self.target {
                info!("Found block hash {}", HEXLOWER.encode(hash.as_slice()));
                break;
            }
            nonce += 1;
        }
        Ok((nonce, hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Transaction;
    use std::sync::OnceLock;

    const TEST_ADDRESS: &str = "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa";

    // Mining is expensive; every test in this module shares one block.
    fn mined_test_block() -> &'static Block {
        static BLOCK: OnceLock<Block> = OnceLock::new();
        BLOCK.get_or_init(|| {
            let coinbase_tx = Transaction::new_coinbase_tx(TEST_ADDRESS, "pow test data").unwrap();
            Block::new_block(vec![], &[coinbase_tx], 0).unwrap()
        })
    }

    #[test]
    fn test_mined_block_validates() {
        assert!(ProofOfWork::validate(mined_test_block()));
    }

    #[test]
    fn test_corrupted_nonce_fails_validation() {
        let mut block = mined_test_block().clone();
        block.set_nonce_for_test(block.get_nonce() ^ 1);
        assert!(!ProofOfWork::validate(&block));
    }

    #[test]
    fn test_prepare_data_is_deterministic() {
        let pow = ProofOfWork::new_proof_of_work(mined_test_block().clone());

        let data1 = pow.prepare_data(12345).unwrap();
        let data2 = pow.prepare_data(12345).unwrap();
        assert_eq!(data1, data2);

        let data3 = pow.prepare_data(54321).unwrap();
        assert_ne!(data1, data3);
    }

    #[test]
    fn test_prepare_data_embeds_nonce_as_hex() {
        let pow = ProofOfWork::new_proof_of_work(mined_test_block().clone());

        let data = pow.prepare_data(0xabcdef).unwrap();
        let tail = String::from_utf8_lossy(&data[data.len() - 6..]).to_string();
        assert_eq!(tail, "abcdef");
    }

    #[test]
    fn test_target_has_leading_zero_bits() {
        let hash = mined_test_block().get_hash();
        // 24 leading zero bits means the first three bytes are zero.
        assert_eq!(&hash[..3], &[0u8, 0u8, 0u8]);
    }
}
