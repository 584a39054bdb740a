use crate::core::{MerkleTree, ProofOfWork, Transaction};
use crate::error::{BlockchainError, Result};
use crate::utils::{current_timestamp, deserialize, serialize};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Block {
    timestamp: i64,
    transactions: Vec<Transaction>,
    prev_block_hash: Vec<u8>,
    hash: Vec<u8>,
    nonce: i64,
    height: usize,
}

impl Block {
    /// Assembles a block over the given transactions and runs the nonce
    /// search. The genesis block is the only one with an empty previous
    /// hash.
    pub fn new_block(
        prev_block_hash: Vec<u8>,
        transactions: &[Transaction],
        height: usize,
    ) -> Result<Block> {
        if transactions.is_empty() {
            return Err(BlockchainError::InvalidBlock(
                "Block must contain at least one transaction".to_string(),
            ));
        }

        let mut block = Block {
            timestamp: current_timestamp()?,
            transactions: transactions.to_vec(),
            prev_block_hash,
            hash: vec![],
            nonce: 0,
            height,
        };

        let pow = ProofOfWork::new_proof_of_work(block.clone());
        let (nonce, hash) = pow.run()?;
        block.nonce = nonce;
        block.hash = hash;

        Ok(block)
    }

    pub fn generate_genesis_block(coinbase: &Transaction) -> Result<Block> {
        Block::new_block(vec![], &[coinbase.clone()], 0)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Block> {
        deserialize::<Block>(bytes)
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn get_transactions(&self) -> &[Transaction] {
        self.transactions.as_slice()
    }

    pub fn get_prev_block_hash(&self) -> &[u8] {
        self.prev_block_hash.as_slice()
    }

    pub fn get_hash(&self) -> &[u8] {
        self.hash.as_slice()
    }

    pub fn get_hash_bytes(&self) -> Vec<u8> {
        self.hash.clone()
    }

    pub fn get_timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn get_height(&self) -> usize {
        self.height
    }

    pub fn get_nonce(&self) -> i64 {
        self.nonce
    }

    /// Merkle root of the block's transaction ids.
    pub fn hash_transactions(&self) -> Result<Vec<u8>> {
        let tx_ids: Vec<Vec<u8>> = self
            .transactions
            .iter()
            .map(|tx| tx.get_id().to_vec())
            .collect();

        MerkleTree::calculate_merkle_root(&tx_ids)
    }

    #[cfg(test)]
    pub fn set_nonce_for_test(&mut self, nonce: i64) {
        self.nonce = nonce;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::OnceLock;

    const TEST_ADDRESS: &str = "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa";

    fn mined_test_block() -> &'static Block {
        static BLOCK: OnceLock<Block> = OnceLock::new();
        BLOCK.get_or_init(|| {
            let coinbase_tx =
                Transaction::new_coinbase_tx(TEST_ADDRESS, "block test data").unwrap();
            Block::new_block(vec![], &[coinbase_tx], 0).unwrap()
        })
    }

    #[test]
    fn test_empty_transaction_list_is_rejected() {
        assert!(Block::new_block(vec![], &[], 0).is_err());
    }

    #[test]
    fn test_genesis_has_empty_prev_hash() {
        let block = mined_test_block();
        assert!(block.get_prev_block_hash().is_empty());
        assert_eq!(block.get_height(), 0);
        assert_eq!(block.get_hash().len(), 32);
    }

    #[test]
    fn test_serialize_roundtrip_is_identical() {
        let block = mined_test_block();
        let bytes = block.serialize().unwrap();
        let decoded = Block::deserialize(&bytes).unwrap();

        assert_eq!(decoded.get_hash(), block.get_hash());
        assert_eq!(decoded.get_timestamp(), block.get_timestamp());
        assert_eq!(decoded.get_nonce(), block.get_nonce());
        assert_eq!(decoded.get_height(), block.get_height());
        assert_eq!(decoded.serialize().unwrap(), bytes);
    }

    #[test]
    fn test_merkle_root_matches_transactions() {
        let block = mined_test_block();
        let ids: Vec<Vec<u8>> = block
            .get_transactions()
            .iter()
            .map(|tx| tx.get_id().to_vec())
            .collect();
        assert_eq!(
            block.hash_transactions().unwrap(),
            MerkleTree::calculate_merkle_root(&ids).unwrap()
        );
    }
}
