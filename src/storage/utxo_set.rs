// The chainstate tree: a derived view mapping txid -> still-unspent outputs
// of that transaction. Rebuilt from the chain by reindex, maintained
// incrementally by update.

use crate::core::{Block, Blockchain, TXOutput, TXOutputs};
use crate::error::{BlockchainError, Result};
use data_encoding::HEXLOWER;
use sled::transaction::ConflictableTransactionError;
use std::collections::HashMap;

const UTXO_TREE: &str = "chainstate";

pub struct UTXOSet {
    blockchain: Blockchain,
}

impl UTXOSet {
    pub fn new(blockchain: Blockchain) -> UTXOSet {
        UTXOSet { blockchain }
    }

    pub fn get_blockchain(&self) -> &Blockchain {
        &self.blockchain
    }

    /// Scans the index for outputs locked to `pub_key_hash` until the
    /// running total reaches `amount`. Returns what was accumulated (which
    /// may fall short) and the selected output indices per txid.
    pub fn find_spendable_outputs(
        &self,
        pub_key_hash: &[u8],
        amount: u64,
    ) -> Result<(u64, HashMap<String, Vec<usize>>)> {
        let mut unspent_outputs: HashMap<String, Vec<usize>> = HashMap::new();
        let mut accumulated = 0;
        let utxo_tree = self
            .blockchain
            .get_db()
            .open_tree(UTXO_TREE)
            .map_err(|e| BlockchainError::Database(format!("Failed to open UTXO tree: {e}")))?;

        for item in utxo_tree.iter() {
            let (k, v) = item.map_err(|e| {
                BlockchainError::Database(format!("Failed to iterate UTXO tree: {e}"))
            })?;
            let txid_hex = HEXLOWER.encode(k.as_ref());
            let outs = TXOutputs::deserialize(v.as_ref())?;

            for (idx, out) in outs.outputs.iter().enumerate() {
                if out.is_locked_with_key(pub_key_hash) && accumulated < amount {
                    accumulated += out.get_value();
                    unspent_outputs
                        .entry(txid_hex.clone())
                        .or_default()
                        .push(idx);
                }
            }
        }
        Ok((accumulated, unspent_outputs))
    }

    /// All outputs locked to `pub_key_hash`.
    pub fn find_utxo(&self, pub_key_hash: &[u8]) -> Result<Vec<TXOutput>> {
        let utxo_tree = self
            .blockchain
            .get_db()
            .open_tree(UTXO_TREE)
            .map_err(|e| BlockchainError::Database(format!("Failed to open UTXO tree: {e}")))?;
        let mut utxos = vec![];

        for item in utxo_tree.iter() {
            let (_, v) = item.map_err(|e| {
                BlockchainError::Database(format!("Failed to iterate UTXO tree: {e}"))
            })?;
            let outs = TXOutputs::deserialize(v.as_ref())?;

            for out in outs.outputs.iter() {
                if out.is_locked_with_key(pub_key_hash) {
                    utxos.push(out.clone());
                }
            }
        }
        Ok(utxos)
    }

    /// Number of transactions with at least one unspent output.
    pub fn count_transactions(&self) -> Result<usize> {
        let utxo_tree = self
            .blockchain
            .get_db()
            .open_tree(UTXO_TREE)
            .map_err(|e| BlockchainError::Database(format!("Failed to open UTXO tree: {e}")))?;
        let mut counter = 0;

        for item in utxo_tree.iter() {
            item.map_err(|e| {
                BlockchainError::Database(format!("Failed to iterate UTXO tree: {e}"))
            })?;
            counter += 1;
        }
        Ok(counter)
    }

    /// Drops the index and rebuilds it from a full chain walk. Idempotent.
    pub fn reindex(&self) -> Result<()> {
        let utxo_tree = self
            .blockchain
            .get_db()
            .open_tree(UTXO_TREE)
            .map_err(|e| BlockchainError::Database(format!("Failed to open UTXO tree: {e}")))?;

        utxo_tree
            .clear()
            .map_err(|e| BlockchainError::Database(format!("Failed to clear UTXO tree: {e}")))?;

        let utxo_map = self.blockchain.find_utxo()?;
        for (txid_hex, outs) in &utxo_map {
            let txid = HEXLOWER.decode(txid_hex.as_bytes()).map_err(|e| {
                BlockchainError::Serialization(format!("Failed to decode transaction id: {e}"))
            })?;
            utxo_tree
                .insert(txid.as_slice(), outs.serialize()?)
                .map_err(|e| BlockchainError::Database(format!("Failed to insert UTXO: {e}")))?;
        }
        Ok(())
    }

    /// Applies one block to the index in a single tree transaction: spent
    /// outputs leave their entries (the entry is deleted once empty), and
    /// every transaction contributes a fresh entry with all its outputs.
    pub fn update(&self, block: &Block) -> Result<()> {
        let utxo_tree = self
            .blockchain
            .get_db()
            .open_tree(UTXO_TREE)
            .map_err(|e| BlockchainError::Database(format!("Failed to open UTXO tree: {e}")))?;

        utxo_tree
            .transaction(|tx_db| {
                for tx in block.get_transactions() {
                    if !tx.is_coinbase() {
                        for vin in tx.get_vin() {
                            let outs_bytes = tx_db.get(vin.get_txid())?.ok_or_else(|| {
                                ConflictableTransactionError::Abort(BlockchainError::Database(
                                    "Referenced UTXO entry is missing".to_string(),
                                ))
                            })?;
                            let outs = TXOutputs::deserialize(outs_bytes.as_ref())
                                .map_err(ConflictableTransactionError::Abort)?;
                            let out_idx = vin
                                .out_index()
                                .map_err(ConflictableTransactionError::Abort)?;

                            let updated_outs: Vec<TXOutput> = outs
                                .outputs
                                .iter()
                                .enumerate()
                                .filter(|(idx, _)| *idx != out_idx)
                                .map(|(_, out)| out.clone())
                                .collect();

                            if updated_outs.is_empty() {
                                tx_db.remove(vin.get_txid())?;
                            } else {
                                let bytes = TXOutputs {
                                    outputs: updated_outs,
                                }
                                .serialize()
                                .map_err(ConflictableTransactionError::Abort)?;
                                tx_db.insert(vin.get_txid(), bytes)?;
                            }
                        }
                    }

                    let new_outputs = TXOutputs {
                        outputs: tx.get_vout().to_vec(),
                    };
                    let bytes = new_outputs
                        .serialize()
                        .map_err(ConflictableTransactionError::Abort)?;
                    tx_db.insert(tx.get_id(), bytes)?;
                }
                Ok(())
            })
            .map_err(BlockchainError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SUBSIDY;
    use crate::wallet::{hash_pub_key, Wallet};
    use tempfile::tempdir;

    #[test]
    fn test_reindex_indexes_genesis_subsidy() {
        let temp_dir = tempdir().unwrap();
        let wallet = Wallet::new().unwrap();
        let address = wallet.get_address();

        let blockchain =
            Blockchain::create_blockchain_with_path(&address, temp_dir.path().join("chain"))
                .unwrap();
        let utxo_set = UTXOSet::new(blockchain);

        utxo_set.reindex().unwrap();
        assert_eq!(utxo_set.count_transactions().unwrap(), 1);

        let pub_key_hash = hash_pub_key(wallet.get_public_key());
        let utxos = utxo_set.find_utxo(&pub_key_hash).unwrap();
        let balance: u64 = utxos.iter().map(|out| out.get_value()).sum();
        assert_eq!(balance, SUBSIDY);

        // Reindex is idempotent.
        utxo_set.reindex().unwrap();
        assert_eq!(utxo_set.count_transactions().unwrap(), 1);
    }

    #[test]
    fn test_find_spendable_outputs_accumulates_until_amount() {
        let temp_dir = tempdir().unwrap();
        let wallet = Wallet::new().unwrap();
        let other = Wallet::new().unwrap();
        let address = wallet.get_address();

        let blockchain =
            Blockchain::create_blockchain_with_path(&address, temp_dir.path().join("chain"))
                .unwrap();
        let utxo_set = UTXOSet::new(blockchain);
        utxo_set.reindex().unwrap();

        let pub_key_hash = hash_pub_key(wallet.get_public_key());

        let (accumulated, outputs) = utxo_set.find_spendable_outputs(&pub_key_hash, 4).unwrap();
        assert!(accumulated >= 4);
        assert_eq!(outputs.len(), 1);

        // Asking for more than exists falls short instead of failing.
        let (accumulated, _) = utxo_set
            .find_spendable_outputs(&pub_key_hash, SUBSIDY + 100)
            .unwrap();
        assert_eq!(accumulated, SUBSIDY);

        // A key with no outputs accumulates nothing.
        let other_hash = hash_pub_key(other.get_public_key());
        let (accumulated, outputs) = utxo_set.find_spendable_outputs(&other_hash, 1).unwrap();
        assert_eq!(accumulated, 0);
        assert!(outputs.is_empty());
    }
}
