// The chain store: an append-only sled tree of blocks keyed by hash, with
// the distinguished key "l" pointing at the current tip. All mutations run
// inside a sled transaction so block insertion and tip update are atomic.

use crate::core::{Block, TXOutputs, Transaction};
use crate::error::{BlockchainError, Result};
use data_encoding::HEXLOWER;
use log::info;
use sled::transaction::ConflictableTransactionError;
use sled::{Db, Tree};
use std::collections::HashMap;
use std::env::current_dir;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

const BLOCKS_TREE: &str = "blocks";
const TIP_BLOCK_HASH_KEY: &str = "l";

const GENESIS_COINBASE_DATA: &str =
    "The Times 03/Jan/2009 Chancellor on brink of second bailout for banks";

#[derive(Clone, Debug)]
pub struct Blockchain {
    tip_hash: Arc<RwLock<Vec<u8>>>,
    db: Db,
}

impl Blockchain {
    fn node_db_path(node_id: &str) -> Result<PathBuf> {
        Ok(current_dir()?.join(format!("blockchain_{node_id}.db")))
    }

    /// Creates the chain database for a node and mines its genesis block,
    /// paying the subsidy to `address`.
    pub fn create_blockchain(address: &str, node_id: &str) -> Result<Blockchain> {
        Self::create_blockchain_with_path(address, Self::node_db_path(node_id)?)
    }

    /// Opens the existing chain database of a node.
    pub fn open_blockchain(node_id: &str) -> Result<Blockchain> {
        Self::open_blockchain_with_path(Self::node_db_path(node_id)?)
    }

    pub fn create_blockchain_with_path(
        address: &str,
        db_path: impl AsRef<Path>,
    ) -> Result<Blockchain> {
        let path = db_path.as_ref();
        if path.exists() {
            return Err(BlockchainError::DbExists);
        }

        let db = sled::open(path)
            .map_err(|e| BlockchainError::Database(format!("Failed to open database: {e}")))?;
        let blocks_tree = db
            .open_tree(BLOCKS_TREE)
            .map_err(|e| BlockchainError::Database(format!("Failed to open blocks tree: {e}")))?;

        info!("Creating genesis block for address {address}");
        let coinbase_tx = Transaction::new_coinbase_tx(address, GENESIS_COINBASE_DATA)?;
        let genesis = Block::generate_genesis_block(&coinbase_tx)?;
        Self::update_blocks_tree(&blocks_tree, &genesis)?;

        Ok(Blockchain {
            tip_hash: Arc::new(RwLock::new(genesis.get_hash_bytes())),
            db,
        })
    }

    pub fn open_blockchain_with_path(db_path: impl AsRef<Path>) -> Result<Blockchain> {
        let path = db_path.as_ref();
        if !path.exists() {
            return Err(BlockchainError::DbDoesNotExist);
        }

        let db = sled::open(path)
            .map_err(|e| BlockchainError::Database(format!("Failed to open database: {e}")))?;
        let blocks_tree = db
            .open_tree(BLOCKS_TREE)
            .map_err(|e| BlockchainError::Database(format!("Failed to open blocks tree: {e}")))?;

        let tip_bytes = blocks_tree
            .get(TIP_BLOCK_HASH_KEY)
            .map_err(|e| BlockchainError::Database(format!("Failed to get tip hash: {e}")))?
            .ok_or_else(|| BlockchainError::Database("Tip hash is missing".to_string()))?;

        Ok(Blockchain {
            tip_hash: Arc::new(RwLock::new(tip_bytes.to_vec())),
            db,
        })
    }

    /// Writes a block and points the tip at it, atomically.
    fn update_blocks_tree(blocks_tree: &Tree, block: &Block) -> Result<()> {
        let block_data = block.serialize()?;
        blocks_tree
            .transaction(|tx_db| {
                tx_db.insert(block.get_hash(), block_data.as_slice())?;
                tx_db.insert(TIP_BLOCK_HASH_KEY, block.get_hash())?;
                Ok(())
            })
            .map_err(|e: sled::transaction::TransactionError<BlockchainError>| {
                BlockchainError::from(e)
            })?;
        Ok(())
    }

    pub fn get_db(&self) -> &Db {
        &self.db
    }

    pub fn get_tip_hash(&self) -> Vec<u8> {
        self.tip_hash
            .read()
            .expect("Failed to acquire read lock on tip_hash - this should never happen")
            .clone()
    }

    fn set_tip_hash(&self, new_tip_hash: &[u8]) {
        let mut tip_hash = self
            .tip_hash
            .write()
            .expect("Failed to acquire write lock on tip_hash - this should never happen");
        *tip_hash = new_tip_hash.to_vec();
    }

    /// Verifies every transaction, then mines a block extending the current
    /// tip. The new block always becomes the tip because its height
    /// strictly increases.
    pub fn mine_block(&self, transactions: &[Transaction]) -> Result<Block> {
        for transaction in transactions {
            if !self.verify_transaction(transaction)? {
                return Err(BlockchainError::InvalidTransaction(format!(
                    "Rejected transaction {}",
                    HEXLOWER.encode(transaction.get_id())
                )));
            }
        }

        let best_height = self.get_best_height()?;
        let block = Block::new_block(self.get_tip_hash(), transactions, best_height + 1)?;

        let blocks_tree = self
            .db
            .open_tree(BLOCKS_TREE)
            .map_err(|e| BlockchainError::Database(format!("Failed to open blocks tree: {e}")))?;
        Self::update_blocks_tree(&blocks_tree, &block)?;
        self.set_tip_hash(block.get_hash());

        info!("Mined block {}", HEXLOWER.encode(block.get_hash()));
        Ok(block)
    }

    /// Stores a block received from a peer. The tip moves only when the new
    /// block's height is strictly greater than the current tip's; two
    /// blocks racing at the same height leave peers diverged until a higher
    /// block arrives.
    pub fn add_block(&self, block: &Block) -> Result<()> {
        let blocks_tree = self
            .db
            .open_tree(BLOCKS_TREE)
            .map_err(|e| BlockchainError::Database(format!("Failed to open blocks tree: {e}")))?;

        let block_data = block.serialize()?;
        let tip_hash = self.get_tip_hash();

        let became_tip = blocks_tree
            .transaction(|tx_db| {
                if tx_db.get(block.get_hash())?.is_some() {
                    return Err(ConflictableTransactionError::Abort(
                        BlockchainError::BlockExists(HEXLOWER.encode(block.get_hash())),
                    ));
                }
                tx_db.insert(block.get_hash(), block_data.as_slice())?;

                let tip_bytes = tx_db.get(tip_hash.as_slice())?.ok_or_else(|| {
                    ConflictableTransactionError::Abort(BlockchainError::Database(
                        "Tip block is missing".to_string(),
                    ))
                })?;
                let tip_block = Block::deserialize(tip_bytes.as_ref())
                    .map_err(ConflictableTransactionError::Abort)?;

                if block.get_height() > tip_block.get_height() {
                    tx_db.insert(TIP_BLOCK_HASH_KEY, block.get_hash())?;
                    Ok(true)
                } else {
                    Ok(false)
                }
            })
            .map_err(BlockchainError::from)?;

        if became_tip {
            self.set_tip_hash(block.get_hash());
        }
        Ok(())
    }

    pub fn get_block(&self, block_hash: &[u8]) -> Result<Option<Block>> {
        let blocks_tree = self
            .db
            .open_tree(BLOCKS_TREE)
            .map_err(|e| BlockchainError::Database(format!("Failed to open blocks tree: {e}")))?;

        if let Some(block_bytes) = blocks_tree
            .get(block_hash)
            .map_err(|e| BlockchainError::Database(format!("Failed to get block: {e}")))?
        {
            let block = Block::deserialize(block_bytes.as_ref())?;
            return Ok(Some(block));
        }
        Ok(None)
    }

    pub fn get_best_height(&self) -> Result<usize> {
        let tip_block = self
            .get_block(self.get_tip_hash().as_slice())?
            .ok_or_else(|| BlockchainError::Database("Tip block is missing".to_string()))?;
        Ok(tip_block.get_height())
    }

    /// Block hashes from the tip back to genesis.
    pub fn get_block_hashes(&self) -> Vec<Vec<u8>> {
        self.iterator().map(|block| block.get_hash_bytes()).collect()
    }

    /// Linear scan from the tip for a transaction by id.
    pub fn find_transaction(&self, txid: &[u8]) -> Result<Transaction> {
        for block in self.iterator() {
            for transaction in block.get_transactions() {
                if txid.eq(transaction.get_id()) {
                    return Ok(transaction.clone());
                }
            }
        }
        Err(BlockchainError::TransactionNotFound)
    }

    /// Walks the whole chain and accumulates the unspent outputs of every
    /// transaction, subtracting outputs referenced by any input seen along
    /// the way.
    pub fn find_utxo(&self) -> Result<HashMap<String, TXOutputs>> {
        let mut utxo: HashMap<String, TXOutputs> = HashMap::new();
        let mut spent_txos: HashMap<String, Vec<usize>> = HashMap::new();

        for block in self.iterator() {
            for tx in block.get_transactions() {
                let txid_hex = HEXLOWER.encode(tx.get_id());

                for (idx, out) in tx.get_vout().iter().enumerate() {
                    if let Some(spent) = spent_txos.get(txid_hex.as_str()) {
                        if spent.contains(&idx) {
                            continue;
                        }
                    }
                    utxo.entry(txid_hex.clone())
                        .or_default()
                        .outputs
                        .push(out.clone());
                }

                if tx.is_coinbase() {
                    continue;
                }
                for txin in tx.get_vin() {
                    spent_txos
                        .entry(HEXLOWER.encode(txin.get_txid()))
                        .or_default()
                        .push(txin.out_index()?);
                }
            }
        }
        Ok(utxo)
    }

    /// Collects the transactions referenced by `tx`'s inputs and signs every
    /// input with the given key.
    pub fn sign_transaction(&self, tx: &mut Transaction, pkcs8: &[u8]) -> Result<()> {
        let mut prev_txs: HashMap<String, Transaction> = HashMap::new();
        for vin in tx.get_vin() {
            let prev_tx = self.find_transaction(vin.get_txid())?;
            prev_txs.insert(HEXLOWER.encode(prev_tx.get_id()), prev_tx);
        }
        tx.sign(pkcs8, &prev_txs)
    }

    /// Verifies `tx` against the chain. Coinbase transactions verify
    /// trivially.
    pub fn verify_transaction(&self, tx: &Transaction) -> Result<bool> {
        if tx.is_coinbase() {
            return Ok(true);
        }

        let mut prev_txs: HashMap<String, Transaction> = HashMap::new();
        for vin in tx.get_vin() {
            let prev_tx = self.find_transaction(vin.get_txid())?;
            prev_txs.insert(HEXLOWER.encode(prev_tx.get_id()), prev_tx);
        }
        tx.verify(&prev_txs)
    }

    /// Lazy tip-to-genesis cursor. The walk ends after yielding the genesis
    /// block; restarting means building a new iterator from the tip.
    pub fn iterator(&self) -> BlockchainIterator {
        BlockchainIterator::new(self.get_tip_hash(), self.db.clone())
    }
}

pub struct BlockchainIterator {
    db: Db,
    current_hash: Vec<u8>,
}

impl BlockchainIterator {
    fn new(tip_hash: Vec<u8>, db: Db) -> BlockchainIterator {
        BlockchainIterator {
            current_hash: tip_hash,
            db,
        }
    }
}

impl Iterator for BlockchainIterator {
    type Item = Block;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_hash.is_empty() {
            return None;
        }
        let blocks_tree = self.db.open_tree(BLOCKS_TREE).ok()?;
        let data = blocks_tree.get(self.current_hash.as_slice()).ok()??;
        let block = Block::deserialize(data.as_ref()).ok()?;
        self.current_hash = block.get_prev_block_hash().to_vec();
        Some(block)
    }
}
