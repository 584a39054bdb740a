use crate::core::Transaction;
use data_encoding::HEXLOWER;
use std::collections::HashMap;
use std::sync::RwLock;

/// Transactions waiting to be mined, keyed by hex txid. Process-local and
/// never persisted.
pub struct MemoryPool {
    inner: RwLock<HashMap<String, Transaction>>,
}

impl Default for MemoryPool {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPool {
    pub fn new() -> MemoryPool {
        MemoryPool {
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, txid_hex: &str) -> Option<Transaction> {
        self.inner
            .read()
            .expect("Failed to acquire read lock on memory pool")
            .get(txid_hex)
            .cloned()
    }

    pub fn contains(&self, txid_hex: &str) -> bool {
        self.inner
            .read()
            .expect("Failed to acquire read lock on memory pool")
            .contains_key(txid_hex)
    }

    pub fn add(&self, tx: Transaction) {
        let mut inner = self
            .inner
            .write()
            .expect("Failed to acquire write lock on memory pool");
        inner.insert(HEXLOWER.encode(tx.get_id()), tx);
    }

    pub fn remove(&self, txid_hex: &str) {
        let mut inner = self
            .inner
            .write()
            .expect("Failed to acquire write lock on memory pool");
        inner.remove(txid_hex);
    }

    pub fn get_all(&self) -> Vec<Transaction> {
        self.inner
            .read()
            .expect("Failed to acquire read lock on memory pool")
            .values()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .expect("Failed to acquire read lock on memory pool")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner
            .read()
            .expect("Failed to acquire read lock on memory pool")
            .is_empty()
    }
}

/// Hashes of blocks announced by a peer but not yet downloaded.
pub struct BlocksInTransit {
    inner: RwLock<Vec<Vec<u8>>>,
}

impl Default for BlocksInTransit {
    fn default() -> Self {
        Self::new()
    }
}

impl BlocksInTransit {
    pub fn new() -> BlocksInTransit {
        BlocksInTransit {
            inner: RwLock::new(vec![]),
        }
    }

    pub fn add_blocks(&self, hashes: &[Vec<u8>]) {
        let mut inner = self
            .inner
            .write()
            .expect("Failed to acquire write lock on blocks in transit");
        for hash in hashes {
            inner.push(hash.clone());
        }
    }

    pub fn first(&self) -> Option<Vec<u8>> {
        self.inner
            .read()
            .expect("Failed to acquire read lock on blocks in transit")
            .first()
            .cloned()
    }

    pub fn remove(&self, block_hash: &[u8]) {
        let mut inner = self
            .inner
            .write()
            .expect("Failed to acquire write lock on blocks in transit");
        if let Some(idx) = inner.iter().position(|x| x.eq(block_hash)) {
            inner.remove(idx);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inner
            .read()
            .expect("Failed to acquire read lock on blocks in transit")
            .is_empty()
    }
}
