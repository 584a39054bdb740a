use crate::error::{BlockchainError, Result};
use crate::utils::{deserialize, serialize};
use crate::wallet::Wallet;
use std::collections::HashMap;
use std::env::current_dir;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// File-backed wallet collection. Each node keeps its own file so several
/// nodes can share a working directory.
pub struct Wallets {
    file: PathBuf,
    wallets: HashMap<String, Wallet>,
}

impl Wallets {
    /// Opens the wallet file of a node (`wallet_<node_id>.dat` in the
    /// working directory), starting empty if it does not exist yet.
    pub fn new(node_id: &str) -> Result<Wallets> {
        let file = current_dir()?.join(format!("wallet_{node_id}.dat"));
        Self::with_file(file)
    }

    pub fn with_file(file: impl AsRef<Path>) -> Result<Wallets> {
        let mut wallets = Wallets {
            file: file.as_ref().to_path_buf(),
            wallets: HashMap::new(),
        };
        wallets.load_from_file()?;
        Ok(wallets)
    }

    pub fn create_wallet(&mut self) -> Result<String> {
        let wallet = Wallet::new()?;
        let address = wallet.get_address();
        self.wallets.insert(address.clone(), wallet);
        self.save_to_file()?;
        Ok(address)
    }

    pub fn get_addresses(&self) -> Vec<String> {
        self.wallets.keys().cloned().collect()
    }

    pub fn get_wallet(&self, address: &str) -> Option<&Wallet> {
        self.wallets.get(address)
    }

    fn load_from_file(&mut self) -> Result<()> {
        if !self.file.exists() {
            return Ok(());
        }

        let mut file = File::open(&self.file)
            .map_err(|e| BlockchainError::Wallet(format!("Failed to open wallet file: {e}")))?;
        let mut buf = vec![];
        file.read_to_end(&mut buf)
            .map_err(|e| BlockchainError::Wallet(format!("Failed to read wallet file: {e}")))?;
        self.wallets = deserialize(buf.as_slice())?;
        Ok(())
    }

    fn save_to_file(&self) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&self.file)
            .map_err(|e| BlockchainError::Wallet(format!("Failed to open wallet file: {e}")))?;
        let mut writer = BufWriter::new(file);
        let wallets_bytes = serialize(&self.wallets)?;
        writer.write_all(wallets_bytes.as_slice())?;
        writer.flush()?;
        Ok(())
    }
}
