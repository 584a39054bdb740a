//! Error handling for the node
//!
//! Every fallible operation in the crate returns [`Result`]; domain errors
//! are surfaced upward while connection-level framing errors are logged at
//! the peer boundary.

use std::fmt;

/// Result type alias for node operations
pub type Result<T> = std::result::Result<T, BlockchainError>;

/// Error kinds surfaced by the chain store, transaction engine, UTXO index
/// and peer protocol
#[derive(Debug, Clone)]
pub enum BlockchainError {
    /// Database-related errors
    Database(String),
    /// The chain database already exists on disk
    DbExists,
    /// The chain database does not exist on disk
    DbDoesNotExist,
    /// A block with this hash is already stored
    BlockExists(String),
    /// Transaction verification failed during mining
    InvalidTransaction(String),
    /// Lookup by transaction id found nothing on the chain
    TransactionNotFound,
    /// A spend request exceeds the spendable UTXO total
    NotEnoughFunds { required: u64, available: u64 },
    /// Invalid address format (Base58 or checksum failure)
    InvalidAddress(String),
    /// Unrecognized wire command tag
    UnknownCommand(String),
    /// Unrecognized kind in a getdata request
    UnknownGetDataType(String),
    /// Cryptographic operation errors
    Crypto(String),
    /// Network communication errors
    Network(String),
    /// Wallet operation errors
    Wallet(String),
    /// Serialization/deserialization errors
    Serialization(String),
    /// File I/O errors
    Io(String),
    /// Block validation errors
    InvalidBlock(String),
}

impl fmt::Display for BlockchainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockchainError::Database(msg) => write!(f, "Database error: {msg}"),
            BlockchainError::DbExists => write!(f, "Blockchain database already exists"),
            BlockchainError::DbDoesNotExist => {
                write!(f, "Blockchain database does not exist. Create one first")
            }
            BlockchainError::BlockExists(hash) => write!(f, "Block already exists: {hash}"),
            BlockchainError::InvalidTransaction(msg) => write!(f, "Invalid transaction: {msg}"),
            BlockchainError::TransactionNotFound => write!(f, "Transaction not found"),
            BlockchainError::NotEnoughFunds {
                required,
                available,
            } => {
                write!(
                    f,
                    "Not enough funds: required {required}, available {available}"
                )
            }
            BlockchainError::InvalidAddress(addr) => write!(f, "Invalid address: {addr}"),
            BlockchainError::UnknownCommand(cmd) => write!(f, "Unknown command: {cmd}"),
            BlockchainError::UnknownGetDataType(kind) => {
                write!(f, "Unknown getdata type: {kind}")
            }
            BlockchainError::Crypto(msg) => write!(f, "Cryptographic error: {msg}"),
            BlockchainError::Network(msg) => write!(f, "Network error: {msg}"),
            BlockchainError::Wallet(msg) => write!(f, "Wallet error: {msg}"),
            BlockchainError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            BlockchainError::Io(msg) => write!(f, "I/O error: {msg}"),
            BlockchainError::InvalidBlock(msg) => write!(f, "Invalid block: {msg}"),
        }
    }
}

impl std::error::Error for BlockchainError {}

impl From<std::io::Error> for BlockchainError {
    fn from(err: std::io::Error) -> Self {
        BlockchainError::Io(err.to_string())
    }
}

impl From<sled::Error> for BlockchainError {
    fn from(err: sled::Error) -> Self {
        BlockchainError::Database(err.to_string())
    }
}

impl From<sled::transaction::TransactionError<BlockchainError>> for BlockchainError {
    fn from(err: sled::transaction::TransactionError<BlockchainError>) -> Self {
        match err {
            sled::transaction::TransactionError::Abort(e) => e,
            sled::transaction::TransactionError::Storage(e) => {
                BlockchainError::Database(e.to_string())
            }
        }
    }
}

impl From<bincode::error::EncodeError> for BlockchainError {
    fn from(err: bincode::error::EncodeError) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for BlockchainError {
    fn from(err: bincode::error::DecodeError) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}
