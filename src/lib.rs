//! # tincoin
//!
//! A minimal Bitcoin-style cryptocurrency node: a proof-of-work chain of
//! UTXO transactions, authorized with P-256 ECDSA signatures, persisted in
//! an embedded store and gossiped with peers over TCP.
//!
//! - `core/`: blocks, proof of work, the Merkle tree, the chain store and
//!   the transaction engine
//! - `storage/`: the derived UTXO index and the in-memory pools
//! - `wallet/`: key management and address derivation
//! - `network/`: wire framing, the known-peers list and the gossip server
//! - `config/`: per-node configuration from the environment
//! - `cli/`: the command-line surface

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod network;
pub mod storage;
pub mod utils;
pub mod wallet;

pub use cli::{Command, Opt};
pub use config::{Config, GLOBAL_CONFIG};
pub use core::{
    Block, Blockchain, MerkleTree, ProofOfWork, TXInput, TXOutput, TXOutputs, Transaction,
    SUBSIDY, TARGET_BITS,
};
pub use error::{BlockchainError, Result};
pub use network::{send_transaction, Server, CENTRAL_NODE};
pub use storage::{BlocksInTransit, MemoryPool, UTXOSet};
pub use utils::{
    base58_decode, base58_encode, current_timestamp, ecdsa_p256_sha256_sign_digest,
    ecdsa_p256_sha256_sign_verify, new_key_pair, ripemd160_digest, sha256_digest,
};
pub use wallet::{
    convert_address, hash_pub_key, validate_address, Wallet, Wallets, ADDRESS_CHECK_SUM_LEN,
};
