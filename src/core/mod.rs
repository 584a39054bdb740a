//! The ledger core: blocks, proof of work, the Merkle tree, the chain
//! store and the transaction engine.

mod block;
mod blockchain;
mod merkle;
mod proof_of_work;
mod transaction;

pub use block::Block;
pub use blockchain::{Blockchain, BlockchainIterator};
pub use merkle::MerkleTree;
pub use proof_of_work::{ProofOfWork, TARGET_BITS};
pub use transaction::{TXInput, TXOutput, TXOutputs, Transaction, SUBSIDY};
