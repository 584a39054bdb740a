//! The peer gossip protocol: framed messages over TCP, the known-peers
//! list, and the server that drives sync, relay and mining.

mod message;
mod node;
mod server;

pub use message::{
    bytes_to_command, command_to_bytes, frame, Addr, BlockMessage, GetBlocks, GetData, Inv,
    OpType, TxMessage, Version, COMMAND_LENGTH,
};
pub use node::{Peer, Peers};
pub use server::{send_transaction, Server, CENTRAL_NODE};
