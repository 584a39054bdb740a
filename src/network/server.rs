use crate::config::GLOBAL_CONFIG;
use crate::core::{Block, Blockchain, ProofOfWork, Transaction};
use crate::error::{BlockchainError, Result};
use crate::network::message::{
    bytes_to_command, frame, Addr, BlockMessage, GetBlocks, GetData, Inv, OpType, TxMessage,
    Version, COMMAND_LENGTH,
};
use crate::network::Peers;
use crate::storage::{BlocksInTransit, MemoryPool, UTXOSet};
use crate::utils::deserialize;
use data_encoding::HEXLOWER;
use log::{error, info, warn};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

const NODE_VERSION: usize = 1;

/// The coordinator every node knows from the start; new transactions are
/// relayed through it.
pub const CENTRAL_NODE: &str = "localhost:5000";

/// A non-coordinator miner waits for this many mempool transactions before
/// assembling a block.
const TRANSACTION_THRESHOLD: usize = 2;

/// Everything a handler needs besides the chain itself: our own listen
/// address, the optional mining address, and the three shared structures
/// the protocol mutates. Each structure serializes its own access.
struct NodeState {
    addr: String,
    mining_address: Option<String>,
    peers: Peers,
    blocks_in_transit: BlocksInTransit,
    mempool: MemoryPool,
}

impl NodeState {
    fn new(addr: String, mining_address: Option<String>) -> NodeState {
        let peers = Peers::new();
        peers.add_peer(CENTRAL_NODE.to_string());
        NodeState {
            addr,
            mining_address,
            peers,
            blocks_in_transit: BlocksInTransit::new(),
            mempool: MemoryPool::new(),
        }
    }

    fn is_coordinator(&self) -> bool {
        self.addr == CENTRAL_NODE
    }
}

pub struct Server {
    blockchain: Blockchain,
    node: Arc<NodeState>,
}

impl Server {
    pub fn new(blockchain: Blockchain, addr: String, mining_address: Option<String>) -> Server {
        Server {
            blockchain,
            node: Arc::new(NodeState::new(addr, mining_address)),
        }
    }

    /// Binds the listen socket and serves one message per inbound
    /// connection, each on its own thread. A non-coordinator announces its
    /// height to the coordinator first so it can catch up.
    pub fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.node.addr).map_err(|e| {
            BlockchainError::Network(format!("Failed to bind to {}: {e}", self.node.addr))
        })?;
        info!("Node listening on {}", self.node.addr);

        if !self.node.is_coordinator() {
            let best_height = self.blockchain.get_best_height()?;
            if let Err(e) = send_version(&self.node, CENTRAL_NODE, best_height) {
                error!("Failed to reach the coordinator: {e}");
            }
        }

        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let blockchain = self.blockchain.clone();
                    let node = Arc::clone(&self.node);
                    thread::spawn(move || {
                        if let Err(e) = handle_connection(&blockchain, &node, stream) {
                            error!("Error handling connection: {e}");
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {e}");
                }
            }
        }

        Ok(())
    }
}

/// Reads the single message carried by the connection and dispatches on its
/// command tag.
fn handle_connection(
    blockchain: &Blockchain,
    node: &NodeState,
    mut stream: TcpStream,
) -> Result<()> {
    let mut request = vec![];
    stream
        .read_to_end(&mut request)
        .map_err(|e| BlockchainError::Network(format!("Failed to read request: {e}")))?;
    drop(stream);

    if request.len() < COMMAND_LENGTH {
        return Err(BlockchainError::Network(
            "Request shorter than a command tag".to_string(),
        ));
    }

    let command = bytes_to_command(&request[..COMMAND_LENGTH]);
    let payload = &request[COMMAND_LENGTH..];
    info!("Received {command} command");

    match command.as_str() {
        "version" => handle_version(blockchain, node, payload),
        "addr" => handle_addr(node, payload),
        "getblocks" => handle_get_blocks(blockchain, node, payload),
        "inv" => handle_inv(node, payload),
        "getdata" => handle_get_data(blockchain, node, payload),
        "block" => handle_block(blockchain, node, payload),
        "tx" => handle_tx(blockchain, node, payload),
        _ => {
            error!("{}", BlockchainError::UnknownCommand(command.clone()));
            Ok(())
        }
    }
}

/// Height comparison drives sync: whoever is behind asks for blocks, and a
/// node that is ahead answers with its own version so the remote fetches.
fn handle_version(blockchain: &Blockchain, node: &NodeState, payload: &[u8]) -> Result<()> {
    let payload: Version = deserialize(payload)?;
    let my_best_height = blockchain.get_best_height()?;

    if my_best_height < payload.best_height {
        send_get_blocks(node, &payload.addr_from)?;
    } else if my_best_height > payload.best_height {
        send_version(node, &payload.addr_from, my_best_height)?;
    }

    if !node.peers.peer_is_known(&payload.addr_from) {
        node.peers.add_peer(payload.addr_from);
    }
    Ok(())
}

fn handle_addr(node: &NodeState, payload: &[u8]) -> Result<()> {
    let payload: Addr = deserialize(payload)?;
    for addr in payload.addr_list {
        node.peers.add_peer(addr);
    }
    info!("There are {} known peers now", node.peers.get_peers().len());
    Ok(())
}

fn handle_get_blocks(blockchain: &Blockchain, node: &NodeState, payload: &[u8]) -> Result<()> {
    let payload: GetBlocks = deserialize(payload)?;
    let blocks = blockchain.get_block_hashes();
    send_inv(node, &payload.addr_from, OpType::Block, &blocks)
}

fn handle_inv(node: &NodeState, payload: &[u8]) -> Result<()> {
    let payload: Inv = deserialize(payload)?;
    info!(
        "Received inventory with {} {}",
        payload.items.len(),
        payload.kind
    );

    match OpType::from_kind(&payload.kind) {
        Some(OpType::Block) => {
            node.blocks_in_transit.add_blocks(&payload.items);
            if let Some(block_hash) = payload.items.first() {
                send_get_data(node, &payload.addr_from, OpType::Block, block_hash)?;
                node.blocks_in_transit.remove(block_hash);
            }
        }
        Some(OpType::Tx) => {
            if let Some(txid) = payload.items.first() {
                if !node.mempool.contains(&HEXLOWER.encode(txid)) {
                    send_get_data(node, &payload.addr_from, OpType::Tx, txid)?;
                }
            }
        }
        None => {
            warn!("Ignoring inventory of unknown kind {}", payload.kind);
        }
    }
    Ok(())
}

fn handle_get_data(blockchain: &Blockchain, node: &NodeState, payload: &[u8]) -> Result<()> {
    let payload: GetData = deserialize(payload)?;

    match OpType::from_kind(&payload.kind) {
        Some(OpType::Block) => {
            if let Some(block) = blockchain.get_block(&payload.id)? {
                send_block(node, &payload.addr_from, &block)?;
            }
        }
        Some(OpType::Tx) => {
            if let Some(tx) = node.mempool.get(&HEXLOWER.encode(&payload.id)) {
                send_tx(node, &payload.addr_from, &tx)?;
            }
        }
        None => return Err(BlockchainError::UnknownGetDataType(payload.kind)),
    }
    Ok(())
}

/// Appends a relayed block, keeps draining the transit queue, and rebuilds
/// the UTXO view once the queue runs dry.
fn handle_block(blockchain: &Blockchain, node: &NodeState, payload: &[u8]) -> Result<()> {
    let payload: BlockMessage = deserialize(payload)?;
    let block = Block::deserialize(&payload.block)?;

    if !ProofOfWork::validate(&block) {
        return Err(BlockchainError::InvalidBlock(format!(
            "Received block {} fails proof-of-work",
            HEXLOWER.encode(block.get_hash())
        )));
    }

    match blockchain.add_block(&block) {
        Ok(()) => info!("Added block {}", HEXLOWER.encode(block.get_hash())),
        Err(BlockchainError::BlockExists(hash)) => info!("Block {hash} is already known"),
        Err(e) => return Err(e),
    }

    if let Some(block_hash) = node.blocks_in_transit.first() {
        send_get_data(node, &payload.addr_from, OpType::Block, &block_hash)?;
        node.blocks_in_transit.remove(&block_hash);
    } else {
        UTXOSet::new(blockchain.clone()).reindex()?;
    }
    Ok(())
}

/// Pools the transaction, then either relays it (coordinator) or checks
/// whether enough traffic has accumulated to mine (miner).
fn handle_tx(blockchain: &Blockchain, node: &NodeState, payload: &[u8]) -> Result<()> {
    let payload: TxMessage = deserialize(payload)?;
    let tx = Transaction::deserialize(&payload.transaction)?;
    let txid = tx.get_id_bytes();
    node.mempool.add(tx);

    if node.is_coordinator() {
        for peer in node.peers.get_peers() {
            let addr = peer.get_addr();
            if addr != node.addr && addr != payload.addr_from {
                if let Err(e) = send_inv(node, &addr, OpType::Tx, &[txid.clone()]) {
                    error!("Failed to relay transaction to {addr}: {e}");
                }
            }
        }
    } else if node.mempool.len() >= TRANSACTION_THRESHOLD && node.mining_address.is_some() {
        mine_mempool(blockchain, node)?;
    }
    Ok(())
}

/// Drains the mempool into freshly mined blocks. Transactions that fail
/// verification are dropped; each block carries a coinbase paying the
/// miner, and every other peer gets an inv for it.
fn mine_mempool(blockchain: &Blockchain, node: &NodeState) -> Result<()> {
    let mining_address = node
        .mining_address
        .clone()
        .ok_or_else(|| BlockchainError::Network("Mining address is not configured".to_string()))?;

    loop {
        let mut txs = vec![];
        for tx in node.mempool.get_all() {
            match blockchain.verify_transaction(&tx) {
                Ok(true) => txs.push(tx),
                Ok(false) | Err(_) => {
                    let txid_hex = HEXLOWER.encode(tx.get_id());
                    warn!("Dropping invalid transaction {txid_hex}");
                    node.mempool.remove(&txid_hex);
                }
            }
        }

        if txs.is_empty() {
            info!("All transactions were invalid. Waiting for new transactions");
            return Ok(());
        }

        let coinbase_tx = Transaction::new_coinbase_tx(&mining_address, "")?;
        txs.push(coinbase_tx);

        let new_block = blockchain.mine_block(&txs)?;
        UTXOSet::new(blockchain.clone()).reindex()?;
        info!("New block {} is mined", HEXLOWER.encode(new_block.get_hash()));

        for tx in &txs {
            node.mempool.remove(&HEXLOWER.encode(tx.get_id()));
        }

        for peer in node.peers.get_peers() {
            let addr = peer.get_addr();
            if addr != node.addr {
                if let Err(e) =
                    send_inv(node, &addr, OpType::Block, &[new_block.get_hash_bytes()])
                {
                    error!("Failed to announce block to {addr}: {e}");
                }
            }
        }

        if node.mempool.is_empty() {
            return Ok(());
        }
    }
}

/// Dials a peer and writes one framed message. A peer that cannot be
/// reached is evicted from the known list.
fn send_data(node: &NodeState, addr: &str, request: &[u8]) -> Result<()> {
    let mut stream = match TcpStream::connect(addr) {
        Ok(stream) => stream,
        Err(e) => {
            warn!("Peer {addr} is not available, evicting");
            node.peers.evict_peer(addr);
            return Err(BlockchainError::Network(format!(
                "Failed to connect to {addr}: {e}"
            )));
        }
    };

    stream
        .write_all(request)
        .map_err(|e| BlockchainError::Network(format!("Failed to send data to {addr}: {e}")))?;
    stream
        .flush()
        .map_err(|e| BlockchainError::Network(format!("Failed to flush data to {addr}: {e}")))?;
    Ok(())
}

fn send_version(node: &NodeState, addr: &str, best_height: usize) -> Result<()> {
    let payload = Version {
        version: NODE_VERSION,
        best_height,
        addr_from: node.addr.clone(),
    };
    send_data(node, addr, &frame("version", &payload)?)
}

fn send_get_blocks(node: &NodeState, addr: &str) -> Result<()> {
    let payload = GetBlocks {
        addr_from: node.addr.clone(),
    };
    send_data(node, addr, &frame("getblocks", &payload)?)
}

fn send_get_data(node: &NodeState, addr: &str, op_type: OpType, id: &[u8]) -> Result<()> {
    let payload = GetData {
        addr_from: node.addr.clone(),
        kind: op_type.as_str().to_string(),
        id: id.to_vec(),
    };
    send_data(node, addr, &frame("getdata", &payload)?)
}

fn send_inv(node: &NodeState, addr: &str, op_type: OpType, items: &[Vec<u8>]) -> Result<()> {
    let payload = Inv {
        addr_from: node.addr.clone(),
        kind: op_type.as_str().to_string(),
        items: items.to_vec(),
    };
    send_data(node, addr, &frame("inv", &payload)?)
}

fn send_block(node: &NodeState, addr: &str, block: &Block) -> Result<()> {
    let payload = BlockMessage {
        addr_from: node.addr.clone(),
        block: block.serialize()?,
    };
    send_data(node, addr, &frame("block", &payload)?)
}

fn send_tx(node: &NodeState, addr: &str, tx: &Transaction) -> Result<()> {
    let payload = TxMessage {
        addr_from: node.addr.clone(),
        transaction: tx.serialize()?,
    };
    send_data(node, addr, &frame("tx", &payload)?)
}

/// Dispatches a locally built transaction to a node, typically the
/// coordinator. Used by the CLI when a send is not mined on the spot.
pub fn send_transaction(addr: &str, tx: &Transaction) -> Result<()> {
    let payload = TxMessage {
        addr_from: GLOBAL_CONFIG.get_node_addr(),
        transaction: tx.serialize()?,
    };
    let request = frame("tx", &payload)?;

    let mut stream = TcpStream::connect(addr).map_err(|e| {
        BlockchainError::Network(format!("Failed to connect to {addr}: {e}"))
    })?;
    stream
        .write_all(&request)
        .map_err(|e| BlockchainError::Network(format!("Failed to send data to {addr}: {e}")))?;
    stream
        .flush()
        .map_err(|e| BlockchainError::Network(format!("Failed to flush data to {addr}: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::Wallet;
    use tempfile::tempdir;

    #[test]
    fn test_node_state_roles() {
        let coordinator = NodeState::new(CENTRAL_NODE.to_string(), None);
        assert!(coordinator.is_coordinator());
        assert!(coordinator.peers.peer_is_known(CENTRAL_NODE));

        let miner = NodeState::new(
            "localhost:5001".to_string(),
            Some("some-address".to_string()),
        );
        assert!(!miner.is_coordinator());
        assert!(miner.peers.peer_is_known(CENTRAL_NODE));
    }

    #[test]
    fn test_send_to_unreachable_peer_evicts_it() {
        let node = NodeState::new("localhost:5001".to_string(), None);
        node.peers.add_peer("localhost:1".to_string());

        let result = send_get_blocks(&node, "localhost:1");
        assert!(result.is_err());
        assert!(!node.peers.peer_is_known("localhost:1"));
    }

    #[test]
    fn test_server_creation() {
        let temp_dir = tempdir().unwrap();
        let wallet = Wallet::new().unwrap();
        let blockchain = Blockchain::create_blockchain_with_path(
            &wallet.get_address(),
            temp_dir.path().join("chain"),
        )
        .unwrap();

        let _server = Server::new(blockchain, "localhost:5001".to_string(), None);
    }
}
