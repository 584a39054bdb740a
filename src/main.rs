use clap::Parser;
use data_encoding::HEXLOWER;
use log::{error, LevelFilter};
use std::process;
use tincoin::{
    convert_address, hash_pub_key, send_transaction, utils, validate_address, Blockchain,
    Command, Opt, ProofOfWork, Server, Transaction, UTXOSet, Wallets, ADDRESS_CHECK_SUM_LEN,
    CENTRAL_NODE, GLOBAL_CONFIG,
};

fn main() {
    env_logger::builder().filter_level(LevelFilter::Info).init();

    let opt = Opt::parse();

    if let Err(e) = run_command(opt.command) {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn run_command(command: Command) -> Result<(), Box<dyn std::error::Error>> {
    // The node id picks the chain database, the wallet file and the port.
    let node_id = GLOBAL_CONFIG.get_node_id();

    match command {
        Command::Createblockchain { address } => {
            if !validate_address(&address) {
                return Err(format!("Invalid address: {address}").into());
            }
            let blockchain = Blockchain::create_blockchain(&address, &node_id)?;
            let utxo_set = UTXOSet::new(blockchain);
            utxo_set.reindex()?;
            println!("Done!");
        }
        Command::Createwallet => {
            let mut wallets = Wallets::new(&node_id)?;
            let address = wallets.create_wallet()?;
            println!("Your new address: {address}");
        }
        Command::ListAddresses => {
            let wallets = Wallets::new(&node_id)?;
            for address in wallets.get_addresses() {
                println!("{address}");
            }
        }
        Command::GetBalance { address } => {
            if !validate_address(&address) {
                return Err(format!("Invalid address: {address}").into());
            }

            // Version byte and checksum off, the public-key hash remains.
            let payload = utils::base58_decode(&address)?;
            let pub_key_hash = &payload[1..payload.len() - ADDRESS_CHECK_SUM_LEN];

            let blockchain = Blockchain::open_blockchain(&node_id)?;
            let utxo_set = UTXOSet::new(blockchain);
            let balance: u64 = utxo_set
                .find_utxo(pub_key_hash)?
                .iter()
                .map(|utxo| utxo.get_value())
                .sum();
            println!("Balance of {address}: {balance}");
        }
        Command::Send {
            from,
            to,
            amount,
            mine,
        } => {
            if !validate_address(&from) {
                return Err(format!("Invalid sender address: {from}").into());
            }
            if !validate_address(&to) {
                return Err(format!("Invalid recipient address: {to}").into());
            }

            let blockchain = Blockchain::open_blockchain(&node_id)?;
            let utxo_set = UTXOSet::new(blockchain.clone());

            let wallets = Wallets::new(&node_id)?;
            let wallet = wallets
                .get_wallet(&from)
                .ok_or_else(|| format!("Wallet not found for address: {from}"))?;

            let transaction = Transaction::new_utxo_transaction(wallet, &to, amount, &utxo_set)?;

            if mine {
                // Mine on the spot: the sender collects the block subsidy.
                let coinbase_tx = Transaction::new_coinbase_tx(&from, "")?;
                let block = blockchain.mine_block(&[coinbase_tx, transaction])?;
                utxo_set.update(&block)?;
            } else {
                send_transaction(CENTRAL_NODE, &transaction)?;
            }
            println!("Success!");
        }
        Command::Printchain => {
            let blockchain = Blockchain::open_blockchain(&node_id)?;
            for block in blockchain.iterator() {
                println!("Block {}", HEXLOWER.encode(block.get_hash()));
                println!("Prev block: {}", HEXLOWER.encode(block.get_prev_block_hash()));
                println!("Height: {}", block.get_height());
                println!("Timestamp: {}", block.get_timestamp());
                println!("PoW: {}", ProofOfWork::validate(&block));

                for tx in block.get_transactions() {
                    println!("- Transaction {}", HEXLOWER.encode(tx.get_id()));
                    if !tx.is_coinbase() {
                        for input in tx.get_vin() {
                            let pub_key_hash = hash_pub_key(input.get_pub_key());
                            println!(
                                "-- Input txid = {}, vout = {}, from = {}",
                                HEXLOWER.encode(input.get_txid()),
                                input.get_vout(),
                                convert_address(pub_key_hash.as_slice()),
                            );
                        }
                    }
                    for output in tx.get_vout() {
                        println!(
                            "-- Output value = {}, to = {}",
                            output.get_value(),
                            convert_address(output.get_pub_key_hash()),
                        );
                    }
                }
                println!();
            }
        }
        Command::Reindexutxo => {
            let blockchain = Blockchain::open_blockchain(&node_id)?;
            let utxo_set = UTXOSet::new(blockchain);
            utxo_set.reindex()?;
            let count = utxo_set.count_transactions()?;
            println!("Done! There are {count} transactions in the UTXO set.");
        }
        Command::StartNode { miner } => {
            if let Some(ref addr) = miner {
                if !validate_address(addr) {
                    return Err(format!("Invalid miner address: {addr}").into());
                }
                println!("Mining is on. Address to receive rewards: {addr}");
            }

            let blockchain = Blockchain::open_blockchain(&node_id)?;
            let server = Server::new(blockchain, GLOBAL_CONFIG.get_node_addr(), miner);
            server.run()?;
        }
    }
    Ok(())
}
