use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "tincoin")]
pub struct Opt {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(name = "createblockchain", about = "Create a new blockchain")]
    Createblockchain {
        #[arg(long, help = "The address to send the genesis block reward to")]
        address: String,
    },
    #[command(name = "createwallet", about = "Create a new wallet")]
    Createwallet,
    #[command(name = "listaddresses", about = "Print local wallet addresses")]
    ListAddresses,
    #[command(
        name = "getbalance",
        about = "Get the wallet balance of the target address"
    )]
    GetBalance {
        #[arg(long, help = "The wallet address")]
        address: String,
    },
    #[command(name = "send", about = "Send coins between addresses")]
    Send {
        #[arg(long, help = "Source wallet address")]
        from: String,
        #[arg(long, help = "Destination wallet address")]
        to: String,
        #[arg(long, help = "Amount to send")]
        amount: u64,
        #[arg(long, help = "Mine the transaction immediately on this node")]
        mine: bool,
    },
    #[command(name = "printchain", about = "Print all blocks in the blockchain")]
    Printchain,
    #[command(name = "reindexutxo", about = "Rebuild the UTXO index")]
    Reindexutxo,
    #[command(name = "startnode", about = "Start a node")]
    StartNode {
        #[arg(long, help = "Enable mining mode and send rewards to ADDRESS")]
        miner: Option<String>,
    },
}
