//! `pilot miner` subcommands.

use super::Client;
use anyhow::Result;
use clap::Subcommand;
use pilot_protocol::{ApiInfo, MinerAddress};
use serde_json::{json, Value};

#[derive(Subcommand, Debug)]
pub enum MinerCommand {
    /// Register a miner with the daemon.
    Add {
        /// Miner actor address, e.g. t017387.
        #[arg(long)]
        miner: String,
        /// Miner RPC endpoint, host:port.
        #[arg(long)]
        addr: String,
        /// Admin API token.
        #[arg(long)]
        token: String,
    },
    /// Remove a miner.
    Remove { miner: String },
    /// List registered miners.
    List,
    /// Show worker info of one miner, or `all`.
    Worker { miner: String },
}

pub async fn execute(cmd: MinerCommand, client: &Client) -> Result<()> {
    match cmd {
        MinerCommand::Add { miner, addr, token } => {
            // Validate locally so typos fail before the request goes out.
            let miner: MinerAddress = miner.parse()?;
            let body = json!({
                "miner": miner,
                "api": ApiInfo { addr, token },
            });
            client.post_ok("/miner/add", &body).await
        }
        MinerCommand::Remove { miner } => {
            let miner: MinerAddress = miner.parse()?;
            client.get_ok(&format!("/miner/remove/{miner}")).await
        }
        MinerCommand::List => {
            let miners: Vec<String> = client.get_json("/miner/list").await?;
            for miner in miners {
                println!("{miner}");
            }
            Ok(())
        }
        MinerCommand::Worker { miner } => {
            let info: Value = client.get_json(&format!("/miner/worker/{miner}")).await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
            Ok(())
        }
    }
}
