//! `pilot switch` subcommands.

use super::Client;
use anyhow::Result;
use clap::Subcommand;
use pilot_protocol::{MinerAddress, SwitchId, SwitchRequest, SwitchState, WorkerId};

#[derive(Subcommand, Debug)]
pub enum SwitchCommand {
    /// Start a new switch campaign.
    New {
        /// Source miner address.
        #[arg(long)]
        from: String,
        /// Target miner address.
        #[arg(long)]
        to: String,
        /// Workers to migrate; 0 selects every eligible worker.
        #[arg(long, default_value_t = 0)]
        count: usize,
        /// Explicit worker ids; takes precedence over --count.
        #[arg(long)]
        worker: Vec<String>,
        /// Disable AP on each worker before waiting for drain.
        #[arg(long)]
        disable_ap: bool,
    },
    /// Show one campaign.
    Get { id: String },
    /// Cancel a switching campaign.
    Cancel { id: String },
    /// Resume a canceled or errored campaign.
    Resume { id: String },
    /// Delete a campaign record.
    Remove { id: String },
    /// List campaign ids.
    List,
}

pub async fn execute(cmd: SwitchCommand, client: &Client) -> Result<()> {
    match cmd {
        SwitchCommand::New {
            from,
            to,
            count,
            worker,
            disable_ap,
        } => {
            let from: MinerAddress = from.parse()?;
            let to: MinerAddress = to.parse()?;
            let worker = worker
                .iter()
                .map(|w| w.parse::<WorkerId>())
                .collect::<Result<Vec<_>, _>>()?;

            let req = SwitchRequest {
                from,
                to,
                count,
                worker,
                disable_ap,
            };
            let ss: SwitchState = client.post_json("/switch/new", &req).await?;
            print_switch_state(&ss);
            Ok(())
        }
        SwitchCommand::Get { id } => {
            let id: SwitchId = id.parse()?;
            let ss: SwitchState = client.get_json(&format!("/switch/get/{id}")).await?;
            print_switch_state(&ss);
            Ok(())
        }
        SwitchCommand::Cancel { id } => {
            let id: SwitchId = id.parse()?;
            client.get_ok(&format!("/switch/cancel/{id}")).await
        }
        SwitchCommand::Resume { id } => {
            let id: SwitchId = id.parse()?;
            client.get_ok(&format!("/switch/resume/{id}")).await
        }
        SwitchCommand::Remove { id } => {
            let id: SwitchId = id.parse()?;
            client.get_ok(&format!("/switch/remove/{id}")).await
        }
        SwitchCommand::List => {
            let ids: Vec<SwitchId> = client.get_json("/switch/list").await?;
            for id in ids {
                println!("{id}");
            }
            Ok(())
        }
    }
}

fn print_switch_state(ss: &SwitchState) {
    println!("switchID: {}", ss.id);
    println!("state: {}", ss.state);
    if !ss.err_msg.is_empty() {
        println!("errMsg: {}", ss.err_msg);
    }
    println!(
        "request: {} -> {} count: {} disableAP: {}",
        ss.req.from, ss.req.to, ss.req.count, ss.req.disable_ap
    );
    println!();

    for ws in ss.worker.values() {
        println!("workerID: {}", ws.worker_id);
        println!("hostname: {}", ws.hostname);
        println!("state: {}", ws.state);
        if !ws.err_msg.is_empty() {
            println!("errMsg: {}", ws.err_msg);
        }
        if ws.try_count != 0 {
            println!("try: {}", ws.try_count);
        }
        println!();
    }
}
