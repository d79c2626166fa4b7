//! Command line interface: the `run` daemon command plus thin HTTP
//! clients for operating a running daemon.

pub mod miner;
pub mod run;
pub mod switch;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(name = "pilot", about = "Sealing-worker migration control plane", version)]
pub struct Cli {
    /// Address of a running pilot daemon (client subcommands).
    #[arg(long, global = true, default_value = "127.0.0.1:6788")]
    pub connect: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the pilot daemon.
    Run(run::RunArgs),
    /// Manage miners.
    #[command(subcommand)]
    Miner(miner::MinerCommand),
    /// Manage switch campaigns.
    #[command(subcommand)]
    Switch(switch::SwitchCommand),
    /// Manage bootstrap scripts.
    #[command(subcommand)]
    Script(ScriptCommand),
}

#[derive(Subcommand, Debug)]
pub enum ScriptCommand {
    /// Re-render the bootstrap script of one miner, or `all`.
    Create { id: String },
}

pub async fn execute(cli: Cli) -> Result<()> {
    let client = Client::new(&cli.connect);
    match cli.command {
        Command::Run(args) => run::run(args).await,
        Command::Miner(cmd) => miner::execute(cmd, &client).await,
        Command::Switch(cmd) => switch::execute(cmd, &client).await,
        Command::Script(ScriptCommand::Create { id }) => {
            client.get_ok(&format!("/script/create/{id}")).await
        }
    }
}

/// Minimal HTTP client for the control API.
pub struct Client {
    base: String,
    http: reqwest::Client,
}

impl Client {
    pub fn new(connect: &str) -> Self {
        Self {
            base: format!("http://{connect}"),
            http: reqwest::Client::new(),
        }
    }

    pub async fn get_ok(&self, path: &str) -> Result<()> {
        let resp = self.http.get(format!("{}{path}", self.base)).send().await?;
        Self::check(resp).await?;
        Ok(())
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self.http.get(format!("{}{path}", self.base)).send().await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    pub async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let resp = self
            .http
            .post(format!("{}{path}", self.base))
            .json(body)
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    pub async fn post_ok<B: Serialize>(&self, path: &str, body: &B) -> Result<()> {
        let resp = self
            .http
            .post(format!("{}{path}", self.base))
            .json(body)
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if !status.is_success() {
            let msg = resp.text().await.unwrap_or_default();
            bail!("status: {status} msg: {msg}");
        }
        Ok(resp)
    }
}
