//! Remote shell execution against worker hosts.
//!
//! Worker hosts are reached through ansible ad-hoc commands; the daemon
//! never opens its own transport. Every invocation is bounded by a
//! timeout, and a timeout is treated like a non-zero exit.

use async_trait::async_trait;
use pilot_protocol::{MinerAddress, PilotError};
use std::fmt;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Ansible module selecting the remote action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Module {
    Shell,
    Copy,
}

impl Module {
    pub fn as_str(&self) -> &'static str {
        match self {
            Module::Shell => "shell",
            Module::Copy => "copy",
        }
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to spawn ansible: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("command failed ({status}): {stderr}")]
    NonZero { status: String, stderr: String },
    #[error("command timed out after {0:?}")]
    Timeout(Duration),
    #[error("bootstrap script not rendered: {0}")]
    MissingScript(std::path::PathBuf),
}

impl From<ExecError> for PilotError {
    fn from(err: ExecError) -> Self {
        PilotError::Transient(err.to_string())
    }
}

/// Fire one remote command at every host matching `pattern`.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn run(
        &self,
        pattern: &str,
        module: Module,
        args: &str,
        timeout: Duration,
    ) -> Result<(), ExecError>;
}

/// Shells out to `ansible <pattern> -m <module> -a <args>`.
///
/// The child is killed when the timeout elapses (`kill_on_drop`).
#[derive(Debug, Clone, Default)]
pub struct AnsibleExecutor;

#[async_trait]
impl Executor for AnsibleExecutor {
    async fn run(
        &self,
        pattern: &str,
        module: Module,
        args: &str,
        timeout: Duration,
    ) -> Result<(), ExecError> {
        debug!(pattern, %module, args, "ansible adhoc");

        let child = tokio::process::Command::new("ansible")
            .arg(pattern)
            .arg("-m")
            .arg(module.as_str())
            .arg("-a")
            .arg(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| ExecError::Timeout(timeout))??;

        if !output.status.success() {
            return Err(ExecError::NonZero {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

/// Logs instead of executing. Selected when the `ansible` feature is off
/// (dry-run builds).
#[derive(Debug, Clone, Default)]
pub struct NoopExecutor;

#[async_trait]
impl Executor for NoopExecutor {
    async fn run(
        &self,
        pattern: &str,
        module: Module,
        args: &str,
        _timeout: Duration,
    ) -> Result<(), ExecError> {
        debug!(pattern, %module, args, "ansible adhoc skipped");
        Ok(())
    }
}

/// Worker repo path on the remote host for a given miner.
pub(crate) fn worker_repo(miner: &MinerAddress) -> String {
    format!("/media/nvme/{miner}/.lotusworker")
}

/// `lotus-worker ... tasks disable AP` on the worker's host.
pub(crate) async fn disable_ap_cmd(
    executor: &dyn Executor,
    hostname: &str,
    from: &MinerAddress,
    timeout: Duration,
) -> Result<(), ExecError> {
    let args = format!(
        "lotus-worker --worker-repo={} tasks disable AP",
        worker_repo(from)
    );
    executor.run(hostname, Module::Shell, &args, timeout).await
}

/// Ship the target miner's bootstrap script and run it.
pub(crate) async fn worker_run_cmd(
    executor: &dyn Executor,
    hostname: &str,
    to: &MinerAddress,
    scripts_path: &Path,
    timeout: Duration,
) -> Result<(), ExecError> {
    let src = scripts_path.join(format!("{to}.sh"));
    // Fail before touching the remote host if the script was never rendered.
    if !src.exists() {
        return Err(ExecError::MissingScript(src));
    }

    let args = format!("src={} dest=/root/{to}.sh mode=777", src.display());
    executor.run(hostname, Module::Copy, &args, timeout).await?;

    let args = format!("bash /root/{to}.sh");
    executor.run(hostname, Module::Shell, &args, timeout).await
}

/// `lotus-worker ... stop` on the worker's host.
pub(crate) async fn worker_stop_cmd(
    executor: &dyn Executor,
    hostname: &str,
    from: &MinerAddress,
    timeout: Duration,
) -> Result<(), ExecError> {
    let args = format!("lotus-worker --worker-repo={} stop", worker_repo(from));
    executor.run(hostname, Module::Shell, &args, timeout).await
}
