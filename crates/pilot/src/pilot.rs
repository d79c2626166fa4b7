//! The Pilot: one instance owns the miner registry, the telemetry caches,
//! the campaign map and the reconciler.

use crate::cache::TelemetryCache;
use crate::executor::Executor;
use crate::registry::Registry;
use crate::repo::Repo;
use anyhow::{Context, Result};
use pilot_protocol::{
    ApiInfo, MinerAddress, PilotConfig, PilotError, SwitchId, SwitchState, WorkerId, WorkerInfo,
};
use pilot_rpc::MinerConnector;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::info;

/// Control plane instance. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Pilot {
    pub(crate) interval: Duration,
    pub(crate) parallel: usize,
    pub(crate) registry: Registry,
    pub(crate) cache: Arc<TelemetryCache>,
    pub(crate) switches: Arc<RwLock<HashMap<SwitchId, SwitchState>>>,
    pub(crate) repo: Arc<Repo>,
    pub(crate) executor: Arc<dyn Executor>,
}

impl Pilot {
    /// Production wiring: JSON-RPC connector and, unless the `ansible`
    /// feature is off, the real ansible executor.
    pub async fn open(repo: Repo, conf: &PilotConfig) -> Result<Self> {
        let connector: Arc<dyn MinerConnector> = Arc::new(pilot_rpc::RpcConnector);

        #[cfg(feature = "ansible")]
        let executor: Arc<dyn Executor> = Arc::new(crate::executor::AnsibleExecutor);
        #[cfg(not(feature = "ansible"))]
        let executor: Arc<dyn Executor> = Arc::new(crate::executor::NoopExecutor);

        Self::load(repo, conf, connector, executor).await
    }

    /// Connect every configured miner, render its bootstrap script, and
    /// restore the campaign map from disk.
    pub async fn load(
        repo: Repo,
        conf: &PilotConfig,
        connector: Arc<dyn MinerConnector>,
        executor: Arc<dyn Executor>,
    ) -> Result<Self> {
        let registry = Registry::new(connector);

        for (miner, api) in &conf.miners {
            let address: MinerAddress = miner
                .parse()
                .with_context(|| format!("invalid miner address in config: {miner}"))?;
            let mi = registry
                .connect(&address, api)
                .await
                .with_context(|| format!("failed to connect miner {miner}"))?;
            repo.create_script(&mi.address, &mi.token_blob, mi.size)?;
            registry
                .insert(mi)
                .await
                .map_err(|err| anyhow::anyhow!(err))?;
        }

        let switches = repo.read_switch_state()?;
        if !switches.is_empty() {
            info!(campaigns = switches.len(), "restored campaign state");
        }

        let cache = Arc::new(TelemetryCache::new(registry.clone(), conf.cache_timeout));

        Ok(Self {
            interval: conf.interval,
            parallel: conf.parallel.max(1),
            registry,
            cache,
            switches: Arc::new(RwLock::new(switches)),
            repo: Arc::new(repo),
            executor,
        })
    }

    /// Periodic reconciliation until the shutdown flag flips. The first
    /// tick fires one interval after start.
    pub fn spawn_reconciler(&self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let pilot = self.clone();
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + pilot.interval;
            let mut ticker = tokio::time::interval_at(start, pilot.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => pilot.process_once().await,
                    _ = shutdown.changed() => {
                        info!("reconciler stopped");
                        return;
                    }
                }
            }
        })
    }

    /// Close every miner RPC session.
    pub async fn close(&self) {
        self.registry.close().await;
    }

    // ========================================================================
    // Miner operations
    // ========================================================================

    pub async fn add_miner(&self, address: MinerAddress, api: ApiInfo) -> Result<(), PilotError> {
        if self.registry.has(&address).await {
            return Err(PilotError::AlreadyExists(address.to_string()));
        }

        let mi = self.registry.connect(&address, &api).await?;

        self.repo
            .create_script(&mi.address, &mi.token_blob, mi.size)
            .map_err(fatal)?;
        self.repo
            .update_config(mi.address.as_str(), Some(&api))
            .map_err(fatal)?;

        self.registry.insert(mi).await
    }

    pub async fn remove_miner(&self, address: &MinerAddress) -> Result<(), PilotError> {
        if !self.registry.has(address).await {
            return Err(PilotError::NotFound(format!("miner {address}")));
        }

        self.repo
            .update_config(address.as_str(), None)
            .map_err(fatal)?;
        self.repo.remove_script(address).map_err(fatal)?;

        self.registry.remove(address).await
    }

    pub async fn list_miners(&self) -> Vec<String> {
        self.registry
            .list()
            .await
            .into_iter()
            .map(|m| m.to_string())
            .collect()
    }

    pub async fn has_miner(&self, address: &MinerAddress) -> bool {
        self.registry.has(address).await
    }

    /// Enriched worker info of one miner.
    pub async fn worker_info(
        &self,
        address: &MinerAddress,
    ) -> Result<Arc<HashMap<WorkerId, WorkerInfo>>, PilotError> {
        self.cache.get_worker_info(address).await
    }

    /// Enriched worker info of every registered miner.
    pub async fn worker_info_all(
        &self,
    ) -> Result<HashMap<String, HashMap<WorkerId, WorkerInfo>>, PilotError> {
        let mut out = HashMap::new();
        for address in self.registry.list().await {
            let info = self.cache.get_worker_info(&address).await?;
            out.insert(address.to_string(), (*info).clone());
        }
        Ok(out)
    }

    /// Re-render bootstrap scripts; `id` may be a miner address or `all`.
    pub async fn create_script(&self, id: &str) -> Result<(), PilotError> {
        if id == "all" {
            for mi in self.registry.infos().await {
                self.repo
                    .create_script(&mi.address, &mi.token_blob, mi.size)
                    .map_err(fatal)?;
            }
            return Ok(());
        }

        let address: MinerAddress = id.parse()?;
        let mi = self.registry.get(&address).await?;
        self.repo
            .create_script(&mi.address, &mi.token_blob, mi.size)
            .map_err(fatal)?;
        Ok(())
    }
}

pub(crate) fn fatal(err: anyhow::Error) -> PilotError {
    PilotError::Fatal(err.to_string())
}
