//! Shared test harness: an in-memory miner network and a scripted
//! remote-shell executor.
#![allow(dead_code)]

use async_trait::async_trait;
use pilot::executor::{ExecError, Executor, Module};
use pilot::{Pilot, Repo};
use pilot_protocol::{ApiInfo, MinerAddress, PilotConfig, TaskType, WorkerId};
use pilot_rpc::{
    MinerApi, MinerConnector, RpcError, SchedDiagInfo, SectorRef, StorageDecl, StoragePath,
    WorkerJob, WorkerNetInfo, WorkerStats,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

pub fn wid(n: u128) -> WorkerId {
    WorkerId::new(Uuid::from_u128(n))
}

pub fn sealing_stats(hostname: &str, tasks: &[TaskType]) -> WorkerStats {
    WorkerStats {
        info: WorkerNetInfo {
            hostname: hostname.to_string(),
        },
        enabled: true,
        tasks: tasks.to_vec(),
        paths: vec![StoragePath {
            id: format!("store-{hostname}"),
            can_seal: true,
            can_store: false,
        }],
    }
}

pub fn running_job(task: TaskType, start_secs: i64) -> WorkerJob {
    WorkerJob {
        id: Uuid::from_u128(7),
        sector: SectorRef {
            miner: 1000,
            number: 1,
        },
        task,
        run_wait: pilot_rpc::RW_RUNNING,
        start: chrono::TimeZone::timestamp_opt(&chrono::Utc, start_secs, 0).unwrap(),
    }
}

// ============================================================================
// Mock miner RPC
// ============================================================================

#[derive(Default)]
pub struct MinerSim {
    pub stats: HashMap<WorkerId, WorkerStats>,
    pub jobs: HashMap<WorkerId, Vec<WorkerJob>>,
    pub storage: HashMap<String, Vec<StorageDecl>>,
    pub diag: SchedDiagInfo,
    /// When set, every RPC fails with this message.
    pub fail: Option<String>,
}

pub struct MockMiner {
    pub address: MinerAddress,
    pub sector_size: u64,
    pub sim: Mutex<MinerSim>,
    pub closed: AtomicBool,
}

impl MockMiner {
    pub fn new(address: &str) -> Arc<Self> {
        Arc::new(Self {
            address: address.parse().unwrap(),
            sector_size: 32 << 30,
            sim: Mutex::new(MinerSim::default()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn add_worker(&self, wid: WorkerId, hostname: &str, tasks: &[TaskType]) {
        let mut sim = self.sim.lock().unwrap();
        sim.stats.insert(wid, sealing_stats(hostname, tasks));
    }

    pub fn set_stats(&self, wid: WorkerId, stats: WorkerStats) {
        self.sim.lock().unwrap().stats.insert(wid, stats);
    }

    pub fn remove_worker(&self, wid: WorkerId) {
        let mut sim = self.sim.lock().unwrap();
        sim.stats.remove(&wid);
        sim.jobs.remove(&wid);
    }

    pub fn set_jobs(&self, wid: WorkerId, jobs: Vec<WorkerJob>) {
        self.sim.lock().unwrap().jobs.insert(wid, jobs);
    }

    pub fn fail_rpc(&self, msg: &str) {
        self.sim.lock().unwrap().fail = Some(msg.to_string());
    }

    fn check_fail(&self) -> Result<(), RpcError> {
        if let Some(msg) = &self.sim.lock().unwrap().fail {
            return Err(RpcError::Api {
                code: 500,
                message: msg.clone(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MinerApi for MockMiner {
    async fn actor_address(&self) -> Result<MinerAddress, RpcError> {
        self.check_fail()?;
        Ok(self.address.clone())
    }

    async fn actor_sector_size(&self, _addr: &MinerAddress) -> Result<u64, RpcError> {
        self.check_fail()?;
        Ok(self.sector_size)
    }

    async fn worker_stats(&self) -> Result<HashMap<WorkerId, WorkerStats>, RpcError> {
        self.check_fail()?;
        Ok(self.sim.lock().unwrap().stats.clone())
    }

    async fn worker_jobs(&self) -> Result<HashMap<WorkerId, Vec<WorkerJob>>, RpcError> {
        self.check_fail()?;
        Ok(self.sim.lock().unwrap().jobs.clone())
    }

    async fn storage_list(&self) -> Result<HashMap<String, Vec<StorageDecl>>, RpcError> {
        self.check_fail()?;
        Ok(self.sim.lock().unwrap().storage.clone())
    }

    async fn sealing_sched_diag(&self, _force_sched: bool) -> Result<SchedDiagInfo, RpcError> {
        self.check_fail()?;
        Ok(self.sim.lock().unwrap().diag.clone())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Connector resolving `ApiInfo.addr` to mock miners.
#[derive(Default)]
pub struct MockNet {
    miners: Mutex<HashMap<String, Arc<MockMiner>>>,
}

impl MockNet {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, api_addr: &str, miner: Arc<MockMiner>) {
        self.miners
            .lock()
            .unwrap()
            .insert(api_addr.to_string(), miner);
    }
}

#[async_trait]
impl MinerConnector for MockNet {
    async fn connect(&self, api: &ApiInfo) -> Result<Arc<dyn MinerApi>, RpcError> {
        let miners = self.miners.lock().unwrap();
        miners
            .get(&api.addr)
            .cloned()
            .map(|m| m as Arc<dyn MinerApi>)
            .ok_or_else(|| RpcError::Api {
                code: 0,
                message: format!("no endpoint at {}", api.addr),
            })
    }
}

// ============================================================================
// Scripted executor
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecCall {
    pub pattern: String,
    pub module: String,
    pub args: String,
}

/// Records every remote command; optionally fails them all.
#[derive(Default)]
pub struct ScriptedExecutor {
    pub calls: Mutex<Vec<ExecCall>>,
    fail: AtomicBool,
}

impl ScriptedExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<ExecCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Executor for ScriptedExecutor {
    async fn run(
        &self,
        pattern: &str,
        module: Module,
        args: &str,
        _timeout: Duration,
    ) -> Result<(), ExecError> {
        self.calls.lock().unwrap().push(ExecCall {
            pattern: pattern.to_string(),
            module: module.as_str().to_string(),
            args: args.to_string(),
        });
        if self.fail.load(Ordering::SeqCst) {
            return Err(ExecError::NonZero {
                status: "exit status: 2".to_string(),
                stderr: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// Pilot setup
// ============================================================================

/// Config with a zero cache TTL so every tick sees fresh telemetry.
pub fn test_config(miners: &[(&str, &str)]) -> PilotConfig {
    let mut entries = BTreeMap::new();
    for (miner, api_addr) in miners {
        entries.insert(
            miner.to_string(),
            ApiInfo {
                addr: api_addr.to_string(),
                token: "test-token".to_string(),
            },
        );
    }
    PilotConfig {
        interval: Duration::from_secs(1),
        cache_timeout: Duration::ZERO,
        parallel: 2,
        miners: entries,
        ..PilotConfig::default()
    }
}

pub async fn new_pilot(
    dir: &TempDir,
    conf: &PilotConfig,
    net: Arc<MockNet>,
    executor: Arc<ScriptedExecutor>,
) -> Pilot {
    let repo = Repo::new(dir.path());
    repo.init().unwrap();
    Pilot::load(repo, conf, net, executor)
        .await
        .expect("pilot load")
}

/// The on-disk snapshot must agree with the in-memory campaign map.
pub async fn assert_persisted(pilot: &Pilot, dir: &TempDir) {
    let on_disk = Repo::new(dir.path()).read_switch_state().unwrap();
    let ids = pilot.list_switch().await;
    assert_eq!(on_disk.len(), ids.len());
    for id in ids {
        let live = pilot.get_switch(id).await.unwrap();
        assert_eq!(on_disk.get(&id), Some(&live));
    }
}
