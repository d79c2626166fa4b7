//! Worker telemetry caches.
//!
//! Two TTL caches per miner: raw `WorkerStats`, and the enriched
//! [`WorkerInfo`] joined from stats, jobs, storage declarations and the
//! scheduler diagnostic. Snapshots are immutable once produced and shared
//! behind `Arc`, so callers never lock them.

use crate::registry::Registry;
use pilot_protocol::{MinerAddress, PilotError, TaskType, WorkerClass, WorkerId, WorkerInfo};
use pilot_rpc::{SchedDiagInfo, SectorRef, StorageDecl, WorkerJob, WorkerStats, RW_PREPARED, RW_RUNNING};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

type StatsMap = HashMap<WorkerId, WorkerStats>;
type InfoMap = HashMap<WorkerId, WorkerInfo>;

struct CacheEntry<T> {
    value: Arc<T>,
    cached_at: Instant,
}

/// TTL-cached telemetry per miner.
pub struct TelemetryCache {
    ttl: Duration,
    registry: Registry,
    stats: Mutex<HashMap<MinerAddress, CacheEntry<StatsMap>>>,
    info: Mutex<HashMap<MinerAddress, CacheEntry<InfoMap>>>,
}

impl TelemetryCache {
    pub fn new(registry: Registry, ttl: Duration) -> Self {
        Self {
            ttl,
            registry,
            stats: Mutex::new(HashMap::new()),
            info: Mutex::new(HashMap::new()),
        }
    }

    /// Raw worker stats of one miner, at most `ttl` old.
    pub async fn get_worker_stats(&self, miner: &MinerAddress) -> Result<Arc<StatsMap>, PilotError> {
        if let Some(hit) = fresh(&self.stats, miner, self.ttl) {
            debug!(%miner, "worker stats cache hit");
            return Ok(hit);
        }

        let mi = self.registry.get(miner).await?;
        let stats = Arc::new(mi.api.worker_stats().await.map_err(PilotError::from)?);
        store(&self.stats, miner, stats.clone());
        Ok(stats)
    }

    /// Enriched worker info of one miner, at most `ttl` old.
    pub async fn get_worker_info(&self, miner: &MinerAddress) -> Result<Arc<InfoMap>, PilotError> {
        if let Some(hit) = fresh(&self.info, miner, self.ttl) {
            debug!(%miner, "worker info cache hit");
            return Ok(hit);
        }

        let info = Arc::new(self.fetch_worker_info(miner).await?);
        store(&self.info, miner, info.clone());
        Ok(info)
    }

    async fn fetch_worker_info(&self, miner: &MinerAddress) -> Result<InfoMap, PilotError> {
        let mi = self.registry.get(miner).await?;

        let stats = mi.api.worker_stats().await.map_err(PilotError::from)?;
        let jobs = mi.api.worker_jobs().await.map_err(PilotError::from)?;
        let storage = mi.api.storage_list().await.map_err(PilotError::from)?;

        #[cfg(feature = "sched-diag")]
        let diag = mi
            .api
            .sealing_sched_diag(false)
            .await
            .map_err(PilotError::from)?;
        #[cfg(not(feature = "sched-diag"))]
        let diag = SchedDiagInfo::default();

        Ok(build_worker_info(&stats, &jobs, &storage, &diag))
    }
}

fn fresh<T>(
    cache: &Mutex<HashMap<MinerAddress, CacheEntry<T>>>,
    miner: &MinerAddress,
    ttl: Duration,
) -> Option<Arc<T>> {
    let cache = cache.lock().expect("cache lock poisoned");
    cache
        .get(miner)
        .filter(|entry| entry.cached_at.elapsed() < ttl)
        .map(|entry| entry.value.clone())
}

fn store<T>(
    cache: &Mutex<HashMap<MinerAddress, CacheEntry<T>>>,
    miner: &MinerAddress,
    value: Arc<T>,
) {
    let mut cache = cache.lock().expect("cache lock poisoned");
    cache.insert(
        miner.clone(),
        CacheEntry {
            value,
            cached_at: Instant::now(),
        },
    );
}

/// A worker the Pilot may migrate: enabled, sealing-class (not a
/// window-post worker), and advertising PC1 or PC2. This excludes the
/// miner-local AP/GET-only workers.
pub(crate) fn worker_check(st: &WorkerStats) -> bool {
    if let Some(first) = st.tasks.first() {
        if first.worker_class() != WorkerClass::Sealing {
            return false;
        }
    }

    if !st.enabled {
        return false;
    }

    st.tasks
        .iter()
        .any(|t| matches!(t, TaskType::PreCommit1 | TaskType::PreCommit2))
}

/// Join stats, jobs, storage and scheduler queue into per-worker info.
pub(crate) fn build_worker_info(
    stats: &StatsMap,
    jobs: &HashMap<WorkerId, Vec<WorkerJob>>,
    storage: &HashMap<String, Vec<StorageDecl>>,
    diag: &SchedDiagInfo,
) -> InfoMap {
    let mut worker: InfoMap = HashMap::new();
    let mut sector_worker: HashMap<SectorRef, WorkerId> = HashMap::new();

    for (wid, st) in stats {
        if !worker_check(st) {
            debug!(worker = %wid, "worker not eligible, skipped");
            continue;
        }

        let storage_id = st.paths.iter().find(|p| p.can_seal).map(|p| p.id.clone());

        let mut sectors = BTreeSet::new();
        if let Some(id) = &storage_id {
            for decl in storage.get(id).into_iter().flatten() {
                sectors.insert(decl.sector_id.number);
                sector_worker.insert(decl.sector_id, *wid);
            }
        }

        let tasks = st.tasks.iter().map(|t| t.short().to_string()).collect();

        worker.insert(
            *wid,
            WorkerInfo {
                worker_id: *wid,
                storage_id,
                hostname: st.info.hostname.clone(),
                sectors,
                tasks,
                ..WorkerInfo::default()
            },
        );
    }

    for (wid, worker_jobs) in jobs {
        let Some(info) = worker.get_mut(wid) else {
            debug!(worker = %wid, "jobs for unknown worker, skipped");
            continue;
        };
        for job in worker_jobs {
            // Negative RunWait: completed or cancelled.
            if job.run_wait < 0 {
                continue;
            }
            let tt = job.task.short().to_string();
            if job.run_wait == RW_RUNNING {
                *info.running.entry(tt.clone()).or_default() += 1;
                let last = info.last_start.entry(tt).or_insert(job.start);
                if *last < job.start {
                    *last = job.start;
                }
            } else if job.run_wait == RW_PREPARED {
                *info.prepared.entry(tt).or_default() += 1;
            } else {
                *info.assigned.entry(tt).or_default() += 1;
            }
        }
    }

    // Queued scheduler requests are attributed through the sector index.
    for req in &diag.requests {
        let Some(wid) = sector_worker.get(&req.sector) else {
            debug!(sector = req.sector.number, "sector not staged on any worker");
            continue;
        };
        if let Some(info) = worker.get_mut(wid) {
            *info.sched.entry(req.task_type.short().to_string()).or_default() += 1;
        }
    }

    worker
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pilot_rpc::{SchedDiagRequest, StoragePath, WorkerNetInfo};
    use uuid::Uuid;

    fn wid(n: u128) -> WorkerId {
        WorkerId::new(Uuid::from_u128(n))
    }

    fn sealing_stats(hostname: &str) -> WorkerStats {
        WorkerStats {
            info: WorkerNetInfo {
                hostname: hostname.to_string(),
            },
            enabled: true,
            tasks: vec![TaskType::AddPiece, TaskType::PreCommit1, TaskType::PreCommit2],
            paths: vec![StoragePath {
                id: format!("store-{hostname}"),
                can_seal: true,
                can_store: false,
            }],
        }
    }

    fn job(task: TaskType, run_wait: i64, start_secs: i64) -> WorkerJob {
        WorkerJob {
            id: Uuid::from_u128(99),
            sector: SectorRef {
                miner: 1000,
                number: 1,
            },
            task,
            run_wait,
            start: Utc.timestamp_opt(start_secs, 0).unwrap(),
        }
    }

    #[test]
    fn worker_check_filters_classes() {
        let mut st = sealing_stats("h1");
        assert!(worker_check(&st));

        st.enabled = false;
        assert!(!worker_check(&st));

        let mut post = sealing_stats("h2");
        post.tasks.insert(0, TaskType::GenerateWindowPost);
        assert!(!worker_check(&post));

        // miner-local AP/GET-only worker
        let mut local = sealing_stats("h3");
        local.tasks = vec![TaskType::AddPiece, TaskType::Fetch];
        assert!(!worker_check(&local));
    }

    #[test]
    fn build_counts_phases_and_last_start() {
        let w = wid(1);
        let stats = HashMap::from([(w, sealing_stats("h1"))]);
        let jobs = HashMap::from([(
            w,
            vec![
                job(TaskType::PreCommit1, RW_RUNNING, 100),
                job(TaskType::PreCommit1, RW_RUNNING, 200),
                job(TaskType::PreCommit1, RW_PREPARED, 0),
                job(TaskType::PreCommit2, 3, 0),
                job(TaskType::Commit2, -1, 0),
            ],
        )]);

        let info = build_worker_info(&stats, &jobs, &HashMap::new(), &SchedDiagInfo::default());
        let w1 = &info[&w];
        assert_eq!(w1.running["PC1"], 2);
        assert_eq!(w1.prepared["PC1"], 1);
        assert_eq!(w1.assigned["PC2"], 1);
        assert!(!w1.running.contains_key("C2"));
        assert_eq!(
            w1.last_start["PC1"],
            Utc.timestamp_opt(200, 0).unwrap()
        );
        assert_eq!(w1.sum("PC1"), 3);
    }

    #[test]
    fn build_attributes_sched_via_sector_index() {
        let w = wid(1);
        let stats = HashMap::from([(w, sealing_stats("h1"))]);
        let sector = SectorRef {
            miner: 1000,
            number: 42,
        };
        let storage = HashMap::from([(
            "store-h1".to_string(),
            vec![StorageDecl { sector_id: sector }],
        )]);
        let diag = SchedDiagInfo {
            requests: vec![
                SchedDiagRequest {
                    sector,
                    task_type: TaskType::PreCommit2,
                    priority: 0,
                },
                // unknown sector: dropped
                SchedDiagRequest {
                    sector: SectorRef {
                        miner: 1000,
                        number: 7,
                    },
                    task_type: TaskType::PreCommit2,
                    priority: 0,
                },
            ],
        };

        let info = build_worker_info(&stats, &HashMap::new(), &storage, &diag);
        let w1 = &info[&w];
        assert_eq!(w1.sched["PC2"], 1);
        assert_eq!(w1.sectors, BTreeSet::from([42]));
        assert_eq!(w1.storage_id.as_deref(), Some("store-h1"));
    }

    #[test]
    fn build_skips_ineligible_workers_entirely() {
        let w1 = wid(1);
        let w2 = wid(2);
        let mut disabled = sealing_stats("h2");
        disabled.enabled = false;

        let stats = HashMap::from([(w1, sealing_stats("h1")), (w2, disabled)]);
        let jobs = HashMap::from([(w2, vec![job(TaskType::PreCommit1, RW_RUNNING, 1)])]);

        let info = build_worker_info(&stats, &jobs, &HashMap::new(), &SchedDiagInfo::default());
        assert!(info.contains_key(&w1));
        assert!(!info.contains_key(&w2));
    }
}
