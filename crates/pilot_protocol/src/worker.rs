//! Derived per-worker telemetry snapshot.

use crate::types::{TaskType, WorkerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Snapshot of one worker's load, rebuilt from a joined view of
/// `WorkerStats + WorkerJobs + StorageList + SealingSchedDiag`.
///
/// Maps are keyed by task short code ("AP", "PC1", ...). Never mutated in
/// place; the telemetry cache rebuilds the whole map on refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct WorkerInfo {
    #[serde(rename = "workerID")]
    pub worker_id: WorkerId,
    /// Seal-capable storage path, when the worker has one.
    #[serde(rename = "storageID")]
    pub storage_id: Option<String>,
    pub hostname: String,
    /// Jobs currently executing, per task type.
    pub running: BTreeMap<String, u32>,
    /// Jobs past prepare, waiting to run.
    pub prepared: BTreeMap<String, u32>,
    /// Jobs assigned but not yet prepared.
    pub assigned: BTreeMap<String, u32>,
    /// Latest start time of any running job, per task type.
    #[serde(rename = "lastStart")]
    pub last_start: BTreeMap<String, DateTime<Utc>>,
    /// Tasks queued in the miner scheduler attributed to this worker.
    pub sched: BTreeMap<String, u32>,
    /// Sector numbers staged on the seal-capable storage path.
    pub sectors: BTreeSet<u64>,
    /// Task short codes the worker advertises.
    pub tasks: BTreeSet<String>,
}

impl WorkerInfo {
    /// Total pending work of one task type across all phases.
    pub fn sum(&self, tt: &str) -> u32 {
        self.running.get(tt).copied().unwrap_or(0)
            + self.prepared.get(tt).copied().unwrap_or(0)
            + self.assigned.get(tt).copied().unwrap_or(0)
            + self.sched.get(tt).copied().unwrap_or(0)
    }

    /// A worker may be started against the target miner once no early
    /// sealing work (AP, PC1, PC2) remains on the source side.
    pub fn can_switch(&self) -> bool {
        self.sum(TaskType::AddPiece.short())
            + self.sum(TaskType::PreCommit1.short())
            + self.sum(TaskType::PreCommit2.short())
            == 0
    }

    /// A worker may be stopped on the source miner once it has no work of
    /// any kind and no sector data left on its seal path.
    pub fn can_stop(&self) -> bool {
        let all: u32 = self
            .running
            .values()
            .chain(self.prepared.values())
            .chain(self.assigned.values())
            .chain(self.sched.values())
            .sum();
        all == 0 && self.sectors.is_empty()
    }
}
