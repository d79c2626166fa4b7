//! Miner RPC wire types (lotus JSON field names).

use chrono::{DateTime, Utc};
use pilot_protocol::TaskType;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `RunWait` value of a job that is executing.
pub const RW_RUNNING: i64 = 0;
/// `RunWait` value of a job that finished its prepare phase.
pub const RW_PREPARED: i64 = 1;

/// Identity block inside [`WorkerStats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct WorkerNetInfo {
    #[serde(rename = "Hostname")]
    pub hostname: String,
}

/// One storage path attached to a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StoragePath {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "CanSeal")]
    pub can_seal: bool,
    #[serde(default, rename = "CanStore")]
    pub can_store: bool,
}

/// Live stats of one worker as reported by `WorkerStats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct WorkerStats {
    #[serde(rename = "Info")]
    pub info: WorkerNetInfo,
    #[serde(rename = "Enabled")]
    pub enabled: bool,
    #[serde(rename = "Tasks")]
    pub tasks: Vec<TaskType>,
    #[serde(rename = "Paths")]
    pub paths: Vec<StoragePath>,
}

/// Sector reference: owning actor id plus sector number.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct SectorRef {
    #[serde(rename = "Miner")]
    pub miner: u64,
    #[serde(rename = "Number")]
    pub number: u64,
}

/// One in-flight job as reported by `WorkerJobs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerJob {
    #[serde(rename = "ID")]
    pub id: Uuid,
    #[serde(rename = "Sector")]
    pub sector: SectorRef,
    #[serde(rename = "Task")]
    pub task: TaskType,
    /// Negative: done or cancelled. 0: running. 1: prepared. Larger:
    /// assigned, waiting in the worker queue.
    #[serde(rename = "RunWait")]
    pub run_wait: i64,
    #[serde(rename = "Start")]
    pub start: DateTime<Utc>,
}

/// Sector declared on a storage path (`StorageList`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageDecl {
    #[serde(rename = "SectorID")]
    pub sector_id: SectorRef,
}

/// Entry of the miner's pending scheduling queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedDiagRequest {
    #[serde(rename = "Sector")]
    pub sector: SectorRef,
    #[serde(rename = "TaskType")]
    pub task_type: TaskType,
    #[serde(default, rename = "Priority")]
    pub priority: i64,
}

/// Diagnostic snapshot of the miner scheduler queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SchedDiagInfo {
    #[serde(default, rename = "Requests")]
    pub requests: Vec<SchedDiagRequest>,
}

/// `SealingSchedDiag` wraps the queue snapshot in an outer envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SchedInfo {
    #[serde(default, rename = "SchedInfo")]
    pub sched_info: SchedDiagInfo,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pilot_protocol::TaskType;

    #[test]
    fn worker_stats_decodes_lotus_shape() {
        let json = r#"{
            "Info": { "Hostname": "sealer-03" },
            "Enabled": true,
            "Tasks": ["seal/v0/addpiece", "seal/v0/precommit/1"],
            "Paths": [{ "ID": "path-1", "CanSeal": true, "CanStore": false }]
        }"#;
        let stats: WorkerStats = serde_json::from_str(json).unwrap();
        assert_eq!(stats.info.hostname, "sealer-03");
        assert!(stats.enabled);
        assert_eq!(stats.tasks, vec![TaskType::AddPiece, TaskType::PreCommit1]);
        assert!(stats.paths[0].can_seal);
    }

    #[test]
    fn sched_diag_envelope_decodes() {
        let json = r#"{
            "SchedInfo": {
                "Requests": [
                    { "Sector": { "Miner": 1000, "Number": 7 }, "TaskType": "seal/v0/precommit/2", "Priority": 1 }
                ],
                "OpenWindows": ["w1"]
            },
            "ReturnedWork": []
        }"#;
        let info: SchedInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.sched_info.requests.len(), 1);
        assert_eq!(info.sched_info.requests[0].sector.number, 7);
        assert_eq!(info.sched_info.requests[0].task_type, TaskType::PreCommit2);
    }
}
