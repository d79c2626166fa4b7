//! Switch campaign model: requests, per-worker progress, campaign roll-up.
//!
//! These types are served verbatim over the control API and persisted as
//! JSON in `state/switch.json`. States serialize by name so the on-disk
//! snapshot survives enum reordering across versions.

use crate::defaults;
use crate::types::{MinerAddress, WorkerId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Ids
// ============================================================================

/// Unique id of a switch campaign.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct SwitchId(Uuid);

impl SwitchId {
    /// Allocate a fresh campaign id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for SwitchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SwitchId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s.trim())?))
    }
}

// ============================================================================
// States
// ============================================================================

/// Campaign lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CampaignState {
    #[default]
    Switching,
    Complete,
    Canceled,
    Error,
}

impl CampaignState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignState::Switching => "switching",
            CampaignState::Complete => "complete",
            CampaignState::Canceled => "canceled",
            CampaignState::Error => "error",
        }
    }

    /// A campaign still advanced by the reconciler.
    pub fn is_active(&self) -> bool {
        matches!(self, CampaignState::Switching)
    }

    /// Canceled and errored campaigns may be switched back to `Switching`.
    pub fn can_resume(&self) -> bool {
        matches!(self, CampaignState::Canceled | CampaignState::Error)
    }
}

impl fmt::Display for CampaignState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-worker progress through one campaign.
///
/// Confirming states are entered right after a remote command is issued;
/// the command is never assumed to have succeeded, the next tick's
/// telemetry decides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum WorkerSwitchState {
    #[default]
    #[serde(rename = "picked")]
    Picked,
    #[serde(rename = "disableAPConfirming")]
    DisableApConfirming,
    #[serde(rename = "switchWaiting")]
    SwitchWaiting,
    #[serde(rename = "switchConfirming")]
    SwitchConfirming,
    #[serde(rename = "stopWaiting")]
    StopWaiting,
    #[serde(rename = "stopConfirming")]
    StopConfirming,
    #[serde(rename = "complete")]
    Complete,
    #[serde(rename = "error")]
    Error,
}

impl WorkerSwitchState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerSwitchState::Picked => "picked",
            WorkerSwitchState::DisableApConfirming => "disableAPConfirming",
            WorkerSwitchState::SwitchWaiting => "switchWaiting",
            WorkerSwitchState::SwitchConfirming => "switchConfirming",
            WorkerSwitchState::StopWaiting => "stopWaiting",
            WorkerSwitchState::StopConfirming => "stopConfirming",
            WorkerSwitchState::Complete => "complete",
            WorkerSwitchState::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerSwitchState::Complete | WorkerSwitchState::Error)
    }
}

impl fmt::Display for WorkerSwitchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Request / state
// ============================================================================

/// Operator request to migrate workers from one miner to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchRequest {
    pub from: MinerAddress,
    pub to: MinerAddress,
    /// 0 selects every eligible worker on `from`.
    #[serde(default)]
    pub count: usize,
    /// Explicit worker list; when non-empty it takes precedence and
    /// `count` is ignored. Treated as a set.
    #[serde(default)]
    pub worker: Vec<WorkerId>,
    /// Disable AP on the worker before waiting for drain.
    #[serde(default, rename = "disableAP")]
    pub disable_ap: bool,
}

/// Campaign-local authoritative record for one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerState {
    #[serde(rename = "workerID")]
    pub worker_id: WorkerId,
    pub hostname: String,
    pub state: WorkerSwitchState,
    #[serde(default, rename = "errMsg")]
    pub err_msg: String,
    /// Monotonic failure counter; past `ERR_TRY_COUNT` the worker errors out.
    #[serde(default, rename = "try")]
    pub try_count: u32,
}

impl WorkerState {
    pub fn picked(worker_id: WorkerId, hostname: impl Into<String>) -> Self {
        Self {
            worker_id,
            hostname: hostname.into(),
            state: WorkerSwitchState::Picked,
            err_msg: String::new(),
            try_count: 0,
        }
    }

    /// Record a failed attempt. The worker only errors out once the
    /// counter exceeds [`defaults::ERR_TRY_COUNT`].
    pub fn update_err(&mut self, err_msg: impl Into<String>) {
        self.try_count += 1;
        self.err_msg = err_msg.into();
        if self.try_count > defaults::ERR_TRY_COUNT {
            self.state = WorkerSwitchState::Error;
        }
    }
}

/// One switch campaign: the request plus every worker's progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchState {
    pub id: SwitchId,
    pub state: CampaignState,
    #[serde(default, rename = "errMsg")]
    pub err_msg: String,
    pub req: SwitchRequest,
    pub worker: HashMap<WorkerId, WorkerState>,
}

impl SwitchState {
    pub fn new(req: SwitchRequest, worker: HashMap<WorkerId, WorkerState>) -> Self {
        Self {
            id: SwitchId::generate(),
            state: CampaignState::Switching,
            err_msg: String::new(),
            req,
            worker,
        }
    }

    /// Fold per-worker outcomes into the campaign state: once every worker
    /// is terminal the campaign is `Error` if any worker errored, else
    /// `Complete`.
    pub fn roll_up(&mut self) {
        let completed = self
            .worker
            .values()
            .filter(|w| w.state == WorkerSwitchState::Complete)
            .count();
        let errored = self
            .worker
            .values()
            .filter(|w| w.state == WorkerSwitchState::Error)
            .count();

        if completed + errored == self.worker.len() {
            self.state = if errored != 0 {
                CampaignState::Error
            } else {
                CampaignState::Complete
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> MinerAddress {
        s.parse().unwrap()
    }

    fn req() -> SwitchRequest {
        SwitchRequest {
            from: addr("t01000"),
            to: addr("t01001"),
            count: 1,
            worker: vec![],
            disable_ap: false,
        }
    }

    #[test]
    fn states_serialize_by_name() {
        assert_eq!(
            serde_json::to_string(&CampaignState::Canceled).unwrap(),
            "\"canceled\""
        );
        assert_eq!(
            serde_json::to_string(&WorkerSwitchState::DisableApConfirming).unwrap(),
            "\"disableAPConfirming\""
        );
        let back: WorkerSwitchState = serde_json::from_str("\"stopWaiting\"").unwrap();
        assert_eq!(back, WorkerSwitchState::StopWaiting);
    }

    #[test]
    fn update_err_trips_after_limit() {
        let mut ws = WorkerState::picked(WorkerId::default(), "host-1");
        for i in 1..=defaults::ERR_TRY_COUNT {
            ws.update_err("boom");
            assert_eq!(ws.try_count, i);
            assert_ne!(ws.state, WorkerSwitchState::Error);
        }
        ws.update_err("boom");
        assert_eq!(ws.state, WorkerSwitchState::Error);
        assert_eq!(ws.try_count, defaults::ERR_TRY_COUNT + 1);
    }

    #[test]
    fn roll_up_requires_all_terminal() {
        let w1 = WorkerId::new(uuid::Uuid::new_v4());
        let w2 = WorkerId::new(uuid::Uuid::new_v4());
        let mut ss = SwitchState::new(
            req(),
            HashMap::from([
                (w1, WorkerState::picked(w1, "h1")),
                (w2, WorkerState::picked(w2, "h2")),
            ]),
        );

        ss.worker.get_mut(&w1).unwrap().state = WorkerSwitchState::Complete;
        ss.roll_up();
        assert_eq!(ss.state, CampaignState::Switching);

        ss.worker.get_mut(&w2).unwrap().state = WorkerSwitchState::Error;
        ss.roll_up();
        assert_eq!(ss.state, CampaignState::Error);
    }

    #[test]
    fn roll_up_all_complete() {
        let w1 = WorkerId::new(uuid::Uuid::new_v4());
        let mut ss = SwitchState::new(
            req(),
            HashMap::from([(w1, WorkerState::picked(w1, "h1"))]),
        );
        ss.worker.get_mut(&w1).unwrap().state = WorkerSwitchState::Complete;
        ss.roll_up();
        assert_eq!(ss.state, CampaignState::Complete);
    }

    #[test]
    fn switch_state_json_roundtrip() {
        let w1 = WorkerId::new(uuid::Uuid::new_v4());
        let ss = SwitchState::new(
            SwitchRequest {
                worker: vec![w1],
                disable_ap: true,
                ..req()
            },
            HashMap::from([(w1, WorkerState::picked(w1, "h1"))]),
        );

        let json = serde_json::to_string(&ss).unwrap();
        assert!(json.contains("\"disableAP\":true"));
        let back: SwitchState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ss);
    }
}
