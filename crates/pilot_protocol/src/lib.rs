//! Canonical types shared across the Pilot control plane.
//!
//! Everything that crosses a boundary lives here: miner addresses and
//! worker ids, sealing task types, the switch campaign model served over
//! the control API and persisted to `state/switch.json`, the on-disk
//! configuration, and the error taxonomy.

pub mod config;
pub mod defaults;
pub mod error;
pub mod switch;
pub mod types;
pub mod worker;

// Re-export types for convenience
pub use config::{ApiInfo, PilotConfig};
pub use error::PilotError;
pub use switch::{CampaignState, SwitchId, SwitchRequest, SwitchState, WorkerState, WorkerSwitchState};
pub use types::{AddressError, MinerAddress, SectorSize, TaskType, WorkerClass, WorkerId};
pub use worker::WorkerInfo;
