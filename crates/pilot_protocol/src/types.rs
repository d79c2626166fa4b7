//! Core identifier and task types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Miner address
// ============================================================================

/// Canonical miner actor address (an ID address such as `t017387`).
///
/// Stored lowercase; equality and hashing are on the canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MinerAddress(String);

impl MinerAddress {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MinerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MinerAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        let mut chars = s.chars();
        match chars.next() {
            Some('t') | Some('f') => {}
            _ => return Err(AddressError::Network(s)),
        }
        // Miner actors are ID addresses: protocol 0 followed by digits.
        match chars.next() {
            Some('0') => {}
            _ => return Err(AddressError::Protocol(s)),
        }
        let id: String = chars.collect();
        if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AddressError::Id(s));
        }
        Ok(MinerAddress(s))
    }
}

impl TryFrom<String> for MinerAddress {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MinerAddress> for String {
    fn from(value: MinerAddress) -> Self {
        value.0
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("address must start with network prefix 't' or 'f': {0}")]
    Network(String),
    #[error("miner address must be an ID address (protocol 0): {0}")]
    Protocol(String),
    #[error("invalid actor id in address: {0}")]
    Id(String),
}

// ============================================================================
// Worker id
// ============================================================================

/// Unique id of a sealing worker process (assigned by the worker itself).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct WorkerId(Uuid);

impl WorkerId {
    pub const fn new(value: Uuid) -> Self {
        Self(value)
    }

    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for WorkerId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s.trim())?))
    }
}

impl From<Uuid> for WorkerId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

// ============================================================================
// Sector size
// ============================================================================

const SIZE_32GIB: u64 = 32 << 30;
const SIZE_64GIB: u64 = 64 << 30;

/// Sealed sector size of a miner. Only the two mainnet sizes exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SectorSize {
    #[serde(rename = "32GiB")]
    Gib32,
    #[serde(rename = "64GiB")]
    Gib64,
}

impl SectorSize {
    pub fn from_bytes(bytes: u64) -> Result<Self, UnsupportedSectorSize> {
        match bytes {
            SIZE_32GIB => Ok(SectorSize::Gib32),
            SIZE_64GIB => Ok(SectorSize::Gib64),
            other => Err(UnsupportedSectorSize(other)),
        }
    }

    pub fn as_bytes(&self) -> u64 {
        match self {
            SectorSize::Gib32 => SIZE_32GIB,
            SectorSize::Gib64 => SIZE_64GIB,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SectorSize::Gib32 => "32GiB",
            SectorSize::Gib64 => "64GiB",
        }
    }
}

impl fmt::Display for SectorSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("unsupported sector size: {0} bytes")]
pub struct UnsupportedSectorSize(pub u64);

// ============================================================================
// Sealing task types
// ============================================================================

/// Sealing and proving task types as advertised by workers.
///
/// Wire form is the full lotus identifier (`seal/v0/addpiece`); the short
/// code (`AP`) is what operators see and what telemetry maps are keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaskType {
    #[serde(rename = "seal/v0/datacid")]
    DataCid,
    #[serde(rename = "seal/v0/addpiece")]
    AddPiece,
    #[serde(rename = "seal/v0/precommit/1")]
    PreCommit1,
    #[serde(rename = "seal/v0/precommit/2")]
    PreCommit2,
    #[serde(rename = "seal/v0/commit/1")]
    Commit1,
    #[serde(rename = "seal/v0/commit/2")]
    Commit2,
    #[serde(rename = "seal/v0/finalize")]
    Finalize,
    #[serde(rename = "seal/v0/finalizeunsealed")]
    FinalizeUnsealed,
    #[serde(rename = "seal/v0/fetch")]
    Fetch,
    #[serde(rename = "seal/v0/unseal")]
    Unseal,
    #[serde(rename = "seal/v0/replicaupdate")]
    ReplicaUpdate,
    #[serde(rename = "seal/v0/provereplicaupdate/1")]
    ProveReplicaUpdate1,
    #[serde(rename = "seal/v0/provereplicaupdate/2")]
    ProveReplicaUpdate2,
    #[serde(rename = "seal/v0/regensectorkey")]
    RegenSectorKey,
    #[serde(rename = "seal/v0/finalizereplicaupdate")]
    FinalizeReplicaUpdate,
    #[serde(rename = "seal/v0/downloadsector")]
    DownloadSector,
    #[serde(rename = "post/v0/windowproof")]
    GenerateWindowPost,
    #[serde(rename = "post/v0/winningproof")]
    GenerateWinningPost,
}

impl TaskType {
    pub fn short(&self) -> &'static str {
        match self {
            TaskType::DataCid => "DC",
            TaskType::AddPiece => "AP",
            TaskType::PreCommit1 => "PC1",
            TaskType::PreCommit2 => "PC2",
            TaskType::Commit1 => "C1",
            TaskType::Commit2 => "C2",
            TaskType::Finalize => "FIN",
            TaskType::FinalizeUnsealed => "FUS",
            TaskType::Fetch => "GET",
            TaskType::Unseal => "UNS",
            TaskType::ReplicaUpdate => "RU",
            TaskType::ProveReplicaUpdate1 => "PR1",
            TaskType::ProveReplicaUpdate2 => "PR2",
            TaskType::RegenSectorKey => "GSK",
            TaskType::FinalizeReplicaUpdate => "FRU",
            TaskType::DownloadSector => "DL",
            TaskType::GenerateWindowPost => "WDPOST",
            TaskType::GenerateWinningPost => "WINPOST",
        }
    }

    /// Worker class implied by a task type. A worker's class is decided by
    /// the first task it advertises.
    pub fn worker_class(&self) -> WorkerClass {
        match self {
            TaskType::GenerateWindowPost => WorkerClass::WindowPost,
            TaskType::GenerateWinningPost => WorkerClass::WinningPost,
            _ => WorkerClass::Sealing,
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short())
    }
}

/// Worker class derived from the advertised task set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerClass {
    Sealing,
    WindowPost,
    WinningPost,
}
