//! Typed miner RPC surface.
//!
//! The storage-miner daemon speaks JSON-RPC 2.0. This crate holds the
//! wire types the Pilot consumes, the [`MinerApi`] trait the rest of the
//! control plane is written against, and the HTTP client implementation.

pub mod client;
pub mod types;

pub use client::{MinerApi, MinerConnector, RpcClient, RpcConnector, RpcError};
pub use types::{
    SchedDiagInfo, SchedDiagRequest, SectorRef, StorageDecl, StoragePath, WorkerJob, WorkerNetInfo,
    WorkerStats, RW_PREPARED, RW_RUNNING,
};
