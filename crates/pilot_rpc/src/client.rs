//! JSON-RPC client for the storage-miner API.

use crate::types::{SchedDiagInfo, SchedInfo, StorageDecl, WorkerJob, WorkerStats};
use async_trait::async_trait;
use pilot_protocol::{ApiInfo, MinerAddress, PilotError, WorkerId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("rpc transport: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("rpc error {code}: {message}")]
    Api { code: i64, message: String },
    #[error("rpc decode: {0}")]
    Decode(String),
}

impl From<RpcError> for PilotError {
    fn from(err: RpcError) -> Self {
        PilotError::Transient(err.to_string())
    }
}

/// Typed view of one miner's RPC, as the control plane consumes it.
#[async_trait]
pub trait MinerApi: Send + Sync {
    async fn actor_address(&self) -> Result<MinerAddress, RpcError>;
    async fn actor_sector_size(&self, addr: &MinerAddress) -> Result<u64, RpcError>;
    async fn worker_stats(&self) -> Result<HashMap<WorkerId, WorkerStats>, RpcError>;
    async fn worker_jobs(&self) -> Result<HashMap<WorkerId, Vec<WorkerJob>>, RpcError>;
    async fn storage_list(&self) -> Result<HashMap<String, Vec<StorageDecl>>, RpcError>;
    async fn sealing_sched_diag(&self, force_sched: bool) -> Result<SchedDiagInfo, RpcError>;

    /// Release the transport. A no-op for plain HTTP clients.
    async fn close(&self) {}
}

/// Opens miner RPC sessions. A seam so tests can hand out mock clients.
#[async_trait]
pub trait MinerConnector: Send + Sync {
    async fn connect(&self, api: &ApiInfo) -> Result<Arc<dyn MinerApi>, RpcError>;
}

#[derive(Serialize)]
struct Request<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Value,
    id: u64,
}

#[derive(Deserialize)]
struct Response<T> {
    result: Option<T>,
    error: Option<ResponseError>,
}

#[derive(Deserialize)]
struct ResponseError {
    code: i64,
    message: String,
}

/// JSON-RPC 2.0 over HTTP with bearer-token auth.
pub struct RpcClient {
    http: reqwest::Client,
    url: String,
    token: String,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(api: &ApiInfo) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: format!("http://{}/rpc/v0", api.addr),
            token: api.token.clone(),
            next_id: AtomicU64::new(1),
        }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(method, id, "miner rpc call");

        let resp = self
            .http
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(&Request {
                jsonrpc: "2.0",
                method,
                params,
                id,
            })
            .send()
            .await?
            .error_for_status()?;

        let body: Response<T> = resp.json().await?;
        if let Some(err) = body.error {
            return Err(RpcError::Api {
                code: err.code,
                message: err.message,
            });
        }
        body.result
            .ok_or_else(|| RpcError::Decode(format!("{method}: response has no result")))
    }
}

#[async_trait]
impl MinerApi for RpcClient {
    async fn actor_address(&self) -> Result<MinerAddress, RpcError> {
        let raw: String = self.call("Filecoin.ActorAddress", json!([])).await?;
        raw.parse()
            .map_err(|err| RpcError::Decode(format!("actor address: {err}")))
    }

    async fn actor_sector_size(&self, addr: &MinerAddress) -> Result<u64, RpcError> {
        self.call("Filecoin.ActorSectorSize", json!([addr])).await
    }

    async fn worker_stats(&self) -> Result<HashMap<WorkerId, WorkerStats>, RpcError> {
        self.call("Filecoin.WorkerStats", json!([])).await
    }

    async fn worker_jobs(&self) -> Result<HashMap<WorkerId, Vec<WorkerJob>>, RpcError> {
        self.call("Filecoin.WorkerJobs", json!([])).await
    }

    async fn storage_list(&self) -> Result<HashMap<String, Vec<StorageDecl>>, RpcError> {
        self.call("Filecoin.StorageList", json!([])).await
    }

    async fn sealing_sched_diag(&self, force_sched: bool) -> Result<SchedDiagInfo, RpcError> {
        let info: SchedInfo = self
            .call("Filecoin.SealingSchedDiag", json!([force_sched]))
            .await?;
        Ok(info.sched_info)
    }
}

/// Production connector handing out [`RpcClient`]s.
#[derive(Debug, Clone, Default)]
pub struct RpcConnector;

#[async_trait]
impl MinerConnector for RpcConnector {
    async fn connect(&self, api: &ApiInfo) -> Result<Arc<dyn MinerApi>, RpcError> {
        Ok(Arc::new(RpcClient::new(api)))
    }
}
