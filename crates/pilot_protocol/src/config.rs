//! On-disk configuration (`config.json`).

use crate::defaults;
use crate::error::PilotError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// RPC endpoint of one miner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ApiInfo {
    /// `host:port` of the miner RPC.
    pub addr: String,
    /// Bearer token with admin permission.
    pub token: String,
}

impl ApiInfo {
    /// Render the worker-bootstrapping `MINER_API_INFO` blob:
    /// `TOKEN:/ip4/HOST/tcp/PORT/http`.
    pub fn to_api_info(&self) -> Result<String, PilotError> {
        let (host, port) = self
            .addr
            .split_once(':')
            .filter(|(h, p)| !h.is_empty() && !p.is_empty())
            .ok_or_else(|| {
                PilotError::BadRequest(format!("api addr must be host:port, got '{}'", self.addr))
            })?;
        Ok(format!("{}:/ip4/{}/tcp/{}/http", self.token, host, port))
    }
}

/// Daemon configuration. Durations are human-readable strings ("1m", "30s").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PilotConfig {
    /// Control API listen address.
    #[serde(default = "defaults::listen_addr")]
    pub listen: String,
    /// Reconciler tick interval.
    #[serde(with = "humantime_serde", default = "defaults::interval")]
    pub interval: Duration,
    /// Telemetry cache freshness window.
    #[serde(with = "humantime_serde", default = "defaults::cache_ttl")]
    pub cache_timeout: Duration,
    /// Concurrent per-worker updates within one campaign tick.
    #[serde(default = "defaults::parallel")]
    pub parallel: usize,
    /// Known miners keyed by address string.
    #[serde(default)]
    pub miners: BTreeMap<String, ApiInfo>,
}

impl Default for PilotConfig {
    fn default() -> Self {
        Self {
            listen: defaults::listen_addr(),
            interval: defaults::INTERVAL,
            cache_timeout: defaults::CACHE_TTL,
            parallel: defaults::PARALLEL,
            miners: BTreeMap::new(),
        }
    }
}
