//! Miner registry: the set of known miners and their RPC handles.

use pilot_protocol::{ApiInfo, MinerAddress, PilotError, SectorSize};
use pilot_rpc::{MinerApi, MinerConnector};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// One registered miner.
#[derive(Clone)]
pub struct MinerInfo {
    pub address: MinerAddress,
    pub size: SectorSize,
    pub api: Arc<dyn MinerApi>,
    /// Worker-bootstrapping blob: `TOKEN:/ip4/HOST/tcp/PORT/http`.
    pub token_blob: String,
}

/// Registered miners under a reader-writer lock.
///
/// The lock is only held for map access; RPC handles are cloned out and
/// used after release.
#[derive(Clone)]
pub struct Registry {
    connector: Arc<dyn MinerConnector>,
    miners: Arc<RwLock<HashMap<MinerAddress, MinerInfo>>>,
}

impl Registry {
    pub fn new(connector: Arc<dyn MinerConnector>) -> Self {
        Self {
            connector,
            miners: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Open an RPC session and validate it: the actor address reported by
    /// the miner must match the configured one, and the sector size must
    /// be one we have a bootstrap template for.
    pub async fn connect(
        &self,
        address: &MinerAddress,
        api: &ApiInfo,
    ) -> Result<MinerInfo, PilotError> {
        if api.addr.is_empty() || api.token.is_empty() {
            return Err(PilotError::BadRequest(format!(
                "miner {address}: api info is empty"
            )));
        }
        let token_blob = api.to_api_info()?;

        let client = self.connector.connect(api).await?;

        let reported = client.actor_address().await?;
        if reported != *address {
            client.close().await;
            return Err(PilotError::ConfigMismatch(format!(
                "config address {address} but rpc reports {reported}"
            )));
        }

        let size_bytes = client.actor_sector_size(address).await?;
        let size = SectorSize::from_bytes(size_bytes)
            .map_err(|err| PilotError::ConfigMismatch(err.to_string()))?;

        info!(miner = %address, addr = %api.addr, %size, "connected to miner");
        Ok(MinerInfo {
            address: address.clone(),
            size,
            api: client,
            token_blob,
        })
    }

    /// Insert a connected miner. Fails with `AlreadyExists` on duplicates.
    pub async fn insert(&self, mi: MinerInfo) -> Result<(), PilotError> {
        let mut miners = self.miners.write().await;
        if miners.contains_key(&mi.address) {
            return Err(PilotError::AlreadyExists(mi.address.to_string()));
        }
        info!(miner = %mi.address, "add miner");
        miners.insert(mi.address.clone(), mi);
        Ok(())
    }

    /// Remove a miner and close its RPC session.
    pub async fn remove(&self, address: &MinerAddress) -> Result<(), PilotError> {
        let removed = {
            let mut miners = self.miners.write().await;
            miners.remove(address)
        };
        match removed {
            Some(mi) => {
                mi.api.close().await;
                info!(miner = %address, "remove miner");
                Ok(())
            }
            None => Err(PilotError::NotFound(format!("miner {address}"))),
        }
    }

    pub async fn get(&self, address: &MinerAddress) -> Result<MinerInfo, PilotError> {
        let miners = self.miners.read().await;
        miners
            .get(address)
            .cloned()
            .ok_or_else(|| PilotError::NotFound(format!("miner {address}")))
    }

    pub async fn has(&self, address: &MinerAddress) -> bool {
        self.miners.read().await.contains_key(address)
    }

    pub async fn list(&self) -> Vec<MinerAddress> {
        self.miners.read().await.keys().cloned().collect()
    }

    /// Snapshot of every registered miner.
    pub async fn infos(&self) -> Vec<MinerInfo> {
        self.miners.read().await.values().cloned().collect()
    }

    /// Close every RPC session. The map is drained so repeated calls are
    /// harmless.
    pub async fn close(&self) {
        let drained: Vec<MinerInfo> = {
            let mut miners = self.miners.write().await;
            miners.drain().map(|(_, mi)| mi).collect()
        };
        for mi in drained {
            mi.api.close().await;
        }
    }
}
