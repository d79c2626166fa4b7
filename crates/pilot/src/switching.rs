//! Switch campaigns: the per-worker state machine, the reconciler tick,
//! and the durable campaign store.

use crate::executor::{disable_ap_cmd, worker_run_cmd, worker_stop_cmd};
use crate::pilot::{fatal, Pilot};
use crate::select;
use pilot_protocol::{
    defaults, CampaignState, PilotError, SwitchId, SwitchRequest, SwitchState, TaskType, WorkerId,
    WorkerState, WorkerSwitchState,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

impl Pilot {
    // ========================================================================
    // Campaign store
    // ========================================================================

    /// Create a campaign: select workers, insert it as `Switching`,
    /// persist. Nothing is created when selection fails.
    pub async fn new_switch(&self, req: SwitchRequest) -> Result<SwitchState, PilotError> {
        if !self.registry.has(&req.from).await {
            return Err(PilotError::NotFound(format!("miner {}", req.from)));
        }
        if !self.registry.has(&req.to).await {
            return Err(PilotError::NotFound(format!("miner {}", req.to)));
        }

        let busy = self.switching_workers().await;
        let worker = select::pick(&self.cache, &busy, &req).await?;
        let ss = SwitchState::new(req, worker);

        let mut switches = self.switches.write().await;
        // Selection ran outside the lock; a racing request may have claimed
        // one of these workers in the meantime.
        let busy = switching_workers_locked(&switches);
        if let Some(wid) = ss.worker.keys().find(|wid| busy.contains(wid)) {
            return Err(PilotError::AlreadySwitching(*wid));
        }

        switches.insert(ss.id, ss.clone());
        self.repo.write_switch_state(&switches).map_err(fatal)?;

        info!(switch = %ss.id, workers = ss.worker.len(), "new switch");
        Ok(ss)
    }

    pub async fn get_switch(&self, id: SwitchId) -> Result<SwitchState, PilotError> {
        let switches = self.switches.read().await;
        switches
            .get(&id)
            .cloned()
            .ok_or_else(|| PilotError::NotFound(format!("switch {id}")))
    }

    pub async fn list_switch(&self) -> Vec<SwitchId> {
        self.switches.read().await.keys().copied().collect()
    }

    /// Cancel a campaign. Legal only while it is still `Switching`.
    pub async fn cancel_switch(&self, id: SwitchId) -> Result<(), PilotError> {
        let mut switches = self.switches.write().await;
        let ss = switches
            .get_mut(&id)
            .ok_or_else(|| PilotError::NotFound(format!("switch {id}")))?;
        if ss.state != CampaignState::Switching {
            return Err(PilotError::BadRequest(format!(
                "switch state {} can not cancel",
                ss.state
            )));
        }

        ss.state = CampaignState::Canceled;
        info!(switch = %id, "switch canceled");
        self.repo.write_switch_state(&switches).map_err(fatal)
    }

    /// Put a canceled or errored campaign back to `Switching`; the state
    /// machine resumes from each worker's current state.
    pub async fn resume_switch(&self, id: SwitchId) -> Result<(), PilotError> {
        let mut switches = self.switches.write().await;
        let ss = switches
            .get_mut(&id)
            .ok_or_else(|| PilotError::NotFound(format!("switch {id}")))?;
        if !ss.state.can_resume() {
            return Err(PilotError::BadRequest(format!(
                "switch state {} can not resume",
                ss.state
            )));
        }

        ss.state = CampaignState::Switching;
        info!(switch = %id, "switch resumed");
        self.repo.write_switch_state(&switches).map_err(fatal)
    }

    /// Delete a campaign. Removing an unknown id is a no-op.
    pub async fn remove_switch(&self, id: SwitchId) -> Result<(), PilotError> {
        let mut switches = self.switches.write().await;
        if switches.remove(&id).is_some() {
            info!(switch = %id, "switch removed");
        }
        self.repo.write_switch_state(&switches).map_err(fatal)
    }

    /// Workers claimed by campaigns that are still switching.
    pub async fn switching_workers(&self) -> HashSet<WorkerId> {
        let switches = self.switches.read().await;
        switching_workers_locked(&switches)
    }

    // ========================================================================
    // Reconciler
    // ========================================================================

    /// One reconciliation tick: advance every switching campaign, then
    /// persist if anything moved. Holds the campaign write lock for the
    /// whole tick so API mutators observe consistent state.
    pub async fn process_once(&self) {
        let mut switches = self.switches.write().await;

        let mut mutated = false;
        for ss in switches.values_mut() {
            if !ss.state.is_active() {
                continue;
            }
            self.advance_campaign(ss).await;
            mutated = true;
        }

        if mutated {
            if let Err(err) = self.repo.write_switch_state(&switches) {
                // The in-memory map stays authoritative; the snapshot lags.
                error!(error = %err, "failed to persist campaign state");
            }
        }
    }

    /// Advance every non-terminal worker of one campaign by at most one
    /// state, up to `parallel` workers concurrently, then roll up.
    async fn advance_campaign(&self, ss: &mut SwitchState) {
        let pending: Vec<WorkerState> = ss
            .worker
            .values()
            .filter(|ws| !ws.state.is_terminal())
            .cloned()
            .collect();
        if pending.is_empty() {
            ss.roll_up();
            return;
        }

        let semaphore = Arc::new(Semaphore::new(self.parallel));
        let mut tasks = JoinSet::new();
        for ws in pending {
            let pilot = self.clone();
            let req = ss.req.clone();
            let id = ss.id;
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                pilot.step_worker(id, &req, ws).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(ws) => {
                    ss.worker.insert(ws.worker_id, ws);
                }
                Err(err) => error!(switch = %ss.id, error = %err, "worker update task failed"),
            }
        }

        ss.roll_up();
        match ss.state {
            CampaignState::Complete => info!(switch = %ss.id, "switch complete"),
            CampaignState::Error => info!(switch = %ss.id, "switch errored"),
            _ => {}
        }
    }

    // ========================================================================
    // Per-worker state machine
    // ========================================================================

    /// Drive one worker one transition forward. Every failure (rpc,
    /// remote shell, failed verification) lands in `update_err`; waiting
    /// states simply stay put until telemetry satisfies their predicate.
    async fn step_worker(
        &self,
        id: SwitchId,
        req: &SwitchRequest,
        mut ws: WorkerState,
    ) -> WorkerState {
        let wid = ws.worker_id;
        match ws.state {
            WorkerSwitchState::Picked => {
                if req.disable_ap {
                    match disable_ap_cmd(
                        self.executor.as_ref(),
                        &ws.hostname,
                        &req.from,
                        defaults::CMD_TIMEOUT,
                    )
                    .await
                    {
                        Ok(()) => {
                            debug!(switch = %id, worker = %wid, "disable AP issued");
                            ws.state = WorkerSwitchState::DisableApConfirming;
                        }
                        Err(err) => {
                            error!(switch = %id, worker = %wid, error = %err, "disable AP failed");
                            ws.update_err(err.to_string());
                        }
                    }
                } else {
                    debug!(switch = %id, worker = %wid, "no need to disable AP");
                    ws.state = WorkerSwitchState::SwitchWaiting;
                }
            }

            WorkerSwitchState::DisableApConfirming => {
                match self.cache.get_worker_stats(&req.from).await {
                    Err(err) => ws.update_err(err.to_string()),
                    Ok(stats) => match stats.get(&wid) {
                        None => ws.update_err(format!("worker {wid} not found on {}", req.from)),
                        Some(st) => {
                            if st.tasks.contains(&TaskType::AddPiece) {
                                ws.update_err(format!("worker {wid} still advertises AP"));
                            } else {
                                info!(switch = %id, worker = %wid, hostname = %ws.hostname, "disable AP confirmed");
                                ws.state = WorkerSwitchState::SwitchWaiting;
                            }
                        }
                    },
                }
            }

            WorkerSwitchState::SwitchWaiting => {
                match self.cache.get_worker_info(&req.from).await {
                    Err(err) => ws.update_err(err.to_string()),
                    Ok(info) => match info.get(&wid) {
                        None => ws.update_err(format!("worker {wid} not found on {}", req.from)),
                        Some(w) => {
                            if !w.can_switch() {
                                debug!(switch = %id, worker = %wid, "switch conditions not met");
                                return ws;
                            }
                            match worker_run_cmd(
                                self.executor.as_ref(),
                                &ws.hostname,
                                &req.to,
                                &self.repo.scripts_path(),
                                defaults::CMD_TIMEOUT,
                            )
                            .await
                            {
                                Ok(()) => {
                                    debug!(switch = %id, worker = %wid, to = %req.to, "worker run issued");
                                    ws.state = WorkerSwitchState::SwitchConfirming;
                                }
                                Err(err) => {
                                    error!(switch = %id, worker = %wid, error = %err, "worker run failed");
                                    ws.update_err(err.to_string());
                                }
                            }
                        }
                    },
                }
            }

            WorkerSwitchState::SwitchConfirming => {
                match self.cache.get_worker_stats(&req.to).await {
                    Err(err) => ws.update_err(err.to_string()),
                    Ok(stats) => {
                        let appeared = stats.values().any(|st| st.info.hostname == ws.hostname);
                        if appeared {
                            info!(switch = %id, worker = %wid, hostname = %ws.hostname, to = %req.to, "switch confirmed");
                            ws.state = WorkerSwitchState::StopWaiting;
                        } else {
                            ws.update_err(format!(
                                "worker {} not found on miner {}",
                                ws.hostname, req.to
                            ));
                        }
                    }
                }
            }

            WorkerSwitchState::StopWaiting => {
                match self.cache.get_worker_info(&req.from).await {
                    Err(err) => ws.update_err(err.to_string()),
                    Ok(info) => match info.get(&wid) {
                        None => ws.update_err(format!("worker {wid} not found on {}", req.from)),
                        Some(w) => {
                            if !w.can_stop() {
                                debug!(switch = %id, worker = %wid, "stop conditions not met");
                                return ws;
                            }
                            match worker_stop_cmd(
                                self.executor.as_ref(),
                                &ws.hostname,
                                &req.from,
                                defaults::CMD_TIMEOUT,
                            )
                            .await
                            {
                                Ok(()) => {
                                    debug!(switch = %id, worker = %wid, from = %req.from, "worker stop issued");
                                    ws.state = WorkerSwitchState::StopConfirming;
                                }
                                Err(err) => {
                                    error!(switch = %id, worker = %wid, error = %err, "worker stop failed");
                                    ws.update_err(err.to_string());
                                }
                            }
                        }
                    },
                }
            }

            WorkerSwitchState::StopConfirming => {
                match self.cache.get_worker_stats(&req.from).await {
                    Err(err) => ws.update_err(err.to_string()),
                    Ok(stats) => {
                        if stats.contains_key(&wid) {
                            ws.update_err(format!("worker {wid} still on miner {}", req.from));
                        } else {
                            info!(switch = %id, worker = %wid, hostname = %ws.hostname, "stop confirmed");
                            ws.state = WorkerSwitchState::Complete;
                        }
                    }
                }
            }

            WorkerSwitchState::Complete | WorkerSwitchState::Error => {
                warn!(switch = %id, worker = %wid, state = %ws.state, "terminal worker scheduled");
            }
        }
        ws
    }
}

fn switching_workers_locked(switches: &HashMap<SwitchId, SwitchState>) -> HashSet<WorkerId> {
    let mut out = HashSet::new();
    for ss in switches.values() {
        if !ss.state.is_active() {
            continue;
        }
        out.extend(ss.worker.keys().copied());
    }
    out
}
