//! Candidate selection and ranking for switch campaigns.

use crate::cache::{worker_check, TelemetryCache};
use pilot_protocol::{PilotError, SwitchRequest, TaskType, WorkerId, WorkerInfo, WorkerState};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Pick the workers for a new campaign, all in state `Picked`.
///
/// Precedence: an explicit worker list wins; otherwise `count == 0` takes
/// every eligible worker; otherwise the best `count` by rank. Workers that
/// belong to a campaign still switching are never picked.
pub(crate) async fn pick(
    cache: &TelemetryCache,
    busy: &HashSet<WorkerId>,
    req: &SwitchRequest,
) -> Result<HashMap<WorkerId, WorkerState>, PilotError> {
    let mut out = HashMap::new();

    if !req.worker.is_empty() {
        // Explicit list; duplicates collapse to a set.
        let requested: BTreeSet<WorkerId> = req.worker.iter().copied().collect();
        let stats = cache.get_worker_stats(&req.from).await?;
        for wid in requested {
            let st = stats
                .get(&wid)
                .ok_or_else(|| PilotError::NotFound(format!("worker {wid}")))?;
            if !worker_check(st) {
                return Err(PilotError::Ineligible(wid));
            }
            if busy.contains(&wid) {
                return Err(PilotError::AlreadySwitching(wid));
            }
            out.insert(wid, WorkerState::picked(wid, st.info.hostname.clone()));
        }
        return Ok(out);
    }

    if req.count == 0 {
        // Every eligible worker on the source miner.
        let stats = cache.get_worker_stats(&req.from).await?;
        for (wid, st) in stats.iter() {
            if !worker_check(st) || busy.contains(wid) {
                continue;
            }
            out.insert(*wid, WorkerState::picked(*wid, st.info.hostname.clone()));
        }
        return Ok(out);
    }

    // Ranked top-N. The info map only carries eligible workers.
    let info = cache.get_worker_info(&req.from).await?;
    let mut candidates: Vec<&WorkerInfo> =
        info.values().filter(|w| !busy.contains(&w.worker_id)).collect();

    if candidates.len() < req.count {
        return Err(PilotError::Insufficient {
            miner: req.from.to_string(),
            have: candidates.len(),
            need: req.count,
        });
    }

    candidates.sort_by(|a, b| rank(a, b));
    for w in candidates.into_iter().take(req.count) {
        out.insert(
            w.worker_id,
            WorkerState::picked(w.worker_id, w.hostname.clone()),
        );
    }
    Ok(out)
}

/// Total order on candidates, best first:
/// least pending AP+PC1, then least PC2, then oldest running PC1 (that
/// worker is closest to draining), then hostname as a deterministic
/// tie-break.
pub(crate) fn rank(a: &WorkerInfo, b: &WorkerInfo) -> Ordering {
    let ap = TaskType::AddPiece.short();
    let pc1 = TaskType::PreCommit1.short();
    let pc2 = TaskType::PreCommit2.short();

    let lhs = (
        a.sum(ap) + a.sum(pc1),
        a.sum(pc2),
        a.last_start.get(pc1),
        &a.hostname,
    );
    let rhs = (
        b.sum(ap) + b.sum(pc1),
        b.sum(pc2),
        b.last_start.get(pc1),
        &b.hostname,
    );
    lhs.cmp(&rhs)
}
