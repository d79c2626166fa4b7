//! Selection rules: explicit lists, select-all, ranked top-N, busy workers.

mod harness;

use harness::*;
use pilot::Pilot;
use pilot_protocol::{PilotError, SwitchRequest, TaskType, WorkerId, WorkerSwitchState};
use std::sync::Arc;
use tempfile::TempDir;

const M1: &str = "t01000";
const M2: &str = "t01001";
const M1_API: &str = "10.0.0.1:2345";
const M2_API: &str = "10.0.0.2:2345";

const SEALING: &[TaskType] = &[TaskType::AddPiece, TaskType::PreCommit1, TaskType::PreCommit2];

async fn fixture() -> (TempDir, Pilot, Arc<MockMiner>) {
    let m1 = MockMiner::new(M1);
    let m2 = MockMiner::new(M2);
    let net = MockNet::new();
    net.register(M1_API, m1.clone());
    net.register(M2_API, m2.clone());

    let dir = TempDir::new().unwrap();
    let conf = test_config(&[(M1, M1_API), (M2, M2_API)]);
    let pilot = new_pilot(&dir, &conf, net, ScriptedExecutor::new()).await;
    (dir, pilot, m1)
}

fn request(count: usize, worker: Vec<WorkerId>) -> SwitchRequest {
    SwitchRequest {
        from: M1.parse().unwrap(),
        to: M2.parse().unwrap(),
        count,
        worker,
        disable_ap: false,
    }
}

/// S2: asking for more workers than are eligible creates nothing.
#[tokio::test]
async fn insufficient_workers_rejected() {
    let (dir, pilot, m1) = fixture().await;
    m1.add_worker(wid(1), "h1", SEALING);
    m1.add_worker(wid(2), "h2", SEALING);

    let err = pilot.new_switch(request(3, vec![])).await.unwrap_err();
    match err {
        PilotError::Insufficient { have, need, .. } => {
            assert_eq!(have, 2);
            assert_eq!(need, 3);
        }
        other => panic!("expected Insufficient, got {other}"),
    }

    // no partial campaign was created, in memory or on disk
    assert!(pilot.list_switch().await.is_empty());
    assert_persisted(&pilot, &dir).await;
}

/// S3: a worker already in a switching campaign cannot be named again.
#[tokio::test]
async fn busy_worker_rejected() {
    let (_dir, pilot, m1) = fixture().await;
    let w = wid(1);
    m1.add_worker(w, "h1", SEALING);
    m1.add_worker(wid(2), "h2", SEALING);

    pilot.new_switch(request(0, vec![w])).await.unwrap();

    let err = pilot.new_switch(request(0, vec![w])).await.unwrap_err();
    assert!(matches!(err, PilotError::AlreadySwitching(id) if id == w));
}

/// count = 0 with no explicit list selects every eligible worker.
#[tokio::test]
async fn count_zero_selects_all_eligible() {
    let (_dir, pilot, m1) = fixture().await;
    m1.add_worker(wid(1), "h1", SEALING);
    m1.add_worker(wid(2), "h2", SEALING);
    // window-post worker: not eligible
    m1.add_worker(
        wid(3),
        "h3",
        &[TaskType::GenerateWindowPost, TaskType::PreCommit1],
    );
    // disabled worker: not eligible
    let mut disabled = sealing_stats("h4", SEALING);
    disabled.enabled = false;
    m1.set_stats(wid(4), disabled);
    // miner-local AP/GET worker: not eligible
    m1.add_worker(wid(5), "h5", &[TaskType::AddPiece, TaskType::Fetch]);

    let ss = pilot.new_switch(request(0, vec![])).await.unwrap();
    let mut picked: Vec<WorkerId> = ss.worker.keys().copied().collect();
    picked.sort();
    assert_eq!(picked, vec![wid(1), wid(2)]);
    assert!(ss
        .worker
        .values()
        .all(|w| w.state == WorkerSwitchState::Picked));
}

/// Duplicate ids in an explicit list collapse to one worker.
#[tokio::test]
async fn duplicate_explicit_workers_collapse() {
    let (_dir, pilot, m1) = fixture().await;
    let w = wid(1);
    m1.add_worker(w, "h1", SEALING);

    let ss = pilot.new_switch(request(0, vec![w, w, w])).await.unwrap();
    assert_eq!(ss.worker.len(), 1);
}

/// Explicit list validation: unknown and ineligible workers are rejected.
#[tokio::test]
async fn explicit_worker_validation() {
    let (_dir, pilot, m1) = fixture().await;
    m1.add_worker(wid(1), "h1", SEALING);
    let mut disabled = sealing_stats("h2", SEALING);
    disabled.enabled = false;
    m1.set_stats(wid(2), disabled);

    let err = pilot.new_switch(request(0, vec![wid(9)])).await.unwrap_err();
    assert!(matches!(err, PilotError::NotFound(_)));

    let err = pilot.new_switch(request(0, vec![wid(2)])).await.unwrap_err();
    assert!(matches!(err, PilotError::Ineligible(id) if id == wid(2)));
}

/// Ranked selection: the least-loaded worker goes first, hostname breaks
/// full ties.
#[tokio::test]
async fn ranked_selection_picks_least_loaded() {
    let (_dir, pilot, m1) = fixture().await;
    m1.add_worker(wid(1), "bb", SEALING);
    m1.add_worker(wid(2), "cc", SEALING);
    m1.add_worker(wid(3), "aa", SEALING);
    // wid(2) carries a running PC1: ranked last
    m1.set_jobs(wid(2), vec![running_job(TaskType::PreCommit1, 100)]);

    let ss = pilot.new_switch(request(1, vec![])).await.unwrap();
    assert_eq!(ss.worker.keys().copied().collect::<Vec<_>>(), vec![wid(3)]);

    pilot.remove_switch(ss.id).await.unwrap();

    let ss = pilot.new_switch(request(2, vec![])).await.unwrap();
    let mut picked: Vec<WorkerId> = ss.worker.keys().copied().collect();
    picked.sort();
    assert_eq!(picked, vec![wid(1), wid(3)]);
}

/// Busy workers are excluded before the count check.
#[tokio::test]
async fn busy_workers_reduce_the_eligible_pool() {
    let (_dir, pilot, m1) = fixture().await;
    m1.add_worker(wid(1), "h1", SEALING);
    m1.add_worker(wid(2), "h2", SEALING);

    pilot.new_switch(request(1, vec![])).await.unwrap();

    let err = pilot.new_switch(request(2, vec![])).await.unwrap_err();
    match err {
        PilotError::Insufficient { have, need, .. } => {
            assert_eq!(have, 1);
            assert_eq!(need, 2);
        }
        other => panic!("expected Insufficient, got {other}"),
    }
}

/// Campaigns that stopped switching release their claim on workers.
#[tokio::test]
async fn canceled_campaign_frees_workers() {
    let (_dir, pilot, m1) = fixture().await;
    let w = wid(1);
    m1.add_worker(w, "h1", SEALING);

    let first = pilot.new_switch(request(0, vec![w])).await.unwrap();
    pilot.cancel_switch(first.id).await.unwrap();

    // canceled campaign no longer claims the worker
    let second = pilot.new_switch(request(0, vec![w])).await.unwrap();
    assert_eq!(second.worker.len(), 1);
}

/// Requests naming unknown miners fail before selection.
#[tokio::test]
async fn unknown_miner_rejected() {
    let (_dir, pilot, m1) = fixture().await;
    m1.add_worker(wid(1), "h1", SEALING);

    let req = SwitchRequest {
        from: "t09999".parse().unwrap(),
        to: M2.parse().unwrap(),
        count: 1,
        worker: vec![],
        disable_ap: false,
    };
    assert!(matches!(
        pilot.new_switch(req).await.unwrap_err(),
        PilotError::NotFound(_)
    ));
}
