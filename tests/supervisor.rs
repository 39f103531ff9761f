// ABOUTME: Integration tests for release serialization and rollback decisions.
// ABOUTME: Covers preemption by newer releases, rollbacks and duplicate release ids.

mod support;

use std::sync::Arc;
use std::time::Duration;

use easydep::pipeline::{ChainError, Stage};
use easydep::stages::{rollback_chain, SymlinkFlip};
use easydep::supervisor::ReleaseSupervisor;
use support::stages::{event_log, Block, Marker, StubFetch};

/// Test: a release with the same id as the last executed one is a no-op.
#[tokio::test]
async fn equal_release_id_is_ignored() {
    let tmp = tempfile::tempdir().unwrap();
    let layout = support::layout(tmp.path());

    // current -> 42 seeds the last executed id
    let dir = layout.release_dir(42);
    std::fs::create_dir_all(&dir).unwrap();
    symlink::symlink_auto(&dir, layout.current_link()).unwrap();

    let marker = tmp.path().join("deployed-marker");
    let deploy: Vec<Arc<dyn Stage>> = vec![Arc::new(Marker {
        name: "Deploy",
        path: marker.clone(),
    })];
    let supervisor = ReleaseSupervisor::new(
        Arc::clone(&layout),
        deploy,
        rollback_chain(Arc::clone(&layout), Vec::new()),
    );

    assert!(supervisor.enqueue(support::release(42, "v42")).is_none());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!marker.exists());
}

/// Test: a newer release cancels the in-flight deployment before its own
/// chain takes over.
#[tokio::test]
async fn newer_release_preempts_the_running_deployment() {
    let tmp = tempfile::tempdir().unwrap();
    let layout = support::layout(tmp.path());

    let log = event_log();
    let deploy: Vec<Arc<dyn Stage>> = vec![
        Arc::new(StubFetch {
            layout: Arc::clone(&layout),
            scripts: Vec::new(),
        }),
        Arc::new(Block {
            name: "Deploy Script",
            log: Arc::clone(&log),
        }),
    ];
    let supervisor = ReleaseSupervisor::new(
        Arc::clone(&layout),
        deploy,
        rollback_chain(Arc::clone(&layout), Vec::new()),
    );

    let first = supervisor
        .enqueue(support::release(100, "v1"))
        .expect("first release should schedule");
    support::wait_until("the first deployment to block", || {
        log.lock().iter().any(|entry| entry == "exec:Deploy Script")
    })
    .await;
    assert!(layout.release_dir(100).is_dir());

    let second = supervisor
        .enqueue(support::release(101, "v2"))
        .expect("newer release should schedule");

    let first_result = tokio::time::timeout(Duration::from_secs(5), first.wait())
        .await
        .expect("preempted deployment should resolve promptly");
    assert_eq!(first_result, Err(ChainError::Cancelled));
    support::wait_until("the first release directory to be removed", || {
        !layout.release_dir(100).exists()
    })
    .await;

    // the second chain blocks as well; it exists and owns the filesystem now
    support::wait_until("the second deployment to start", || {
        layout.release_dir(101).is_dir()
    })
    .await;
    drop(second);
}

/// Test: an older release whose directory is still stored rolls back by
/// flipping the symlink only.
#[tokio::test]
async fn rollback_reuses_the_stored_release_directory() {
    let tmp = tempfile::tempdir().unwrap();
    let layout = support::layout(tmp.path());

    let old_dir = layout.release_dir(99);
    let current_dir = layout.release_dir(100);
    std::fs::create_dir_all(&old_dir).unwrap();
    std::fs::create_dir_all(&current_dir).unwrap();
    symlink::symlink_auto(&current_dir, layout.current_link()).unwrap();

    let marker = tmp.path().join("deployed-marker");
    let deploy: Vec<Arc<dyn Stage>> = vec![Arc::new(Marker {
        name: "Deploy",
        path: marker.clone(),
    })];
    let supervisor = ReleaseSupervisor::new(
        Arc::clone(&layout),
        deploy,
        rollback_chain(Arc::clone(&layout), Vec::new()),
    );

    let handle = supervisor
        .enqueue(support::release(99, "v0"))
        .expect("rollback should schedule");
    handle.wait().await.unwrap();

    assert_eq!(std::fs::read_link(layout.current_link()).unwrap(), old_dir);
    assert!(!marker.exists(), "rollback must not re-deploy");
}

/// Test: rolling back to a discarded release falls through to a fresh
/// forward deployment.
#[tokio::test]
async fn rollback_to_missing_directory_deploys_from_scratch() {
    let tmp = tempfile::tempdir().unwrap();
    let layout = support::layout(tmp.path());

    let current_dir = layout.release_dir(100);
    std::fs::create_dir_all(&current_dir).unwrap();
    symlink::symlink_auto(&current_dir, layout.current_link()).unwrap();

    let deploy: Vec<Arc<dyn Stage>> = vec![
        Arc::new(StubFetch {
            layout: Arc::clone(&layout),
            scripts: Vec::new(),
        }),
        Arc::new(SymlinkFlip::new(Arc::clone(&layout), Vec::new())),
    ];
    let supervisor = ReleaseSupervisor::new(
        Arc::clone(&layout),
        deploy,
        rollback_chain(Arc::clone(&layout), Vec::new()),
    );

    let handle = supervisor
        .enqueue(support::release(99, "v0"))
        .expect("fallback deployment should schedule");
    handle.wait().await.unwrap();

    assert!(layout.release_dir(99).is_dir());
    assert_eq!(
        std::fs::read_link(layout.current_link()).unwrap(),
        layout.release_dir(99)
    );
}

/// Test: after a rollback, re-enqueueing the rolled-back id is a no-op.
#[tokio::test]
async fn rollback_updates_the_last_executed_id() {
    let tmp = tempfile::tempdir().unwrap();
    let layout = support::layout(tmp.path());

    let old_dir = layout.release_dir(99);
    let current_dir = layout.release_dir(100);
    std::fs::create_dir_all(&old_dir).unwrap();
    std::fs::create_dir_all(&current_dir).unwrap();
    symlink::symlink_auto(&current_dir, layout.current_link()).unwrap();

    let supervisor = ReleaseSupervisor::new(
        Arc::clone(&layout),
        Vec::new(),
        rollback_chain(Arc::clone(&layout), Vec::new()),
    );

    supervisor
        .enqueue(support::release(99, "v0"))
        .expect("rollback should schedule")
        .wait()
        .await
        .unwrap();
    assert!(supervisor.enqueue(support::release(99, "v0")).is_none());
}
