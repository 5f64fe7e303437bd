//! Offline queue scenarios across restarts and partial replay failures.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{fast_recovery, meal, test_engine};
use nutrilink::adapters::mock::{InMemoryStore, MockActionSubmitter, MockSession, MockTransport};
use nutrilink::adapters::FileStore;
use nutrilink::config::{ConnectionConfig, QueueConfig};
use nutrilink::connection::{ConnectionManager, ConnectionState};
use nutrilink::error::{ErrorKind, RawError};
use nutrilink::offline::{spawn_replay_on_reconnect, ActionIntent, OfflineActionQueue, QueueEvent};
use nutrilink::traits::KeyValueStore;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_queue_survives_restart_on_disk() {
    let temp_dir = TempDir::new().unwrap();
    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(temp_dir.path()));

    let (a, b) = {
        let queue = OfflineActionQueue::load(store.clone(), QueueConfig::default())
            .await
            .unwrap();
        let a = queue.enqueue(meal("oatmeal", 320)).await.unwrap();
        let b = queue
            .enqueue(ActionIntent::LogWater { milliliters: 500 })
            .await
            .unwrap();
        (a, b)
    };

    let reloaded = OfflineActionQueue::load(store, QueueConfig::default())
        .await
        .unwrap();
    let pending = reloaded.pending().await;
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0], a);
    assert_eq!(pending[1], b);
}

#[tokio::test(start_paused = true)]
async fn test_retryable_failure_is_retried_before_next_action() {
    let store = InMemoryStore::new();
    let queue = OfflineActionQueue::load(Arc::new(store.clone()), QueueConfig::default())
        .await
        .unwrap();
    let a = queue.enqueue(meal("a", 100)).await.unwrap();
    let b = queue.enqueue(meal("b", 200)).await.unwrap();

    let submitter = MockActionSubmitter::new();
    submitter.fail_next(&a.id, RawError::status(503));
    let t = test_engine(fast_recovery(3), MockSession::new());

    let report = queue
        .flush(&submitter, &t.engine, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(submitter.submitted_ids(), vec![a.id.clone(), a.id.clone(), b.id.clone()]);
    assert_eq!(report.replayed, vec![a.id, b.id]);
    assert!(report.dead_lettered.is_empty());
    assert!(report.halted.is_none());
    assert!(queue.is_empty().await);
    assert_eq!(store.get(&QueueConfig::default().pending_key()).as_deref(), Some("[]"));
}

#[tokio::test(start_paused = true)]
async fn test_outage_halts_replay_and_keeps_order() {
    let queue = OfflineActionQueue::load(Arc::new(InMemoryStore::new()), QueueConfig::default())
        .await
        .unwrap();
    let a = queue.enqueue(meal("a", 100)).await.unwrap();
    let b = queue.enqueue(meal("b", 200)).await.unwrap();

    let submitter = MockActionSubmitter::new();
    submitter.fail_always(&a.id, RawError::status(502));
    let t = test_engine(fast_recovery(2), MockSession::new());

    let report = queue
        .flush(&submitter, &t.engine, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.halted.map(|e| e.kind()), Some(ErrorKind::ServerError));
    assert!(!submitter.submitted_ids().contains(&b.id));

    let pending = queue.pending().await;
    assert_eq!(pending.iter().map(|p| p.id.clone()).collect::<Vec<_>>(), vec![a.id, b.id]);
    assert_eq!(pending[0].attempts, 3);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_action_is_dead_lettered_and_replay_continues() {
    let store = InMemoryStore::new();
    let queue = OfflineActionQueue::load(Arc::new(store.clone()), QueueConfig::default())
        .await
        .unwrap();
    let mut events = queue.events();
    let a = queue.enqueue(meal("a", 100)).await.unwrap();
    let b = queue.enqueue(meal("b", 200)).await.unwrap();

    let submitter = MockActionSubmitter::new();
    submitter.fail_always(
        &a.id,
        RawError::Http {
            status: 409,
            message: Some("meal already deleted".to_string()),
            code: Some("CONFLICT".to_string()),
        },
    );
    let t = test_engine(fast_recovery(3), MockSession::new());

    let report = queue
        .flush(&submitter, &t.engine, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.dead_lettered, vec![a.id.clone()]);
    assert_eq!(report.replayed, vec![b.id.clone()]);

    let dead = queue.dead_letters().await;
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].error_kind, ErrorKind::Validation);
    assert_eq!(dead[0].error_code.as_deref(), Some("CONFLICT"));

    let mut saw_recovery_needed = false;
    while let Ok(event) = events.try_recv() {
        if let QueueEvent::RecoveryNeeded { action, .. } = event {
            assert_eq!(action.id, a.id);
            saw_recovery_needed = true;
        }
    }
    assert!(saw_recovery_needed);

    // Dead letters survive a restart and can be requeued.
    let reloaded = OfflineActionQueue::load(Arc::new(store), QueueConfig::default())
        .await
        .unwrap();
    assert_eq!(reloaded.dead_letters().await.len(), 1);
    assert!(reloaded.requeue_dead_letter(&a.id).await.unwrap());
    assert_eq!(reloaded.size().await, 1);
    assert!(reloaded.dead_letters().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_triggers_replay() {
    let transport = Arc::new(MockTransport::unreachable());
    let manager = ConnectionManager::create(
        ConnectionConfig::new("ws://nutrilink.test/realtime")
            .with_reconnect_interval(Duration::from_secs(5)),
        transport.clone(),
    );
    let queue = Arc::new(
        OfflineActionQueue::load(Arc::new(InMemoryStore::new()), QueueConfig::default())
            .await
            .unwrap(),
    );
    let submitter = Arc::new(MockActionSubmitter::new());
    let t = test_engine(fast_recovery(2), MockSession::new());
    let cancel = CancellationToken::new();
    let mut queue_events = queue.events();

    let replay = spawn_replay_on_reconnect(
        manager.events(),
        queue.clone(),
        submitter.clone(),
        t.engine.clone(),
        cancel.clone(),
    );

    manager.connect().unwrap();
    let action = queue.enqueue(meal("lunch", 640)).await.unwrap();
    let mut state = manager.state_receiver();
    state
        .wait_for(|s| matches!(s, ConnectionState::Reconnecting { .. }))
        .await
        .unwrap();
    assert!(submitter.submitted_ids().is_empty());

    transport.set_reachable(true);
    loop {
        if let QueueEvent::Replayed { id } = queue_events.recv().await.unwrap() {
            assert_eq!(id, action.id);
            break;
        }
    }
    assert!(queue.is_empty().await);

    cancel.cancel();
    replay.await.unwrap();
    manager.dispose().await;
}

#[tokio::test]
async fn test_concurrent_flush_is_skipped() {
    let queue = Arc::new(
        OfflineActionQueue::load(Arc::new(InMemoryStore::new()), QueueConfig::default())
            .await
            .unwrap(),
    );
    queue.enqueue(meal("a", 100)).await.unwrap();
    let submitter = MockActionSubmitter::new().with_delay(Duration::from_millis(50));
    let t = test_engine(fast_recovery(1), MockSession::new());
    let cancel = CancellationToken::new();

    let (first, second) = tokio::join!(
        queue.flush(&submitter, &t.engine, &cancel),
        async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            queue.flush(&submitter, &t.engine, &cancel).await
        }
    );

    assert_eq!(first.unwrap().replayed.len(), 1);
    assert!(second.unwrap().skipped);
    assert_eq!(submitter.submitted_ids().len(), 1);
}
