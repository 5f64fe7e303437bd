//! Wiring between the connection manager and the offline queue.

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::queue::OfflineActionQueue;
use crate::connection::ConnectionEvent;
use crate::error::RecoveryEngine;
use crate::traits::ActionSubmitter;

/// Flush `queue` every time the connection manager reports `Connected`.
///
/// The task ends when `cancel` fires or the event channel closes.
pub fn spawn_replay_on_reconnect(
    mut events: broadcast::Receiver<ConnectionEvent>,
    queue: Arc<OfflineActionQueue>,
    submitter: Arc<dyn ActionSubmitter>,
    engine: Arc<RecoveryEngine>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => event,
            };

            match event {
                Ok(ConnectionEvent::Connected) => {}
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    // A Connected event may be among the skipped ones.
                    warn!("Replay listener lagged by {} events, flushing anyway", skipped);
                }
                Err(RecvError::Closed) => break,
            }

            if queue.is_empty().await {
                continue;
            }

            debug!("Connectivity restored, replaying offline queue");
            match queue.flush(&*submitter, &engine, &cancel).await {
                Ok(report) if report.skipped => {}
                Ok(report) => info!(
                    "Offline replay finished: {} replayed, {} dead-lettered{}",
                    report.replayed.len(),
                    report.dead_lettered.len(),
                    if report.halted.is_some() { ", halted" } else { "" }
                ),
                Err(e) => error!("Offline replay failed: {}", e),
            }
        }
        debug!("Replay listener stopped");
    })
}
