use std::sync::Arc;

use color_eyre::Result;
use nutrilink::adapters::{FileStore, RestActionSubmitter, TokenSession, TungsteniteTransport};
use nutrilink::config::ResilienceConfig;
use nutrilink::connection::{ConnectionEvent, ConnectionManager};
use nutrilink::error::{ErrorClassifier, RecoveryEngine};
use nutrilink::logging::init_tracing;
use nutrilink::offline::{spawn_replay_on_reconnect, OfflineActionQueue};
use nutrilink::traits::KeyValueStore;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Runs the resilience core against the configured backend: keeps the
/// real-time channel open, subscribes to the topics given as arguments and
/// replays the offline queue whenever the connection returns.
#[tokio::main]
async fn main() -> Result<()> {
    if std::env::args().any(|arg| arg == "--version" || arg == "-V") {
        println!("nutrilink {}", VERSION);
        return Ok(());
    }

    color_eyre::install()?;
    init_tracing("info")?;

    let config = ResilienceConfig::from_env()?;
    config.validate()?;
    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(config.resolved_storage_dir()?));

    let session = Arc::new(TokenSession::new(
        &config.api_base_url,
        store.clone(),
        &config.queue.namespace,
    ));
    let submitter =
        Arc::new(RestActionSubmitter::new(&config.api_base_url).with_session(session.clone()));

    let classifier = Arc::new(ErrorClassifier::new());
    let engine = Arc::new(RecoveryEngine::new(
        config.recovery.clone(),
        classifier.clone(),
        session,
    ));
    let queue = Arc::new(OfflineActionQueue::load(store, config.queue.clone()).await?);
    info!("nutrilink {} started, {} actions pending", VERSION, queue.size().await);

    let manager = ConnectionManager::create_with_classifier(
        config.connection.clone(),
        Arc::new(TungsteniteTransport::new()),
        classifier,
    );
    let cancel = CancellationToken::new();
    let replay = spawn_replay_on_reconnect(
        manager.events(),
        queue.clone(),
        submitter,
        engine,
        cancel.clone(),
    );

    for topic in std::env::args().skip(1).filter(|arg| !arg.starts_with('-')) {
        manager.subscribe(topic)?;
    }
    manager.connect()?;

    let mut events = manager.events();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(ConnectionEvent::StateChanged(state)) => info!("Connection state: {}", state),
                Ok(ConnectionEvent::MaxReconnectAttemptsReached { attempts }) => {
                    warn!("Working offline after {} reconnect attempts", attempts);
                }
                Ok(ConnectionEvent::RealTimeAlert(alert)) => {
                    info!("Alert [{:?}]: {}", alert.level, alert.message);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!("Event log skipped {} events", skipped),
                Err(RecvError::Closed) => break,
            },
        }
    }

    info!("Shutting down");
    cancel.cancel();
    manager.disconnect().await?;
    let _ = replay.await;
    manager.dispose().await;
    Ok(())
}
