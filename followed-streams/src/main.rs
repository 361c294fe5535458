use std::sync::Arc;
use std::time::Duration;

use followed_streams::config::CheckerConfig;
use followed_streams::logging::init_logging;
use followed_streams::store::{MemoryStore, SharedStateStore, SqliteStore};
use followed_streams::{NotifChecker, StreamEvent};
use stream_platforms::{ProviderRegistry, create_client_builder};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = CheckerConfig::from_env_or_default();
    let _log_guard = init_logging(config.log_dir.as_deref())?;
    config.validate()?;

    let client = create_client_builder(Some(config.request_timeout)).build()?;
    let registry = ProviderRegistry::with_defaults(client, config.twitch_credentials());

    let store: Arc<dyn SharedStateStore> = match &config.database_url {
        Some(url) => Arc::new(SqliteStore::connect(url).await?),
        None => {
            warn!("FOLLOWED_STREAMS_DATABASE_URL not set; tracked streams live in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    let checker = Arc::new(NotifChecker::from_config(registry, store, &config));

    for url in &config.track_urls {
        match checker.track_by_url(url).await {
            Ok(Some(data)) => info!(key = %data.key(), "Tracking {}", url),
            Ok(None) => warn!("Could not resolve {}", url),
            Err(e) => error!("Failed to track {}: {}", url, e),
        }
    }

    let cancel = CancellationToken::new();

    let events_task = tokio::spawn(log_events(checker.clone(), cancel.clone()));
    let eviction_task = tokio::spawn(evict_failing(
        checker.clone(),
        config.eviction_after,
        config.eviction_sweep_interval,
        cancel.clone(),
    ));

    let loop_task = {
        let checker = checker.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { checker.run(cancel).await })
    };

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    cancel.cancel();

    loop_task.await??;
    let (events, eviction) = tokio::join!(events_task, eviction_task);
    for (task, result) in [("event listener", events), ("eviction sweep", eviction)] {
        if let Err(e) = result {
            error!("{} task failed: {}", task, e);
        }
    }

    info!("followed-streams stopped");
    Ok(())
}

async fn log_events(checker: Arc<NotifChecker>, cancel: CancellationToken) {
    let mut receiver = checker.subscribe();
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = receiver.recv() => event,
        };
        match event {
            Ok(StreamEvent::Online(streams)) => {
                for stream in streams {
                    info!(
                        key = %stream.key(),
                        title = %stream.title,
                        game = %stream.game,
                        viewers = stream.viewers,
                        "{} is live at {}",
                        stream.unique_name,
                        stream.stream_url
                    );
                }
            }
            Ok(StreamEvent::Offline(streams)) => {
                for stream in streams {
                    info!(key = %stream.key(), "{} went offline", stream.unique_name);
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("Event listener lagged, skipped {} events", skipped)
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Untrack streams whose provider has kept failing for `evict_after`.
async fn evict_failing(
    checker: Arc<NotifChecker>,
    evict_after: Duration,
    sweep_interval: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(sweep_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        for key in checker.failing_streams(evict_after, true) {
            match checker.untrack(&key).await {
                Ok(true) => info!(key = %key, "Evicted stream after persistent fetch failures"),
                Ok(false) => {}
                Err(e) => error!(key = %key, "Failed to evict stream: {}", e),
            }
        }
    }
}
