//! The poll loop orchestrator.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use futures::future::join_all;
use parking_lot::Mutex;
use stream_platforms::{Platform, ProviderRegistry, StreamData, StreamDataKey};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::debounce::Debouncer;
use super::events::{StreamEvent, StreamEventBroadcaster};
use crate::config::CheckerConfig;
use crate::store::{SharedStateStore, StreamStateStore};
use crate::{Error, Result};

/// Counters for one completed cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Tracked keys read from the store.
    pub polled: usize,
    /// Snapshots returned by providers and written back.
    pub fetched: usize,
    pub online: usize,
    pub offline: usize,
    /// Keys waiting for a second offline observation.
    pub pending_offline: usize,
}

/// Clears the single-run flag when `run` returns.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Polls every tracked stream, persists the fresh snapshots and publishes
/// online/offline transitions.
pub struct NotifChecker {
    registry: ProviderRegistry,
    state: StreamStateStore,
    debouncer: Mutex<Debouncer>,
    /// Keys untracked since the current cycle started.
    untracked: Mutex<HashSet<StreamDataKey>>,
    broadcaster: StreamEventBroadcaster,
    poll_interval: Duration,
    running: AtomicBool,
}

impl NotifChecker {
    pub fn new(registry: ProviderRegistry, state: StreamStateStore) -> Self {
        Self {
            registry,
            state,
            debouncer: Mutex::new(Debouncer::new()),
            untracked: Mutex::new(HashSet::new()),
            broadcaster: StreamEventBroadcaster::new(),
            poll_interval: Duration::from_secs(30),
            running: AtomicBool::new(false),
        }
    }

    /// Build a checker from configuration over the given store backend.
    pub fn from_config(
        registry: ProviderRegistry,
        store: Arc<dyn SharedStateStore>,
        config: &CheckerConfig,
    ) -> Self {
        Self::new(registry, StreamStateStore::new(store, config.bucket.clone()))
            .with_poll_interval(config.poll_interval)
            .with_event_capacity(config.event_capacity)
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.broadcaster = StreamEventBroadcaster::with_capacity(capacity);
        self
    }

    /// Subscribe to online/offline events.
    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.broadcaster.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run the poll loop until `cancel` fires.
    ///
    /// A failing cycle is logged and the loop carries on after the usual
    /// delay. Cancellation is honoured between cycles and during the delay;
    /// an in-flight cycle always completes. Returns [`Error::AlreadyRunning`]
    /// if this checker's loop is already running.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::AlreadyRunning);
        }
        let _guard = RunGuard(&self.running);

        info!(
            poll_interval_secs = self.poll_interval.as_secs(),
            platforms = ?self.registry.platforms(),
            bucket = self.state.bucket(),
            "Starting followed-streams poll loop"
        );

        while !cancel.is_cancelled() {
            match self.run_cycle().await {
                Ok(report) => debug!(
                    polled = report.polled,
                    fetched = report.fetched,
                    online = report.online,
                    offline = report.offline,
                    pending_offline = report.pending_offline,
                    "Cycle complete"
                ),
                Err(e) => warn!(error = %e, "Cycle failed"),
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!("Poll loop stopped");
        Ok(())
    }

    /// Run a single poll cycle.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        self.untracked.lock().clear();

        let tracked = self.state.load_tracked().await?;

        let mut by_platform: BTreeMap<Platform, HashSet<String>> = BTreeMap::new();
        for key in tracked.keys() {
            by_platform
                .entry(key.platform())
                .or_default()
                .insert(key.name().to_string());
        }

        let fetches = by_platform
            .into_iter()
            .filter_map(|(platform, names)| match self.registry.get(platform) {
                Some(provider) => Some(async move { provider.fetch_batch(&names).await }),
                None => {
                    warn!(
                        platform = %platform,
                        keys = names.len(),
                        "No provider registered; skipping"
                    );
                    None
                }
            });
        let fetched = join_all(fetches)
            .await
            .into_iter()
            .flatten()
            .collect::<Vec<_>>();

        let polled = tracked.len();
        let written = self.write_back(&tracked, fetched).await?;

        // Keys without a prior snapshot are seeded by the write above.
        let old = tracked
            .into_iter()
            .filter_map(|(key, snapshot)| snapshot.map(|data| (key, data)))
            .collect::<HashMap<_, _>>();

        let fetched = written.len();
        let (transitions, pending_offline) = {
            // Both locks are held so an untrack cannot slip in between the
            // diff and the cleanup below.
            let untracked = self.untracked.lock();
            let mut debouncer = self.debouncer.lock();
            let still_tracked = written
                .into_iter()
                .filter(|data| !untracked.contains(&data.key()))
                .collect::<Vec<_>>();
            let transitions = debouncer.reconcile(&old, &still_tracked);
            // Drop markers for keys that left the store, whoever removed them.
            debouncer.retain(|key| old.contains_key(key) && !untracked.contains(key));
            (transitions, debouncer.pending_count())
        };

        let report = CycleReport {
            polled,
            fetched,
            online: transitions.online.len(),
            offline: transitions.offline.len(),
            pending_offline,
        };

        if !transitions.online.is_empty() {
            self.publish(StreamEvent::Online(transitions.online));
        }
        if !transitions.offline.is_empty() {
            self.publish(StreamEvent::Offline(transitions.offline));
        }

        Ok(report)
    }

    /// Persist fresh snapshots for keys that are still tracked.
    async fn write_back(
        &self,
        tracked: &HashMap<StreamDataKey, Option<StreamData>>,
        fetched: Vec<StreamData>,
    ) -> Result<Vec<StreamData>> {
        let mut written = Vec::with_capacity(fetched.len());
        for data in fetched {
            let key = data.key();
            if !tracked.contains_key(&key) {
                debug!(key = %key, "Ignoring snapshot for a channel that was not requested");
                continue;
            }
            let untracked = self.untracked.lock().contains(&key);
            if untracked {
                debug!(key = %key, "Skipping snapshot for a channel untracked mid-cycle");
                continue;
            }
            self.state.put(&data).await?;
            written.push(data);
        }
        Ok(written)
    }

    fn publish(&self, event: StreamEvent) {
        info!("{}", event.description());
        let receivers = self.broadcaster.publish(event);
        debug!(receivers, "Published stream event");
    }

    /// Keys whose provider has been failing to fetch them for longer than
    /// `min_duration`. With `remove`, their failure records are cleared.
    pub fn failing_streams(&self, min_duration: Duration, remove: bool) -> Vec<StreamDataKey> {
        let now = Utc::now();
        let min_age = TimeDelta::from_std(min_duration).unwrap_or(TimeDelta::MAX);

        let mut keys = Vec::new();
        for provider in self.registry.iter() {
            for channel in provider.failing_channels() {
                if now - channel.erroring_since <= min_age {
                    continue;
                }
                keys.push(StreamDataKey::new(provider.platform(), &channel.name));
                if remove {
                    provider.clear_failure(&channel.name);
                }
            }
        }
        keys.sort();
        keys
    }

    /// Resolve `url` and start tracking it. Returns `None` when no provider
    /// recognises the URL or the channel cannot be resolved.
    pub async fn track_by_url(&self, url: &str) -> Result<Option<StreamData>> {
        let Some(data) = self.resolve_by_url(url).await else {
            return Ok(None);
        };
        if self.track(&data).await? {
            info!(key = %data.key(), "Now tracking stream");
        } else {
            debug!(key = %data.key(), "Stream already tracked");
        }
        Ok(Some(data))
    }

    /// Track a stream from a snapshot the caller already holds. An existing
    /// entry is never replaced. Returns whether the entry was written.
    pub async fn track(&self, data: &StreamData) -> Result<bool> {
        self.untracked.lock().remove(&data.key());
        self.state.seed(data).await
    }

    /// Stop tracking `key`. Returns whether it was tracked.
    pub async fn untrack(&self, key: &StreamDataKey) -> Result<bool> {
        self.untracked.lock().insert(key.clone());
        let removed = self.state.remove(key).await?;
        self.debouncer.lock().clear(key);
        if removed {
            info!(key = %key, "Stopped tracking stream");
        }
        Ok(removed)
    }

    /// Stop tracking every stream.
    pub async fn untrack_all(&self) -> Result<()> {
        let keys = self.tracked().await?;
        self.untracked.lock().extend(keys);
        self.state.clear().await?;
        self.debouncer.lock().clear_all();
        info!(bucket = self.state.bucket(), "Stopped tracking all streams");
        Ok(())
    }

    /// Resolve `url` without tracking it.
    pub async fn resolve_by_url(&self, url: &str) -> Option<StreamData> {
        let Some(provider) = self.registry.get_by_url(url) else {
            debug!(url, "No provider recognises URL");
            return None;
        };
        provider.resolve_by_url(url).await
    }

    /// Every tracked key, sorted.
    pub async fn tracked(&self) -> Result<Vec<StreamDataKey>> {
        let mut keys = self.state.load_tracked().await?.into_keys().collect::<Vec<_>>();
        keys.sort();
        Ok(keys)
    }

    pub fn is_pending_offline(&self, key: &StreamDataKey) -> bool {
        self.debouncer.lock().is_pending_offline(key)
    }
}
