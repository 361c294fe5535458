//! Integration tests for the poll loop.
//!
//! Providers are scripted fakes; stores are the in-memory and
//! `sqlite::memory:` backends.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use followed_streams::store::{
    MemoryStore, SetMode, SharedStateStore, SqliteStore, StreamStateStore,
};
use followed_streams::{Error, NotifChecker, StreamEvent};
use parking_lot::Mutex;
use stream_platforms::{
    FailureTracker, Platform, Provider, ProviderRegistry, StreamData, StreamDataKey,
};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

const BUCKET: &str = "followed_streams";

/// A provider whose channels are scripted by the test. A channel with no
/// scripted status fails to fetch.
struct FakeProvider {
    platform: Platform,
    statuses: Mutex<HashMap<String, bool>>,
    failures: FailureTracker,
    fetches: AtomicUsize,
    hold: tokio::sync::Mutex<()>,
}

impl FakeProvider {
    fn new(platform: Platform) -> Arc<Self> {
        Arc::new(Self {
            platform,
            statuses: Mutex::new(HashMap::new()),
            failures: FailureTracker::new(),
            fetches: AtomicUsize::new(0),
            hold: tokio::sync::Mutex::new(()),
        })
    }

    fn set_live(&self, name: &str, is_live: bool) {
        self.statuses.lock().insert(name.to_string(), is_live);
    }

    fn set_failing(&self, name: &str) {
        self.statuses.lock().remove(name);
    }

    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn url_prefix(&self) -> &'static str {
        match self.platform {
            Platform::Twitch => "https://www.twitch.tv/",
            Platform::Picarto => "https://picarto.tv/",
        }
    }
}

fn snapshot(platform: Platform, name: &str, is_live: bool) -> StreamData {
    let url = match platform {
        Platform::Twitch => format!("https://www.twitch.tv/{name}"),
        Platform::Picarto => format!("https://picarto.tv/{name}"),
    };
    StreamData {
        is_live,
        viewers: if is_live { 42 } else { 0 },
        title: "Fake stream".to_string(),
        ..StreamData::offline(platform, name, url)
    }
}

#[async_trait]
impl Provider for FakeProvider {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn failures(&self) -> &FailureTracker {
        &self.failures
    }

    async fn fetch_batch(&self, names: &HashSet<String>) -> Vec<StreamData> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let _hold = self.hold.lock().await;

        let statuses = self.statuses.lock().clone();
        let mut out = Vec::new();
        for name in names {
            match statuses.get(name) {
                Some(&is_live) => {
                    self.failures.record_success(name);
                    out.push(snapshot(self.platform, name, is_live));
                }
                None => self.failures.record_failure(name),
            }
        }
        out
    }

    fn is_valid_url(&self, url: &str) -> bool {
        url.starts_with(self.url_prefix())
    }

    async fn resolve_by_url(&self, url: &str) -> Option<StreamData> {
        let name = url
            .strip_prefix(self.url_prefix())?
            .trim_end_matches('/')
            .to_lowercase();
        let is_live = *self.statuses.lock().get(&name)?;
        Some(snapshot(self.platform, &name, is_live))
    }
}

/// A store that can be switched into a failing state.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    failing: AtomicBool,
    reads: AtomicUsize,
}

impl FlakyStore {
    fn check(&self) -> followed_streams::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::store("connection refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl SharedStateStore for FlakyStore {
    async fn hash_set(
        &self,
        bucket: &str,
        field: &str,
        value: &str,
        mode: SetMode,
    ) -> followed_streams::Result<bool> {
        self.check()?;
        self.inner.hash_set(bucket, field, value, mode).await
    }

    async fn hash_delete(&self, bucket: &str, field: &str) -> followed_streams::Result<bool> {
        self.check()?;
        self.inner.hash_delete(bucket, field).await
    }

    async fn hash_get_all(
        &self,
        bucket: &str,
    ) -> followed_streams::Result<HashMap<String, String>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.hash_get_all(bucket).await
    }

    async fn key_delete(&self, bucket: &str) -> followed_streams::Result<bool> {
        self.check()?;
        self.inner.key_delete(bucket).await
    }
}

fn registry(providers: &[Arc<FakeProvider>]) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    for provider in providers {
        registry.register(provider.clone());
    }
    registry
}

fn setup(providers: &[Arc<FakeProvider>]) -> (NotifChecker, Arc<MemoryStore>) {
    let backend = Arc::new(MemoryStore::new());
    let checker = NotifChecker::new(
        registry(providers),
        StreamStateStore::new(backend.clone(), BUCKET),
    );
    (checker, backend)
}

fn key(platform: Platform, name: &str) -> StreamDataKey {
    StreamDataKey::new(platform, name)
}

fn drain(receiver: &mut broadcast::Receiver<StreamEvent>) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}

fn names(event: &StreamEvent) -> Vec<String> {
    let mut names = event
        .streams()
        .iter()
        .map(|s| s.name.clone())
        .collect::<Vec<_>>();
    names.sort();
    names
}

mod transition_tests {
    use super::*;

    #[tokio::test]
    async fn test_unseen_key_is_seeded_without_event() {
        let picarto = FakeProvider::new(Platform::Picarto);
        picarto.set_live("k", true);
        let (checker, backend) = setup(&[picarto.clone()]);
        let mut events = checker.subscribe();

        // Tracked, but no snapshot recorded yet.
        backend
            .hash_set(BUCKET, "picarto:k", "", SetMode::AlwaysReplace)
            .await
            .unwrap();

        let report = checker.run_cycle().await.unwrap();
        assert_eq!(report.polled, 1);
        assert_eq!(report.fetched, 1);
        assert!(drain(&mut events).is_empty());

        let state = StreamStateStore::new(backend, BUCKET);
        let stored = state.load_tracked().await.unwrap();
        assert!(stored[&key(Platform::Picarto, "k")].as_ref().unwrap().is_live);

        checker.run_cycle().await.unwrap();
        assert!(drain(&mut events).is_empty());
    }

    #[tokio::test]
    async fn test_offline_needs_two_cycles() {
        let picarto = FakeProvider::new(Platform::Picarto);
        let (checker, _) = setup(&[picarto.clone()]);
        let mut events = checker.subscribe();
        let k = key(Platform::Picarto, "k");

        checker
            .track(&snapshot(Platform::Picarto, "k", true))
            .await
            .unwrap();

        picarto.set_live("k", false);
        let report = checker.run_cycle().await.unwrap();
        assert_eq!(report.offline, 0);
        assert_eq!(report.pending_offline, 1);
        assert!(drain(&mut events).is_empty());
        assert!(checker.is_pending_offline(&k));

        let report = checker.run_cycle().await.unwrap();
        assert_eq!(report.offline, 1);
        let got = drain(&mut events);
        assert_eq!(got.len(), 1);
        assert!(matches!(got[0], StreamEvent::Offline(_)));
        assert_eq!(names(&got[0]), vec!["k"]);
        assert!(!got[0].streams()[0].is_live);
        assert!(!checker.is_pending_offline(&k));
    }

    #[tokio::test]
    async fn test_dip_resolves_to_online() {
        let picarto = FakeProvider::new(Platform::Picarto);
        let (checker, _) = setup(&[picarto.clone()]);
        let mut events = checker.subscribe();
        let k = key(Platform::Picarto, "k");

        checker
            .track(&snapshot(Platform::Picarto, "k", true))
            .await
            .unwrap();

        picarto.set_live("k", false);
        checker.run_cycle().await.unwrap();
        assert!(checker.is_pending_offline(&k));

        picarto.set_live("k", true);
        let report = checker.run_cycle().await.unwrap();
        assert_eq!(report.online, 1);
        assert_eq!(report.offline, 0);
        assert!(!checker.is_pending_offline(&k));

        let got = drain(&mut events);
        assert_eq!(got.len(), 1);
        assert!(got[0].is_online());

        // The dip never turns into an offline event.
        checker.run_cycle().await.unwrap();
        assert!(drain(&mut events).is_empty());
    }

    #[tokio::test]
    async fn test_externally_removed_key_drops_pending_offline() {
        let picarto = FakeProvider::new(Platform::Picarto);
        let (checker, backend) = setup(&[picarto.clone()]);
        let mut events = checker.subscribe();
        let k = key(Platform::Picarto, "k");

        checker
            .track(&snapshot(Platform::Picarto, "k", true))
            .await
            .unwrap();
        picarto.set_live("k", false);
        checker.run_cycle().await.unwrap();
        assert!(checker.is_pending_offline(&k));

        // Another process drops the entry behind the checker's back.
        assert!(backend.hash_delete(BUCKET, "picarto:k").await.unwrap());
        let report = checker.run_cycle().await.unwrap();
        assert_eq!(report.polled, 0);
        assert_eq!(report.pending_offline, 0);
        assert!(!checker.is_pending_offline(&k));

        // Tracked again while live: one offline reading is only a dip.
        checker
            .track(&snapshot(Platform::Picarto, "k", true))
            .await
            .unwrap();
        let report = checker.run_cycle().await.unwrap();
        assert_eq!(report.offline, 0);
        assert_eq!(report.pending_offline, 1);
        assert!(drain(&mut events).is_empty());

        let report = checker.run_cycle().await.unwrap();
        assert_eq!(report.offline, 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_pending_offline() {
        let picarto = FakeProvider::new(Platform::Picarto);
        let (checker, _) = setup(&[picarto.clone()]);
        let k = key(Platform::Picarto, "k");

        checker
            .track(&snapshot(Platform::Picarto, "k", true))
            .await
            .unwrap();
        picarto.set_live("k", false);
        checker.run_cycle().await.unwrap();

        // Still tracked, just not fetched this cycle.
        picarto.set_failing("k");
        let report = checker.run_cycle().await.unwrap();
        assert_eq!(report.fetched, 0);
        assert!(checker.is_pending_offline(&k));
    }

    #[tokio::test]
    async fn test_online_fires_immediately() {
        let picarto = FakeProvider::new(Platform::Picarto);
        let (checker, _) = setup(&[picarto.clone()]);
        let mut events = checker.subscribe();

        checker
            .track(&snapshot(Platform::Picarto, "k", false))
            .await
            .unwrap();

        picarto.set_live("k", true);
        checker.run_cycle().await.unwrap();

        let got = drain(&mut events);
        assert_eq!(got.len(), 1);
        assert!(got[0].is_online());
        assert_eq!(got[0].streams()[0].viewers, 42);
    }

    #[tokio::test]
    async fn test_unchanged_results_are_quiet() {
        let picarto = FakeProvider::new(Platform::Picarto);
        picarto.set_live("up", true);
        picarto.set_live("down", false);
        let (checker, _) = setup(&[picarto.clone()]);
        let mut events = checker.subscribe();

        checker
            .track(&snapshot(Platform::Picarto, "up", true))
            .await
            .unwrap();
        checker
            .track(&snapshot(Platform::Picarto, "down", false))
            .await
            .unwrap();

        for _ in 0..3 {
            let report = checker.run_cycle().await.unwrap();
            assert_eq!(report.fetched, 2);
            assert_eq!(report.pending_offline, 0);
        }
        assert!(drain(&mut events).is_empty());
    }

    #[tokio::test]
    async fn test_one_event_per_kind_across_platforms() {
        let picarto = FakeProvider::new(Platform::Picarto);
        let twitch = FakeProvider::new(Platform::Twitch);
        let (checker, _) = setup(&[picarto.clone(), twitch.clone()]);
        let mut events = checker.subscribe();

        checker
            .track(&snapshot(Platform::Picarto, "a", false))
            .await
            .unwrap();
        checker
            .track(&snapshot(Platform::Twitch, "b", false))
            .await
            .unwrap();

        picarto.set_live("a", true);
        twitch.set_live("b", true);
        checker.run_cycle().await.unwrap();

        assert_eq!(picarto.fetches(), 1);
        assert_eq!(twitch.fetches(), 1);
        let got = drain(&mut events);
        assert_eq!(got.len(), 1);
        assert_eq!(names(&got[0]), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_not_offline() {
        let picarto = FakeProvider::new(Platform::Picarto);
        let (checker, _) = setup(&[picarto.clone()]);
        let mut events = checker.subscribe();
        let k = key(Platform::Picarto, "k");

        checker
            .track(&snapshot(Platform::Picarto, "k", true))
            .await
            .unwrap();

        for _ in 0..3 {
            let report = checker.run_cycle().await.unwrap();
            assert_eq!(report.fetched, 0);
        }
        assert!(!checker.is_pending_offline(&k));

        picarto.set_live("k", true);
        checker.run_cycle().await.unwrap();
        assert!(drain(&mut events).is_empty());
    }

    #[tokio::test]
    async fn test_platform_without_provider_is_skipped() {
        let picarto = FakeProvider::new(Platform::Picarto);
        picarto.set_live("a", true);
        let (checker, _) = setup(&[picarto.clone()]);

        checker
            .track(&snapshot(Platform::Picarto, "a", true))
            .await
            .unwrap();
        checker
            .track(&snapshot(Platform::Twitch, "b", true))
            .await
            .unwrap();

        let report = checker.run_cycle().await.unwrap();
        assert_eq!(report.polled, 2);
        assert_eq!(report.fetched, 1);
        assert!(
            checker
                .tracked()
                .await
                .unwrap()
                .contains(&key(Platform::Twitch, "b"))
        );
    }

    #[tokio::test]
    async fn test_sqlite_backed_cycle() {
        let picarto = FakeProvider::new(Platform::Picarto);
        let backend = Arc::new(SqliteStore::connect("sqlite::memory:").await.unwrap());
        let checker = NotifChecker::new(
            registry(&[picarto.clone()]),
            StreamStateStore::new(backend, BUCKET),
        );
        let mut events = checker.subscribe();

        checker
            .track(&snapshot(Platform::Picarto, "k", true))
            .await
            .unwrap();

        picarto.set_live("k", false);
        checker.run_cycle().await.unwrap();
        assert!(drain(&mut events).is_empty());

        checker.run_cycle().await.unwrap();
        let got = drain(&mut events);
        assert_eq!(got.len(), 1);
        assert!(!got[0].is_online());
    }
}

mod tracking_tests {
    use super::*;

    #[tokio::test]
    async fn test_track_by_url_round_trip() {
        let picarto = FakeProvider::new(Platform::Picarto);
        picarto.set_live("foo", true);
        let (checker, _) = setup(&[picarto.clone()]);
        let mut events = checker.subscribe();

        let data = checker
            .track_by_url("https://picarto.tv/Foo")
            .await
            .unwrap()
            .unwrap();
        assert!(data.is_live);
        assert_eq!(
            checker.tracked().await.unwrap(),
            vec![key(Platform::Picarto, "foo")]
        );

        checker.run_cycle().await.unwrap();
        assert!(drain(&mut events).is_empty());
    }

    #[tokio::test]
    async fn test_track_never_clobbers() {
        let picarto = FakeProvider::new(Platform::Picarto);
        let (checker, backend) = setup(&[picarto.clone()]);

        assert!(
            checker
                .track(&snapshot(Platform::Picarto, "foo", true))
                .await
                .unwrap()
        );

        picarto.set_live("foo", false);
        let again = checker
            .track_by_url("https://picarto.tv/foo")
            .await
            .unwrap()
            .unwrap();
        assert!(!again.is_live);

        let stored = StreamStateStore::new(backend, BUCKET)
            .load_tracked()
            .await
            .unwrap();
        assert!(stored[&key(Platform::Picarto, "foo")].as_ref().unwrap().is_live);
    }

    #[tokio::test]
    async fn test_unknown_url_is_not_tracked() {
        let picarto = FakeProvider::new(Platform::Picarto);
        let (checker, _) = setup(&[picarto]);

        assert!(
            checker
                .track_by_url("https://example.com/foo")
                .await
                .unwrap()
                .is_none()
        );
        // Recognised, but the channel does not resolve.
        assert!(
            checker
                .track_by_url("https://picarto.tv/missing")
                .await
                .unwrap()
                .is_none()
        );
        assert!(checker.tracked().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_by_url_does_not_track() {
        let picarto = FakeProvider::new(Platform::Picarto);
        picarto.set_live("foo", true);
        let (checker, _) = setup(&[picarto]);

        let data = checker.resolve_by_url("https://picarto.tv/foo").await.unwrap();
        assert_eq!(data.key(), key(Platform::Picarto, "foo"));
        assert!(checker.tracked().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_untrack_clears_pending_offline() {
        let picarto = FakeProvider::new(Platform::Picarto);
        let (checker, backend) = setup(&[picarto.clone()]);
        let mut events = checker.subscribe();
        let k = key(Platform::Picarto, "k");

        checker
            .track(&snapshot(Platform::Picarto, "k", true))
            .await
            .unwrap();
        picarto.set_live("k", false);
        checker.run_cycle().await.unwrap();
        assert!(checker.is_pending_offline(&k));

        assert!(checker.untrack(&k).await.unwrap());
        assert!(!checker.is_pending_offline(&k));
        assert!(!checker.untrack(&k).await.unwrap());

        let report = checker.run_cycle().await.unwrap();
        assert_eq!(report.polled, 0);
        assert!(drain(&mut events).is_empty());
        assert!(backend.hash_get_all(BUCKET).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_untrack_during_cycle_is_not_written_back() {
        let picarto = FakeProvider::new(Platform::Picarto);
        picarto.set_live("k", true);
        let (checker, backend) = setup(&[picarto.clone()]);
        let checker = Arc::new(checker);
        let k = key(Platform::Picarto, "k");

        checker
            .track(&snapshot(Platform::Picarto, "k", false))
            .await
            .unwrap();
        let mut events = checker.subscribe();

        let hold = picarto.hold.lock().await;
        let cycle = {
            let checker = checker.clone();
            tokio::spawn(async move { checker.run_cycle().await })
        };
        while picarto.fetches() == 0 {
            tokio::task::yield_now().await;
        }

        assert!(checker.untrack(&k).await.unwrap());
        drop(hold);

        let report = cycle.await.unwrap().unwrap();
        assert_eq!(report.fetched, 0);
        assert!(drain(&mut events).is_empty());
        assert!(backend.hash_get_all(BUCKET).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_untrack_all() {
        let picarto = FakeProvider::new(Platform::Picarto);
        let (checker, _) = setup(&[picarto.clone()]);

        for name in ["a", "b", "c"] {
            checker
                .track(&snapshot(Platform::Picarto, name, true))
                .await
                .unwrap();
            picarto.set_live(name, false);
        }
        checker.run_cycle().await.unwrap();
        assert!(checker.is_pending_offline(&key(Platform::Picarto, "a")));

        checker.untrack_all().await.unwrap();
        assert!(checker.tracked().await.unwrap().is_empty());
        assert!(!checker.is_pending_offline(&key(Platform::Picarto, "a")));
    }
}

mod failing_stream_tests {
    use super::*;

    #[tokio::test]
    async fn test_persistent_failure_is_reported_and_cleared() {
        let picarto = FakeProvider::new(Platform::Picarto);
        picarto.set_live("bar", true);
        let (checker, _) = setup(&[picarto.clone()]);

        for name in ["foo", "bar"] {
            checker
                .track(&snapshot(Platform::Picarto, name, true))
                .await
                .unwrap();
        }

        // The first failure happened an hour ago.
        picarto
            .failures
            .record_failure_at("foo", Utc::now() - chrono::Duration::hours(1));
        for _ in 0..3 {
            checker.run_cycle().await.unwrap();
        }

        let min = Duration::from_secs(30 * 60);
        assert!(checker.failing_streams(Duration::from_secs(2 * 60 * 60), false).is_empty());
        assert_eq!(
            checker.failing_streams(min, false),
            vec![key(Platform::Picarto, "foo")]
        );

        assert_eq!(
            checker.failing_streams(min, true),
            vec![key(Platform::Picarto, "foo")]
        );
        assert!(checker.failing_streams(min, false).is_empty());
        assert!(picarto.failing_channels().is_empty());
    }

    #[tokio::test]
    async fn test_recovery_clears_failure() {
        let picarto = FakeProvider::new(Platform::Picarto);
        let (checker, _) = setup(&[picarto.clone()]);

        checker
            .track(&snapshot(Platform::Picarto, "foo", true))
            .await
            .unwrap();
        picarto
            .failures
            .record_failure_at("foo", Utc::now() - chrono::Duration::hours(1));

        picarto.set_live("foo", true);
        checker.run_cycle().await.unwrap();
        assert!(checker.failing_streams(Duration::ZERO, false).is_empty());
    }
}

mod run_loop_tests {
    use super::*;

    fn flaky_checker(store: Arc<FlakyStore>) -> Arc<NotifChecker> {
        flaky_checker_with(store, FakeProvider::new(Platform::Picarto))
    }

    fn flaky_checker_with(
        store: Arc<FlakyStore>,
        picarto: Arc<FakeProvider>,
    ) -> Arc<NotifChecker> {
        Arc::new(
            NotifChecker::new(registry(&[picarto]), StreamStateStore::new(store, BUCKET))
                .with_poll_interval(Duration::from_secs(1)),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_failure_does_not_stop_loop() {
        let store = Arc::new(FlakyStore::default());
        StreamStateStore::new(store.clone(), BUCKET)
            .put(&snapshot(Platform::Picarto, "k", false))
            .await
            .unwrap();
        store.failing.store(true, Ordering::SeqCst);

        let picarto = FakeProvider::new(Platform::Picarto);
        picarto.set_live("k", true);
        let checker = flaky_checker_with(store.clone(), picarto.clone());
        let mut events = checker.subscribe();
        let cancel = CancellationToken::new();

        let handle = {
            let checker = checker.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { checker.run(cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert!(store.reads.load(Ordering::SeqCst) >= 3);
        assert!(checker.is_running());
        assert_eq!(picarto.fetches(), 0);
        assert!(drain(&mut events).is_empty());

        store.failing.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(2)).await;

        // The next cycle after recovery polls, writes back and publishes.
        assert!(picarto.fetches() >= 1);
        let got = drain(&mut events);
        assert_eq!(got.len(), 1);
        assert!(got[0].is_online());
        assert_eq!(names(&got[0]), vec!["k"]);
        let stored = StreamStateStore::new(store.clone(), BUCKET)
            .load_tracked()
            .await
            .unwrap();
        assert!(stored[&key(Platform::Picarto, "k")].as_ref().unwrap().is_live);

        cancel.cancel();
        handle.await.unwrap().unwrap();
        assert!(!checker.is_running());
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_loop() {
        let store = Arc::new(FlakyStore::default());
        let checker = flaky_checker(store.clone());

        let cancel = CancellationToken::new();
        cancel.cancel();
        checker.run(cancel).await.unwrap();
        assert_eq!(store.reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_run_is_refused() {
        let store = Arc::new(FlakyStore::default());
        let checker = flaky_checker(store);
        let cancel = CancellationToken::new();

        let handle = {
            let checker = checker.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { checker.run(cancel).await })
        };
        while !checker.is_running() {
            tokio::task::yield_now().await;
        }

        let second = checker.run(CancellationToken::new()).await;
        assert!(matches!(second, Err(Error::AlreadyRunning)));

        cancel.cancel();
        handle.await.unwrap().unwrap();

        // The guard is released once the first loop returns.
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(checker.run(cancel).await.is_ok());
    }
}
