//! Checker configuration.

use std::str::FromStr;
use std::time::Duration;

use stream_platforms::providers::TwitchCredentials;
use tracing::warn;

use crate::{Error, Result};

/// Configuration for the poll loop and its collaborators.
#[derive(Debug, Clone)]
pub struct CheckerConfig {
    /// Delay between the end of one cycle and the start of the next.
    pub poll_interval: Duration,
    /// Shared-store bucket holding the tracked snapshots.
    pub bucket: String,
    /// SQLite URL for the shared store; in-memory store when unset.
    pub database_url: Option<String>,
    /// Per-request timeout for provider HTTP calls.
    pub request_timeout: Duration,
    pub twitch_client_id: Option<String>,
    pub twitch_access_token: Option<String>,
    /// How long a channel must keep failing before the host evicts it.
    pub eviction_after: Duration,
    pub eviction_sweep_interval: Duration,
    /// Broadcast channel capacity for stream events.
    pub event_capacity: usize,
    /// Directory for rotated log files; console only when unset.
    pub log_dir: Option<String>,
    /// URLs to track at startup.
    pub track_urls: Vec<String>,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            bucket: "followed_streams".to_string(),
            database_url: None,
            request_timeout: Duration::from_secs(10),
            twitch_client_id: None,
            twitch_access_token: None,
            eviction_after: Duration::from_secs(24 * 60 * 60),
            eviction_sweep_interval: Duration::from_secs(10 * 60),
            event_capacity: 256,
            log_dir: None,
            track_urls: Vec::new(),
        }
    }
}

impl CheckerConfig {
    /// Load config from environment variables, falling back to defaults.
    ///
    /// Supported env vars:
    /// - `FOLLOWED_STREAMS_POLL_INTERVAL_SECS`
    /// - `FOLLOWED_STREAMS_BUCKET`
    /// - `FOLLOWED_STREAMS_DATABASE_URL` (e.g. "sqlite:streams.db?mode=rwc")
    /// - `FOLLOWED_STREAMS_REQUEST_TIMEOUT_SECS`
    /// - `TWITCH_CLIENT_ID`, `TWITCH_ACCESS_TOKEN`
    /// - `FOLLOWED_STREAMS_EVICT_AFTER_SECS`, `FOLLOWED_STREAMS_EVICT_SWEEP_SECS`
    /// - `FOLLOWED_STREAMS_EVENT_CAPACITY`
    /// - `FOLLOWED_STREAMS_LOG_DIR`
    /// - `FOLLOWED_STREAMS_TRACK_URLS` (comma-separated)
    pub fn from_env_or_default() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(secs) = parse_var::<u64>(&get, "FOLLOWED_STREAMS_POLL_INTERVAL_SECS") {
            config.poll_interval = Duration::from_secs(secs);
        }
        if let Some(bucket) = get("FOLLOWED_STREAMS_BUCKET") {
            config.bucket = bucket.trim().to_string();
        }
        config.database_url = get("FOLLOWED_STREAMS_DATABASE_URL");
        if let Some(secs) = parse_var::<u64>(&get, "FOLLOWED_STREAMS_REQUEST_TIMEOUT_SECS") {
            config.request_timeout = Duration::from_secs(secs);
        }
        config.twitch_client_id = get("TWITCH_CLIENT_ID");
        config.twitch_access_token = get("TWITCH_ACCESS_TOKEN");
        if let Some(secs) = parse_var::<u64>(&get, "FOLLOWED_STREAMS_EVICT_AFTER_SECS") {
            config.eviction_after = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>(&get, "FOLLOWED_STREAMS_EVICT_SWEEP_SECS") {
            config.eviction_sweep_interval = Duration::from_secs(secs);
        }
        if let Some(capacity) = parse_var::<usize>(&get, "FOLLOWED_STREAMS_EVENT_CAPACITY") {
            config.event_capacity = capacity;
        }
        config.log_dir = get("FOLLOWED_STREAMS_LOG_DIR");
        if let Some(urls) = get("FOLLOWED_STREAMS_TRACK_URLS") {
            config.track_urls = urls
                .split(',')
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(str::to_string)
                .collect();
        }

        config
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(Error::config("poll interval must be greater than zero"));
        }
        if self.event_capacity == 0 {
            return Err(Error::config("event capacity must be greater than zero"));
        }
        if self.bucket.is_empty() {
            return Err(Error::config("bucket name must not be empty"));
        }
        Ok(())
    }

    /// Twitch credentials, when both halves are configured.
    pub fn twitch_credentials(&self) -> Option<TwitchCredentials> {
        match (&self.twitch_client_id, &self.twitch_access_token) {
            (Some(client_id), Some(access_token)) => Some(TwitchCredentials {
                client_id: client_id.clone(),
                access_token: access_token.clone(),
            }),
            (Some(_), None) | (None, Some(_)) => {
                warn!(
                    "Twitch credentials are incomplete; \
                     both TWITCH_CLIENT_ID and TWITCH_ACCESS_TOKEN are required"
                );
                None
            }
            (None, None) => None,
        }
    }
}

fn parse_var<T: FromStr>(get: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    let raw = get(name)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(var = name, value = %raw, "ignoring unparseable config value");
            None
        }
    }
}
