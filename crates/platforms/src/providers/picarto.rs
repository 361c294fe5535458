use std::collections::HashSet;
use std::sync::LazyLock;

use async_trait::async_trait;
use futures::StreamExt;
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::failure::FailureTracker;
use crate::model::{Platform, StreamData, normalize_name};
use crate::provider::Provider;
use crate::utils::capture_group_1;

pub static URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(?:www\.)?picarto\.tv/([A-Za-z0-9_-]{1,64})/?(?:[?#].*)?$").unwrap()
});

const RESERVED_PATHS: &[&str] = &["communities", "explore", "settings", "site", "videopopout"];

#[derive(Debug, Clone, Deserialize)]
pub struct PicartoChannel {
    pub name: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub viewers: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub category: Vec<String>,
    #[serde(default)]
    pub thumbnails: Option<PicartoThumbnails>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PicartoThumbnails {
    #[serde(default)]
    pub web: String,
}

impl From<PicartoChannel> for StreamData {
    fn from(channel: PicartoChannel) -> Self {
        let name = normalize_name(&channel.name);
        StreamData {
            platform: Platform::Picarto,
            stream_url: format!("{}/{}", Picarto::BASE_URL, channel.name),
            name,
            unique_name: channel.name,
            viewers: channel.viewers,
            title: channel.title,
            game: channel.category.join(", "),
            preview_url: channel.thumbnails.map(|t| t.web).unwrap_or_default(),
            is_live: channel.online,
            avatar_url: channel.avatar,
        }
    }
}

/// Picarto has no batch endpoint; channels are fetched one request each,
/// concurrently.
pub struct Picarto {
    client: Client,
    api_base: String,
    failures: FailureTracker,
}

impl Picarto {
    pub const API_BASE: &str = "https://api.picarto.tv/api/v1";
    const MAX_CONCURRENT: usize = 8;
    const BASE_URL: &str = "https://picarto.tv";

    pub fn new(client: Client) -> Self {
        Self {
            client,
            api_base: Self::API_BASE.to_string(),
            failures: FailureTracker::new(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn channel_from_url(url: &str) -> Option<String> {
        let name = capture_group_1(&URL_REGEX, url.trim())?;
        let name = normalize_name(name);
        if RESERVED_PATHS.contains(&name.as_str()) {
            return None;
        }
        Some(name)
    }

    async fn fetch_channel(&self, name: &str) -> Result<StreamData, ProviderError> {
        let response = self
            .client
            .get(format!("{}/channel/name/{}", self.api_base, name))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ProviderError::ChannelNotFound(name.to_string()));
        }

        let body = response.error_for_status()?.text().await?;
        let channel: PicartoChannel = serde_json::from_str(&body)?;
        if normalize_name(&channel.name) != name {
            return Err(ProviderError::UnexpectedResponse(format!(
                "asked for {name}, got {}",
                channel.name
            )));
        }
        Ok(channel.into())
    }
}

#[async_trait]
impl Provider for Picarto {
    fn platform(&self) -> Platform {
        Platform::Picarto
    }

    fn failures(&self) -> &FailureTracker {
        &self.failures
    }

    async fn fetch_batch(&self, names: &HashSet<String>) -> Vec<StreamData> {
        let names: HashSet<String> = names
            .iter()
            .map(|n| normalize_name(n))
            .filter(|n| !n.is_empty())
            .collect();

        let results: Vec<(String, Result<StreamData, ProviderError>)> =
            futures::stream::iter(names)
                .map(|name| async move {
                    let result = self.fetch_channel(&name).await;
                    (name, result)
                })
                .buffer_unordered(Self::MAX_CONCURRENT)
                .collect()
                .await;

        let mut snapshots = Vec::with_capacity(results.len());
        for (name, result) in results {
            match result {
                Ok(data) => {
                    self.failures.record_success(&name);
                    snapshots.push(data);
                }
                Err(e) => {
                    warn!(channel = %name, error = %e, "picarto fetch failed");
                    self.failures.record_failure(&name);
                }
            }
        }
        debug!(fetched = snapshots.len(), "picarto batch complete");
        snapshots
    }

    fn is_valid_url(&self, url: &str) -> bool {
        Self::channel_from_url(url).is_some()
    }

    async fn resolve_by_url(&self, url: &str) -> Option<StreamData> {
        let name = Self::channel_from_url(url)?;
        match self.fetch_channel(&name).await {
            Ok(data) => Some(data),
            Err(e) => {
                warn!(channel = %name, error = %e, "failed to resolve picarto channel");
                None
            }
        }
    }
}
