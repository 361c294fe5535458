use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::failure::FailureTracker;
use crate::model::{Platform, StreamData, normalize_name};
use crate::provider::Provider;
use crate::utils::capture_group_1;

pub static URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(?:www\.|m\.)?twitch\.tv/([A-Za-z0-9_]{1,25})/?(?:[?#].*)?$").unwrap()
});

/// First path segments on twitch.tv that are site pages, not channels.
const RESERVED_PATHS: &[&str] = &[
    "directory",
    "videos",
    "settings",
    "downloads",
    "p",
    "search",
    "subscriptions",
    "inventory",
    "wallet",
    "drops",
];

/// App credentials for the Helix API.
#[derive(Debug, Clone)]
pub struct TwitchCredentials {
    pub client_id: String,
    pub access_token: String,
}

#[derive(Debug, Deserialize)]
struct HelixResponse<T> {
    data: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HelixUser {
    pub login: String,
    pub display_name: String,
    #[serde(default)]
    pub profile_image_url: String,
    #[serde(default)]
    pub offline_image_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HelixStream {
    pub user_login: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub game_name: String,
    #[serde(rename = "type", default)]
    pub stream_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub viewer_count: u64,
    #[serde(default)]
    pub thumbnail_url: String,
}

pub struct Twitch {
    client: Client,
    credentials: TwitchCredentials,
    api_base: String,
    failures: FailureTracker,
}

impl Twitch {
    pub const API_BASE: &str = "https://api.twitch.tv/helix";
    const BASE_URL: &str = "https://www.twitch.tv";
    /// Helix accepts at most 100 `login`/`user_login` parameters per call.
    const MAX_LOGINS_PER_REQUEST: usize = 100;
    const PREVIEW_SIZE: &str = "1280x720";

    pub fn new(client: Client, credentials: TwitchCredentials) -> Self {
        Self {
            client,
            credentials,
            api_base: Self::API_BASE.to_string(),
            failures: FailureTracker::new(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// The normalized channel login in `url`, if it is a channel URL.
    pub fn channel_from_url(url: &str) -> Option<String> {
        let login = capture_group_1(&URL_REGEX, url.trim())?;
        let login = normalize_name(login);
        if RESERVED_PATHS.contains(&login.as_str()) {
            return None;
        }
        Some(login)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        param: &str,
        logins: &[String],
    ) -> Result<Vec<T>, ProviderError> {
        let mut query: Vec<(&str, &str)> = logins.iter().map(|l| (param, l.as_str())).collect();
        query.push(("first", "100"));

        let response = self
            .client
            .get(format!("{}/{}", self.api_base, endpoint))
            .header("Client-Id", &self.credentials.client_id)
            .bearer_auth(&self.credentials.access_token)
            .query(&query)
            .send()
            .await?
            .error_for_status()?;

        let body = response.text().await?;
        let parsed: HelixResponse<T> = serde_json::from_str(&body)?;
        Ok(parsed.data)
    }

    /// Fetch one chunk of logins. Logins unknown to Twitch are absent from
    /// the result.
    async fn fetch_chunk(&self, logins: &[String]) -> Result<Vec<StreamData>, ProviderError> {
        let users: Vec<HelixUser> = self.get_json("users", "login", logins).await?;
        if users.is_empty() {
            return Ok(Vec::new());
        }
        let streams: Vec<HelixStream> = self.get_json("streams", "user_login", logins).await?;
        debug!(
            requested = logins.len(),
            users = users.len(),
            live = streams.len(),
            "twitch chunk fetched"
        );
        Ok(Self::snapshots(users, streams))
    }

    /// Combine user records with live stream records into snapshots.
    /// A user without a live stream record is offline.
    pub fn snapshots(users: Vec<HelixUser>, streams: Vec<HelixStream>) -> Vec<StreamData> {
        let mut live: HashMap<String, HelixStream> = streams
            .into_iter()
            .filter(|s| s.stream_type == "live")
            .map(|s| (normalize_name(&s.user_login), s))
            .collect();

        users
            .into_iter()
            .map(|user| {
                let login = normalize_name(&user.login);
                let stream_url = format!("{}/{}", Self::BASE_URL, login);
                match live.remove(&login) {
                    Some(stream) => StreamData {
                        platform: Platform::Twitch,
                        name: login,
                        unique_name: if stream.user_name.is_empty() {
                            user.display_name
                        } else {
                            stream.user_name
                        },
                        viewers: stream.viewer_count,
                        title: stream.title,
                        game: stream.game_name,
                        preview_url: stream
                            .thumbnail_url
                            .replace("{width}x{height}", Self::PREVIEW_SIZE),
                        is_live: true,
                        stream_url,
                        avatar_url: user.profile_image_url,
                    },
                    None => StreamData {
                        unique_name: user.display_name,
                        preview_url: user.offline_image_url,
                        avatar_url: user.profile_image_url,
                        ..StreamData::offline(Platform::Twitch, login, stream_url)
                    },
                }
            })
            .collect()
    }
}

#[async_trait]
impl Provider for Twitch {
    fn platform(&self) -> Platform {
        Platform::Twitch
    }

    fn failures(&self) -> &FailureTracker {
        &self.failures
    }

    async fn fetch_batch(&self, names: &HashSet<String>) -> Vec<StreamData> {
        let mut logins: Vec<String> = names
            .iter()
            .map(|n| normalize_name(n))
            .filter(|n| !n.is_empty())
            .collect();
        logins.sort();
        logins.dedup();

        let mut result = Vec::with_capacity(logins.len());
        for chunk in logins.chunks(Self::MAX_LOGINS_PER_REQUEST) {
            match self.fetch_chunk(chunk).await {
                Ok(snapshots) => {
                    let found: HashSet<String> =
                        snapshots.iter().map(|s| normalize_name(&s.name)).collect();
                    for login in chunk {
                        if found.contains(login) {
                            self.failures.record_success(login);
                        } else {
                            warn!(channel = %login, "twitch channel not found");
                            self.failures.record_failure(login);
                        }
                    }
                    result.extend(snapshots);
                }
                Err(e) => {
                    warn!(channels = chunk.len(), error = %e, "twitch batch request failed");
                    for login in chunk {
                        self.failures.record_failure(login);
                    }
                }
            }
        }
        result
    }

    fn is_valid_url(&self, url: &str) -> bool {
        Self::channel_from_url(url).is_some()
    }

    async fn resolve_by_url(&self, url: &str) -> Option<StreamData> {
        let login = Self::channel_from_url(url)?;
        match self.fetch_chunk(std::slice::from_ref(&login)).await {
            Ok(snapshots) => snapshots.into_iter().next(),
            Err(e) => {
                warn!(channel = %login, error = %e, "failed to resolve twitch channel");
                None
            }
        }
    }
}
