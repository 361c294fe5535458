//! Identity and value types for a tracked channel's snapshot.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// A live-streaming platform with a status API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Twitch,
    Picarto,
}

impl Platform {
    /// All known platforms.
    pub const ALL: [Platform; 2] = [Platform::Twitch, Platform::Picarto];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Twitch => "twitch",
            Platform::Picarto => "picarto",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Platform::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ProviderError::UnknownPlatform(s.to_string()))
    }
}

/// Normalize a channel name the way keys store it.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Identity of one tracked channel.
///
/// The name is always normalized to lowercase, so two keys built from
/// `"Foo"` and `"foo"` are equal. The string form `"<platform>:<name>"`
/// is what the shared store uses as its field key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamDataKey {
    platform: Platform,
    name: String,
}

impl StreamDataKey {
    pub fn new(platform: Platform, name: impl AsRef<str>) -> Self {
        Self {
            platform,
            name: normalize_name(name.as_ref()),
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for StreamDataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.platform, self.name)
    }
}

impl FromStr for StreamDataKey {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (platform, name) = s
            .split_once(':')
            .ok_or_else(|| ProviderError::InvalidKey(s.to_string()))?;
        let platform = platform.parse::<Platform>()?;
        if name.trim().is_empty() {
            return Err(ProviderError::InvalidKey(s.to_string()));
        }
        Ok(Self::new(platform, name))
    }
}

/// A complete status snapshot for one channel.
///
/// Every successful fetch produces a whole new value; fields are never
/// merged across fetches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamData {
    pub platform: Platform,
    /// Channel login as the platform reports it.
    pub name: String,
    /// Display name (may differ in case or script from `name`).
    pub unique_name: String,
    pub viewers: u64,
    pub title: String,
    pub game: String,
    pub preview_url: String,
    pub is_live: bool,
    pub stream_url: String,
    pub avatar_url: String,
}

impl StreamData {
    /// The key this snapshot is stored under.
    pub fn key(&self) -> StreamDataKey {
        StreamDataKey::new(self.platform, &self.name)
    }

    /// An offline snapshot with only identity fields filled in.
    pub fn offline(
        platform: Platform,
        name: impl Into<String>,
        stream_url: impl Into<String>,
    ) -> Self {
        let name = name.into();
        Self {
            platform,
            unique_name: name.clone(),
            name,
            viewers: 0,
            title: String::new(),
            game: String::new(),
            preview_url: String::new(),
            is_live: false,
            stream_url: stream_url.into(),
            avatar_url: String::new(),
        }
    }
}
