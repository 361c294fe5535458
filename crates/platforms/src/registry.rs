//! Registry of providers, one per platform.

use std::collections::BTreeMap;
use std::sync::Arc;

use reqwest::Client;
use tracing::{debug, warn};

use crate::model::Platform;
use crate::provider::Provider;
use crate::providers::{Picarto, Twitch, TwitchCredentials};

#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: BTreeMap<Platform, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with every provider that can run with the given
    /// credentials. Twitch is skipped when no credentials are supplied.
    pub fn with_defaults(client: Client, twitch: Option<TwitchCredentials>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(Picarto::new(client.clone())));
        match twitch {
            Some(credentials) => registry.register(Arc::new(Twitch::new(client, credentials))),
            None => warn!("no Twitch credentials configured; Twitch streams will not be polled"),
        }
        registry
    }

    /// Register a provider, replacing any existing one for its platform.
    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        let platform = provider.platform();
        if self.providers.insert(platform, provider).is_some() {
            debug!(platform = %platform, "replaced provider");
        }
    }

    pub fn get(&self, platform: Platform) -> Option<&Arc<dyn Provider>> {
        self.providers.get(&platform)
    }

    /// The first provider that recognises `url`.
    pub fn get_by_url(&self, url: &str) -> Option<&Arc<dyn Provider>> {
        self.providers.values().find(|p| p.is_valid_url(url))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Provider>> {
        self.providers.values()
    }

    pub fn platforms(&self) -> Vec<Platform> {
        self.providers.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
