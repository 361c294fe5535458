use std::sync::OnceLock;
use std::time::Duration;

use reqwest::{Client, ClientBuilder};
use tracing::debug;

pub(crate) const DEFAULT_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

/// Default per-request timeout for status calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Another crate installed one first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// A client builder with the defaults every provider expects.
pub fn create_client_builder(timeout: Option<Duration>) -> ClientBuilder {
    install_rustls_provider();

    Client::builder()
        .user_agent(DEFAULT_UA)
        .timeout(timeout.unwrap_or(DEFAULT_TIMEOUT))
        .connect_timeout(Duration::from_secs(5))
        .pool_idle_timeout(Duration::from_secs(90))
}

/// Build a client with [`create_client_builder`] defaults.
pub fn default_client() -> Result<Client, reqwest::Error> {
    create_client_builder(None).build()
}
