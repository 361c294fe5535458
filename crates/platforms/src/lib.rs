//! Live-status providers for streaming platforms.
//!
//! Each platform implements [`Provider`], which batch-fetches status
//! snapshots ([`StreamData`]) and keeps per-channel failure records.

pub mod client;
pub mod error;
pub mod failure;
pub mod model;
pub mod provider;
pub mod providers;
pub mod registry;
#[cfg(test)]
mod test_server;
mod utils;

pub use client::{create_client_builder, default_client};
pub use error::ProviderError;
pub use failure::{FailingChannel, FailureTracker};
pub use model::{Platform, StreamData, StreamDataKey, normalize_name};
pub use provider::Provider;
pub use registry::ProviderRegistry;
