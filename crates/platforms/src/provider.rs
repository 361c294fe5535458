//! The per-platform status provider contract.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::failure::{FailingChannel, FailureTracker};
use crate::model::{Platform, StreamData};

/// Fetches live status for channels on one platform.
///
/// `fetch_batch` never fails as a whole: a channel whose fetch fails is
/// left out of the result and recorded in the provider's
/// [`FailureTracker`]. A channel that is fetched successfully has its
/// failure record cleared.
#[async_trait]
pub trait Provider: Send + Sync {
    /// The platform this provider serves.
    fn platform(&self) -> Platform;

    /// The failure bookkeeping backing `failing_channels` and `clear_failure`.
    fn failures(&self) -> &FailureTracker;

    /// Fetch the current status of `names` (lowercase channel logins).
    async fn fetch_batch(&self, names: &HashSet<String>) -> Vec<StreamData>;

    /// Structural check that `url` points at a channel on this platform.
    /// Performs no network I/O.
    fn is_valid_url(&self, url: &str) -> bool;

    /// Resolve the current status of the channel behind `url`.
    async fn resolve_by_url(&self, url: &str) -> Option<StreamData>;

    fn failing_channels(&self) -> Vec<FailingChannel> {
        self.failures().failing()
    }

    fn clear_failure(&self, name: &str) {
        self.failures().clear(name);
    }
}
