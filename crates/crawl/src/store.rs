//! Persistence boundary for good peers.

use async_trait::async_trait;

/// Sink for the periodically persisted list of good endpoints.
///
/// Entries are `[host]:port` strings, brackets always present. Each save
/// replaces the previous snapshot in full.
#[async_trait]
pub trait GoodPeerStore: Send + Sync {
    async fn save(&self, peers: &[String]) -> eyre::Result<()>;
}
