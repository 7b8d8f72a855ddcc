use crate::types::{FeedItem, Result};
use async_trait::async_trait;

/// Transport used by the monitor to talk to the remote site.
///
/// Authentication, rate limiting and retries belong to implementations of
/// this trait; the monitor calls each method at most once per step and treats
/// any error as "skip this cycle".
#[async_trait]
pub trait FetchOperator: Send + Sync {
    /// Human-readable name for logs
    fn operator_name(&self) -> String;

    /// Fetch the newest posts of `query`, newest first.
    ///
    /// `before` is the fullname of the newest post already seen; only posts
    /// newer than it are returned. An empty `before` requests the latest
    /// `limit` posts.
    async fn scrape(
        &self,
        query: &str,
        sort: &str,
        after: &str,
        before: &str,
        limit: usize,
    ) -> Result<Vec<FeedItem>>;

    /// Look posts up directly by fullname. Posts that no longer exist are
    /// absent from the result; order is unspecified.
    async fn resolve_by_ids(&self, ids: &[String]) -> Result<Vec<FeedItem>>;
}
