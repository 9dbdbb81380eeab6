//! Host content backend used by the search ability.
//!
//! Hosts that can search their content implement [`ContentSource`].
//! When no backend is configured, [`NullContentSource`] stands in and
//! every search comes back empty.

mod directory;

use async_trait::async_trait;

pub use directory::DirectoryContentSource;

/// A single piece of host content matching a query.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentMatch {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Returns at most `limit` matches for `query`, best first.
    async fn search(&self, query: &str, limit: usize) -> anyhow::Result<Vec<ContentMatch>>;

    /// Backend name for logs (e.g. `"directory"`).
    fn name(&self) -> &str;
}

/// Fallback used when the host has no content backend.
pub struct NullContentSource;

#[async_trait]
impl ContentSource for NullContentSource {
    async fn search(&self, _query: &str, _limit: usize) -> anyhow::Result<Vec<ContentMatch>> {
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        "none"
    }
}
