//! Target pages and the per-page channel record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Post;
use crate::utils::{canonicalize_url, derive_handle};

/// A page configured for harvesting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetPage {
    /// Canonical URL; the channel record key.
    pub url: String,
    pub handle: String,
}

impl TargetPage {
    pub fn new(raw_url: &str) -> Self {
        let url = canonicalize_url(raw_url);
        let handle = derive_handle(&url);
        Self { url, handle }
    }
}

impl std::fmt::Display for TargetPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.handle, self.url)
    }
}

/// Metadata refreshed on every visit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMeta {
    pub url: String,
    pub handle: String,
    pub followers: u64,
    pub last_scraped: DateTime<Utc>,
}

impl ChannelMeta {
    pub fn for_visit(target: &TargetPage, followers: u64) -> Self {
        Self {
            url: target.url.clone(),
            handle: target.handle.clone(),
            followers,
            last_scraped: Utc::now(),
        }
    }
}

/// Persisted document for one target page. Posts are newest-first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub url: String,
    pub handle: String,
    pub followers: u64,
    pub last_scraped: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub posts: Vec<Post>,
}

impl ChannelRecord {
    /// The current newest post, if any.
    pub fn newest(&self) -> Option<&Post> {
        self.posts.first()
    }
}

/// Channel directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSummary {
    pub url: String,
    pub handle: String,
    pub followers: u64,
    pub last_scraped: Option<DateTime<Utc>>,
    pub post_count: u64,
}
