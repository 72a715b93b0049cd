//! Persistent channel records.
//!
//! [`ChannelStore`] is the only way the engine touches persistence.
//! [`SqliteChannelStore`] is the production backend; [`MemoryChannelStore`]
//! keeps everything in process.

mod memory;
mod records;
mod sqlite;

pub use memory::MemoryChannelStore;
pub use sqlite::SqliteChannelStore;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{ChannelMeta, ChannelRecord, ChannelSummary, Post};

/// Storage contract for channel records.
///
/// Posts are kept newest-first. Each page visit gets a visit number from
/// [`upsert_channel`](Self::upsert_channel); posts flushed under a later
/// visit precede every post of earlier visits, and posts flushed within one
/// visit keep their flush order. Nothing is ever reordered or deleted.
#[async_trait]
pub trait ChannelStore: Send + Sync {
    /// Create the record on first visit, refresh handle, follower count and
    /// last-scraped time on every visit. Returns the new visit number.
    async fn upsert_channel(&self, meta: &ChannelMeta) -> Result<u64, StoreError>;

    /// Insert `posts` (in feed order) ahead of everything from earlier
    /// visits. Posts whose identity is already stored are ignored. Returns
    /// the number actually inserted.
    async fn prepend_posts(
        &self,
        channel_url: &str,
        visit: u64,
        posts: &[Post],
    ) -> Result<usize, StoreError>;

    /// The current first post of the record, without loading the rest.
    async fn newest_post(&self, channel_url: &str) -> Result<Option<Post>, StoreError>;

    async fn get_channel(&self, channel_url: &str) -> Result<Option<ChannelRecord>, StoreError>;

    async fn list_channels(&self) -> Result<Vec<ChannelSummary>, StoreError>;
}

/// Await a store call, failing with [`StoreError::Timeout`] after `limit`.
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}
