//! In-process channel store.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use super::ChannelStore;
use crate::error::StoreError;
use crate::models::{ChannelMeta, ChannelRecord, ChannelSummary, Post};

struct MemoryChannel {
    record: ChannelRecord,
    identities: HashSet<String>,
    visits: u64,
    /// Visit currently being written and how many posts it has inserted.
    cursor: (u64, usize),
}

/// [`ChannelStore`] backed by a map; contents are lost on drop.
#[derive(Default)]
pub struct MemoryChannelStore {
    channels: Mutex<HashMap<String, MemoryChannel>>,
}

impl MemoryChannelStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, MemoryChannel>>, StoreError> {
        self.channels
            .lock()
            .map_err(|_| StoreError::Other("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl ChannelStore for MemoryChannelStore {
    async fn upsert_channel(&self, meta: &ChannelMeta) -> Result<u64, StoreError> {
        let mut channels = self.lock()?;
        let channel = channels
            .entry(meta.url.clone())
            .or_insert_with(|| MemoryChannel {
                record: ChannelRecord {
                    url: meta.url.clone(),
                    handle: meta.handle.clone(),
                    followers: 0,
                    last_scraped: None,
                    created_at: Utc::now(),
                    posts: Vec::new(),
                },
                identities: HashSet::new(),
                visits: 0,
                cursor: (0, 0),
            });

        channel.record.handle = meta.handle.clone();
        channel.record.followers = meta.followers;
        channel.record.last_scraped = Some(meta.last_scraped);
        channel.visits += 1;
        Ok(channel.visits)
    }

    async fn prepend_posts(
        &self,
        channel_url: &str,
        visit: u64,
        batch: &[Post],
    ) -> Result<usize, StoreError> {
        let mut channels = self.lock()?;
        let channel = channels
            .get_mut(channel_url)
            .ok_or_else(|| StoreError::Other(format!("unknown channel {}", channel_url)))?;

        if channel.cursor.0 != visit {
            channel.cursor = (visit, 0);
        }

        let mut inserted = 0;
        for post in batch {
            if !channel.identities.insert(post.identity().to_string()) {
                continue;
            }
            let at = channel.cursor.1;
            channel.record.posts.insert(at, post.clone());
            channel.cursor.1 += 1;
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn newest_post(&self, channel_url: &str) -> Result<Option<Post>, StoreError> {
        let channels = self.lock()?;
        Ok(channels
            .get(channel_url)
            .and_then(|c| c.record.newest().cloned()))
    }

    async fn get_channel(&self, channel_url: &str) -> Result<Option<ChannelRecord>, StoreError> {
        let channels = self.lock()?;
        Ok(channels.get(channel_url).map(|c| c.record.clone()))
    }

    async fn list_channels(&self) -> Result<Vec<ChannelSummary>, StoreError> {
        let channels = self.lock()?;
        let mut summaries: Vec<ChannelSummary> = channels
            .values()
            .map(|c| ChannelSummary {
                url: c.record.url.clone(),
                handle: c.record.handle.clone(),
                followers: c.record.followers,
                last_scraped: c.record.last_scraped,
                post_count: c.record.posts.len() as u64,
            })
            .collect();
        summaries.sort_by(|a, b| a.url.cmp(&b.url));
        Ok(summaries)
    }
}
