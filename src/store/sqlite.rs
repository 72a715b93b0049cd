//! SQLite channel store.
//!
//! Uses diesel-async's SyncConnectionWrapper to provide an async interface
//! for SQLite. Connections are cheap, so one is opened per call.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use diesel::dsl::{count_star, max};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use diesel_async::sync_connection_wrapper::SyncConnectionWrapper;
use diesel_async::{AsyncConnection, RunQueryDsl, SimpleAsyncConnection};
use tracing::debug;

use super::records::{parse_datetime, parse_datetime_opt, to_i64, to_u64, ChannelRow, NewPost, PostRow};
use super::ChannelStore;
use crate::error::StoreError;
use crate::models::{ChannelMeta, ChannelRecord, ChannelSummary, Post};
use crate::schema::{channels, posts};

/// Async SQLite connection using SyncConnectionWrapper.
pub type AsyncSqliteConnection = SyncConnectionWrapper<SqliteConnection>;

const SCHEMA: &str = include_str!("schema_sqlite.sql");

/// Several workers write concurrently; wait on locks instead of failing.
const CONNECTION_PRAGMAS: &str = "PRAGMA busy_timeout = 5000; PRAGMA foreign_keys = ON;";

#[derive(Clone)]
pub struct SqliteChannelStore {
    database_url: String,
}

impl SqliteChannelStore {
    pub fn new(database_url: &str) -> Self {
        // Strip sqlite: prefix if present for diesel
        let url = database_url.strip_prefix("sqlite:").unwrap_or(database_url);
        Self {
            database_url: url.to_string(),
        }
    }

    pub fn from_path(db_path: &Path) -> Self {
        Self::new(&db_path.display().to_string())
    }

    /// Open a store and make sure the schema exists.
    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        let store = Self::from_path(db_path);
        store.init_schema().await?;
        Ok(store)
    }

    pub async fn init_schema(&self) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        conn.batch_execute(SCHEMA).await?;
        debug!("Schema ready at {}", self.database_url);
        Ok(())
    }

    async fn conn(&self) -> Result<AsyncSqliteConnection, StoreError> {
        let mut conn = AsyncSqliteConnection::establish(&self.database_url).await?;
        conn.batch_execute(CONNECTION_PRAGMAS).await?;
        Ok(conn)
    }

    async fn load_posts(
        conn: &mut AsyncSqliteConnection,
        channel_url: &str,
    ) -> Result<Vec<Post>, StoreError> {
        let rows = posts::table
            .filter(posts::channel_url.eq(channel_url))
            .order((posts::visit.desc(), posts::ordinal.asc()))
            .select(PostRow::as_select())
            .load::<PostRow>(conn)
            .await?;
        Ok(rows.into_iter().map(Post::from).collect())
    }
}

#[async_trait]
impl ChannelStore for SqliteChannelStore {
    async fn upsert_channel(&self, meta: &ChannelMeta) -> Result<u64, StoreError> {
        let mut conn = self.conn().await?;
        let now = Utc::now().to_rfc3339();
        let last_scraped = meta.last_scraped.to_rfc3339();

        diesel::insert_or_ignore_into(channels::table)
            .values((
                channels::url.eq(&meta.url),
                channels::handle.eq(&meta.handle),
                channels::followers.eq(0i64),
                channels::visits.eq(0i64),
                channels::created_at.eq(&now),
            ))
            .execute(&mut conn)
            .await?;

        diesel::update(channels::table.find(&meta.url))
            .set((
                channels::handle.eq(&meta.handle),
                channels::followers.eq(to_i64(meta.followers)),
                channels::last_scraped.eq(Some(&last_scraped)),
                channels::visits.eq(channels::visits + 1i64),
            ))
            .execute(&mut conn)
            .await?;

        let visits: i64 = channels::table
            .find(&meta.url)
            .select(channels::visits)
            .first(&mut conn)
            .await?;

        Ok(to_u64(visits))
    }

    async fn prepend_posts(
        &self,
        channel_url: &str,
        visit: u64,
        batch: &[Post],
    ) -> Result<usize, StoreError> {
        if batch.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn().await?;
        let visit = to_i64(visit);
        let inserted_at = Utc::now().to_rfc3339();

        let last_ordinal: Option<i64> = posts::table
            .filter(posts::channel_url.eq(channel_url))
            .filter(posts::visit.eq(visit))
            .select(max(posts::ordinal))
            .first(&mut conn)
            .await?;
        let mut ordinal = last_ordinal.map_or(0, |o| o + 1);

        let mut inserted = 0usize;
        for post in batch {
            let row = NewPost::new(channel_url, visit, ordinal, post, &inserted_at);
            let rows = diesel::insert_or_ignore_into(posts::table)
                .values(&row)
                .execute(&mut conn)
                .await?;
            if rows > 0 {
                inserted += rows;
                ordinal += 1;
            }
        }

        Ok(inserted)
    }

    async fn newest_post(&self, channel_url: &str) -> Result<Option<Post>, StoreError> {
        let mut conn = self.conn().await?;
        let row = posts::table
            .filter(posts::channel_url.eq(channel_url))
            .order((posts::visit.desc(), posts::ordinal.asc()))
            .select(PostRow::as_select())
            .first::<PostRow>(&mut conn)
            .await
            .optional()?;
        Ok(row.map(Post::from))
    }

    async fn get_channel(&self, channel_url: &str) -> Result<Option<ChannelRecord>, StoreError> {
        let mut conn = self.conn().await?;
        let Some(row) = channels::table
            .find(channel_url)
            .select(ChannelRow::as_select())
            .first::<ChannelRow>(&mut conn)
            .await
            .optional()?
        else {
            return Ok(None);
        };

        let posts = Self::load_posts(&mut conn, channel_url).await?;
        Ok(Some(ChannelRecord {
            url: row.url,
            handle: row.handle,
            followers: to_u64(row.followers),
            last_scraped: parse_datetime_opt(row.last_scraped),
            created_at: parse_datetime(&row.created_at),
            posts,
        }))
    }

    async fn list_channels(&self) -> Result<Vec<ChannelSummary>, StoreError> {
        let mut conn = self.conn().await?;

        let rows = channels::table
            .order(channels::url.asc())
            .select(ChannelRow::as_select())
            .load::<ChannelRow>(&mut conn)
            .await?;

        let counts: HashMap<String, i64> = posts::table
            .group_by(posts::channel_url)
            .select((posts::channel_url, count_star()))
            .load::<(String, i64)>(&mut conn)
            .await?
            .into_iter()
            .collect();

        Ok(rows
            .into_iter()
            .map(|row| {
                let count = counts.get(&row.url).copied().unwrap_or(0);
                row.into_summary(count)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TargetPage;
    use tempfile::tempdir;

    async fn setup_test_db() -> (SqliteChannelStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = SqliteChannelStore::open(&dir.path().join("test.db"))
            .await
            .unwrap();
        (store, dir)
    }

    fn page() -> TargetPage {
        TargetPage::new("https://www.facebook.com/acme")
    }

    fn post(n: u32) -> Post {
        Post::new(format!("post {}", n))
            .with_url(format!("https://www.facebook.com/acme/posts/{}", n))
            .with_posted_at(format!("2025-07-{:02} 10:00:00", n))
    }

    #[tokio::test]
    async fn upsert_counts_visits_and_refreshes_meta() {
        let (store, _dir) = setup_test_db().await;
        let target = page();

        assert_eq!(store.upsert_channel(&ChannelMeta::for_visit(&target, 10)).await.unwrap(), 1);
        assert_eq!(store.upsert_channel(&ChannelMeta::for_visit(&target, 25)).await.unwrap(), 2);

        let record = store.get_channel(&target.url).await.unwrap().unwrap();
        assert_eq!(record.followers, 25);
        assert_eq!(record.handle, "acme");
        assert!(record.last_scraped.is_some());
        assert!(record.posts.is_empty());
    }

    #[tokio::test]
    async fn later_visits_are_prepended() {
        let (store, _dir) = setup_test_db().await;
        let target = page();

        let v1 = store.upsert_channel(&ChannelMeta::for_visit(&target, 1)).await.unwrap();
        store.prepend_posts(&target.url, v1, &[post(3), post(2)]).await.unwrap();
        store.prepend_posts(&target.url, v1, &[post(1)]).await.unwrap();

        let v2 = store.upsert_channel(&ChannelMeta::for_visit(&target, 1)).await.unwrap();
        store.prepend_posts(&target.url, v2, &[post(5), post(4)]).await.unwrap();

        let record = store.get_channel(&target.url).await.unwrap().unwrap();
        let captions: Vec<_> = record.posts.iter().map(|p| p.caption.as_str()).collect();
        assert_eq!(captions, vec!["post 5", "post 4", "post 3", "post 2", "post 1"]);

        let newest = store.newest_post(&target.url).await.unwrap().unwrap();
        assert_eq!(newest.caption, "post 5");
    }

    #[tokio::test]
    async fn duplicate_identities_are_ignored() {
        let (store, _dir) = setup_test_db().await;
        let target = page();

        let v1 = store.upsert_channel(&ChannelMeta::for_visit(&target, 1)).await.unwrap();
        assert_eq!(store.prepend_posts(&target.url, v1, &[post(1), post(2)]).await.unwrap(), 2);

        let v2 = store.upsert_channel(&ChannelMeta::for_visit(&target, 1)).await.unwrap();
        assert_eq!(store.prepend_posts(&target.url, v2, &[post(2), post(3)]).await.unwrap(), 1);

        let record = store.get_channel(&target.url).await.unwrap().unwrap();
        assert_eq!(record.posts.len(), 3);
        assert_eq!(record.posts[0].caption, "post 3");
    }

    #[tokio::test]
    async fn lists_channels_with_post_counts() {
        let (store, _dir) = setup_test_db().await;
        let acme = page();
        let other = TargetPage::new("https://www.facebook.com/profile.php?id=42");

        let v = store.upsert_channel(&ChannelMeta::for_visit(&acme, 100)).await.unwrap();
        store.prepend_posts(&acme.url, v, &[post(1), post(2)]).await.unwrap();
        store.upsert_channel(&ChannelMeta::for_visit(&other, 7)).await.unwrap();

        let channels = store.list_channels().await.unwrap();
        assert_eq!(channels.len(), 2);

        let acme_summary = channels.iter().find(|c| c.url == acme.url).unwrap();
        assert_eq!(acme_summary.post_count, 2);
        assert_eq!(acme_summary.followers, 100);

        let other_summary = channels.iter().find(|c| c.handle == "42").unwrap();
        assert_eq!(other_summary.post_count, 0);
    }

    #[tokio::test]
    async fn missing_channel_reads_as_none() {
        let (store, _dir) = setup_test_db().await;
        assert!(store.get_channel("https://nowhere").await.unwrap().is_none());
        assert!(store.newest_post("https://nowhere").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn round_trips_post_fields() {
        let (store, _dir) = setup_test_db().await;
        let target = page();
        let v = store.upsert_channel(&ChannelMeta::for_visit(&target, 1)).await.unwrap();

        let mut reel = Post::new("clip").with_url("https://www.facebook.com/reel/9");
        reel.likes = 1200;
        reel.comments = 3;
        reel.shares = 2;
        reel.views = 45_000;
        store.prepend_posts(&target.url, v, std::slice::from_ref(&reel)).await.unwrap();

        let newest = store.newest_post(&target.url).await.unwrap().unwrap();
        assert_eq!(newest, reel);
    }
}
