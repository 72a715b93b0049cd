//! Diesel row types for the SQLite store.

use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::models::{ChannelSummary, Post, PostType};
use crate::schema;

/// Channel row from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::channels)]
#[diesel(primary_key(url))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ChannelRow {
    pub url: String,
    pub handle: String,
    pub followers: i64,
    pub visits: i64,
    pub last_scraped: Option<String>,
    pub created_at: String,
}

impl ChannelRow {
    pub fn into_summary(self, post_count: i64) -> ChannelSummary {
        ChannelSummary {
            url: self.url,
            handle: self.handle,
            followers: to_u64(self.followers),
            last_scraped: parse_datetime_opt(self.last_scraped),
            post_count: to_u64(post_count),
        }
    }
}

/// Post row from the database.
#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = schema::posts)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PostRow {
    pub caption: String,
    pub likes: i64,
    pub comments: i64,
    pub shares: i64,
    pub views: i64,
    pub url: Option<String>,
    pub posted_at: Option<String>,
    pub post_type: String,
}

impl From<PostRow> for Post {
    fn from(row: PostRow) -> Self {
        Post {
            caption: row.caption,
            likes: to_u64(row.likes),
            comments: to_u64(row.comments),
            shares: to_u64(row.shares),
            views: to_u64(row.views),
            url: row.url,
            posted_at: row.posted_at,
            post_type: PostType::from_str(&row.post_type).unwrap_or_default(),
        }
    }
}

/// New post for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::posts)]
pub struct NewPost<'a> {
    pub channel_url: &'a str,
    pub identity: &'a str,
    pub visit: i64,
    pub ordinal: i64,
    pub caption: &'a str,
    pub likes: i64,
    pub comments: i64,
    pub shares: i64,
    pub views: i64,
    pub url: Option<&'a str>,
    pub posted_at: Option<&'a str>,
    pub post_type: &'a str,
    pub inserted_at: &'a str,
}

impl<'a> NewPost<'a> {
    pub fn new(
        channel_url: &'a str,
        visit: i64,
        ordinal: i64,
        post: &'a Post,
        inserted_at: &'a str,
    ) -> Self {
        Self {
            channel_url,
            identity: post.identity(),
            visit,
            ordinal,
            caption: &post.caption,
            likes: to_i64(post.likes),
            comments: to_i64(post.comments),
            shares: to_i64(post.shares),
            views: to_i64(post.views),
            url: post.url.as_deref(),
            posted_at: post.posted_at.as_deref(),
            post_type: post.post_type.as_str(),
            inserted_at,
        }
    }
}

pub fn to_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

pub fn to_u64(n: i64) -> u64 {
    u64::try_from(n).unwrap_or(0)
}

/// Parse a datetime string from the database.
pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

pub fn parse_datetime_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    })
}
