//! Post model and post-type classification.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::parse::dates::parse_canonical;

/// Kind of post, inferred from its permalink shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostType {
    #[default]
    Post,
    Video,
    Reel,
}

impl PostType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Video => "video",
            Self::Reel => "reel",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "post" => Some(Self::Post),
            "video" => Some(Self::Video),
            "reel" => Some(Self::Reel),
            _ => None,
        }
    }

    /// Classify a permalink purely by its shape.
    pub fn from_url(url: &str) -> Self {
        if url.contains("/reel/") {
            Self::Reel
        } else if url.contains("/videos/") || url.contains("/watch") {
            Self::Video
        } else {
            Self::Post
        }
    }
}

impl std::fmt::Display for PostType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One harvested post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub caption: String,
    pub likes: u64,
    pub comments: u64,
    pub shares: u64,
    pub views: u64,
    /// Canonical permalink (query stripped).
    pub url: Option<String>,
    /// Canonical timestamp, or the raw platform string when it could not be
    /// normalized.
    pub posted_at: Option<String>,
    pub post_type: PostType,
}

impl Post {
    /// Create a post with only a caption; metrics default to zero.
    pub fn new(caption: impl Into<String>) -> Self {
        Self {
            caption: caption.into(),
            likes: 0,
            comments: 0,
            shares: 0,
            views: 0,
            url: None,
            posted_at: None,
            post_type: PostType::Post,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.post_type = PostType::from_url(&url);
        self.url = Some(url);
        self
    }

    pub fn with_posted_at(mut self, posted_at: impl Into<String>) -> Self {
        self.posted_at = Some(posted_at.into());
        self
    }

    /// Identity used for deduplication: the permalink when known, else the
    /// raw caption. The caption fallback is weaker and may under-deduplicate.
    pub fn identity(&self) -> &str {
        match self.url.as_deref() {
            Some(url) if !url.is_empty() => url,
            _ => &self.caption,
        }
    }

    /// Whether the post carries anything usable as an identity.
    pub fn is_identifiable(&self) -> bool {
        !self.identity().trim().is_empty()
    }

    /// Parsed timestamp, if `posted_at` holds a canonical value.
    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        self.posted_at.as_deref().and_then(parse_canonical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_url_shape() {
        assert_eq!(PostType::from_url("https://fb.com/acme/reel/123"), PostType::Reel);
        assert_eq!(PostType::from_url("https://fb.com/acme/videos/123"), PostType::Video);
        assert_eq!(PostType::from_url("https://fb.com/watch/?v=1"), PostType::Video);
        assert_eq!(PostType::from_url("https://fb.com/acme/posts/pfbid1"), PostType::Post);
    }

    #[test]
    fn identity_prefers_url() {
        let post = Post::new("hello").with_url("https://fb.com/acme/posts/1");
        assert_eq!(post.identity(), "https://fb.com/acme/posts/1");

        let bare = Post::new("hello");
        assert_eq!(bare.identity(), "hello");

        assert!(!Post::new("  ").is_identifiable());
    }

    #[test]
    fn timestamp_only_for_canonical_dates() {
        let post = Post::new("x").with_posted_at("2025-07-03 10:00:00");
        assert!(post.timestamp().is_some());

        let raw = Post::new("x").with_posted_at("Sometime in spring");
        assert!(raw.timestamp().is_none());
    }
}
