//! Structural signatures used to find metrics around a caption.
//!
//! The platform's markup has no semantic labels for counts, so everything
//! here is positional or class-based and expected to drift. All of it is
//! configurable under `[locator]`.

use regex::Regex;
use scraper::Selector;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LocatorError {
    #[error("bad selector for {field}: {message}")]
    Selector { field: &'static str, message: String },

    #[error("bad pattern for {field}: {source}")]
    Pattern {
        field: &'static str,
        source: regex::Error,
    },
}

/// Raw locator settings as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    /// Post caption elements; each is one post's anchor.
    pub caption: String,
    /// Elements carrying the like count.
    pub likes: String,
    /// Elements carrying comment and share counts, in that order.
    pub comments_or_shares: String,
    /// Regex an anchor's href must match to count as a permalink.
    pub permalink: String,
    /// Hrefs containing this are never permalinks.
    pub permalink_exclude: String,
    /// Query marker identifying comment permalinks.
    pub comment_marker: String,
    pub timestamp_attributes: Vec<String>,
    /// Keys of embedded JSON fragments holding an epoch timestamp.
    pub timestamp_json_keys: Vec<String>,
    /// Old-style time element, used as a last resort for the date.
    pub legacy_time: String,
    /// Regex whose first group is the view count.
    pub views: String,
    /// Close buttons of login walls and cookie dialogs.
    pub overlay_close: String,
    /// Link whose text holds the page's follower count.
    pub follower_link: String,
    pub likes_depth: usize,
    pub link_depth: usize,
    /// Ancestors above the container searched for a view count.
    pub views_depth: usize,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            caption: r#"div[data-ad-preview="message"], div[data-ad-comet-preview="message"]"#
                .to_string(),
            likes: "span.x1e558r4".to_string(),
            comments_or_shares: r#"div[role="button"] span.x193iq5w"#.to_string(),
            permalink: r"/(?:posts|videos|photos|photo|reel|permalink)[/.]|/watch/?\?|story_fbid="
                .to_string(),
            permalink_exclude: "/hashtag/".to_string(),
            comment_marker: "comment_id".to_string(),
            timestamp_attributes: vec!["data-utime".to_string(), "data-timestamp".to_string()],
            timestamp_json_keys: vec!["publish_time".to_string(), "creation_time".to_string()],
            legacy_time: "abbr".to_string(),
            views: r"(?i)([\d.,]+\s*[KMB]?)\s*views?\b".to_string(),
            overlay_close: r#"div[role="dialog"] div[aria-label="Close"], div[aria-label="Close"][role="button"]"#
                .to_string(),
            follower_link: r#"a[href*="followers"]"#.to_string(),
            likes_depth: 10,
            link_depth: 15,
            views_depth: 3,
        }
    }
}

/// Compiled form of [`LocatorConfig`].
#[derive(Debug)]
pub struct StructuralLocator {
    pub(crate) likes: Selector,
    pub(crate) comments_or_shares: Selector,
    pub(crate) anchors: Selector,
    pub(crate) aria_labelled: Selector,
    pub(crate) timestamp_elements: Option<Selector>,
    pub(crate) legacy_time: Selector,
    pub(crate) permalink: Regex,
    pub(crate) timestamp_json: Option<Regex>,
    pub(crate) views: Regex,
    config: LocatorConfig,
}

fn selector(field: &'static str, css: &str) -> Result<Selector, LocatorError> {
    Selector::parse(css).map_err(|e| LocatorError::Selector {
        field,
        message: e.to_string(),
    })
}

fn pattern(field: &'static str, re: &str) -> Result<Regex, LocatorError> {
    Regex::new(re).map_err(|source| LocatorError::Pattern { field, source })
}

impl StructuralLocator {
    pub fn new(config: &LocatorConfig) -> Result<Self, LocatorError> {
        // Selectors only evaluated in the page are still parsed here so typos
        // surface at startup.
        selector("caption", &config.caption)?;
        selector("overlay_close", &config.overlay_close)?;
        selector("follower_link", &config.follower_link)?;

        let timestamp_elements = if config.timestamp_attributes.is_empty() {
            None
        } else {
            let css = config
                .timestamp_attributes
                .iter()
                .map(|attr| format!("[{}]", attr))
                .collect::<Vec<_>>()
                .join(", ");
            Some(selector("timestamp_attributes", &css)?)
        };

        let timestamp_json = if config.timestamp_json_keys.is_empty() {
            None
        } else {
            let keys = config
                .timestamp_json_keys
                .iter()
                .map(|k| regex::escape(k))
                .collect::<Vec<_>>()
                .join("|");
            // Attribute-embedded JSON is serialized with escaped quotes.
            let re = format!(r#"(?:"|&quot;)(?:{})(?:"|&quot;)\s*:\s*(\d{{9,13}})"#, keys);
            Some(pattern("timestamp_json_keys", &re)?)
        };

        Ok(Self {
            likes: selector("likes", &config.likes)?,
            comments_or_shares: selector("comments_or_shares", &config.comments_or_shares)?,
            anchors: selector("anchors", "a[href]")?,
            aria_labelled: selector("aria_labelled", "[aria-label]")?,
            timestamp_elements,
            legacy_time: selector("legacy_time", &config.legacy_time)?,
            permalink: pattern("permalink", &config.permalink)?,
            timestamp_json,
            views: pattern("views", &config.views)?,
            config: config.clone(),
        })
    }

    pub fn config(&self) -> &LocatorConfig {
        &self.config
    }

    /// Whether `href` looks like a post permalink.
    pub fn is_permalink(&self, href: &str) -> bool {
        let exclude = &self.config.permalink_exclude;
        if !exclude.is_empty() && href.contains(exclude.as_str()) {
            return false;
        }
        self.permalink.is_match(href)
    }

    pub fn is_comment_link(&self, href: &str) -> bool {
        !self.config.comment_marker.is_empty() && href.contains(&self.config.comment_marker)
    }

    pub fn timestamp_attributes(&self) -> &[String] {
        &self.config.timestamp_attributes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_locator_compiles() {
        StructuralLocator::new(&LocatorConfig::default()).unwrap();
    }

    #[test]
    fn permalink_patterns() {
        let locator = StructuralLocator::new(&LocatorConfig::default()).unwrap();
        assert!(locator.is_permalink("https://www.facebook.com/acme/posts/pfbid02x"));
        assert!(locator.is_permalink("/acme/videos/123/"));
        assert!(locator.is_permalink("/photo.php?fbid=1"));
        assert!(locator.is_permalink("/reel/987"));
        assert!(locator.is_permalink("/watch/?v=55"));
        assert!(locator.is_permalink("/permalink.php?story_fbid=1&id=2"));
        assert!(!locator.is_permalink("/hashtag/posts/"));
        assert!(!locator.is_permalink("/acme/about"));
    }

    #[test]
    fn comment_marker() {
        let locator = StructuralLocator::new(&LocatorConfig::default()).unwrap();
        assert!(locator.is_comment_link("/acme/posts/1?comment_id=9"));
        assert!(!locator.is_comment_link("/acme/posts/1"));
    }

    #[test]
    fn invalid_selector_is_reported_with_field() {
        let config = LocatorConfig {
            likes: "span[[".to_string(),
            ..Default::default()
        };
        match StructuralLocator::new(&config) {
            Err(LocatorError::Selector { field, .. }) => assert_eq!(field, "likes"),
            other => panic!("expected selector error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let config = LocatorConfig {
            views: "(unclosed".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            StructuralLocator::new(&config),
            Err(LocatorError::Pattern { field: "views", .. })
        ));
    }
}
