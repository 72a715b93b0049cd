//! Per-post metric extraction.
//!
//! The page serializes the subtree around each caption into a
//! [`CaptionSnapshot`]; [`MetricExtractor`] walks that subtree with the
//! [`StructuralLocator`] signatures. Extraction never fails: anything that
//! cannot be found stays at its default.

mod locator;

pub use locator::{LocatorConfig, LocatorError, StructuralLocator};

use std::sync::Arc;

use chrono::NaiveDateTime;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

use crate::models::{Post, PostType};
use crate::parse::{from_epoch, normalize_date, parse_count};
use crate::utils::{absolutize, canonicalize_url};

/// Attribute the page script puts on the caption inside a snapshot.
pub const ANCHOR_ATTRIBUTE: &str = "data-harvest-anchor";

/// One caption as serialized by the page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaptionSnapshot {
    /// Value of [`ANCHOR_ATTRIBUTE`] on the caption element.
    pub key: String,
    /// Rendered caption text.
    #[serde(default)]
    pub text: String,
    /// Outer HTML of the highest ancestor searched. `None` when the element
    /// was detached before it could be serialized.
    #[serde(default)]
    pub html: Option<String>,
}

/// Metrics recovered for one post.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostMetrics {
    pub likes: u64,
    pub comments: u64,
    pub shares: u64,
    pub views: u64,
    pub url: Option<String>,
    pub date: Option<String>,
    pub post_type: PostType,
}

impl PostMetrics {
    pub fn into_post(self, caption: impl Into<String>) -> Post {
        Post {
            caption: caption.into(),
            likes: self.likes,
            comments: self.comments,
            shares: self.shares,
            views: self.views,
            url: self.url,
            posted_at: self.date,
            post_type: self.post_type,
        }
    }
}

/// Recovers engagement metrics from caption snapshots.
#[derive(Clone)]
pub struct MetricExtractor {
    locator: Arc<StructuralLocator>,
    base_url: String,
}

impl MetricExtractor {
    /// `base_url` resolves relative permalinks.
    pub fn new(locator: Arc<StructuralLocator>, base_url: impl Into<String>) -> Self {
        Self {
            locator,
            base_url: base_url.into(),
        }
    }

    /// Build a post from a snapshot. Relative dates resolve against `now`.
    pub fn extract_post(&self, snapshot: &CaptionSnapshot, now: NaiveDateTime) -> Post {
        self.extract(snapshot, now).into_post(snapshot.text.trim())
    }

    /// Extract metrics around the snapshot's caption.
    ///
    /// Comments and shares carry no labels in the markup: the first two
    /// nonzero counts in the container are taken as comments, then shares.
    pub fn extract(&self, snapshot: &CaptionSnapshot, now: NaiveDateTime) -> PostMetrics {
        let Some(html) = snapshot.html.as_deref() else {
            return PostMetrics::default();
        };

        let fragment = Html::parse_fragment(html);
        let anchor_css = format!("[{}=\"{}\"]", ANCHOR_ATTRIBUTE, snapshot.key);
        let Ok(anchor_selector) = Selector::parse(&anchor_css) else {
            return PostMetrics::default();
        };
        let Some(caption) = fragment.select(&anchor_selector).next() else {
            return PostMetrics::default();
        };

        let ancestors: Vec<ElementRef<'_>> =
            caption.ancestors().filter_map(ElementRef::wrap).collect();
        let config = self.locator.config();

        let mut metrics = PostMetrics::default();

        let mut container = None;
        for ancestor in ancestors.iter().take(config.likes_depth) {
            let likes = ancestor
                .select(&self.locator.likes)
                .map(|el| parse_count(&element_text(el)))
                .find(|n| *n > 0);
            if let Some(likes) = likes {
                metrics.likes = likes;
                container = Some(*ancestor);
                break;
            }
        }

        let link = self.find_link(&ancestors, now);
        metrics.url = link.url;
        metrics.date = link.date;

        let container = container.or(link.holder);
        if let Some(container) = container {
            let mut counts = container
                .select(&self.locator.comments_or_shares)
                .map(|el| parse_count(&element_text(el)))
                .filter(|n| *n > 0);
            metrics.comments = counts.next().unwrap_or(0);
            metrics.shares = counts.next().unwrap_or(0);

            if metrics.date.is_none() {
                metrics.date = self.legacy_date(container, now);
            }

            metrics.views = self.find_views(container);
        }

        metrics.post_type = metrics
            .url
            .as_deref()
            .map(PostType::from_url)
            .unwrap_or_default();
        if metrics.views > 0 && metrics.post_type == PostType::Post {
            metrics.post_type = PostType::Video;
        }

        metrics
    }

    fn find_link<'a>(&self, ancestors: &[ElementRef<'a>], now: NaiveDateTime) -> LinkMatch<'a> {
        let config = self.locator.config();
        let mut found = LinkMatch::default();
        let mut label = None;

        for ancestor in ancestors.iter().take(config.link_depth) {
            if found.date.is_none() {
                found.date = self.embedded_timestamp(*ancestor);
            }

            if found.url.is_none() {
                let candidates: Vec<(ElementRef<'a>, &str)> = ancestor
                    .select(&self.locator.anchors)
                    .filter_map(|a| a.value().attr("href").map(|href| (a, href)))
                    .filter(|(_, href)| self.locator.is_permalink(href))
                    .collect();

                let chosen = candidates
                    .iter()
                    .find(|(_, href)| !self.locator.is_comment_link(href))
                    .or_else(|| candidates.first());

                if let Some((anchor, href)) = chosen {
                    if let Some(absolute) = absolutize(&self.base_url, href) {
                        found.url = Some(canonicalize_url(&absolute));
                        found.holder = Some(*ancestor);
                        label = anchor_label(*anchor);
                    }
                }
            }

            // Levels above the permalink holder may hold neighbouring posts.
            if found.url.is_some() {
                break;
            }
        }

        if found.date.is_none() {
            found.date = label.map(|l| normalize_date(&l, now));
        }
        found
    }

    fn embedded_timestamp(&self, element: ElementRef<'_>) -> Option<String> {
        for attr in self.locator.timestamp_attributes() {
            if let Some(ts) = element.value().attr(attr).and_then(epoch_attr) {
                return Some(ts);
            }
        }

        if let Some(selector) = &self.locator.timestamp_elements {
            for el in element.select(selector) {
                for attr in self.locator.timestamp_attributes() {
                    if let Some(ts) = el.value().attr(attr).and_then(epoch_attr) {
                        return Some(ts);
                    }
                }
            }
        }

        let pattern = self.locator.timestamp_json.as_ref()?;
        let html = element.html();
        let caps = pattern.captures(&html)?;
        caps[1].parse::<i64>().ok().and_then(from_epoch)
    }

    fn legacy_date(&self, container: ElementRef<'_>, now: NaiveDateTime) -> Option<String> {
        let el = container.select(&self.locator.legacy_time).next()?;
        if let Some(ts) = self
            .locator
            .timestamp_attributes()
            .iter()
            .find_map(|attr| el.value().attr(attr).and_then(epoch_attr))
        {
            return Some(ts);
        }
        let raw = el
            .value()
            .attr("title")
            .map(str::to_string)
            .unwrap_or_else(|| element_text(el));
        let raw = raw.trim();
        (!raw.is_empty()).then(|| normalize_date(raw, now))
    }

    /// First nonzero view count in the container or the few ancestors above it.
    fn find_views(&self, container: ElementRef<'_>) -> u64 {
        let levels = std::iter::once(container).chain(
            container
                .ancestors()
                .filter_map(ElementRef::wrap)
                .take(self.locator.config().views_depth),
        );

        for level in levels {
            let mut sources = vec![element_text(level)];
            sources.extend(
                level
                    .select(&self.locator.aria_labelled)
                    .filter_map(|el| el.value().attr("aria-label"))
                    .map(str::to_string),
            );

            for source in &sources {
                for caps in self.locator.views.captures_iter(source) {
                    let views = parse_count(&caps[1]);
                    if views > 0 {
                        return views;
                    }
                }
            }
        }
        0
    }
}

#[derive(Default)]
struct LinkMatch<'a> {
    url: Option<String>,
    date: Option<String>,
    holder: Option<ElementRef<'a>>,
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ")
}

fn anchor_label(anchor: ElementRef<'_>) -> Option<String> {
    anchor
        .value()
        .attr("aria-label")
        .map(str::to_string)
        .or_else(|| Some(element_text(anchor)))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn epoch_attr(value: &str) -> Option<String> {
    value.trim().parse::<i64>().ok().and_then(from_epoch)
}
