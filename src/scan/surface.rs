//! The scrollable feed as seen by the scanner.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::Deserialize;
use tracing::debug;

use super::FeedScripts;
use crate::browser::BrowserSession;
use crate::error::HarvestError;
use crate::extract::{CaptionSnapshot, MetricExtractor};
use crate::models::Post;
use crate::parse::parse_count;

/// Scroll position after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollState {
    pub height: u64,
    pub at_bottom: bool,
}

/// Operations the scanner needs from a loaded page feed.
#[async_trait]
pub trait FeedSurface: Send + Sync {
    /// Scroll by `increment` pixels, or to the end when within `margin` of it.
    async fn scroll_step(&self, increment: u32, margin: u32) -> Result<ScrollState, HarvestError>;

    async fn dismiss_overlays(&self) -> Result<(), HarvestError>;

    /// Posts whose captions appeared since the last call, in feed order.
    /// Each caption is returned at most once per page load.
    async fn take_new_posts(&self, now: NaiveDateTime) -> Result<Vec<Post>, HarvestError>;

    /// Nudge lazy loading: scroll up, wait, and return to the end.
    async fn restabilize(&self) -> Result<(), HarvestError>;

    /// Follower count from the page header, 0 when absent.
    async fn follower_count(&self) -> Result<u64, HarvestError>;
}

/// [`FeedSurface`] over a live browser session.
pub struct BrowserFeed<'a> {
    session: &'a dyn BrowserSession,
    extractor: &'a MetricExtractor,
    scripts: &'a FeedScripts,
    settle: Duration,
}

impl<'a> BrowserFeed<'a> {
    pub fn new(
        session: &'a dyn BrowserSession,
        extractor: &'a MetricExtractor,
        scripts: &'a FeedScripts,
        settle: Duration,
    ) -> Self {
        Self {
            session,
            extractor,
            scripts,
            settle,
        }
    }
}

#[async_trait]
impl FeedSurface for BrowserFeed<'_> {
    async fn scroll_step(&self, increment: u32, margin: u32) -> Result<ScrollState, HarvestError> {
        let value = self
            .session
            .evaluate(&self.scripts.scroll(increment, margin))
            .await?;
        serde_json::from_value(value)
            .map_err(|e| HarvestError::Script(format!("scroll state: {}", e)))
    }

    async fn dismiss_overlays(&self) -> Result<(), HarvestError> {
        let clicked = self.session.evaluate(self.scripts.dismiss()).await?;
        if clicked.as_u64().unwrap_or(0) > 0 {
            debug!(clicked = %clicked, "Dismissed overlays");
        }
        Ok(())
    }

    async fn take_new_posts(&self, now: NaiveDateTime) -> Result<Vec<Post>, HarvestError> {
        let value = self.session.evaluate(self.scripts.snapshot()).await?;
        let snapshots: Vec<CaptionSnapshot> = serde_json::from_value(value)
            .map_err(|e| HarvestError::Script(format!("caption snapshots: {}", e)))?;

        Ok(snapshots
            .iter()
            .map(|snapshot| self.extractor.extract_post(snapshot, now))
            .collect())
    }

    async fn restabilize(&self) -> Result<(), HarvestError> {
        self.session.evaluate(self.scripts.scroll_up()).await?;
        tokio::time::sleep(self.settle).await;
        self.session.evaluate(self.scripts.scroll_to_end()).await?;
        tokio::time::sleep(self.settle).await;
        Ok(())
    }

    async fn follower_count(&self) -> Result<u64, HarvestError> {
        let value = self.session.evaluate(self.scripts.followers()).await?;
        let texts: Vec<String> = serde_json::from_value(value).unwrap_or_default();
        Ok(texts
            .iter()
            .map(|t| parse_count(t))
            .find(|n| *n > 0)
            .unwrap_or(0))
    }
}
