//! One full pass over one page.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::browser::BrowserSession;
use crate::config::{ConfigError, Settings};
use crate::error::HarvestError;
use crate::extract::{MetricExtractor, StructuralLocator};
use crate::models::{ChannelMeta, TargetPage};
use crate::scan::{
    BrowserFeed, Checkpoint, FeedScripts, FeedSurface, FlushTarget, IncrementalScanner,
    ScanOutcome,
};
use crate::store::{self, ChannelStore};

/// What one page visit produced.
#[derive(Debug, Clone)]
pub struct PageReport {
    pub url: String,
    pub handle: String,
    pub followers: u64,
    pub visit: u64,
    pub scan: ScanOutcome,
}

/// Harvests a single page over an already authenticated session.
#[async_trait]
pub trait PageHarvester: Send + Sync {
    async fn harvest(
        &self,
        session: &dyn BrowserSession,
        target: &TargetPage,
    ) -> Result<PageReport, HarvestError>;
}

/// Navigate, refresh channel metadata, read the checkpoint, scan.
pub struct PageHarvestController {
    store: Arc<dyn ChannelStore>,
    extractor: MetricExtractor,
    scripts: FeedScripts,
    scanner: IncrementalScanner,
    /// Pause after navigation before reading the page.
    settle: Duration,
    store_timeout: Duration,
}

impl PageHarvestController {
    pub fn new(
        store: Arc<dyn ChannelStore>,
        extractor: MetricExtractor,
        scripts: FeedScripts,
        scanner: IncrementalScanner,
    ) -> Self {
        Self {
            store,
            extractor,
            scripts,
            scanner,
            settle: Duration::from_secs(2),
            store_timeout: Duration::from_secs(10),
        }
    }

    /// Build a controller from loaded settings.
    pub fn from_settings(
        settings: &Settings,
        store: Arc<dyn ChannelStore>,
    ) -> Result<Self, ConfigError> {
        let locator = StructuralLocator::new(&settings.locator)?;
        let extractor = MetricExtractor::new(Arc::new(locator), settings.session.base_url.clone());
        let scripts = FeedScripts::new(&settings.locator);
        let scanner = IncrementalScanner::new(settings.scan.clone());

        Ok(Self::new(store, extractor, scripts, scanner)
            .with_settle(settings.session.settle())
            .with_store_timeout(settings.supervisor.store_timeout()))
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn with_scanner(mut self, scanner: IncrementalScanner) -> Self {
        self.scanner = scanner;
        self
    }

    async fn checkpoint(&self, url: &str) -> Checkpoint {
        match store::with_timeout(self.store_timeout, self.store.newest_post(url)).await {
            Ok(newest) => Checkpoint::from_newest(newest.as_ref()),
            Err(e) => {
                // Without a checkpoint the scan runs to the cutoff; the
                // identity index still keeps the record duplicate-free.
                warn!(page = url, "Could not read checkpoint: {}", e);
                Checkpoint::empty()
            }
        }
    }
}

#[async_trait]
impl PageHarvester for PageHarvestController {
    async fn harvest(
        &self,
        session: &dyn BrowserSession,
        target: &TargetPage,
    ) -> Result<PageReport, HarvestError> {
        info!(page = %target.url, "Harvesting page");
        session.navigate(&target.url).await?;
        tokio::time::sleep(self.settle).await;

        let feed = BrowserFeed::new(session, &self.extractor, &self.scripts, self.settle);
        if let Err(e) = feed.dismiss_overlays().await {
            if e.is_session_fatal() {
                return Err(e);
            }
            debug!(page = %target.url, "Overlay dismissal failed: {}", e);
        }

        let followers = match feed.follower_count().await {
            Ok(n) => n,
            Err(e) if e.is_session_fatal() => return Err(e),
            Err(e) => {
                debug!(page = %target.url, "Follower count unavailable: {}", e);
                0
            }
        };

        let meta = ChannelMeta::for_visit(target, followers);
        let visit =
            store::with_timeout(self.store_timeout, self.store.upsert_channel(&meta)).await?;

        let checkpoint = self.checkpoint(&target.url).await;
        let flush = FlushTarget {
            store: self.store.as_ref(),
            channel_url: &target.url,
            visit,
            timeout: self.store_timeout,
        };
        let scan = self.scanner.scan(&feed, &checkpoint, &flush).await?;

        info!(
            page = %target.url,
            handle = %target.handle,
            followers,
            appended = scan.persisted,
            stop = %scan.stop,
            "Page harvested"
        );

        Ok(PageReport {
            url: target.url.clone(),
            handle: target.handle.clone(),
            followers,
            visit,
            scan,
        })
    }
}
