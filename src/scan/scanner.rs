//! Incremental scanner: scroll, collect, stop.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use tracing::{debug, info, warn};

use super::{Checkpoint, FeedSurface};
use crate::config::ScanConfig;
use crate::error::HarvestError;
use crate::models::Post;
use crate::store::{self, ChannelStore};

/// Why a scan ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Reached the newest post stored by an earlier visit.
    CheckpointHit,
    /// Saw `stale_limit` consecutive posts older than the cutoff.
    CutoffHit,
    /// The feed stopped growing at the bottom.
    StableBottom,
    /// Hit the configured step bound.
    StepLimit,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CheckpointHit => "checkpoint",
            Self::CutoffHit => "cutoff",
            Self::StableBottom => "stable_bottom",
            Self::StepLimit => "step_limit",
        }
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOutcome {
    pub stop: StopReason,
    pub steps: u32,
    /// Posts accepted into flush batches.
    pub accepted: usize,
    /// Posts the store actually inserted.
    pub persisted: usize,
    pub duplicates: usize,
    pub stale: usize,
    pub failed_flushes: usize,
}

/// Where accepted posts go.
pub struct FlushTarget<'a> {
    pub store: &'a dyn ChannelStore,
    pub channel_url: &'a str,
    pub visit: u64,
    pub timeout: Duration,
}

/// Drives a [`FeedSurface`] until a stop condition holds.
///
/// States: scanning, then one of checkpoint hit, cutoff hit, stable bottom,
/// or the step limit.
pub struct IncrementalScanner {
    config: ScanConfig,
    clock: fn() -> NaiveDateTime,
}

fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

impl IncrementalScanner {
    pub fn new(config: ScanConfig) -> Self {
        Self {
            config,
            clock: local_now,
        }
    }

    /// Use a fixed clock for relative dates and the cutoff.
    pub fn with_clock(mut self, clock: fn() -> NaiveDateTime) -> Self {
        self.clock = clock;
        self
    }

    pub fn now(&self) -> NaiveDateTime {
        (self.clock)()
    }

    /// Scan the feed, flushing accepted posts after every productive step.
    ///
    /// Surface errors end the scan and propagate; flush failures are logged
    /// and scanning continues.
    pub async fn scan(
        &self,
        surface: &dyn FeedSurface,
        checkpoint: &Checkpoint,
        target: &FlushTarget<'_>,
    ) -> Result<ScanOutcome, HarvestError> {
        let now = self.now();
        let cutoff = self.config.cutoff(now);
        let idle_limit = self.config.idle_steps.max(1);

        let mut seen: HashSet<String> = HashSet::new();
        let mut outcome = ScanOutcome {
            stop: StopReason::StepLimit,
            steps: 0,
            accepted: 0,
            persisted: 0,
            duplicates: 0,
            stale: 0,
            failed_flushes: 0,
        };
        let mut stale_run = 0u32;
        let mut idle = 0u32;
        let mut last_height: Option<u64> = None;
        let mut restabilized = false;

        debug!(
            page = target.channel_url,
            cutoff = %cutoff,
            checkpoint = checkpoint.url().unwrap_or("-"),
            "Scan starting"
        );

        while outcome.steps < self.config.max_steps {
            outcome.steps += 1;

            let state = surface
                .scroll_step(self.config.scroll_increment, self.config.bottom_margin)
                .await?;
            if let Err(e) = surface.dismiss_overlays().await {
                if e.is_session_fatal() {
                    return Err(e);
                }
                debug!("Overlay dismissal failed: {}", e);
            }
            tokio::time::sleep(self.config.settle()).await;

            let posts = surface.take_new_posts(now).await?;
            let discovered = posts.len();
            let mut batch: Vec<Post> = Vec::new();
            let mut stop = None;

            for post in posts {
                if !post.is_identifiable() {
                    continue;
                }
                if !seen.insert(post.identity().to_string()) {
                    outcome.duplicates += 1;
                    continue;
                }
                if checkpoint.matches(&post) {
                    stop = Some(StopReason::CheckpointHit);
                    break;
                }
                match post.timestamp() {
                    Some(ts) if ts < cutoff => {
                        outcome.stale += 1;
                        stale_run += 1;
                        if stale_run >= self.config.stale_limit {
                            stop = Some(StopReason::CutoffHit);
                            break;
                        }
                        continue;
                    }
                    Some(_) => stale_run = 0,
                    None => {}
                }
                batch.push(post);
            }

            if !batch.is_empty() {
                outcome.accepted += batch.len();
                match store::with_timeout(
                    target.timeout,
                    target.store.prepend_posts(target.channel_url, target.visit, &batch),
                )
                .await
                {
                    Ok(inserted) => outcome.persisted += inserted,
                    Err(e) => {
                        outcome.failed_flushes += 1;
                        warn!(
                            page = target.channel_url,
                            posts = batch.len(),
                            "Flush failed: {}",
                            e
                        );
                    }
                }
            }

            if let Some(stop) = stop {
                outcome.stop = stop;
                return Ok(self.finish(target, outcome));
            }

            if discovered == 0 && state.at_bottom && last_height == Some(state.height) {
                idle += 1;
            } else {
                idle = 0;
                if discovered > 0 {
                    restabilized = false;
                }
            }
            last_height = Some(state.height);

            if idle >= idle_limit {
                if restabilized {
                    outcome.stop = StopReason::StableBottom;
                    return Ok(self.finish(target, outcome));
                }
                debug!(page = target.channel_url, "Feed idle at bottom, restabilizing");
                surface.restabilize().await?;
                restabilized = true;
                // One more idle step after the retry ends the scan.
                idle = idle_limit - 1;
            }
        }

        outcome.stop = StopReason::StepLimit;
        Ok(self.finish(target, outcome))
    }

    fn finish(&self, target: &FlushTarget<'_>, outcome: ScanOutcome) -> ScanOutcome {
        info!(
            page = target.channel_url,
            stop = %outcome.stop,
            steps = outcome.steps,
            appended = outcome.persisted,
            stale = outcome.stale,
            "Scan finished"
        );
        outcome
    }
}
