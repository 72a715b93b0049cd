//! End-to-end harvesting scenarios over a scripted browser and SQLite.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::{json, Value};
use tempfile::tempdir;

use harvester::browser::{BrowserSession, SessionCookie};
use harvester::config::ScanConfig;
use harvester::extract::{LocatorConfig, MetricExtractor, StructuralLocator};
use harvester::harvest::{PageHarvestController, PageHarvester};
use harvester::models::{PostType, TargetPage};
use harvester::scan::{
    BrowserFeed, Checkpoint, FeedScripts, FlushTarget, IncrementalScanner, StopReason,
};
use harvester::store::{ChannelStore, SqliteChannelStore};
use harvester::HarvestError;

/// A page that reveals one batch of captions per snapshot call.
struct FeedPage {
    batches: Mutex<Vec<Value>>,
    followers: &'static str,
}

impl FeedPage {
    fn new(batches: Vec<Value>) -> Self {
        Self {
            batches: Mutex::new(batches),
            followers: "1.5K followers",
        }
    }
}

#[async_trait]
impl BrowserSession for FeedPage {
    async fn navigate(&self, _url: &str) -> Result<(), HarvestError> {
        Ok(())
    }

    async fn reload(&self) -> Result<(), HarvestError> {
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<Value, HarvestError> {
        if script.contains("const SELECTOR") {
            let mut batches = self.batches.lock().unwrap();
            return Ok(if batches.is_empty() {
                json!([])
            } else {
                batches.remove(0)
            });
        }
        if script.contains("atBottom") {
            return Ok(json!({"height": 5000, "atBottom": true}));
        }
        if script.contains("followers") {
            return Ok(json!([self.followers]));
        }
        Ok(json!(0))
    }

    async fn cookies(&self) -> Result<Vec<SessionCookie>, HarvestError> {
        Ok(Vec::new())
    }

    async fn clear_cookies(&self) -> Result<(), HarvestError> {
        Ok(())
    }

    async fn set_cookie(&self, _cookie: &SessionCookie) -> Result<(), HarvestError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), HarvestError> {
        Ok(())
    }
}

fn fixed_now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 7, 10)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

fn scan_config() -> ScanConfig {
    ScanConfig {
        settle_ms: 0,
        idle_steps: 2,
        cutoff_date: NaiveDate::from_ymd_opt(2025, 6, 1),
        ..Default::default()
    }
}

fn parts() -> (MetricExtractor, FeedScripts) {
    let config = LocatorConfig::default();
    let locator = StructuralLocator::new(&config).unwrap();
    (
        MetricExtractor::new(Arc::new(locator), "https://www.facebook.com/"),
        FeedScripts::new(&config),
    )
}

fn controller(store: Arc<dyn ChannelStore>) -> PageHarvestController {
    let (extractor, scripts) = parts();
    let scanner = IncrementalScanner::new(scan_config()).with_clock(fixed_now);
    PageHarvestController::new(store, extractor, scripts, scanner)
        .with_settle(Duration::ZERO)
        .with_store_timeout(Duration::from_secs(5))
}

/// One post as the snapshot script would serialize it.
fn post(key: u32, id: &str, day: u32, caption: &str, likes: &str) -> Value {
    json!({
        "key": key.to_string(),
        "text": caption,
        "html": format!(
            r#"<div class="post">
                 <a href="/acme/posts/{id}?__cft__=abc" aria-label="July {day}, 2025 at 9:30 AM">July {day}</a>
                 <div data-ad-preview="message" data-harvest-anchor="{key}">{caption}</div>
                 <div class="footer">
                   <span class="x1e558r4">{likes}</span>
                   <div role="button"><span class="x193iq5w">12</span></div>
                   <div role="button"><span class="x193iq5w">3</span></div>
                 </div>
               </div>"#
        ),
    })
}

/// A post with a permalink and date but no engagement markup.
fn bare_post(key: u32, id: &str, day: u32, caption: &str) -> Value {
    json!({
        "key": key.to_string(),
        "text": caption,
        "html": format!(
            r#"<div class="post">
                 <a href="/acme/posts/{id}" aria-label="July {day}, 2025 at 8:00 AM">July {day}</a>
                 <div data-ad-preview="message" data-harvest-anchor="{key}">{caption}</div>
               </div>"#
        ),
    })
}

fn three_posts() -> Vec<Value> {
    vec![
        json!([post(1, "p3", 3, "Third", "1.2K"), post(2, "p2", 2, "Second", "40")]),
        json!([post(3, "p1", 1, "First", "7")]),
    ]
}

async fn sqlite_store(dir: &tempfile::TempDir) -> Arc<SqliteChannelStore> {
    Arc::new(
        SqliteChannelStore::open(&dir.path().join("harvest.db"))
            .await
            .unwrap(),
    )
}

#[tokio::test]
async fn first_visit_stores_three_posts_newest_first() {
    let dir = tempdir().unwrap();
    let store = sqlite_store(&dir).await;
    let harvester = controller(store.clone());
    let target = TargetPage::new("https://www.facebook.com/acme");

    let report = harvester
        .harvest(&FeedPage::new(three_posts()), &target)
        .await
        .unwrap();
    assert_eq!(report.followers, 1500);
    assert_eq!(report.scan.persisted, 3);
    assert_eq!(report.scan.stop, StopReason::StableBottom);

    let record = store.get_channel(&target.url).await.unwrap().unwrap();
    assert_eq!(record.handle, "acme");
    assert_eq!(record.followers, 1500);
    assert!(record.last_scraped.is_some());

    let captions: Vec<_> = record.posts.iter().map(|p| p.caption.as_str()).collect();
    assert_eq!(captions, ["Third", "Second", "First"]);

    let newest = &record.posts[0];
    assert_eq!(newest.likes, 1200);
    assert_eq!(newest.comments, 12);
    assert_eq!(newest.shares, 3);
    assert_eq!(
        newest.url.as_deref(),
        Some("https://www.facebook.com/acme/posts/p3")
    );
    assert_eq!(newest.posted_at.as_deref(), Some("2025-07-03 09:30:00"));
    assert_eq!(newest.post_type, PostType::Post);
}

#[tokio::test]
async fn posts_without_metrics_are_stored_with_zero_counts() {
    let dir = tempdir().unwrap();
    let store = sqlite_store(&dir).await;
    let harvester = controller(store.clone());
    let target = TargetPage::new("https://www.facebook.com/acme");

    let batches = vec![json!([
        bare_post(1, "q3", 3, "Wednesday"),
        bare_post(2, "q2", 2, "Tuesday"),
        bare_post(3, "q1", 1, "Monday")
    ])];
    let report = harvester
        .harvest(&FeedPage::new(batches), &target)
        .await
        .unwrap();
    assert_eq!(report.scan.persisted, 3);

    let record = store.get_channel(&target.url).await.unwrap().unwrap();
    assert_eq!(record.followers, 1500);
    assert_eq!(record.posts.len(), 3);
    for post in &record.posts {
        assert_eq!((post.likes, post.comments, post.shares), (0, 0, 0));
        assert_eq!(post.views, 0);
        assert!(post.url.is_some());
    }
    let dates: Vec<_> = record
        .posts
        .iter()
        .filter_map(|p| p.posted_at.as_deref())
        .collect();
    assert_eq!(
        dates,
        [
            "2025-07-03 08:00:00",
            "2025-07-02 08:00:00",
            "2025-07-01 08:00:00"
        ]
    );
}

#[tokio::test]
async fn second_visit_stops_at_checkpoint_and_appends_nothing() {
    let dir = tempdir().unwrap();
    let store = sqlite_store(&dir).await;
    let harvester = controller(store.clone());
    let target = TargetPage::new("https://www.facebook.com/acme");

    harvester
        .harvest(&FeedPage::new(three_posts()), &target)
        .await
        .unwrap();
    let report = harvester
        .harvest(&FeedPage::new(three_posts()), &target)
        .await
        .unwrap();

    assert_eq!(report.scan.stop, StopReason::CheckpointHit);
    assert_eq!(report.scan.persisted, 0);
    assert_eq!(report.scan.steps, 1);

    let record = store.get_channel(&target.url).await.unwrap().unwrap();
    assert_eq!(record.posts.len(), 3);
}

#[tokio::test]
async fn new_posts_land_ahead_of_earlier_visits() {
    let dir = tempdir().unwrap();
    let store = sqlite_store(&dir).await;
    let harvester = controller(store.clone());
    let target = TargetPage::new("https://www.facebook.com/acme");

    harvester
        .harvest(&FeedPage::new(three_posts()), &target)
        .await
        .unwrap();

    let mut batches = vec![json!([
        post(1, "p5", 5, "Fifth", "2"),
        post(2, "p4", 4, "Fourth", "9")
    ])];
    batches.extend(three_posts());
    let report = harvester
        .harvest(&FeedPage::new(batches), &target)
        .await
        .unwrap();
    assert_eq!(report.scan.stop, StopReason::CheckpointHit);
    assert_eq!(report.scan.persisted, 2);

    let record = store.get_channel(&target.url).await.unwrap().unwrap();
    let captions: Vec<_> = record.posts.iter().map(|p| p.caption.as_str()).collect();
    assert_eq!(captions, ["Fifth", "Fourth", "Third", "Second", "First"]);
}

#[tokio::test]
async fn rescanning_without_checkpoint_is_idempotent() {
    let dir = tempdir().unwrap();
    let store = sqlite_store(&dir).await;
    let harvester = controller(store.clone());
    let target = TargetPage::new("https://www.facebook.com/acme");

    harvester
        .harvest(&FeedPage::new(three_posts()), &target)
        .await
        .unwrap();

    // Same feed scanned with no checkpoint: everything is seen, nothing stored.
    let (extractor, scripts) = parts();
    let page = FeedPage::new(three_posts());
    let feed = BrowserFeed::new(&page, &extractor, &scripts, Duration::ZERO);
    let flush = FlushTarget {
        store: store.as_ref(),
        channel_url: &target.url,
        visit: 2,
        timeout: Duration::from_secs(5),
    };
    let outcome = IncrementalScanner::new(scan_config())
        .with_clock(fixed_now)
        .scan(&feed, &Checkpoint::empty(), &flush)
        .await
        .unwrap();

    assert_eq!(outcome.accepted, 3);
    assert_eq!(outcome.persisted, 0);
    let record = store.get_channel(&target.url).await.unwrap().unwrap();
    assert_eq!(record.posts.len(), 3);
}

#[tokio::test]
async fn repeated_captions_within_a_visit_are_stored_once() {
    let dir = tempdir().unwrap();
    let store = sqlite_store(&dir).await;
    let harvester = controller(store.clone());
    let target = TargetPage::new("https://www.facebook.com/acme");

    // The feed re-renders the same post under a new element.
    let batches = vec![
        json!([post(1, "p3", 3, "Third", "1.2K")]),
        json!([post(2, "p3", 3, "Third", "1.2K"), post(3, "p2", 2, "Second", "40")]),
    ];
    let report = harvester
        .harvest(&FeedPage::new(batches), &target)
        .await
        .unwrap();
    assert_eq!(report.scan.duplicates, 1);
    assert_eq!(report.scan.persisted, 2);

    let record = store.get_channel(&target.url).await.unwrap().unwrap();
    let mut urls: Vec<_> = record.posts.iter().filter_map(|p| p.url.clone()).collect();
    let total = urls.len();
    urls.sort();
    urls.dedup();
    assert_eq!(urls.len(), total);
}

#[tokio::test]
async fn old_posts_end_the_scan_at_the_cutoff() {
    let dir = tempdir().unwrap();
    let store = sqlite_store(&dir).await;
    let harvester = controller(store.clone());
    let target = TargetPage::new("https://www.facebook.com/acme");

    let stale = |key: u32, day: u32| {
        json!({
            "key": key.to_string(),
            "text": format!("May post {}", day),
            "html": format!(
                r#"<div><a href="/acme/posts/m{day}" aria-label="May {day}, 2025">May {day}</a>
                   <div data-harvest-anchor="{key}">May post {day}</div></div>"#
            ),
        })
    };
    let batches = vec![
        json!([post(1, "p3", 3, "Third", "5")]),
        json!([stale(2, 9), stale(3, 8), stale(4, 7)]),
        json!([stale(5, 6), stale(6, 5), stale(7, 4)]),
    ];
    let report = harvester
        .harvest(&FeedPage::new(batches), &target)
        .await
        .unwrap();
    assert_eq!(report.scan.stop, StopReason::CutoffHit);
    assert_eq!(report.scan.stale, 5);
    assert_eq!(report.scan.persisted, 1);
}
