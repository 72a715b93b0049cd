//! Configuration for the harvester.
//!
//! Settings come from a TOML file (`harvest.toml` by default). Every section
//! is optional and falls back to defaults; a few values can be overridden
//! from the environment (see [`Settings::with_env_overrides`]).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::browser::BrowserEngineConfig;
use crate::extract::{LocatorConfig, LocatorError, StructuralLocator};
use crate::models::TargetPage;

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILENAME: &str = "harvest.toml";

/// Default database filename.
pub const DEFAULT_DATABASE_FILENAME: &str = "harvest.db";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid locator: {0}")]
    Locator(#[from] LocatorError),

    #[error("{0}")]
    Invalid(String),
}

/// Session bootstrap settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Page loaded before cookies are injected.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Cookie whose presence proves an authenticated session.
    #[serde(default = "default_identity_cookie")]
    pub identity_cookie: String,

    /// Parent domain every injected cookie is scoped to.
    #[serde(default = "default_cookie_domain")]
    pub cookie_domain: String,

    /// Pause after each reload, in milliseconds.
    #[serde(default = "default_session_settle_ms")]
    pub settle_ms: u64,
}

fn default_base_url() -> String {
    "https://www.facebook.com/".to_string()
}

fn default_identity_cookie() -> String {
    "c_user".to_string()
}

fn default_cookie_domain() -> String {
    ".facebook.com".to_string()
}

fn default_session_settle_ms() -> u64 {
    2_000
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            identity_cookie: default_identity_cookie(),
            cookie_domain: default_cookie_domain(),
            settle_ms: default_session_settle_ms(),
        }
    }
}

impl SessionConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

/// Incremental scan settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Pixels scrolled per step.
    #[serde(default = "default_scroll_increment")]
    pub scroll_increment: u32,

    /// Distance from the bottom at which a step jumps straight to the end.
    #[serde(default = "default_bottom_margin")]
    pub bottom_margin: u32,

    /// Pause after each scroll step, in milliseconds.
    #[serde(default = "default_scan_settle_ms")]
    pub settle_ms: u64,

    /// Consecutive idle steps at the bottom before the feed counts as exhausted.
    #[serde(default = "default_idle_steps")]
    pub idle_steps: u32,

    /// Consecutive posts older than the cutoff before scanning stops.
    #[serde(default = "default_stale_limit")]
    pub stale_limit: u32,

    /// Absolute cutoff date (`YYYY-MM-DD`). Takes precedence over `max_age_days`.
    #[serde(default)]
    pub cutoff_date: Option<NaiveDate>,

    /// Relative cutoff in days when no absolute date is set.
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u32,

    /// Safety bound on scroll steps per page visit.
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
}

fn default_scroll_increment() -> u32 {
    1_200
}

fn default_bottom_margin() -> u32 {
    1_500
}

fn default_scan_settle_ms() -> u64 {
    1_500
}

fn default_idle_steps() -> u32 {
    8
}

fn default_stale_limit() -> u32 {
    5
}

fn default_max_age_days() -> u32 {
    90
}

fn default_max_steps() -> u32 {
    500
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            scroll_increment: default_scroll_increment(),
            bottom_margin: default_bottom_margin(),
            settle_ms: default_scan_settle_ms(),
            idle_steps: default_idle_steps(),
            stale_limit: default_stale_limit(),
            cutoff_date: None,
            max_age_days: default_max_age_days(),
            max_steps: default_max_steps(),
        }
    }
}

impl ScanConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    /// Cutoff for a scan starting at `now`.
    pub fn cutoff(&self, now: NaiveDateTime) -> NaiveDateTime {
        match self.cutoff_date.and_then(|d| d.and_hms_opt(0, 0, 0)) {
            Some(cutoff) => cutoff,
            None => now - chrono::Duration::days(i64::from(self.max_age_days)),
        }
    }

    /// Cutoff for a scan starting now.
    pub fn cutoff_now(&self) -> NaiveDateTime {
        self.cutoff(Local::now().naive_local())
    }
}

/// Worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Number of parallel browser sessions.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Pages processed before a session is closed and reopened.
    #[serde(default = "default_recycle_every")]
    pub recycle_every: usize,

    #[serde(default = "default_auth_attempts")]
    pub auth_attempts: u32,

    /// Base delay between authentication attempts, in seconds. Attempt `n`
    /// waits `n * auth_backoff`.
    #[serde(default = "default_auth_backoff")]
    pub auth_backoff: u64,

    /// Timeout for a single store call, in seconds.
    #[serde(default = "default_store_timeout")]
    pub store_timeout: u64,
}

fn default_workers() -> usize {
    1
}

fn default_recycle_every() -> usize {
    10
}

fn default_auth_attempts() -> u32 {
    3
}

fn default_auth_backoff() -> u64 {
    5
}

fn default_store_timeout() -> u64 {
    10
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            recycle_every: default_recycle_every(),
            auth_attempts: default_auth_attempts(),
            auth_backoff: default_auth_backoff(),
            store_timeout: default_store_timeout(),
        }
    }
}

impl SupervisorConfig {
    pub fn auth_backoff(&self) -> Duration {
        Duration::from_secs(self.auth_backoff)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout)
    }
}

/// Application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Pages to harvest, in any URL form; canonicalized on use.
    #[serde(default)]
    pub targets: Vec<String>,

    /// SQLite database path.
    #[serde(default = "default_database")]
    pub database: PathBuf,

    /// Exported cookie file used to authenticate sessions.
    #[serde(default = "default_credentials")]
    pub credentials: PathBuf,

    #[serde(default)]
    pub browser: BrowserEngineConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub scan: ScanConfig,

    #[serde(default)]
    pub supervisor: SupervisorConfig,

    #[serde(default)]
    pub locator: LocatorConfig,
}

fn default_database() -> PathBuf {
    PathBuf::from(DEFAULT_DATABASE_FILENAME)
}

fn default_credentials() -> PathBuf {
    PathBuf::from("cookies.json")
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            database: default_database(),
            credentials: default_credentials(),
            browser: BrowserEngineConfig::default(),
            session: SessionConfig::default(),
            scan: ScanConfig::default(),
            supervisor: SupervisorConfig::default(),
            locator: LocatorConfig::default(),
        }
    }
}

impl Settings {
    /// Load settings from `path`, or from `harvest.toml` in the working
    /// directory when it exists, then apply environment overrides and
    /// validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let settings = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILENAME);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };

        let settings = settings.with_env_overrides();
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply overrides from environment variables.
    ///
    /// - `HARVEST_DATABASE`: database path
    /// - `HARVEST_CREDENTIALS`: cookie bundle path
    /// - `HARVEST_WORKERS`: worker count
    /// - `BROWSER_URL`, `SOCKS_PROXY`: see [`BrowserEngineConfig`]
    pub fn with_env_overrides(mut self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok());
        self
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(db) = lookup("HARVEST_DATABASE").filter(|s| !s.is_empty()) {
            self.database = PathBuf::from(db);
        }
        if let Some(creds) = lookup("HARVEST_CREDENTIALS").filter(|s| !s.is_empty()) {
            self.credentials = PathBuf::from(creds);
        }
        if let Some(workers) = lookup("HARVEST_WORKERS").and_then(|s| s.parse().ok()) {
            self.supervisor.workers = workers;
        }
        self.browser.apply_overrides(lookup);
    }

    /// Check value ranges and compile the locator once so bad selectors
    /// fail at startup rather than mid-run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.supervisor.workers == 0 {
            return Err(ConfigError::Invalid("supervisor.workers must be at least 1".into()));
        }
        if self.supervisor.recycle_every == 0 {
            return Err(ConfigError::Invalid(
                "supervisor.recycle_every must be at least 1".into(),
            ));
        }
        if self.supervisor.auth_attempts == 0 {
            return Err(ConfigError::Invalid(
                "supervisor.auth_attempts must be at least 1".into(),
            ));
        }
        if self.scan.stale_limit == 0 {
            return Err(ConfigError::Invalid("scan.stale_limit must be at least 1".into()));
        }
        if self.scan.scroll_increment == 0 || self.scan.max_steps == 0 {
            return Err(ConfigError::Invalid(
                "scan.scroll_increment and scan.max_steps must be positive".into(),
            ));
        }
        StructuralLocator::new(&self.locator)?;
        Ok(())
    }

    /// Configured targets, canonicalized and deduplicated in order.
    pub fn target_pages(&self) -> Vec<TargetPage> {
        let mut pages: Vec<TargetPage> = Vec::new();
        for raw in &self.targets {
            let page = TargetPage::new(raw);
            if !pages.iter().any(|p| p.url == page.url) {
                pages.push(page);
            }
        }
        pages
    }
}
