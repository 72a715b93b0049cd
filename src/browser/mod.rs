//! Browser automation boundary.
//!
//! The harvesting engine only talks to [`BrowserSession`] and
//! [`SessionFactory`]. The Chrome DevTools implementation lives in
//! [`chrome`] and is compiled with the `browser` feature.

mod chrome;
mod config;
mod stealth;

pub use chrome::{ChromeSession, ChromeSessionFactory};
pub use config::{BrowserEngineConfig, BrowserEngineType, DEFAULT_USER_AGENT};
pub use stealth::{STEALTH_ARGS, STEALTH_SCRIPTS};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::HarvestError;

/// SameSite attribute of a cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    /// Parse the spellings found in exported cookie files
    /// ("lax", "no_restriction", "unspecified", ...).
    /// Unspecified and unrecognized values give `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "strict" => Some(Self::Strict),
            "lax" => Some(Self::Lax),
            "none" | "no_restriction" => Some(Self::None),
            _ => None,
        }
    }
}

/// A cookie as seen by or injected into a browser session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    /// Expiry as integer seconds since the epoch; `None` for session cookies.
    pub expires: Option<i64>,
    pub same_site: Option<SameSite>,
    pub secure: bool,
    pub http_only: bool,
}

impl SessionCookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: domain.into(),
            path: "/".to_string(),
            expires: None,
            same_site: None,
            secure: true,
            http_only: false,
        }
    }
}

/// One live, single-tab browser session.
///
/// Implementations must enforce their own navigation and script timeouts and
/// report them as [`HarvestError::Timeout`].
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Navigate to `url` and wait for the load to settle.
    async fn navigate(&self, url: &str) -> Result<(), HarvestError>;

    async fn reload(&self) -> Result<(), HarvestError>;

    /// Evaluate a script in the page and return its JSON result
    /// (`Null` for `undefined`).
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, HarvestError>;

    async fn cookies(&self) -> Result<Vec<SessionCookie>, HarvestError>;

    async fn clear_cookies(&self) -> Result<(), HarvestError>;

    async fn set_cookie(&self, cookie: &SessionCookie) -> Result<(), HarvestError>;

    /// Tear the session down. Errors are informational only.
    async fn close(&self) -> Result<(), HarvestError>;
}

/// Opens fresh browser sessions.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self) -> Result<Box<dyn BrowserSession>, HarvestError>;
}
