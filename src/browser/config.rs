//! Browser engine configuration types.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Realistic desktop Chrome user agent sent instead of the headless default.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Browser engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserEngineConfig {
    /// Browser engine type.
    #[serde(default)]
    pub engine: BrowserEngineType,

    /// Run in headless mode (default: true).
    /// Set to false for debugging or if headless detection is an issue.
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Proxy server URL (e.g., "socks5://127.0.0.1:1080").
    #[serde(default)]
    pub proxy: Option<String>,

    /// Remote Chrome DevTools URL (e.g., "ws://localhost:9222").
    /// If set, connects to existing browser instead of launching one.
    #[serde(default)]
    pub remote_url: Option<String>,

    /// Additional Chrome arguments.
    #[serde(default)]
    pub chrome_args: Vec<String>,

    /// User agent override. Defaults to [`DEFAULT_USER_AGENT`].
    #[serde(default)]
    pub user_agent: Option<String>,

    /// Page navigation timeout in seconds.
    #[serde(default = "default_navigation_timeout")]
    pub navigation_timeout: u64,

    /// Script execution timeout in seconds.
    #[serde(default = "default_script_timeout")]
    pub script_timeout: u64,

    /// Viewport width and height.
    #[serde(default = "default_window_size")]
    pub window_size: (u32, u32),
}

pub fn default_headless() -> bool {
    true
}

fn default_navigation_timeout() -> u64 {
    30
}

fn default_script_timeout() -> u64 {
    15
}

fn default_window_size() -> (u32, u32) {
    (1366, 900)
}

impl Default for BrowserEngineConfig {
    fn default() -> Self {
        Self {
            engine: BrowserEngineType::default(),
            headless: default_headless(),
            proxy: None,
            remote_url: None,
            chrome_args: Vec::new(),
            user_agent: None,
            navigation_timeout: default_navigation_timeout(),
            script_timeout: default_script_timeout(),
            window_size: default_window_size(),
        }
    }
}

impl BrowserEngineConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout)
    }

    pub fn script_timeout(&self) -> Duration {
        Duration::from_secs(self.script_timeout)
    }

    pub fn user_agent(&self) -> &str {
        self.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT)
    }

    /// Apply overrides from environment variables.
    ///
    /// - `BROWSER_URL`: remote Chrome DevTools URL
    /// - `SOCKS_PROXY`: proxy server for the browser
    pub fn with_env_overrides(mut self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok());
        self
    }

    pub(crate) fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("BROWSER_URL").filter(|s| !s.is_empty()) {
            self.remote_url = Some(url);
        }
        if let Some(proxy) = lookup("SOCKS_PROXY").filter(|s| !s.is_empty()) {
            self.proxy = Some(proxy);
        }
    }
}

/// Browser engine types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BrowserEngineType {
    /// Standard chromiumoxide with stealth patches (default).
    #[default]
    Stealth,

    /// No stealth patches (for debugging).
    Standard,
}
