//! Chrome DevTools Protocol sessions via chromiumoxide.

#[cfg(not(feature = "browser"))]
use async_trait::async_trait;

#[cfg(not(feature = "browser"))]
use super::{BrowserEngineConfig, BrowserSession, SessionCookie, SessionFactory};
#[cfg(not(feature = "browser"))]
use crate::error::HarvestError;

#[cfg(feature = "browser")]
pub use cdp::{ChromeSession, ChromeSessionFactory};

#[cfg(feature = "browser")]
mod cdp {
    use std::path::PathBuf;
    use std::time::{Duration, Instant};

    use async_trait::async_trait;
    use chromiumoxide::cdp::browser_protocol::network::{
        ClearBrowserCookiesParams, CookieParam, CookieSameSite, SetUserAgentOverrideParams,
        TimeSinceEpoch,
    };
    use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
    use chromiumoxide::error::CdpError;
    use chromiumoxide::{Browser, BrowserConfig, Page};
    use futures::StreamExt;
    use tokio::sync::Mutex;
    use tracing::{debug, info, warn};

    use super::super::{
        BrowserEngineConfig, BrowserEngineType, BrowserSession, SameSite, SessionCookie,
        SessionFactory, STEALTH_ARGS, STEALTH_SCRIPTS,
    };
    use crate::error::HarvestError;

    /// Common Chrome executable paths to check.
    const CHROME_PATHS: &[&str] = &[
        // Linux
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        // macOS
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
        "/opt/google/chrome/google-chrome",
    ];

    fn cdp_error(e: CdpError) -> HarvestError {
        match e {
            CdpError::Ws(_) | CdpError::ChannelSendError(_) | CdpError::NoResponse => {
                HarvestError::SessionLost(e.to_string())
            }
            other => HarvestError::Browser(other.to_string()),
        }
    }

    fn find_chrome() -> Result<PathBuf, HarvestError> {
        for path in CHROME_PATHS {
            let p = std::path::Path::new(path);
            if p.exists() {
                debug!("Found Chrome at: {}", path);
                return Ok(p.to_path_buf());
            }
        }

        for cmd in &[
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
        ] {
            if let Ok(path) = which::which(cmd) {
                debug!("Found Chrome in PATH: {}", path.display());
                return Ok(path);
            }
        }

        Err(HarvestError::Browser(
            "Chrome/Chromium not found. Install it or set BROWSER_URL to a remote DevTools endpoint"
                .to_string(),
        ))
    }

    /// Launches a dedicated Chrome per session, or attaches to a remote one.
    pub struct ChromeSessionFactory {
        config: BrowserEngineConfig,
    }

    impl ChromeSessionFactory {
        pub fn new(config: BrowserEngineConfig) -> Self {
            Self { config }
        }

        async fn launch(&self) -> Result<(Browser, bool), HarvestError> {
            if let Some(remote_url) = self.config.remote_url.as_deref() {
                return Ok((self.connect_remote(remote_url).await?, false));
            }

            info!("Launching browser (headless={})", self.config.headless);
            let chrome_path = find_chrome()?;

            let (width, height) = self.config.window_size;
            let mut builder = BrowserConfig::builder()
                .chrome_executable(chrome_path)
                .window_size(width, height)
                .request_timeout(self.config.navigation_timeout());

            // with_head means NOT headless
            if !self.config.headless {
                builder = builder.with_head();
            }
            if let Some(ref proxy) = self.config.proxy {
                builder = builder.arg(format!("--proxy-server={}", proxy));
            }
            if self.config.engine == BrowserEngineType::Stealth {
                for arg in STEALTH_ARGS {
                    builder = builder.arg(*arg);
                }
            }
            for arg in &self.config.chrome_args {
                builder = builder.arg(arg);
            }

            let config = builder.build().map_err(|e| {
                HarvestError::Browser(format!("Failed to build browser config: {}", e))
            })?;

            let (browser, handler) = Browser::launch(config).await.map_err(cdp_error)?;
            Ok((with_handler(browser, handler), true))
        }

        async fn connect_remote(&self, url: &str) -> Result<Browser, HarvestError> {
            info!("Connecting to remote browser at {}", url);

            // Get WebSocket URL from the /json/version endpoint
            let http_url = url
                .replace("ws://", "http://")
                .replace("wss://", "https://");
            let version_url = format!("{}/json/version", http_url.trim_end_matches('/'));

            let resp: serde_json::Value = reqwest::Client::new()
                .get(&version_url)
                .timeout(self.config.navigation_timeout())
                .send()
                .await
                .map_err(|e| HarvestError::Browser(format!("remote browser unreachable: {}", e)))?
                .json()
                .await
                .map_err(|e| HarvestError::Browser(format!("bad browser version info: {}", e)))?;

            let ws_url = resp
                .get("webSocketDebuggerUrl")
                .and_then(|v| v.as_str())
                .ok_or_else(|| {
                    HarvestError::Browser("No webSocketDebuggerUrl in response".to_string())
                })?;

            debug!("Connecting to WebSocket: {}", ws_url);
            let handler_config = chromiumoxide::handler::HandlerConfig {
                request_timeout: self.config.navigation_timeout(),
                ..Default::default()
            };
            let (browser, handler) = Browser::connect_with_config(ws_url, handler_config)
                .await
                .map_err(cdp_error)?;
            Ok(with_handler(browser, handler))
        }

        async fn prepare_page(&self, page: &Page) -> Result<(), HarvestError> {
            page.execute(SetUserAgentOverrideParams::new(
                self.config.user_agent().to_string(),
            ))
            .await
            .map_err(cdp_error)?;

            if self.config.engine == BrowserEngineType::Stealth {
                for script in STEALTH_SCRIPTS {
                    page.execute(AddScriptToEvaluateOnNewDocumentParams::new(
                        script.to_string(),
                    ))
                    .await
                    .map_err(cdp_error)?;
                }
            }
            Ok(())
        }
    }

    /// Drives the CDP handler on a background task; the browser is unusable
    /// once it stops.
    fn with_handler(browser: Browser, mut handler: chromiumoxide::Handler) -> Browser {
        tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });
        browser
    }

    #[async_trait]
    impl SessionFactory for ChromeSessionFactory {
        async fn open(&self) -> Result<Box<dyn BrowserSession>, HarvestError> {
            let (browser, owned) = self.launch().await?;
            let page = browser.new_page("about:blank").await.map_err(cdp_error)?;
            self.prepare_page(&page).await?;

            Ok(Box::new(ChromeSession {
                browser: Mutex::new(Some(browser)),
                page,
                owned,
                stealth: self.config.engine == BrowserEngineType::Stealth,
                navigation_timeout: self.config.navigation_timeout(),
                script_timeout: self.config.script_timeout(),
            }))
        }
    }

    /// One Chrome tab plus the browser that owns it.
    pub struct ChromeSession {
        browser: Mutex<Option<Browser>>,
        page: Page,
        /// Whether this session launched the browser (and may kill it).
        owned: bool,
        stealth: bool,
        navigation_timeout: Duration,
        script_timeout: Duration,
    }

    impl ChromeSession {
        async fn reapply_stealth(&self) {
            if !self.stealth {
                return;
            }
            for script in STEALTH_SCRIPTS {
                if let Err(e) = self.page.evaluate(script.to_string()).await {
                    // Fails during page transitions; the new-document hook still applies.
                    debug!("Stealth script re-apply skipped: {}", e);
                }
            }
        }

        async fn with_timeout<T, F>(
            &self,
            operation: &'static str,
            limit: Duration,
            fut: F,
        ) -> Result<T, HarvestError>
        where
            F: std::future::Future<Output = Result<T, CdpError>>,
        {
            let started = Instant::now();
            match tokio::time::timeout(limit, fut).await {
                Ok(result) => result.map_err(cdp_error),
                Err(_) => Err(HarvestError::timeout(operation, started.elapsed())),
            }
        }
    }

    #[async_trait]
    impl BrowserSession for ChromeSession {
        async fn navigate(&self, url: &str) -> Result<(), HarvestError> {
            debug!("Navigating to {}", url);
            self.with_timeout("navigation", self.navigation_timeout, async {
                self.page.goto(url).await?;
                self.page.wait_for_navigation().await?;
                Ok(())
            })
            .await?;
            self.reapply_stealth().await;
            Ok(())
        }

        async fn reload(&self) -> Result<(), HarvestError> {
            self.with_timeout("reload", self.navigation_timeout, async {
                self.page.reload().await?;
                Ok(())
            })
            .await?;
            self.reapply_stealth().await;
            Ok(())
        }

        async fn evaluate(&self, script: &str) -> Result<serde_json::Value, HarvestError> {
            let result = self
                .with_timeout(
                    "script",
                    self.script_timeout,
                    self.page.evaluate(script.to_string()),
                )
                .await?;
            Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
        }

        async fn cookies(&self) -> Result<Vec<SessionCookie>, HarvestError> {
            let cookies = self
                .with_timeout("cookies", self.script_timeout, self.page.get_cookies())
                .await?;
            Ok(cookies
                .into_iter()
                .map(|c| SessionCookie {
                    name: c.name,
                    value: c.value,
                    domain: c.domain,
                    path: c.path,
                    expires: (c.expires > 0.0).then_some(c.expires as i64),
                    same_site: c.same_site.map(|s| match s {
                        CookieSameSite::Strict => SameSite::Strict,
                        CookieSameSite::Lax => SameSite::Lax,
                        CookieSameSite::None => SameSite::None,
                    }),
                    secure: c.secure,
                    http_only: c.http_only,
                })
                .collect())
        }

        async fn clear_cookies(&self) -> Result<(), HarvestError> {
            self.with_timeout("clear cookies", self.script_timeout, async {
                self.page.execute(ClearBrowserCookiesParams::default()).await?;
                Ok(())
            })
            .await
        }

        async fn set_cookie(&self, cookie: &SessionCookie) -> Result<(), HarvestError> {
            let mut builder = CookieParam::builder()
                .name(cookie.name.clone())
                .value(cookie.value.clone())
                .domain(cookie.domain.clone())
                .path(cookie.path.clone())
                .secure(cookie.secure)
                .http_only(cookie.http_only);
            if let Some(expires) = cookie.expires {
                builder = builder.expires(TimeSinceEpoch::new(expires as f64));
            }
            if let Some(same_site) = cookie.same_site {
                builder = builder.same_site(match same_site {
                    SameSite::Strict => CookieSameSite::Strict,
                    SameSite::Lax => CookieSameSite::Lax,
                    SameSite::None => CookieSameSite::None,
                });
            }
            let param = builder.build().map_err(|e| {
                HarvestError::Browser(format!("Failed to build cookie {}: {}", cookie.name, e))
            })?;

            self.with_timeout("set cookie", self.script_timeout, async {
                self.page.set_cookie(param).await?;
                Ok(())
            })
            .await
        }

        async fn close(&self) -> Result<(), HarvestError> {
            let _ = self.page.clone().close().await;

            let mut guard = self.browser.lock().await;
            if let Some(mut browser) = guard.take() {
                if self.owned {
                    if let Err(e) = browser.close().await {
                        warn!("Failed to close browser cleanly: {}", e);
                    }
                    let _ = browser.wait().await;
                }
            }
            Ok(())
        }
    }
}

/// Stub for when browser feature is disabled.
#[cfg(not(feature = "browser"))]
pub struct ChromeSessionFactory {
    _config: BrowserEngineConfig,
}

#[cfg(not(feature = "browser"))]
impl ChromeSessionFactory {
    pub fn new(config: BrowserEngineConfig) -> Self {
        Self { _config: config }
    }
}

#[cfg(not(feature = "browser"))]
#[async_trait]
impl SessionFactory for ChromeSessionFactory {
    async fn open(&self) -> Result<Box<dyn BrowserSession>, HarvestError> {
        Err(HarvestError::Browser(
            "Browser support not compiled. Rebuild with: cargo build --features browser"
                .to_string(),
        ))
    }
}

/// Stub for when browser feature is disabled.
#[cfg(not(feature = "browser"))]
pub struct ChromeSession;

#[cfg(not(feature = "browser"))]
#[async_trait]
impl BrowserSession for ChromeSession {
    async fn navigate(&self, _url: &str) -> Result<(), HarvestError> {
        Err(not_compiled())
    }

    async fn reload(&self) -> Result<(), HarvestError> {
        Err(not_compiled())
    }

    async fn evaluate(&self, _script: &str) -> Result<serde_json::Value, HarvestError> {
        Err(not_compiled())
    }

    async fn cookies(&self) -> Result<Vec<SessionCookie>, HarvestError> {
        Err(not_compiled())
    }

    async fn clear_cookies(&self) -> Result<(), HarvestError> {
        Err(not_compiled())
    }

    async fn set_cookie(&self, _cookie: &SessionCookie) -> Result<(), HarvestError> {
        Err(not_compiled())
    }

    async fn close(&self) -> Result<(), HarvestError> {
        Ok(())
    }
}

#[cfg(not(feature = "browser"))]
fn not_compiled() -> HarvestError {
    HarvestError::Browser("Browser support not compiled".to_string())
}
