use crate::error::{BrowserError, Result};
use crate::fingerprint::FingerprintConfig;
use crate::session::{BrowserSession, Cookie, SessionLauncher};
use chromiumoxide::browser::{Browser, BrowserConfig as ChromiumConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    CookieParam, SetUserAgentOverrideParams, TimeSinceEpoch,
};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures_util::stream::StreamExt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tickerscan_core::{BrowserConfig, Platform};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

fn chromium_err(e: impl std::fmt::Display) -> BrowserError {
    BrowserError::ChromiumError(e.to_string())
}

/// Launches one chromium process per session.
///
/// Giving every agent its own browser keeps their memory attributable and
/// lets closing a session actually free the process.
pub struct BrowserEngine {
    config: BrowserConfig,
    launched: AtomicU64,
}

impl BrowserEngine {
    /// Create an engine using the `[browser]` config section
    #[must_use]
    pub fn new(config: BrowserConfig) -> Self {
        Self {
            config,
            launched: AtomicU64::new(0),
        }
    }

    fn chromium_config(&self, fingerprint: &FingerprintConfig) -> Result<ChromiumConfig> {
        let mut builder = ChromiumConfig::builder()
            .no_sandbox()
            .window_size(fingerprint.viewport_width, fingerprint.viewport_height)
            .request_timeout(Duration::from_secs(self.config.navigation_timeout_secs));
        if !self.config.headless {
            builder = builder.with_head();
        }
        builder.build().map_err(BrowserError::ChromiumError)
    }

    /// Launch a browser with a specific fingerprint
    pub async fn launch_with_fingerprint(
        &self,
        platform: &Platform,
        fingerprint: FingerprintConfig,
    ) -> Result<ChromiumSession> {
        let config = self.chromium_config(&fingerprint)?;
        let (browser, mut handler) = Browser::launch(config).await.map_err(chromium_err)?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler.abort();
                return Err(chromium_err(e));
            }
        };
        page.execute(SetUserAgentOverrideParams::new(fingerprint.user_agent.clone()))
            .await
            .map_err(chromium_err)?;

        let n = self.launched.fetch_add(1, Ordering::Relaxed) + 1;
        let id = format!("{platform}-{n}");
        debug!(session = %id, user_agent = %fingerprint.user_agent, "browser launched");

        Ok(ChromiumSession {
            id,
            navigation_timeout: Duration::from_secs(self.config.navigation_timeout_secs),
            inner: Mutex::new(Some(ChromiumInner {
                browser,
                page,
                handler,
            })),
            closed: AtomicBool::new(false),
        })
    }
}

#[async_trait::async_trait]
impl SessionLauncher for BrowserEngine {
    async fn launch(&self, platform: &Platform) -> Result<Arc<dyn BrowserSession>> {
        let mut fingerprint = FingerprintConfig::randomized();
        if !self.config.headless {
            fingerprint =
                fingerprint.with_viewport(self.config.window_width, self.config.window_height);
        }
        let session = self.launch_with_fingerprint(platform, fingerprint).await?;
        Ok(Arc::new(session))
    }
}

struct ChromiumInner {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
}

/// A [`BrowserSession`] backed by its own chromium process.
pub struct ChromiumSession {
    id: String,
    navigation_timeout: Duration,
    inner: Mutex<Option<ChromiumInner>>,
    closed: AtomicBool,
}

impl ChromiumSession {
    // Cloned out so a concurrent close is not blocked by a slow page call.
    async fn page(&self) -> Result<Page> {
        let inner = self.inner.lock().await;
        inner
            .as_ref()
            .map(|inner| inner.page.clone())
            .ok_or(BrowserError::SessionClosed)
    }

    fn map_page_err(&self, e: impl std::fmt::Display) -> BrowserError {
        if self.is_closed() {
            BrowserError::SessionClosed
        } else {
            chromium_err(e)
        }
    }
}

#[async_trait::async_trait]
impl BrowserSession for ChromiumSession {
    fn id(&self) -> &str {
        &self.id
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        let page = self.page().await?;
        match tokio::time::timeout(self.navigation_timeout, page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) if self.is_closed() => {
                debug!(session = %self.id, error = %e, "navigation interrupted by close");
                Err(BrowserError::SessionClosed)
            }
            Ok(Err(e)) => Err(BrowserError::NavigationError(format!("{url}: {e}"))),
            Err(_) => Err(BrowserError::Timeout(format!(
                "{url} after {}s",
                self.navigation_timeout.as_secs()
            ))),
        }
    }

    async fn current_url(&self) -> Result<Option<String>> {
        let page = self.page().await?;
        page.url().await.map_err(|e| self.map_page_err(e))
    }

    async fn content(&self) -> Result<String> {
        let page = self.page().await?;
        page.content().await.map_err(|e| self.map_page_err(e))
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        let page = self.page().await?;
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();
        page.screenshot(params)
            .await
            .map_err(|e| self.map_page_err(e))
    }

    async fn cookies(&self) -> Result<Vec<Cookie>> {
        let page = self.page().await?;
        let cookies = page.get_cookies().await.map_err(|e| self.map_page_err(e))?;
        Ok(cookies
            .into_iter()
            .map(|c| Cookie {
                expires: (!c.session).then_some(c.expires),
                name: c.name,
                value: c.value,
                domain: c.domain,
                path: c.path,
                secure: c.secure,
                http_only: c.http_only,
            })
            .collect())
    }

    async fn set_cookies(&self, cookies: &[Cookie]) -> Result<()> {
        let page = self.page().await?;
        let mut params = Vec::with_capacity(cookies.len());
        for cookie in cookies {
            let mut builder = CookieParam::builder()
                .name(cookie.name.clone())
                .value(cookie.value.clone())
                .domain(cookie.domain.clone())
                .path(cookie.path.clone())
                .secure(cookie.secure)
                .http_only(cookie.http_only);
            if let Some(expires) = cookie.expires {
                builder = builder.expires(TimeSinceEpoch::new(expires));
            }
            params.push(builder.build().map_err(BrowserError::ChromiumError)?);
        }
        page.set_cookies(params)
            .await
            .map_err(|e| self.map_page_err(e))?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        let Some(mut inner) = self.inner.lock().await.take() else {
            return Ok(());
        };

        if let Err(e) = inner.page.close().await {
            debug!(session = %self.id, error = %e, "page close failed");
        }
        let result = inner.browser.close().await.map(|_| ());
        if let Err(e) = inner.browser.wait().await {
            warn!(session = %self.id, error = %e, "browser process did not exit cleanly");
        }
        inner.handler.abort();
        debug!(session = %self.id, "browser closed");
        result.map_err(chromium_err)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
