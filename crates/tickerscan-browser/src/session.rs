use crate::error::{BrowserError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tickerscan_core::Platform;

/// A browser cookie as persisted between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    /// Cookie name
    pub name: String,
    /// Cookie value
    pub value: String,
    /// Domain the cookie is scoped to
    pub domain: String,
    /// Path the cookie is scoped to
    pub path: String,
    /// Expiry as seconds since the epoch, `None` for session cookies
    #[serde(default)]
    pub expires: Option<f64>,
    /// Secure flag
    #[serde(default)]
    pub secure: bool,
    /// `HttpOnly` flag
    #[serde(default)]
    pub http_only: bool,
}

/// One live browser session driven by a single agent.
#[async_trait::async_trait]
pub trait BrowserSession: Send + Sync {
    /// Identifier for logging
    fn id(&self) -> &str;

    /// Navigate to a URL and wait for the load to finish
    async fn navigate(&self, url: &str) -> Result<()>;

    /// URL currently displayed, if any
    async fn current_url(&self) -> Result<Option<String>>;

    /// Rendered HTML of the current page
    async fn content(&self) -> Result<String>;

    /// PNG screenshot of the current page
    async fn screenshot(&self) -> Result<Vec<u8>>;

    /// Cookies visible to the current page
    async fn cookies(&self) -> Result<Vec<Cookie>>;

    /// Install cookies into the session
    async fn set_cookies(&self, cookies: &[Cookie]) -> Result<()>;

    /// Close the session and release its browser. Idempotent.
    async fn close(&self) -> Result<()>;

    /// Whether [`close`](Self::close) has run
    fn is_closed(&self) -> bool;
}

/// Opens browser sessions for agents.
#[async_trait::async_trait]
pub trait SessionLauncher: Send + Sync {
    /// Launch a fresh session for `platform`
    async fn launch(&self, platform: &Platform) -> Result<Arc<dyn BrowserSession>>;
}

/// Helper to extract domain from URL
pub fn extract_domain(url: &str) -> Result<String> {
    let url = url::Url::parse(url)
        .map_err(|e| BrowserError::NavigationError(format!("Invalid URL: {e}")))?;

    url.host_str()
        .ok_or_else(|| BrowserError::NavigationError("No host in URL".to_string()))
        .map(ToString::to_string)
}
