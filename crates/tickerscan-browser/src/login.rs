//! Per-platform login strategies and cookie persistence.
//!
//! Each platform registers a [`PlatformLogin`] in the [`LoginRegistry`].
//! [`SessionManager::ensure_logged_in`] restores saved cookies first and only
//! falls back to a credential login when the restored session does not
//! verify. Platforms without a registered strategy are treated as public and
//! handled by [`AnonymousLogin`].

use crate::error::{BrowserError, Result};
use crate::session::{BrowserSession, Cookie};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tickerscan_core::{load_json, save_json, KvStore, Platform};
use tracing::{debug, info, warn};

/// Username and password for one platform.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Account name
    pub username: String,
    /// Account password
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl Credentials {
    /// Create credentials.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Read `TICKERSCAN_<PLATFORM>_USERNAME` and `TICKERSCAN_<PLATFORM>_PASSWORD`.
    #[must_use]
    pub fn from_env(platform: &Platform) -> Option<Self> {
        Self::from_lookup(platform, |name| std::env::var(name).ok())
    }

    /// Like [`from_env`](Self::from_env) with an injectable variable lookup.
    #[must_use]
    pub fn from_lookup(platform: &Platform, lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let prefix = format!(
            "TICKERSCAN_{}",
            platform.as_str().to_ascii_uppercase().replace('-', "_")
        );
        let username = lookup(&format!("{prefix}_USERNAME")).filter(|v| !v.is_empty())?;
        let password = lookup(&format!("{prefix}_PASSWORD")).filter(|v| !v.is_empty())?;
        Some(Self { username, password })
    }
}

/// Login flow for one platform.
#[async_trait::async_trait]
pub trait PlatformLogin: Send + Sync {
    /// Platform this strategy handles
    fn platform(&self) -> &Platform;

    /// Whether a login needs credentials
    fn requires_credentials(&self) -> bool {
        true
    }

    /// Check whether the session is already authenticated
    async fn verify_session(&self, session: &dyn BrowserSession) -> Result<bool>;

    /// Perform the login. Returns whether it succeeded.
    async fn login(&self, session: &dyn BrowserSession, credentials: &Credentials) -> Result<bool>;
}

/// Strategy for public platforms that need no account.
#[derive(Debug, Clone)]
pub struct AnonymousLogin {
    platform: Platform,
}

impl AnonymousLogin {
    /// Create a strategy for `platform`.
    #[must_use]
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }
}

#[async_trait::async_trait]
impl PlatformLogin for AnonymousLogin {
    fn platform(&self) -> &Platform {
        &self.platform
    }

    fn requires_credentials(&self) -> bool {
        false
    }

    async fn verify_session(&self, _session: &dyn BrowserSession) -> Result<bool> {
        Ok(true)
    }

    async fn login(&self, _session: &dyn BrowserSession, _credentials: &Credentials) -> Result<bool> {
        Ok(true)
    }
}

/// Login strategies keyed by platform.
#[derive(Clone, Default)]
pub struct LoginRegistry {
    strategies: HashMap<Platform, Arc<dyn PlatformLogin>>,
}

impl LoginRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a strategy, replacing any previous one for its platform.
    #[must_use]
    pub fn with(mut self, strategy: Arc<dyn PlatformLogin>) -> Self {
        self.register(strategy);
        self
    }

    /// Register a strategy, replacing any previous one for its platform.
    pub fn register(&mut self, strategy: Arc<dyn PlatformLogin>) {
        let platform = strategy.platform().clone();
        if self.strategies.insert(platform.clone(), strategy).is_some() {
            debug!(platform = %platform, "replaced login strategy");
        }
    }

    /// Strategy for `platform`, if registered.
    #[must_use]
    pub fn get(&self, platform: &Platform) -> Option<Arc<dyn PlatformLogin>> {
        self.strategies.get(platform).cloned()
    }

    /// Registered platforms, sorted.
    #[must_use]
    pub fn platforms(&self) -> Vec<Platform> {
        let mut platforms: Vec<Platform> = self.strategies.keys().cloned().collect();
        platforms.sort();
        platforms
    }
}

fn cookie_key(platform: &Platform) -> String {
    format!("cookies/{platform}.json")
}

/// Restores sessions and runs logins.
pub struct SessionManager {
    registry: LoginRegistry,
    store: Arc<dyn KvStore>,
    credentials: HashMap<Platform, Credentials>,
}

impl SessionManager {
    /// Create a manager. Credentials not supplied via
    /// [`with_credentials`](Self::with_credentials) are read from the
    /// environment on demand.
    #[must_use]
    pub fn new(registry: LoginRegistry, store: Arc<dyn KvStore>) -> Self {
        Self {
            registry,
            store,
            credentials: HashMap::new(),
        }
    }

    /// Supply credentials for a platform explicitly.
    #[must_use]
    pub fn with_credentials(mut self, platform: Platform, credentials: Credentials) -> Self {
        self.credentials.insert(platform, credentials);
        self
    }

    fn strategy(&self, platform: &Platform) -> Arc<dyn PlatformLogin> {
        self.registry
            .get(platform)
            .unwrap_or_else(|| Arc::new(AnonymousLogin::new(platform.clone())))
    }

    /// Make sure `session` is authenticated on `platform`.
    ///
    /// Returns `Ok(false)` when the login strategy rejects the session and
    /// an error when credentials are missing or the strategy fails.
    pub async fn ensure_logged_in(
        &self,
        session: &dyn BrowserSession,
        platform: &Platform,
    ) -> Result<bool> {
        let strategy = self.strategy(platform);

        match self.restore_cookies(session, platform).await {
            Ok(0) => {}
            Ok(count) => debug!(platform = %platform, count, "restored cookies"),
            Err(e) => warn!(platform = %platform, error = %e, "could not restore cookies"),
        }

        if strategy.verify_session(session).await? {
            debug!(platform = %platform, "session verified");
            return Ok(true);
        }
        if !strategy.requires_credentials() {
            return Ok(false);
        }

        let credentials = self
            .credentials
            .get(platform)
            .cloned()
            .or_else(|| Credentials::from_env(platform))
            .ok_or_else(|| BrowserError::MissingCredentials {
                platform: platform.clone(),
            })?;

        let logged_in = strategy.login(session, &credentials).await?;
        if logged_in {
            info!(platform = %platform, "logged in");
            if let Err(e) = self.save_cookies(session, platform).await {
                warn!(platform = %platform, error = %e, "could not save cookies after login");
            }
        } else {
            warn!(platform = %platform, "login rejected");
        }
        Ok(logged_in)
    }

    async fn restore_cookies(&self, session: &dyn BrowserSession, platform: &Platform) -> Result<usize> {
        let cookies: Vec<Cookie> =
            load_json(self.store.as_ref(), &cookie_key(platform))?.unwrap_or_default();
        if !cookies.is_empty() {
            session.set_cookies(&cookies).await?;
        }
        Ok(cookies.len())
    }

    /// Persist the session's cookies for the next run.
    pub async fn save_cookies(&self, session: &dyn BrowserSession, platform: &Platform) -> Result<usize> {
        let cookies = session.cookies().await?;
        save_json(self.store.as_ref(), &cookie_key(platform), &cookies)?;
        Ok(cookies.len())
    }
}
