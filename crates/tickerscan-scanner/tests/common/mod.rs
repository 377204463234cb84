//! Fakes shared by the scanner integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tickerscan_browser::{
    BrowserError, BrowserSession, Cookie, Credentials, LoginRegistry, PlatformLogin,
    SessionLauncher, SessionManager,
};
use tickerscan_budget::{CostTracker, RateLimiter};
use tickerscan_core::{
    KvStore, MemoryStore, Platform, PlatformLimits, ScanTarget, SocialMention,
};
use tickerscan_scanner::{
    AgentServices, CheckpointStore, PlatformScanner, ScanError, MemoryProbe,
};

pub fn platform(id: &str) -> Platform {
    Platform::new(id).unwrap()
}

pub fn targets(tickers: &[&str]) -> Vec<ScanTarget> {
    tickers
        .iter()
        .map(|t| ScanTarget::new(*t, format!("{t} Holdings")))
        .collect()
}

pub fn mention(platform: &Platform, ticker: &str, score: i64) -> SocialMention {
    let mut m = SocialMention::new(
        platform.clone(),
        ticker,
        format!("https://{platform}.example/{ticker}"),
    );
    m.title = format!("{ticker} to the moon");
    m.apply_score(score, Vec::new());
    m
}

/// Limits loose enough that only the test decides when to stop.
pub fn open_limits() -> PlatformLimits {
    PlatformLimits {
        daily_page_max: 1000,
        per_minute_max: 1000,
        min_delay_ms: 0,
        max_delay_ms: 0,
    }
}

#[derive(Default)]
pub struct FakeSession {
    closed: AtomicBool,
    pub screenshots: AtomicUsize,
}

#[async_trait::async_trait]
impl BrowserSession for FakeSession {
    fn id(&self) -> &str {
        "fake-session"
    }

    async fn navigate(&self, _url: &str) -> tickerscan_browser::Result<()> {
        if self.is_closed() {
            return Err(BrowserError::SessionClosed);
        }
        Ok(())
    }

    async fn current_url(&self) -> tickerscan_browser::Result<Option<String>> {
        Ok(None)
    }

    async fn content(&self) -> tickerscan_browser::Result<String> {
        Ok(String::new())
    }

    async fn screenshot(&self) -> tickerscan_browser::Result<Vec<u8>> {
        if self.is_closed() {
            return Err(BrowserError::SessionClosed);
        }
        self.screenshots.fetch_add(1, Ordering::SeqCst);
        Ok(vec![0x89, b'P', b'N', b'G'])
    }

    async fn cookies(&self) -> tickerscan_browser::Result<Vec<Cookie>> {
        Ok(Vec::new())
    }

    async fn set_cookies(&self, _cookies: &[Cookie]) -> tickerscan_browser::Result<()> {
        Ok(())
    }

    async fn close(&self) -> tickerscan_browser::Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct FakeLauncher {
    pub sessions: Mutex<Vec<Arc<FakeSession>>>,
    pub fail: AtomicBool,
}

impl FakeLauncher {
    pub fn launched(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn closed(&self) -> usize {
        self.sessions
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.is_closed())
            .count()
    }

    pub fn screenshots(&self) -> usize {
        self.sessions
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.screenshots.load(Ordering::SeqCst))
            .sum()
    }
}

#[async_trait::async_trait]
impl SessionLauncher for FakeLauncher {
    async fn launch(&self, _platform: &Platform) -> tickerscan_browser::Result<Arc<dyn BrowserSession>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(BrowserError::ChromiumError("no chrome here".to_string()));
        }
        let session = Arc::new(FakeSession::default());
        self.sessions.lock().unwrap().push(session.clone());
        Ok(session)
    }
}

/// What the scanner does for a ticker.
#[derive(Clone)]
pub enum Script {
    Mentions(Vec<i64>),
    Transient,
    /// One mention whose score the scanner writes directly
    RawScore(u8),
    /// The browser dies under the scanner
    LoseSession,
    /// Another session elsewhere charges this many minutes meanwhile
    Spend(Arc<CostTracker>, i64),
}

/// Scanner following a per-ticker script, one mention per listed score.
pub struct ScriptedScanner {
    platform: Platform,
    script: HashMap<String, Script>,
    delay: Duration,
    pub scanned: Mutex<Vec<String>>,
}

impl ScriptedScanner {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            script: HashMap::new(),
            delay: Duration::ZERO,
            scanned: Mutex::new(Vec::new()),
        }
    }

    pub fn with(mut self, ticker: &str, script: Script) -> Self {
        self.script.insert(ticker.to_string(), script);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn scanned(&self) -> Vec<String> {
        self.scanned.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl PlatformScanner for ScriptedScanner {
    fn platform(&self) -> &Platform {
        &self.platform
    }

    async fn scan_for_ticker(
        &self,
        session: &dyn BrowserSession,
        target: &ScanTarget,
    ) -> tickerscan_scanner::Result<Vec<SocialMention>> {
        self.scanned.lock().unwrap().push(target.ticker.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if session.is_closed() {
            return Err(ScanError::SessionLost);
        }
        match self.script.get(&target.ticker) {
            Some(Script::Transient) => Err(ScanError::transient(&target.ticker, "search failed")),
            Some(Script::RawScore(score)) => {
                let mut m = mention(&self.platform, &target.ticker, 0);
                m.promotion_score = *score;
                m.is_promotional = false;
                Ok(vec![m])
            }
            Some(Script::LoseSession) => {
                session.close().await.ok();
                Err(ScanError::SessionLost)
            }
            Some(Script::Spend(cost, minutes)) => {
                let started = chrono::Utc::now() - chrono::Duration::minutes(*minutes);
                cost.start_session_at("elsewhere", started);
                cost.end_session("elsewhere", &self.platform);
                Ok(vec![mention(&self.platform, &target.ticker, 10)])
            }
            Some(Script::Mentions(scores)) => Ok(scores
                .iter()
                .map(|score| mention(&self.platform, &target.ticker, *score))
                .collect()),
            None => Ok(vec![mention(&self.platform, &target.ticker, 10)]),
        }
    }
}

/// Everything an agent test needs, all in memory.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub launcher: Arc<FakeLauncher>,
    pub cost: Arc<CostTracker>,
    pub services: AgentServices,
}

impl Harness {
    pub fn new(platforms: &[&str]) -> Self {
        Self::with_budget(platforms, 240.0, open_limits())
    }

    pub fn with_budget(platforms: &[&str], minutes: f64, limits: PlatformLimits) -> Self {
        Self::build(platforms, minutes, limits, LoginRegistry::new())
    }

    pub fn build(
        platforms: &[&str],
        minutes: f64,
        limits: PlatformLimits,
        registry: LoginRegistry,
    ) -> Self {
        let store = Arc::new(MemoryStore::new());
        let kv: Arc<dyn KvStore> = store.clone();
        let launcher = Arc::new(FakeLauncher::default());
        let cost = Arc::new(CostTracker::new(kv.clone(), minutes));

        let mut limiter = RateLimiter::new(kv.clone());
        for id in platforms {
            limiter = limiter.with_limits(platform(id), limits.clone());
        }

        let services = AgentServices {
            rate_limiter: Arc::new(limiter),
            cost: cost.clone(),
            launcher: launcher.clone(),
            sessions: Arc::new(SessionManager::new(registry, kv.clone())),
            checkpoints: CheckpointStore::new(kv),
            evidence: None,
            scorer: None,
        };

        Self {
            store,
            launcher,
            cost,
            services,
        }
    }

    pub fn checkpoints(&self) -> CheckpointStore {
        self.services.checkpoints.clone()
    }
}

/// Login whose session check takes a while and then touches the browser.
pub struct SlowLogin {
    pub platform: Platform,
    pub delay: Duration,
}

impl SlowLogin {
    pub fn new(id: &str, delay: Duration) -> Self {
        Self {
            platform: platform(id),
            delay,
        }
    }
}

#[async_trait::async_trait]
impl PlatformLogin for SlowLogin {
    fn platform(&self) -> &Platform {
        &self.platform
    }

    async fn verify_session(&self, session: &dyn BrowserSession) -> tickerscan_browser::Result<bool> {
        tokio::time::sleep(self.delay).await;
        session.navigate("https://example.com/home").await?;
        Ok(true)
    }

    async fn login(
        &self,
        _session: &dyn BrowserSession,
        _credentials: &Credentials,
    ) -> tickerscan_browser::Result<bool> {
        Ok(false)
    }
}

/// Probe computed from a closure.
pub struct FnProbe<F>(pub F);

#[async_trait::async_trait]
impl<F: Fn() -> u64 + Send + Sync> MemoryProbe for FnProbe<F> {
    async fn used_mb(&self) -> u64 {
        (self.0)()
    }
}
