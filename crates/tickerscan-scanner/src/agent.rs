//! The per-platform scan agent.
//!
//! A [`ScanAgent`] walks one platform through
//! `Init -> BudgetCheck -> Login -> ResumeCheck -> TickerLoop -> Cleanup -> Done`,
//! checkpointing after every ticker so a killed run resumes where it stopped.
//! The orchestrator talks to a running agent only through its
//! [`AgentControl`].

use crate::checkpoint::CheckpointStore;
use crate::evidence::EvidenceCollector;
use crate::platform::PlatformScanner;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tickerscan_browser::{BrowserSession, SessionLauncher, SessionManager};
use tickerscan_budget::{CostTracker, RateLimiter};
use tickerscan_core::{
    AgentProgress, ContentScorer, Platform, PlatformScanResult, ScanTarget, ScanningConfig,
    SocialMention,
};
use tokio::sync::Notify;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Error reported when the day's browser budget is used up before starting.
pub const BUDGET_EXHAUSTED: &str = "daily budget exhausted";

/// Error reported by an agent stopped for memory pressure.
pub const SUSPENDED: &str = "suspended under memory pressure";

/// Lifecycle of one agent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum AgentState {
    Init,
    BudgetCheck,
    Login,
    ResumeCheck,
    TickerLoop,
    Cleanup,
    Done,
    Failed,
}

impl AgentState {
    /// `Done` and `Failed` are final.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Shared handle between the orchestrator and a running agent.
pub struct AgentControl {
    suspend_requested: AtomicBool,
    suspended: Notify,
    session: Mutex<Option<Arc<dyn BrowserSession>>>,
    state: Mutex<AgentState>,
}

impl Default for AgentControl {
    fn default() -> Self {
        Self {
            suspend_requested: AtomicBool::new(false),
            suspended: Notify::new(),
            session: Mutex::new(None),
            state: Mutex::new(AgentState::Init),
        }
    }
}

impl AgentControl {
    /// Fresh control in the `Init` state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the agent to stop and close its browser so its memory is freed.
    pub async fn suspend(&self) {
        self.suspend_requested.store(true, Ordering::SeqCst);
        self.suspended.notify_waiters();
        let session = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(session) = session {
            if let Err(e) = session.close().await {
                debug!(session = session.id(), error = %e, "close on suspend failed");
            }
        }
    }

    /// Whether [`suspend`](Self::suspend) has been called.
    #[must_use]
    pub fn is_suspend_requested(&self) -> bool {
        self.suspend_requested.load(Ordering::SeqCst)
    }

    /// Resolves once suspension is requested.
    pub async fn wait_suspended(&self) {
        loop {
            let notified = self.suspended.notified();
            if self.is_suspend_requested() {
                return;
            }
            notified.await;
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> AgentState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: AgentState) {
        let mut current = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *current != state {
            debug!(from = ?*current, to = ?state, "agent state");
            *current = state;
        }
    }

    fn attach(&self, session: Arc<dyn BrowserSession>) {
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = Some(session);
    }

    fn detach(&self) {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

/// What an agent run produced.
#[derive(Debug, Clone)]
pub struct AgentReport {
    /// Mentions gathered, including any resumed from a checkpoint
    pub result: PlatformScanResult,
    /// Tickers completed so far, across resumes
    pub tickers_completed: usize,
    /// Size of the target list
    pub tickers_total: usize,
    /// The run stopped because suspension was requested
    pub suspended: bool,
}

/// Anything the orchestrator can schedule.
#[async_trait::async_trait]
pub trait ScanWorker: Send + Sync {
    /// Unique name within a run
    fn name(&self) -> &str;

    /// Platform scanned
    fn platform(&self) -> &Platform;

    /// Memory to attribute to this worker while it runs, in MB
    fn footprint_mb(&self) -> u64;

    /// Scan `targets`, honouring suspension requests on `control`
    async fn run(&self, targets: &[ScanTarget], control: Arc<AgentControl>) -> AgentReport;
}

/// Collaborators shared by every agent in a run.
#[derive(Clone)]
#[allow(missing_docs)]
pub struct AgentServices {
    pub rate_limiter: Arc<RateLimiter>,
    pub cost: Arc<CostTracker>,
    pub launcher: Arc<dyn SessionLauncher>,
    pub sessions: Arc<SessionManager>,
    pub checkpoints: CheckpointStore,
    pub evidence: Option<Arc<EvidenceCollector>>,
    /// Rescores every mention a scanner returns when set
    pub scorer: Option<Arc<dyn ContentScorer>>,
}

enum LoopOutcome {
    Finished,
    Stopped(&'static str),
    Suspended,
    Failed(String),
}

/// Scans one platform for every target ticker.
pub struct ScanAgent {
    name: String,
    scanner: Arc<dyn PlatformScanner>,
    services: AgentServices,
    footprint_mb: u64,
}

impl ScanAgent {
    /// Create an agent named after the scanner's platform, with the default
    /// footprint.
    #[must_use]
    pub fn new(scanner: Arc<dyn PlatformScanner>, services: AgentServices) -> Self {
        Self::from_config(scanner, services, &ScanningConfig::default())
    }

    /// Create an agent using `agent_footprint_mb` from `config`.
    #[must_use]
    pub fn from_config(
        scanner: Arc<dyn PlatformScanner>,
        services: AgentServices,
        config: &ScanningConfig,
    ) -> Self {
        Self {
            name: scanner.platform().to_string(),
            scanner,
            services,
            footprint_mb: config.agent_footprint_mb,
        }
    }

    /// Override the agent name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Override the memory attributed to this agent.
    #[must_use]
    pub fn with_footprint_mb(mut self, mb: u64) -> Self {
        self.footprint_mb = mb;
        self
    }

    async fn open_session(
        &self,
        control: &AgentControl,
        slot: &mut Option<Arc<dyn BrowserSession>>,
    ) -> Result<Arc<dyn BrowserSession>, String> {
        let platform = self.platform();
        let session = self
            .services
            .launcher
            .launch(platform)
            .await
            .map_err(|e| format!("browser launch failed: {e}"))?;
        control.attach(session.clone());
        *slot = Some(session.clone());

        match self
            .services
            .sessions
            .ensure_logged_in(session.as_ref(), platform)
            .await
        {
            Ok(true) => Ok(session),
            Ok(false) => Err(format!("login failed for {platform}")),
            Err(e) => Err(e.to_string()),
        }
    }

    fn resume(&self, targets: &[ScanTarget], progress: &mut AgentProgress) {
        let platform = self.platform();
        match self.services.checkpoints.load(platform) {
            Ok(Some(saved)) if saved.matches_targets(targets) => {
                info!(
                    platform = %platform,
                    completed = saved.completed_tickers.len(),
                    remaining = saved.remaining_tickers.len(),
                    "resuming from checkpoint"
                );
                *progress = saved;
            }
            Ok(Some(_)) => {
                warn!(platform = %platform, "checkpoint does not match targets, starting over");
            }
            Ok(None) => debug!(platform = %platform, "no checkpoint"),
            Err(e) => {
                warn!(platform = %platform, error = %e, "unreadable checkpoint, starting over");
            }
        }
    }

    /// Rescore with the configured scorer, or normalise whatever score the
    /// scanner set so it stays in `0..=100` with a matching promotional flag.
    fn score(&self, mentions: &mut [SocialMention]) {
        for mention in mentions {
            match &self.services.scorer {
                Some(scorer) => {
                    let text = format!("{}\n{}", mention.title, mention.content);
                    let scored = scorer.score_content(&text);
                    mention.apply_score(i64::from(scored.score), scored.flags);
                }
                None => {
                    let flags = std::mem::take(&mut mention.red_flags);
                    mention.apply_score(i64::from(mention.promotion_score), flags);
                }
            }
        }
    }

    /// Capture and persist evidence for one ticker's mentions.
    ///
    /// Records are written before the ticker is checkpointed, so a resumed
    /// run never skips a ticker whose evidence was lost.
    async fn collect_evidence(&self, session: &dyn BrowserSession, mentions: &[SocialMention]) {
        let Some(evidence) = &self.services.evidence else {
            return;
        };
        let mut recorded = 0;
        for mention in mentions.iter().filter(|m| evidence.qualifies(m)) {
            let screenshot = evidence
                .capture_screenshot(session, &mention.url, &mention.ticker, &mention.platform)
                .await;
            evidence.record(mention, screenshot);
            recorded += 1;
        }
        if recorded > 0 {
            if let Err(e) = evidence.save_evidence_file(Utc::now().date_naive()) {
                warn!(platform = %self.platform(), error = %e, "evidence not saved, kept pending");
            }
        }
    }

    async fn ticker_loop(
        &self,
        session: &dyn BrowserSession,
        control: &AgentControl,
        progress: &mut AgentProgress,
    ) -> LoopOutcome {
        let platform = self.platform();
        let services = &self.services;
        let session_started = Instant::now();
        let base_minutes = progress.browser_minutes_used;

        while let Some(target) = progress.remaining_tickers.first().cloned() {
            if control.is_suspend_requested() {
                return LoopOutcome::Suspended;
            }
            if !services.rate_limiter.can_proceed(platform) {
                info!(platform = %platform, "rate limit reached, stopping early");
                return LoopOutcome::Stopped("rate limit");
            }
            if !services.cost.has_budget() {
                info!(platform = %platform, "daily budget reached, stopping early");
                return LoopOutcome::Stopped("budget");
            }

            let scanned = self.scanner.scan_for_ticker(session, &target).await;
            let mentions = match scanned {
                Ok(mut mentions) => {
                    self.score(&mut mentions);
                    Some(mentions)
                }
                Err(_) if control.is_suspend_requested() => return LoopOutcome::Suspended,
                Err(e) if session.is_closed() || e.is_session_lost() => {
                    return LoopOutcome::Failed(e.to_string());
                }
                Err(e) => {
                    warn!(platform = %platform, ticker = %target.ticker, error = %e, "ticker scan failed, skipping");
                    None
                }
            };

            if let Err(e) = services.rate_limiter.record_action(platform) {
                warn!(platform = %platform, error = %e, "rate limiter state not persisted");
            }

            match mentions {
                Some(mentions) => {
                    self.collect_evidence(session, &mentions).await;
                    debug!(platform = %platform, ticker = %target.ticker, found = mentions.len(), "ticker scanned");
                    progress.complete_ticker(&target.ticker, mentions);
                }
                None => {
                    progress.fail_ticker(&target.ticker);
                }
            }
            progress.browser_minutes_used =
                base_minutes + session_started.elapsed().as_secs_f64() / 60.0;
            progress.last_checkpoint = Utc::now();
            if let Err(e) = services.checkpoints.save(progress) {
                warn!(platform = %platform, error = %e, "checkpoint not saved");
            }

            if !progress.remaining_tickers.is_empty() {
                tokio::select! {
                    _ = services.rate_limiter.wait_for_delay(platform) => {}
                    () = control.wait_suspended() => return LoopOutcome::Suspended,
                }
            }
        }
        LoopOutcome::Finished
    }

    async fn cleanup(&self, session: Option<Arc<dyn BrowserSession>>, control: &AgentControl) {
        let platform = self.platform();
        if let Some(session) = session {
            if !session.is_closed() {
                if let Err(e) = self.services.sessions.save_cookies(session.as_ref(), platform).await {
                    debug!(platform = %platform, error = %e, "cookies not saved");
                }
            }
            if let Err(e) = session.close().await {
                debug!(platform = %platform, error = %e, "session close failed");
            }
        }
        control.detach();
    }
}

#[async_trait::async_trait]
impl ScanWorker for ScanAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn platform(&self) -> &Platform {
        self.scanner.platform()
    }

    fn footprint_mb(&self) -> u64 {
        self.footprint_mb
    }

    async fn run(&self, targets: &[ScanTarget], control: Arc<AgentControl>) -> AgentReport {
        let started = Instant::now();
        let platform = self.platform().clone();
        let tickers_total = targets.len();

        control.set_state(AgentState::Init);
        let session_id = Uuid::new_v4().to_string();

        control.set_state(AgentState::BudgetCheck);
        if !self.services.cost.has_budget() {
            warn!(platform = %platform, "{BUDGET_EXHAUSTED}");
            control.set_state(AgentState::Failed);
            return AgentReport {
                result: PlatformScanResult::failed(platform, BUDGET_EXHAUSTED),
                tickers_completed: 0,
                tickers_total,
                suspended: false,
            };
        }

        control.set_state(AgentState::Login);
        self.services.cost.start_session(&session_id);
        let mut progress = AgentProgress::new(platform.clone(), targets, Utc::now());
        let mut session_slot = None;
        let mut suspended = false;
        let mut resumed = false;
        let mut error = None;

        match self.open_session(&control, &mut session_slot).await {
            Ok(session) => {
                control.set_state(AgentState::ResumeCheck);
                self.resume(targets, &mut progress);
                resumed = true;

                control.set_state(AgentState::TickerLoop);
                match self.ticker_loop(session.as_ref(), &control, &mut progress).await {
                    LoopOutcome::Finished => {}
                    LoopOutcome::Stopped(reason) => {
                        debug!(platform = %platform, reason, "stopped with tickers remaining");
                    }
                    LoopOutcome::Suspended => {
                        suspended = true;
                        error = Some(SUSPENDED.to_string());
                    }
                    LoopOutcome::Failed(e) => error = Some(e),
                }
            }
            Err(e) if control.is_suspend_requested() => {
                info!(platform = %platform, error = %e, "suspended during session setup");
                suspended = true;
                error = Some(SUSPENDED.to_string());
            }
            Err(e) => {
                warn!(platform = %platform, error = %e, "session setup failed");
                error = Some(e);
            }
        }

        control.set_state(AgentState::Cleanup);
        self.cleanup(session_slot, &control).await;
        let minutes = self.services.cost.end_session(&session_id, &platform);

        if suspended && !resumed {
            debug!(platform = %platform, "suspended before resume check, checkpoint left as is");
        } else if suspended {
            progress.last_checkpoint = Utc::now();
            match self.services.checkpoints.save(&progress) {
                Ok(()) => info!(platform = %platform, remaining = progress.remaining_tickers.len(), "suspended, checkpoint saved"),
                Err(e) => warn!(platform = %platform, error = %e, "suspended without checkpoint"),
            }
        } else if error.is_none() && progress.is_finished() {
            if let Err(e) = self.services.checkpoints.delete(&platform) {
                warn!(platform = %platform, error = %e, "stale checkpoint not deleted");
            }
        }

        let tickers_completed = progress.completed_tickers.len();
        control.set_state(if error.is_none() {
            AgentState::Done
        } else {
            AgentState::Failed
        });
        info!(
            platform = %platform,
            completed = tickers_completed,
            total = tickers_total,
            mentions = progress.mentions_so_far.len(),
            minutes,
            failed = error.is_some(),
            "agent finished"
        );

        AgentReport {
            result: PlatformScanResult::from_mentions(
                platform,
                progress.mentions_so_far,
                started.elapsed(),
                error,
            ),
            tickers_completed,
            tickers_total,
            suspended,
        }
    }
}
