//! Global daily browser-time budget.
//!
//! Every agent session is bracketed by [`CostTracker::start_session`] and
//! [`CostTracker::end_session`]; the elapsed minutes accumulate per platform
//! and in total. The totals live in `usage/cost.json` and reset on the first
//! access after the calendar day changes.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use tickerscan_core::{load_json, save_json, AppConfig, KvStore, Platform, StoreResult};
use tracing::{debug, info, warn};

const USAGE_KEY: &str = "usage/cost.json";

/// Cost tracker state for one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyUsage {
    /// Calendar day the totals belong to
    pub date: NaiveDate,
    /// Browser minutes used across all platforms
    pub total_browser_minutes: f64,
    /// Browser minutes per platform id
    pub platform_breakdown: BTreeMap<String, f64>,
    /// Sessions started today
    pub session_count: u32,
    /// Highest memory sample recorded today
    pub peak_memory_mb: u64,
    /// Agents suspended under memory pressure today
    pub suspension_count: u32,
}

impl DailyUsage {
    fn fresh(date: NaiveDate) -> Self {
        Self {
            date,
            total_browser_minutes: 0.0,
            platform_breakdown: BTreeMap::new(),
            session_count: 0,
            peak_memory_mb: 0,
            suspension_count: 0,
        }
    }
}

#[derive(Debug, Default)]
struct CostState {
    usage: Option<DailyUsage>,
    sessions: HashMap<String, DateTime<Utc>>,
}

/// Enforces the global daily browser-minute budget.
pub struct CostTracker {
    store: Arc<dyn KvStore>,
    daily_max_minutes: f64,
    state: Mutex<CostState>,
}

impl CostTracker {
    /// Create a tracker allowing `daily_max_minutes` of browser time per day.
    #[must_use]
    pub fn new(store: Arc<dyn KvStore>, daily_max_minutes: f64) -> Self {
        Self {
            store,
            daily_max_minutes,
            state: Mutex::new(CostState::default()),
        }
    }

    /// Create a tracker using `budget.daily_browser_minutes` from `config`.
    #[must_use]
    pub fn from_config(store: Arc<dyn KvStore>, config: &AppConfig) -> Self {
        Self::new(store, config.budget.daily_browser_minutes)
    }

    /// Configured daily maximum.
    #[must_use]
    pub fn daily_max_minutes(&self) -> f64 {
        self.daily_max_minutes
    }

    /// Run `f` on today's usage, loading it on first access and rolling it
    /// over on a new day. Persists afterwards when `f` reports a change.
    fn with_usage<T>(&self, now: DateTime<Utc>, f: impl FnOnce(&mut DailyUsage) -> (T, bool)) -> T {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let today = now.date_naive();
        let usage = state.usage.get_or_insert_with(|| {
            match load_json::<DailyUsage>(self.store.as_ref(), USAGE_KEY) {
                Ok(Some(stored)) => stored,
                Ok(None) => DailyUsage::fresh(today),
                Err(e) => {
                    warn!(error = %e, "unreadable cost tracker state, starting fresh");
                    DailyUsage::fresh(today)
                }
            }
        });
        if usage.date != today {
            debug!(from = %usage.date, to = %today, "cost tracker day rollover");
            *usage = DailyUsage::fresh(today);
        }

        let (value, changed) = f(usage);
        if changed {
            if let Err(e) = save_json(self.store.as_ref(), USAGE_KEY, &*usage) {
                warn!(error = %e, "failed to persist cost tracker state");
            }
        }
        value
    }

    /// Whether any browser time is left today.
    #[must_use]
    pub fn has_budget(&self) -> bool {
        self.has_budget_at(Utc::now())
    }

    /// [`has_budget`](Self::has_budget) at `now`.
    #[must_use]
    pub fn has_budget_at(&self, now: DateTime<Utc>) -> bool {
        let max = self.daily_max_minutes;
        self.with_usage(now, |usage| (usage.total_browser_minutes < max, false))
    }

    /// Minutes left today, never negative.
    #[must_use]
    pub fn remaining_minutes(&self) -> f64 {
        let max = self.daily_max_minutes;
        self.with_usage(Utc::now(), |usage| {
            ((max - usage.total_browser_minutes).max(0.0), false)
        })
    }

    /// Record the start of a session.
    pub fn start_session(&self, session_id: &str) {
        self.start_session_at(session_id, Utc::now());
    }

    /// [`start_session`](Self::start_session) at `now`.
    pub fn start_session_at(&self, session_id: &str, now: DateTime<Utc>) {
        self.with_usage(now, |usage| {
            usage.session_count += 1;
            ((), true)
        });
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.sessions.insert(session_id.to_string(), now);
        debug!(session_id, "cost session started");
    }

    /// Stop the clock for a session and charge its minutes to `platform`.
    ///
    /// Returns the minutes charged. Unknown ids (never started or already
    /// ended) charge nothing and return 0.
    pub fn end_session(&self, session_id: &str, platform: &Platform) -> f64 {
        self.end_session_at(session_id, platform, Utc::now())
    }

    /// [`end_session`](Self::end_session) at `now`.
    pub fn end_session_at(&self, session_id: &str, platform: &Platform, now: DateTime<Utc>) -> f64 {
        let started = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.sessions.remove(session_id)
        };
        let Some(started) = started else {
            debug!(session_id, "end_session for unknown session ignored");
            return 0.0;
        };

        #[allow(clippy::cast_precision_loss)]
        let minutes = (now - started).num_milliseconds().max(0) as f64 / 60_000.0;
        self.with_usage(now, |usage| {
            usage.total_browser_minutes += minutes;
            *usage
                .platform_breakdown
                .entry(platform.to_string())
                .or_insert(0.0) += minutes;
            ((), true)
        });
        info!(session_id, platform = %platform, minutes, "cost session ended");
        minutes
    }

    /// Count a memory-pressure suspension. Diagnostic only.
    pub fn record_suspension(&self) {
        self.with_usage(Utc::now(), |usage| {
            usage.suspension_count += 1;
            ((), true)
        });
    }

    /// Track the peak memory seen today.
    pub fn record_memory_sample(&self, used_mb: u64) {
        self.with_usage(Utc::now(), |usage| {
            let changed = used_mb > usage.peak_memory_mb;
            if changed {
                usage.peak_memory_mb = used_mb;
            }
            ((), changed)
        });
    }

    /// Snapshot of today's usage.
    #[must_use]
    pub fn usage(&self) -> DailyUsage {
        self.usage_at(Utc::now())
    }

    /// [`usage`](Self::usage) at `now`.
    #[must_use]
    pub fn usage_at(&self, now: DateTime<Utc>) -> DailyUsage {
        self.with_usage(now, |usage| (usage.clone(), false))
    }

    /// Persist the current totals, reporting any failure.
    pub fn flush(&self) -> StoreResult<()> {
        let usage = self.usage();
        save_json(self.store.as_ref(), USAGE_KEY, &usage)
    }
}
