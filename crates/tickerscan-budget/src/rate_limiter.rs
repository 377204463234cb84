//! Per-platform rate limiting.
//!
//! Each platform has a daily page cap and a per-minute action cap. Counters
//! live in `usage/rate-{platform}.json` so limits hold across process
//! restarts, and reset on the first access after the calendar day changes.

use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tickerscan_core::{load_json, save_json, AppConfig, KvStore, Platform, PlatformLimits, StoreResult};
use tracing::{debug, warn};

/// Length of the sliding action window.
const WINDOW: Duration = Duration::from_secs(60);

/// Rate limiter state for one platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformUsage {
    /// Platform the counters belong to
    pub platform: Platform,
    /// Page loads so far today
    pub pages_used_today: u32,
    /// Actions in the current 60-second window
    pub actions_this_minute: u32,
    /// Start of the current window
    pub minute_started_at: DateTime<Utc>,
    /// Time of the most recent action
    pub last_action_at: Option<DateTime<Utc>>,
    /// Calendar day the counters belong to
    pub date: NaiveDate,
}

impl PlatformUsage {
    fn fresh(platform: Platform, now: DateTime<Utc>) -> Self {
        Self {
            platform,
            pages_used_today: 0,
            actions_this_minute: 0,
            minute_started_at: now,
            last_action_at: None,
            date: now.date_naive(),
        }
    }

    /// Reset everything if `now` falls on a later day than the counters.
    fn roll_day(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();
        if self.date != today {
            debug!(platform = %self.platform, from = %self.date, to = %today, "rate limiter day rollover");
            let platform = self.platform.clone();
            let last_action_at = self.last_action_at;
            *self = Self::fresh(platform, now);
            self.last_action_at = last_action_at;
        }
    }

    /// Start a new window once more than 60 seconds have passed since the current one began.
    fn roll_window(&mut self, now: DateTime<Utc>) {
        if elapsed_between(self.minute_started_at, now) > WINDOW {
            self.actions_this_minute = 0;
            self.minute_started_at = now;
        }
    }
}

fn elapsed_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> Duration {
    (later - earlier).to_std().unwrap_or(Duration::ZERO)
}

/// How long to still wait given the sampled delay and the time of the last action.
///
/// Time already spent since the last action counts toward the delay, so
/// delays never stack.
#[must_use]
pub fn remaining_delay(
    required: Duration,
    last_action_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Duration {
    match last_action_at {
        Some(last) => required.saturating_sub(elapsed_between(last, now)),
        None => Duration::ZERO,
    }
}

/// Enforces per-platform daily and per-minute caps.
pub struct RateLimiter {
    store: Arc<dyn KvStore>,
    limits: HashMap<Platform, PlatformLimits>,
    usage: Mutex<HashMap<Platform, PlatformUsage>>,
}

impl RateLimiter {
    /// Create a limiter using tier defaults for every platform.
    #[must_use]
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            limits: HashMap::new(),
            usage: Mutex::new(HashMap::new()),
        }
    }

    /// Create a limiter with the platform limits from `config`.
    #[must_use]
    pub fn from_config(store: Arc<dyn KvStore>, config: &AppConfig) -> Self {
        let mut limiter = Self::new(store);
        for (id, limits) in &config.platforms {
            match Platform::new(id.as_str()) {
                Ok(platform) => {
                    limiter.limits.insert(platform, limits.clone());
                }
                Err(e) => warn!("Ignoring limits for {}: {}", id, e),
            }
        }
        limiter
    }

    /// Override the limits for one platform.
    #[must_use]
    pub fn with_limits(mut self, platform: Platform, limits: PlatformLimits) -> Self {
        self.limits.insert(platform, limits);
        self
    }

    /// Limits in force for `platform`.
    #[must_use]
    pub fn limits(&self, platform: &Platform) -> PlatformLimits {
        self.limits
            .get(platform)
            .cloned()
            .unwrap_or_else(|| PlatformLimits::default_for(platform.as_str()))
    }

    fn key(platform: &Platform) -> String {
        format!("usage/rate-{platform}.json")
    }

    /// Run `f` on the platform's rolled-over usage, loading it on first access.
    fn with_usage<T>(
        &self,
        platform: &Platform,
        now: DateTime<Utc>,
        f: impl FnOnce(&mut PlatformUsage) -> T,
    ) -> T {
        let mut usage = self.usage.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = usage.entry(platform.clone()).or_insert_with(|| {
            match load_json::<PlatformUsage>(self.store.as_ref(), &Self::key(platform)) {
                Ok(Some(stored)) => stored,
                Ok(None) => PlatformUsage::fresh(platform.clone(), now),
                Err(e) => {
                    warn!(platform = %platform, error = %e, "unreadable rate limiter state, starting fresh");
                    PlatformUsage::fresh(platform.clone(), now)
                }
            }
        });
        entry.roll_day(now);
        entry.roll_window(now);
        f(entry)
    }

    /// Whether another action is allowed on `platform` right now.
    #[must_use]
    pub fn can_proceed(&self, platform: &Platform) -> bool {
        self.can_proceed_at(platform, Utc::now())
    }

    /// [`can_proceed`](Self::can_proceed) evaluated at `now`.
    #[must_use]
    pub fn can_proceed_at(&self, platform: &Platform, now: DateTime<Utc>) -> bool {
        let limits = self.limits(platform);
        self.with_usage(platform, now, |usage| {
            usage.pages_used_today < limits.daily_page_max
                && usage.actions_this_minute < limits.per_minute_max
        })
    }

    /// Count one action against both caps and persist the counters.
    ///
    /// Counters saturate at their caps. The in-memory update always happens;
    /// an error only reports that persisting it failed.
    pub fn record_action(&self, platform: &Platform) -> StoreResult<()> {
        self.record_action_at(platform, Utc::now())
    }

    /// [`record_action`](Self::record_action) at `now`.
    pub fn record_action_at(&self, platform: &Platform, now: DateTime<Utc>) -> StoreResult<()> {
        let limits = self.limits(platform);
        let snapshot = self.with_usage(platform, now, |usage| {
            if usage.pages_used_today < limits.daily_page_max {
                usage.pages_used_today += 1;
            }
            if usage.actions_this_minute < limits.per_minute_max {
                usage.actions_this_minute += 1;
            }
            usage.last_action_at = Some(now);
            usage.clone()
        });
        save_json(self.store.as_ref(), &Self::key(platform), &snapshot)
    }

    /// Sample the humanized pause for `platform` uniformly from its delay range.
    #[must_use]
    pub fn required_delay(&self, platform: &Platform) -> Duration {
        let limits = self.limits(platform);
        let (low, high) = if limits.min_delay_ms <= limits.max_delay_ms {
            (limits.min_delay_ms, limits.max_delay_ms)
        } else {
            (limits.max_delay_ms, limits.min_delay_ms)
        };
        Duration::from_millis(rand::thread_rng().gen_range(low..=high))
    }

    /// Sleep for whatever part of a fresh humanized delay has not already
    /// elapsed since the last action. Returns the time slept.
    pub async fn wait_for_delay(&self, platform: &Platform) -> Duration {
        let required = self.required_delay(platform);
        let now = Utc::now();
        let last = self.with_usage(platform, now, |usage| usage.last_action_at);
        let wait = remaining_delay(required, last, now);
        if !wait.is_zero() {
            debug!(platform = %platform, wait_ms = wait.as_millis(), "humanized delay");
            tokio::time::sleep(wait).await;
        }
        wait
    }

    /// Snapshot of the platform's counters.
    #[must_use]
    pub fn usage(&self, platform: &Platform) -> PlatformUsage {
        self.usage_at(platform, Utc::now())
    }

    /// [`usage`](Self::usage) at `now`.
    #[must_use]
    pub fn usage_at(&self, platform: &Platform, now: DateTime<Utc>) -> PlatformUsage {
        self.with_usage(platform, now, |usage| usage.clone())
    }
}
