//! Shared types used across the tickerscan crates.
//!
//! This module defines the scan inputs ([`ScanTarget`]), the records agents
//! produce ([`SocialMention`], [`PlatformScanResult`]) and the checkpoint that
//! makes an agent resumable ([`AgentProgress`]).

use crate::error::TickerscanError;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::OnceLock;
use std::time::Duration;

/// Mentions scoring at or above this value are promotional and get evidence captured.
pub const PROMOTIONAL_SCORE_THRESHOLD: u8 = 40;

/// Newtype for platform identifiers with validation.
///
/// Platform IDs must be lowercase alphanumeric with hyphens, 2-32 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Platform(String);

impl Platform {
    /// Create a new `Platform` from a string.
    ///
    /// # Errors
    /// Returns error if the ID doesn't match the required format.
    pub fn new(id: impl Into<String>) -> Result<Self, TickerscanError> {
        let id = id.into();
        Self::validate(&id)?;
        Ok(Self(id))
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(id: &str) -> Result<(), TickerscanError> {
        static PLATFORM_REGEX: OnceLock<Regex> = OnceLock::new();
        let regex = PLATFORM_REGEX.get_or_init(|| {
            Regex::new(r"^[a-z0-9][a-z0-9-]{0,30}[a-z0-9]$").expect("valid regex")
        });

        if regex.is_match(id) {
            Ok(())
        } else {
            Err(TickerscanError::Validation(format!(
                "invalid platform ID: must be 2-32 lowercase alphanumeric characters or hyphens, got '{id}'"
            )))
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Upstream risk classification attached to a scan target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    /// Low risk
    Low,
    /// Medium risk
    #[default]
    Medium,
    /// High risk
    High,
    /// Not enough data to classify
    Insufficient,
}

/// A ticker to search for. Immutable input whose order is preserved for the whole run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanTarget {
    /// Ticker symbol, e.g. `ABCD`
    pub ticker: String,
    /// Company name
    pub name: String,
    /// Upstream risk score
    pub risk_score: f64,
    /// Upstream risk level
    pub risk_level: RiskLevel,
    /// Signals that made this ticker worth scanning
    #[serde(default)]
    pub signals: Vec<String>,
}

impl ScanTarget {
    /// Create a target with no risk metadata.
    #[must_use]
    pub fn new(ticker: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            name: name.into(),
            risk_score: 0.0,
            risk_level: RiskLevel::default(),
            signals: Vec::new(),
        }
    }
}

/// Engagement counters reported by a platform for a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Engagement {
    /// Likes / upvotes
    pub likes: u64,
    /// Comments / replies
    pub comments: u64,
    /// Shares / reposts
    pub shares: u64,
    /// Views, when the platform exposes them
    pub views: Option<u64>,
}

/// Coarse sentiment of a mention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    /// Bullish / positive
    Positive,
    /// Bearish / negative
    Negative,
    /// Neutral or undetermined
    #[default]
    Neutral,
}

/// One discovered post, video or message referencing a ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialMention {
    pub platform: Platform,
    pub ticker: String,
    /// Sub-source on the platform (subreddit, channel, server)
    pub source: String,
    /// How the mention was found (search query, hashtag, feed)
    pub discovered_via: String,
    pub title: String,
    pub content: String,
    pub url: String,
    pub author: String,
    pub post_date: Option<DateTime<Utc>>,
    pub engagement: Engagement,
    pub sentiment: Sentiment,
    pub is_promotional: bool,
    /// Always within `0..=100`
    pub promotion_score: u8,
    pub red_flags: Vec<String>,
}

impl SocialMention {
    /// Create an unscored mention.
    #[must_use]
    pub fn new(platform: Platform, ticker: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            platform,
            ticker: ticker.into(),
            source: String::new(),
            discovered_via: String::new(),
            title: String::new(),
            content: String::new(),
            url: url.into(),
            author: String::new(),
            post_date: None,
            engagement: Engagement::default(),
            sentiment: Sentiment::default(),
            is_promotional: false,
            promotion_score: 0,
            red_flags: Vec::new(),
        }
    }

    /// Apply a raw promotion score, clamping it into `0..=100`.
    pub fn apply_score(&mut self, raw: i64, flags: Vec<String>) {
        self.promotion_score = clamp_score(raw);
        self.is_promotional = self.promotion_score >= PROMOTIONAL_SCORE_THRESHOLD;
        self.red_flags = flags;
    }
}

/// Clamp a raw computed score into the reportable `0..=100` range.
#[must_use]
pub fn clamp_score(raw: i64) -> u8 {
    u8::try_from(raw.clamp(0, 100)).unwrap_or(100)
}

/// How busy a platform is for the scanned tickers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityLevel {
    High,
    Medium,
    Low,
    None,
}

impl ActivityLevel {
    /// Classify by mention count: high at 10+, medium at 3+, low above zero.
    #[must_use]
    pub fn from_count(mentions_found: usize) -> Self {
        match mentions_found {
            0 => Self::None,
            1..=2 => Self::Low,
            3..=9 => Self::Medium,
            _ => Self::High,
        }
    }
}

/// Aggregate promotion risk across a set of mentions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromotionRisk {
    High,
    Medium,
    Low,
}

impl PromotionRisk {
    /// Classify by mean promotion score: high at 50+, medium at 25+.
    #[must_use]
    pub fn from_mentions(mentions: &[SocialMention]) -> Self {
        if mentions.is_empty() {
            return Self::Low;
        }
        let total: u64 = mentions.iter().map(|m| u64::from(m.promotion_score)).sum();
        #[allow(clippy::cast_precision_loss)]
        let mean = total as f64 / mentions.len() as f64;
        if mean >= 50.0 {
            Self::High
        } else if mean >= 25.0 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// Aggregated outcome of one agent invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformScanResult {
    pub platform: Platform,
    pub success: bool,
    pub error: Option<String>,
    pub mentions_found: usize,
    pub mentions: Vec<SocialMention>,
    pub activity_level: ActivityLevel,
    pub promotion_risk: PromotionRisk,
    pub scan_duration: Duration,
}

impl PlatformScanResult {
    /// Build a result from the mentions gathered so far.
    ///
    /// A failed run still reports everything it collected before failing.
    #[must_use]
    pub fn from_mentions(
        platform: Platform,
        mentions: Vec<SocialMention>,
        scan_duration: Duration,
        error: Option<String>,
    ) -> Self {
        Self {
            platform,
            success: error.is_none(),
            error,
            mentions_found: mentions.len(),
            activity_level: ActivityLevel::from_count(mentions.len()),
            promotion_risk: PromotionRisk::from_mentions(&mentions),
            mentions,
            scan_duration,
        }
    }

    /// A failure with nothing collected.
    #[must_use]
    pub fn failed(platform: Platform, error: impl Into<String>) -> Self {
        Self::from_mentions(platform, Vec::new(), Duration::ZERO, Some(error.into()))
    }
}

/// Persisted progress of one agent, enabling crash-safe resume.
///
/// `completed_tickers` and `remaining_tickers` together always cover the
/// original target set exactly once, in original order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentProgress {
    pub platform: Platform,
    pub started_at: DateTime<Utc>,
    pub completed_tickers: Vec<String>,
    pub remaining_tickers: Vec<ScanTarget>,
    /// Completed tickers whose scan failed and produced no mentions
    #[serde(default)]
    pub failed_tickers: Vec<String>,
    pub mentions_so_far: Vec<SocialMention>,
    pub browser_minutes_used: f64,
    pub last_checkpoint: DateTime<Utc>,
}

impl AgentProgress {
    /// Fresh progress covering every target.
    #[must_use]
    pub fn new(platform: Platform, targets: &[ScanTarget], now: DateTime<Utc>) -> Self {
        Self {
            platform,
            started_at: now,
            completed_tickers: Vec::new(),
            remaining_tickers: targets.to_vec(),
            failed_tickers: Vec::new(),
            mentions_so_far: Vec::new(),
            browser_minutes_used: 0.0,
            last_checkpoint: now,
        }
    }

    /// Move `ticker` from remaining to completed and append its mentions.
    ///
    /// Returns false (and changes nothing) if the ticker is not remaining.
    pub fn complete_ticker(&mut self, ticker: &str, mentions: Vec<SocialMention>) -> bool {
        let Some(pos) = self.remaining_tickers.iter().position(|t| t.ticker == ticker) else {
            return false;
        };
        self.remaining_tickers.remove(pos);
        self.completed_tickers.push(ticker.to_string());
        self.mentions_so_far.extend(mentions);
        true
    }

    /// Complete `ticker` with no mentions and remember that its scan failed.
    pub fn fail_ticker(&mut self, ticker: &str) -> bool {
        if self.complete_ticker(ticker, Vec::new()) {
            self.failed_tickers.push(ticker.to_string());
            true
        } else {
            false
        }
    }

    /// True when no tickers remain.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.remaining_tickers.is_empty()
    }

    /// Check the coverage invariant against the original target list.
    #[must_use]
    pub fn matches_targets(&self, targets: &[ScanTarget]) -> bool {
        let covered = self.completed_tickers.len() + self.remaining_tickers.len();
        if covered != targets.len() {
            return false;
        }

        let mut seen = HashSet::with_capacity(covered);
        let all_unique = self
            .completed_tickers
            .iter()
            .map(String::as_str)
            .chain(self.remaining_tickers.iter().map(|t| t.ticker.as_str()))
            .all(|ticker| seen.insert(ticker));
        if !all_unique || !targets.iter().all(|t| seen.contains(t.ticker.as_str())) {
            return false;
        }

        // remaining must be a subsequence of the original order
        let mut originals = targets.iter();
        self.remaining_tickers
            .iter()
            .all(|r| originals.any(|t| t.ticker == r.ticker))
    }
}
