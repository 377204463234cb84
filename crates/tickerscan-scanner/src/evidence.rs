//! Evidence of promotional content.
//!
//! Agents hand every mention at or above the evidence threshold to the
//! [`EvidenceCollector`], optionally with a screenshot of the post. Records
//! stay pending until [`EvidenceCollector::save_evidence_file`] merges them
//! into `evidence/{date}.json`; agents do that after every ticker.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use tickerscan_browser::BrowserSession;
use tickerscan_core::{
    load_json, save_json, KvStore, Platform, ScanningConfig, SocialMention, StoreResult,
    PROMOTIONAL_SCORE_THRESHOLD,
};
use tracing::{debug, info, warn};

/// One piece of evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceRecord {
    /// Platform the mention was found on
    pub platform: Platform,
    /// Ticker the mention refers to
    pub ticker: String,
    /// Post URL
    pub url: String,
    /// Post author
    pub author: String,
    /// Post title
    pub title: String,
    /// Post body
    pub content: String,
    /// Promotion score in `[0, 100]`
    pub promotion_score: u8,
    /// Matched red flags
    pub red_flags: Vec<String>,
    /// Where the screenshot was stored, if one was taken
    pub screenshot: Option<String>,
    /// When the evidence was recorded
    pub captured_at: DateTime<Utc>,
}

impl EvidenceRecord {
    fn from_mention(mention: &SocialMention, screenshot: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            platform: mention.platform.clone(),
            ticker: mention.ticker.clone(),
            url: mention.url.clone(),
            author: mention.author.clone(),
            title: mention.title.clone(),
            content: mention.content.clone(),
            promotion_score: mention.promotion_score,
            red_flags: mention.red_flags.clone(),
            screenshot,
            captured_at: now,
        }
    }
}

fn evidence_key(date: NaiveDate) -> String {
    format!("evidence/{}.json", date.format("%Y-%m-%d"))
}

fn screenshot_key(platform: &Platform, ticker: &str, now: DateTime<Utc>) -> String {
    let ticker: String = ticker
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect();
    format!(
        "evidence/screenshots/{platform}-{ticker}-{}.png",
        now.format("%Y%m%dT%H%M%S%3fZ")
    )
}

/// Collects evidence records and screenshots.
pub struct EvidenceCollector {
    store: Arc<dyn KvStore>,
    threshold: u8,
    pending: Mutex<Vec<EvidenceRecord>>,
}

impl EvidenceCollector {
    /// Create a collector using the default threshold.
    #[must_use]
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            threshold: PROMOTIONAL_SCORE_THRESHOLD,
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Create a collector using `evidence_score_threshold` from `config`.
    #[must_use]
    pub fn from_config(store: Arc<dyn KvStore>, config: &ScanningConfig) -> Self {
        Self::new(store).with_threshold(config.evidence_score_threshold)
    }

    /// Override the minimum score that warrants evidence.
    #[must_use]
    pub fn with_threshold(mut self, threshold: u8) -> Self {
        self.threshold = threshold;
        self
    }

    /// Whether `mention` scores high enough to be kept as evidence.
    #[must_use]
    pub fn qualifies(&self, mention: &SocialMention) -> bool {
        mention.promotion_score >= self.threshold
    }

    /// Navigate to `url` and store a screenshot of it.
    ///
    /// Best effort: returns the stored location, or `None` after logging
    /// whatever went wrong.
    pub async fn capture_screenshot(
        &self,
        session: &dyn BrowserSession,
        url: &str,
        ticker: &str,
        platform: &Platform,
    ) -> Option<String> {
        if let Err(e) = session.navigate(url).await {
            warn!(platform = %platform, ticker, url, error = %e, "screenshot navigation failed");
            return None;
        }
        let png = match session.screenshot().await {
            Ok(png) => png,
            Err(e) => {
                warn!(platform = %platform, ticker, error = %e, "screenshot capture failed");
                return None;
            }
        };

        let key = screenshot_key(platform, ticker, Utc::now());
        match self.store.put(&key, &png) {
            Ok(()) => {
                let location = self.store.locate(&key);
                debug!(platform = %platform, ticker, location = %location, "screenshot saved");
                Some(location)
            }
            Err(e) => {
                warn!(platform = %platform, ticker, error = %e, "screenshot not saved");
                None
            }
        }
    }

    /// Queue an evidence record for `mention`.
    pub fn record(&self, mention: &SocialMention, screenshot: Option<String>) {
        let record = EvidenceRecord::from_mention(mention, screenshot, Utc::now());
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.push(record);
    }

    /// Records waiting to be written.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Append pending records to the evidence file for `date`.
    ///
    /// Existing records are kept; pending ones are drained only after the
    /// merged file is written. Returns the number of records in the file.
    pub fn save_evidence_file(&self, date: NaiveDate) -> StoreResult<usize> {
        let key = evidence_key(date);
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);

        let mut records: Vec<EvidenceRecord> =
            load_json(self.store.as_ref(), &key)?.unwrap_or_default();
        let added = pending.len();
        records.extend(pending.iter().cloned());
        save_json(self.store.as_ref(), &key, &records)?;
        pending.clear();

        info!(date = %date, added, total = records.len(), "evidence saved");
        Ok(records.len())
    }
}
