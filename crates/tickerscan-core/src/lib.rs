//! Tickerscan Core - Foundation crate for the tickerscan agent fleet.
//!
//! This crate provides the shared data model, error handling, configuration
//! management and persistence layer that the budget, browser and scanner
//! crates depend on.
//!
//! # Modules
//!
//! - [`error`] - Central error types using thiserror
//! - [`config`] - TOML-based configuration with XDG paths
//! - [`types`] - Scan targets, mentions, results and checkpoints
//! - [`store`] - Injected key-value persistence with atomic file writes
//! - [`scoring`] - The content scoring contract and a keyword scorer
//! - [`telemetry`] - Tracing subscriber setup
//!
//! # Example
//!
//! ```rust
//! use tickerscan_core::{AppConfig, MemoryStore, KvStore};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::default();
//! config.validate()?;
//!
//! let store = MemoryStore::new();
//! store.put("usage/cost.json", b"{}")?;
//! assert!(store.get("usage/cost.json")?.is_some());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config;
pub mod error;
pub mod scoring;
pub mod store;
pub mod telemetry;
#[allow(missing_docs)]
pub mod types;

// Re-export commonly used types
pub use config::{
    AppConfig, BrowserConfig, BudgetConfig, PlatformLimits, ScanningConfig, StorageConfig,
};
pub use error::{ConfigError, ConfigResult, Result, StoreError, StoreResult, TickerscanError};
pub use scoring::{ContentScore, ContentScorer, KeywordScorer};
pub use store::{load_json, save_json, FileStore, KvStore, MemoryStore};
pub use types::{
    ActivityLevel, AgentProgress, Engagement, Platform, PlatformScanResult, PromotionRisk,
    RiskLevel, ScanTarget, Sentiment, SocialMention, PROMOTIONAL_SCORE_THRESHOLD,
};
