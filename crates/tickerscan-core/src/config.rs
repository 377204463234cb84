//! Configuration management for tickerscan.
//!
//! Provides TOML-based configuration with XDG-compliant paths and
//! environment variable overrides.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Platform;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration.
///
/// This is loaded from `~/.config/tickerscan/config.toml` (or platform equivalent).
/// If the file doesn't exist, default values are used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Orchestrator admission and resource policy
    pub scanning: ScanningConfig,
    /// Global daily time budget
    pub budget: BudgetConfig,
    /// Browser automation settings
    pub browser: BrowserConfig,
    /// Where state files live
    pub storage: StorageConfig,
    /// Per-platform rate limits, keyed by platform id
    pub platforms: BTreeMap<String, PlatformLimits>,
}

impl AppConfig {
    /// Load configuration from disk, falling back to defaults if not found.
    ///
    /// # Errors
    /// Returns error if:
    /// - Config directory cannot be determined
    /// - File exists but cannot be read
    /// - File contents are not valid TOML
    pub fn load() -> ConfigResult<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            tracing::debug!("Loading config from {}", config_path.display());
            let contents = fs::read_to_string(&config_path)?;
            let config = toml::from_str(&contents)?;
            Ok(config)
        } else {
            tracing::debug!("Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration with environment variable overrides.
    ///
    /// Supports the following environment variables:
    /// - `TICKERSCAN_MAX_PARALLEL`: Override the number of concurrent agents
    /// - `TICKERSCAN_DAILY_MINUTES`: Override the daily browser-minute budget
    /// - `TICKERSCAN_MEMORY_BUDGET_MB`: Override the admission memory budget
    /// - `TICKERSCAN_HEADLESS`: Override browser headless mode (true/false)
    pub fn load_with_env() -> ConfigResult<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(parallel) = lookup("TICKERSCAN_MAX_PARALLEL").and_then(|v| v.parse().ok()) {
            self.scanning.max_parallel = parallel;
            tracing::debug!("Override scanning.max_parallel from env: {}", parallel);
        }

        if let Some(minutes) = lookup("TICKERSCAN_DAILY_MINUTES").and_then(|v| v.parse().ok()) {
            self.budget.daily_browser_minutes = minutes;
            tracing::debug!("Override budget.daily_browser_minutes from env: {}", minutes);
        }

        if let Some(mb) = lookup("TICKERSCAN_MEMORY_BUDGET_MB").and_then(|v| v.parse().ok()) {
            self.scanning.memory_budget_mb = mb;
            tracing::debug!("Override scanning.memory_budget_mb from env: {}", mb);
        }

        if let Some(headless) = lookup("TICKERSCAN_HEADLESS").and_then(|v| v.parse().ok()) {
            self.browser.headless = headless;
            tracing::debug!("Override browser.headless from env: {}", headless);
        }
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.scanning.max_parallel == 0 {
            return Err(invalid("scanning.max_parallel", "must be at least 1"));
        }
        if self.scanning.memory_ceiling_mb < self.scanning.memory_budget_mb {
            return Err(invalid(
                "scanning.memory_ceiling_mb",
                "must not be below scanning.memory_budget_mb",
            ));
        }
        if self.budget.daily_browser_minutes < 0.0 {
            return Err(invalid("budget.daily_browser_minutes", "must not be negative"));
        }
        for (platform, limits) in &self.platforms {
            if Platform::new(platform.as_str()).is_err() {
                return Err(invalid("platforms", &format!("invalid platform id '{platform}'")));
            }
            if limits.min_delay_ms > limits.max_delay_ms {
                return Err(invalid(
                    &format!("platforms.{platform}.min_delay_ms"),
                    "must not exceed max_delay_ms",
                ));
            }
        }
        Ok(())
    }

    /// Limits for `platform`, falling back to its ban-risk tier defaults.
    #[must_use]
    pub fn limits_for(&self, platform: &Platform) -> PlatformLimits {
        self.platforms
            .get(platform.as_str())
            .cloned()
            .unwrap_or_else(|| PlatformLimits::default_for(platform.as_str()))
    }

    /// Save configuration to disk.
    ///
    /// Creates the config directory if it doesn't exist.
    pub fn save(&self) -> ConfigResult<()> {
        let config_path = Self::config_path()?;
        let config_dir = config_path
            .parent()
            .ok_or_else(|| invalid("config_path", "no parent directory"))?;

        fs::create_dir_all(config_dir)?;
        tracing::debug!("Saving config to {}", config_path.display());

        let contents = toml::to_string_pretty(self)?;
        fs::write(config_path, contents)?;
        Ok(())
    }

    /// Get the path to the configuration file.
    ///
    /// Uses XDG base directories: `~/.config/tickerscan/config.toml`
    pub fn config_path() -> ConfigResult<PathBuf> {
        let dirs = project_dirs()?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Directory holding checkpoints, usage files, cookies and evidence.
    ///
    /// `storage.data_dir` wins; otherwise `~/.local/share/tickerscan`.
    pub fn data_dir(&self) -> ConfigResult<PathBuf> {
        if let Some(dir) = &self.storage.data_dir {
            return Ok(dir.clone());
        }
        let dirs = project_dirs()?;
        Ok(dirs.data_dir().to_path_buf())
    }
}

fn project_dirs() -> ConfigResult<ProjectDirs> {
    ProjectDirs::from("com", "tickerscan", "tickerscan").ok_or(ConfigError::NoConfigDir)
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// Orchestrator admission and resource settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanningConfig {
    /// Maximum agents running at once
    pub max_parallel: usize,
    /// Admission budget: an agent launches only if its footprint fits under this
    pub memory_budget_mb: u64,
    /// Measured usage above this triggers save-kill-resume of one agent
    pub memory_ceiling_mb: u64,
    /// Estimated footprint of one agent with its browser session
    pub agent_footprint_mb: u64,
    /// How often the orchestrator samples memory while agents run
    pub pressure_check_secs: u64,
    /// An agent suspended this many times is no longer preempted
    pub max_suspensions: u32,
    /// Mentions at or above this score get a screenshot
    pub evidence_score_threshold: u8,
}

impl ScanningConfig {
    /// Memory sampling interval.
    #[must_use]
    pub fn pressure_check_interval(&self) -> Duration {
        Duration::from_secs(self.pressure_check_secs.max(1))
    }
}

impl Default for ScanningConfig {
    fn default() -> Self {
        Self {
            max_parallel: 3,
            memory_budget_mb: 4096,
            memory_ceiling_mb: 5120,
            agent_footprint_mb: 600,
            pressure_check_secs: 15,
            max_suspensions: 3,
            evidence_score_threshold: crate::types::PROMOTIONAL_SCORE_THRESHOLD,
        }
    }
}

/// Global daily time budget across all platforms.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Browser minutes allowed per calendar day
    pub daily_browser_minutes: f64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            daily_browser_minutes: 240.0,
        }
    }
}

/// Browser automation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Run browser in headless mode
    pub headless: bool,
    /// Browser window width
    pub window_width: u32,
    /// Browser window height
    pub window_height: u32,
    /// Navigation timeout in seconds
    pub navigation_timeout_secs: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 1920,
            window_height: 1080,
            navigation_timeout_secs: 30,
        }
    }
}

/// State file location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Override for the data directory
    pub data_dir: Option<PathBuf>,
}

/// Rate limits and humanized delay range for one platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformLimits {
    /// Page loads allowed per calendar day
    pub daily_page_max: u32,
    /// Actions allowed per 60-second window
    pub per_minute_max: u32,
    /// Lower bound of the delay between actions
    pub min_delay_ms: u64,
    /// Upper bound of the delay between actions
    pub max_delay_ms: u64,
}

impl PlatformLimits {
    /// Defaults by ban-risk tier. Unknown platforms get the medium tier.
    #[must_use]
    pub fn default_for(platform: &str) -> Self {
        match platform {
            "twitter" | "instagram" | "tiktok" | "facebook" => Self {
                daily_page_max: 100,
                per_minute_max: 4,
                min_delay_ms: 8_000,
                max_delay_ms: 20_000,
            },
            "stocktwits" => Self {
                daily_page_max: 300,
                per_minute_max: 12,
                min_delay_ms: 2_000,
                max_delay_ms: 5_000,
            },
            _ => Self::default(),
        }
    }

    /// Lower delay bound.
    #[must_use]
    pub fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_delay_ms)
    }

    /// Upper delay bound.
    #[must_use]
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl Default for PlatformLimits {
    fn default() -> Self {
        Self {
            daily_page_max: 200,
            per_minute_max: 8,
            min_delay_ms: 3_000,
            max_delay_ms: 8_000,
        }
    }
}
