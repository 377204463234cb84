use thiserror::Error;
use tickerscan_browser::BrowserError;
use tickerscan_core::{StoreError, TickerscanError};

/// Errors raised while scanning a platform.
#[derive(Debug, Error)]
pub enum ScanError {
    /// One ticker could not be scanned; the agent skips it and moves on
    #[error("scan of {ticker} failed: {reason}")]
    Transient {
        /// Ticker being scanned
        ticker: String,
        /// Failure description
        reason: String,
    },

    /// The browser session went away mid-scan
    #[error("browser session lost")]
    SessionLost,

    /// Browser error
    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),

    /// Persistence error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Core error
    #[error(transparent)]
    Core(#[from] TickerscanError),
}

impl ScanError {
    /// Convenience constructor for [`ScanError::Transient`].
    pub fn transient(ticker: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transient {
            ticker: ticker.into(),
            reason: reason.into(),
        }
    }

    /// Whether the session can no longer be used.
    #[must_use]
    pub fn is_session_lost(&self) -> bool {
        match self {
            Self::SessionLost => true,
            Self::Browser(e) => e.is_session_lost(),
            _ => false,
        }
    }
}

/// Result alias for scanner operations.
pub type Result<T> = std::result::Result<T, ScanError>;
