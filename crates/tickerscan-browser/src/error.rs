//! Browser error type.

use thiserror::Error;
use tickerscan_core::{Platform, StoreError};

/// Result alias for browser operations.
pub type Result<T> = std::result::Result<T, BrowserError>;

/// Errors raised by browser sessions and the session manager.
#[derive(Debug, Error)]
pub enum BrowserError {
    /// The underlying chromium process or protocol failed
    #[error("chromium error: {0}")]
    ChromiumError(String),

    /// A page could not be loaded
    #[error("navigation failed: {0}")]
    NavigationError(String),

    /// An operation exceeded its deadline
    #[error("timeout: {0}")]
    Timeout(String),

    /// The session was closed, possibly by the orchestrator
    #[error("browser session closed")]
    SessionClosed,

    /// A platform requires credentials that are not configured
    #[error("no credentials configured for {platform}")]
    MissingCredentials {
        /// Platform needing credentials
        platform: Platform,
    },

    /// The login strategy reported an error
    #[error("login failed for {platform}: {reason}")]
    LoginFailed {
        /// Platform being logged into
        platform: Platform,
        /// Failure description
        reason: String,
    },

    /// Cookie persistence failed
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl BrowserError {
    /// Whether this error means the session is gone for good.
    #[must_use]
    pub fn is_session_lost(&self) -> bool {
        matches!(self, Self::SessionClosed | Self::ChromiumError(_))
    }
}
