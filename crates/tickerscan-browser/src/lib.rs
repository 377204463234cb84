//! Browser automation for scan agents.
//!
//! Provides the [`BrowserSession`] contract agents drive, a chromiumoxide
//! backed [`BrowserEngine`] that launches one headless browser per session
//! with a randomized fingerprint, and the [`SessionManager`] that restores
//! cookies and runs the per-platform login strategy.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod login;
pub mod session;

pub use engine::BrowserEngine;
pub use error::{BrowserError, Result};
pub use fingerprint::FingerprintConfig;
pub use login::{AnonymousLogin, Credentials, LoginRegistry, PlatformLogin, SessionManager};
pub use session::{extract_domain, BrowserSession, Cookie, SessionLauncher};
