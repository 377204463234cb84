//! Contract for platform-specific scraping.

use crate::error::Result;
use tickerscan_browser::BrowserSession;
use tickerscan_core::{Platform, ScanTarget, SocialMention};

/// Finds mentions of one ticker on one platform.
///
/// Implementations own the DOM details. Errors that only affect the current
/// ticker should be [`ScanError::Transient`](crate::ScanError::Transient);
/// a lost session should surface as
/// [`ScanError::SessionLost`](crate::ScanError::SessionLost) or the browser
/// error that caused it.
#[async_trait::async_trait]
pub trait PlatformScanner: Send + Sync {
    /// Platform this scanner handles
    fn platform(&self) -> &Platform;

    /// Search the platform for `target` using `session`
    async fn scan_for_ticker(
        &self,
        session: &dyn BrowserSession,
        target: &ScanTarget,
    ) -> Result<Vec<SocialMention>>;
}
