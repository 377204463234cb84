//! Budget enforcement for scan agents.
//!
//! Two independent gates decide whether an agent may take its next action:
//!
//! - [`RateLimiter`] enforces per-platform daily page caps and a sliding
//!   60-second action cap, and computes the humanized pause between actions.
//! - [`CostTracker`] enforces a global daily budget of browser minutes across
//!   every platform and brackets each agent session.
//!
//! Neither gate returns errors for an exhausted budget. A `false` from
//! [`RateLimiter::can_proceed`] or [`CostTracker::has_budget`] is the normal
//! signal to stop early. Both persist their counters through an injected
//! [`tickerscan_core::KvStore`] and reset lazily on the first access after a
//! calendar-day rollover.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod cost_tracker;
pub mod rate_limiter;

pub use cost_tracker::{CostTracker, DailyUsage};
pub use rate_limiter::{PlatformUsage, RateLimiter};
