//! Tickerscan Scanner - agent fleet orchestration.
//!
//! This crate runs one [`ScanAgent`] per platform over a shared list of
//! tickers. Agents respect per-platform rate limits and the daily browser
//! budget, checkpoint after every ticker, and hand high-scoring mentions to
//! the [`EvidenceCollector`]. The [`Orchestrator`] admits agents under a
//! parallelism cap and a memory budget, suspending agents when memory
//! crosses the ceiling and resuming them later from their checkpoints.
//!
//! # Example
//!
//! ```rust,ignore
//! use tickerscan_scanner::{Orchestrator, ProcessTreeProbe, ScanAgent};
//! use std::sync::Arc;
//!
//! let orchestrator = Orchestrator::new(&config.scanning, Arc::new(ProcessTreeProbe::new()))
//!     .with_cost_tracker(cost.clone())
//!     .with_evidence(evidence.clone())
//!     .with_agent(Arc::new(ScanAgent::from_config(reddit_scanner, services.clone(), &config.scanning)))
//!     .with_agent(Arc::new(ScanAgent::from_config(stocktwits_scanner, services, &config.scanning)));
//!
//! let report = orchestrator.run_report(&targets).await;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod agent;
pub mod checkpoint;
pub mod error;
pub mod evidence;
pub mod memory;
pub mod orchestrator;
pub mod platform;

// Re-export commonly used types
pub use agent::{
    AgentControl, AgentReport, AgentServices, AgentState, ScanAgent, ScanWorker, BUDGET_EXHAUSTED,
    SUSPENDED,
};
pub use checkpoint::CheckpointStore;
pub use error::{Result, ScanError};
pub use evidence::{EvidenceCollector, EvidenceRecord};
pub use memory::{FixedProbe, MemoryProbe, ProcessTreeProbe};
pub use orchestrator::{AgentRunStatus, AgentStatus, Orchestrator, RunStatus, ScanRunReport};
pub use platform::PlatformScanner;
