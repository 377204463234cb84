//! Memory-aware orchestration of scan agents.
//!
//! The [`Orchestrator`] runs a queue of [`ScanWorker`]s against one target
//! list with three tiers of memory handling:
//!
//! 1. **Queue**: an agent is admitted only while fewer than `max_parallel`
//!    run and its footprint fits in `memory_budget_mb`. Otherwise it waits.
//! 2. **Save-kill-resume**: when measured memory exceeds
//!    `memory_ceiling_mb`, the most recently launched agent is suspended. It
//!    checkpoints, frees its browser and goes to the back of the queue.
//! 3. **Sequential fallback**: when nothing runs, the head of the queue is
//!    launched whether it fits or not, so the run always makes progress.

use crate::agent::{AgentControl, AgentReport, ScanWorker};
use crate::evidence::EvidenceCollector;
use crate::memory::MemoryProbe;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tickerscan_budget::CostTracker;
use tickerscan_core::{Platform, PlatformScanResult, ScanTarget, ScanningConfig};
use tokio::task::JoinError;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Where an agent is in the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Waiting for admission
    Queued,
    /// Task in flight
    Running,
    /// Stopped under memory pressure and re-queued
    Suspended,
    /// Finished successfully
    Completed,
    /// Finished with an error
    Failed,
}

/// Status of one agent within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRunStatus {
    /// Agent name
    pub name: String,
    /// Platform scanned
    pub platform: Platform,
    /// Current status
    pub status: AgentStatus,
    /// Tickers completed so far
    pub tickers_completed: usize,
    /// Tickers in the target list
    pub tickers_total: usize,
    /// Mentions reported on completion
    pub mentions_found: usize,
    /// When the agent was queued
    pub queued_at: DateTime<Utc>,
    /// When the agent first started
    pub started_at: Option<DateTime<Utc>>,
    /// When the agent reached a final status
    pub finished_at: Option<DateTime<Utc>>,
    /// Error of a failed agent
    pub error: Option<String>,
    /// Times the agent was suspended
    pub suspend_count: u32,
}

/// Overall outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// Every agent succeeded
    Completed,
    /// Some agents failed
    Partial,
    /// No agent succeeded
    Failed,
}

impl RunStatus {
    /// Classify a run from its per-platform results.
    #[must_use]
    pub fn from_results(results: &[PlatformScanResult]) -> Self {
        let succeeded = results.iter().filter(|r| r.success).count();
        if succeeded == results.len() {
            Self::Completed
        } else if succeeded == 0 {
            Self::Failed
        } else {
            Self::Partial
        }
    }
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct ScanRunReport {
    /// Overall outcome
    pub status: RunStatus,
    /// Per-platform results in completion order
    pub results: Vec<PlatformScanResult>,
    /// Final status of every agent in the order they were added
    pub agents: Vec<AgentRunStatus>,
}

const MIN_PRESSURE_INTERVAL: Duration = Duration::from_millis(10);

type Settled = (String, Result<AgentReport, JoinError>);

struct RunningAgent {
    worker: Arc<dyn ScanWorker>,
    control: Arc<AgentControl>,
    launch_seq: u64,
    footprint_mb: u64,
}

struct RunState {
    queue: VecDeque<Arc<dyn ScanWorker>>,
    running: HashMap<String, RunningAgent>,
    statuses: HashMap<String, AgentRunStatus>,
    order: Vec<String>,
    tasks: FuturesUnordered<BoxFuture<'static, Settled>>,
    results: Vec<PlatformScanResult>,
    launch_seq: u64,
    peak_mb: u64,
}

impl RunState {
    fn status_mut(&mut self, name: &str) -> Option<&mut AgentRunStatus> {
        self.statuses.get_mut(name)
    }
}

/// Schedules scan agents under parallelism and memory limits.
pub struct Orchestrator {
    max_parallel: usize,
    memory_budget_mb: u64,
    memory_ceiling_mb: u64,
    max_suspensions: u32,
    pressure_interval: Duration,
    probe: Arc<dyn MemoryProbe>,
    cost: Option<Arc<CostTracker>>,
    evidence: Option<Arc<EvidenceCollector>>,
    agents: Vec<Arc<dyn ScanWorker>>,
}

impl Orchestrator {
    /// Create an orchestrator from the `[scanning]` config section.
    #[must_use]
    pub fn new(config: &ScanningConfig, probe: Arc<dyn MemoryProbe>) -> Self {
        Self {
            max_parallel: config.max_parallel.max(1),
            memory_budget_mb: config.memory_budget_mb,
            memory_ceiling_mb: config.memory_ceiling_mb,
            max_suspensions: config.max_suspensions,
            pressure_interval: config.pressure_check_interval(),
            probe,
            cost: None,
            evidence: None,
            agents: Vec::new(),
        }
    }

    /// Set the maximum number of concurrent agents.
    #[must_use]
    pub fn with_max_parallel(mut self, max: usize) -> Self {
        self.max_parallel = max.max(1);
        self
    }

    /// Set how often memory pressure is checked.
    #[must_use]
    pub fn with_pressure_interval(mut self, interval: Duration) -> Self {
        self.pressure_interval = interval;
        self
    }

    /// Count suspensions and peak memory against the daily usage.
    #[must_use]
    pub fn with_cost_tracker(mut self, cost: Arc<CostTracker>) -> Self {
        self.cost = Some(cost);
        self
    }

    /// Write any evidence still pending when the run ends.
    #[must_use]
    pub fn with_evidence(mut self, evidence: Arc<EvidenceCollector>) -> Self {
        self.evidence = Some(evidence);
        self
    }

    /// Queue an agent. Agents launch in the order they were added.
    #[must_use]
    pub fn with_agent(mut self, agent: Arc<dyn ScanWorker>) -> Self {
        self.agents.push(agent);
        self
    }

    /// Queue an agent.
    pub fn add_agent(&mut self, agent: Arc<dyn ScanWorker>) {
        self.agents.push(agent);
    }

    /// Run every agent against `targets` and return the per-platform results.
    pub async fn run(&self, targets: &[ScanTarget]) -> Vec<PlatformScanResult> {
        self.run_report(targets).await.results
    }

    /// Run every agent against `targets`.
    pub async fn run_report(&self, targets: &[ScanTarget]) -> ScanRunReport {
        let targets: Arc<[ScanTarget]> = targets.into();
        let mut run = self.prepare(targets.len());
        info!(
            agents = run.queue.len(),
            tickers = targets.len(),
            max_parallel = self.max_parallel,
            "scan run starting"
        );

        let mut pressure = tokio::time::interval(self.pressure_interval.max(MIN_PRESSURE_INTERVAL));
        pressure.set_missed_tick_behavior(MissedTickBehavior::Skip);
        pressure.tick().await;

        self.launch_next(&mut run, &targets).await;
        while !run.running.is_empty() || !run.queue.is_empty() {
            tokio::select! {
                Some((name, joined)) = run.tasks.next() => {
                    self.settle(&mut run, &name, joined);
                    self.launch_next(&mut run, &targets).await;
                }
                _ = pressure.tick() => {
                    self.relieve_pressure(&mut run).await;
                }
            }
        }

        self.finish(run)
    }

    fn prepare(&self, tickers_total: usize) -> RunState {
        let now = Utc::now();
        let mut run = RunState {
            queue: VecDeque::new(),
            running: HashMap::new(),
            statuses: HashMap::new(),
            order: Vec::new(),
            tasks: FuturesUnordered::new(),
            results: Vec::new(),
            launch_seq: 0,
            peak_mb: 0,
        };

        let mut seen = HashSet::new();
        for agent in &self.agents {
            let name = agent.name().to_string();
            if !seen.insert(name.clone()) {
                warn!(agent = %name, "duplicate agent name, skipping");
                continue;
            }
            run.statuses.insert(
                name.clone(),
                AgentRunStatus {
                    name: name.clone(),
                    platform: agent.platform().clone(),
                    status: AgentStatus::Queued,
                    tickers_completed: 0,
                    tickers_total,
                    mentions_found: 0,
                    queued_at: now,
                    started_at: None,
                    finished_at: None,
                    error: None,
                    suspend_count: 0,
                },
            );
            run.order.push(name);
            run.queue.push_back(agent.clone());
        }
        run
    }

    async fn measure(&self, run: &mut RunState) -> u64 {
        let used = self.probe.used_mb().await;
        run.peak_mb = run.peak_mb.max(used);
        used
    }

    /// Launch queued agents while admission holds.
    async fn launch_next(&self, run: &mut RunState, targets: &Arc<[ScanTarget]>) {
        while let Some(head) = run.queue.front().cloned() {
            let footprint = head.footprint_mb();

            if run.running.is_empty() {
                let measured = self.measure(run).await;
                if measured + footprint > self.memory_budget_mb {
                    info!(
                        agent = head.name(),
                        measured_mb = measured,
                        footprint_mb = footprint,
                        "over memory budget with nothing running, launching sequentially"
                    );
                }
            } else {
                if run.running.len() >= self.max_parallel {
                    break;
                }
                let measured = self.measure(run).await;
                let attributed: u64 = run.running.values().map(|a| a.footprint_mb).sum();
                if measured.max(attributed) + footprint > self.memory_budget_mb {
                    debug!(
                        agent = head.name(),
                        measured_mb = measured,
                        attributed_mb = attributed,
                        footprint_mb = footprint,
                        "agent does not fit, keeping it queued"
                    );
                    break;
                }
            }

            run.queue.pop_front();
            self.launch(run, head, targets);
        }
    }

    fn launch(&self, run: &mut RunState, worker: Arc<dyn ScanWorker>, targets: &Arc<[ScanTarget]>) {
        let name = worker.name().to_string();
        let control = Arc::new(AgentControl::new());
        run.launch_seq += 1;

        let handle = tokio::spawn({
            let worker = worker.clone();
            let targets = targets.clone();
            let control = control.clone();
            async move { worker.run(&targets, control).await }
        });
        let task_name = name.clone();
        run.tasks
            .push(async move { (task_name, handle.await) }.boxed());

        if let Some(status) = run.status_mut(&name) {
            status.status = AgentStatus::Running;
            status.started_at.get_or_insert_with(Utc::now);
        }
        info!(agent = %name, platform = %worker.platform(), running = run.running.len() + 1, "agent launched");

        run.running.insert(
            name,
            RunningAgent {
                footprint_mb: worker.footprint_mb(),
                worker,
                control,
                launch_seq: run.launch_seq,
            },
        );
    }

    fn settle(&self, run: &mut RunState, name: &str, joined: Result<AgentReport, JoinError>) {
        let Some(agent) = run.running.remove(name) else {
            error!(agent = %name, "settled agent was not running");
            return;
        };

        let report = match joined {
            Ok(report) => report,
            Err(e) => {
                error!(agent = %name, error = %e, "agent task panicked");
                AgentReport {
                    result: PlatformScanResult::failed(
                        agent.worker.platform().clone(),
                        format!("agent task failed: {e}"),
                    ),
                    tickers_completed: 0,
                    tickers_total: 0,
                    suspended: false,
                }
            }
        };

        if report.suspended {
            if let Some(cost) = &self.cost {
                cost.record_suspension();
            }
            if let Some(status) = run.status_mut(name) {
                status.status = AgentStatus::Suspended;
                status.tickers_completed = report.tickers_completed;
            }
            info!(
                agent = %name,
                completed = report.tickers_completed,
                "agent suspended, re-queued"
            );
            run.queue.push_back(agent.worker);
            return;
        }

        if let Some(status) = run.status_mut(name) {
            status.status = if report.result.success {
                AgentStatus::Completed
            } else {
                AgentStatus::Failed
            };
            if report.tickers_total > 0 {
                status.tickers_completed = report.tickers_completed;
            }
            status.mentions_found = report.result.mentions_found;
            status.error.clone_from(&report.result.error);
            status.finished_at = Some(Utc::now());
        }
        run.results.push(report.result);
    }

    /// Suspend the newest eligible agent when memory is over the ceiling.
    async fn relieve_pressure(&self, run: &mut RunState) {
        let measured = self.measure(run).await;
        if measured <= self.memory_ceiling_mb || run.running.len() <= 1 {
            return;
        }
        if run
            .running
            .values()
            .any(|agent| agent.control.is_suspend_requested())
        {
            debug!(measured_mb = measured, "memory over ceiling, waiting for a suspended agent to stop");
            return;
        }

        let victim = run
            .running
            .iter()
            .filter(|(name, _)| {
                run.statuses
                    .get(name.as_str())
                    .is_some_and(|s| s.suspend_count < self.max_suspensions)
            })
            .max_by_key(|(_, agent)| agent.launch_seq)
            .map(|(name, agent)| (name.clone(), agent.control.clone()));

        let Some((name, control)) = victim else {
            warn!(measured_mb = measured, ceiling_mb = self.memory_ceiling_mb, "memory over ceiling, no agent eligible for suspension");
            return;
        };

        if let Some(status) = run.status_mut(&name) {
            status.suspend_count += 1;
        }
        warn!(
            agent = %name,
            measured_mb = measured,
            ceiling_mb = self.memory_ceiling_mb,
            "memory over ceiling, suspending agent"
        );
        control.suspend().await;
    }

    fn finish(&self, run: RunState) -> ScanRunReport {
        if let Some(cost) = &self.cost {
            cost.record_memory_sample(run.peak_mb);
        }
        if let Some(evidence) = &self.evidence {
            if let Err(e) = evidence.save_evidence_file(Utc::now().date_naive()) {
                error!(error = %e, "evidence file not saved");
            }
        }

        let RunState {
            mut statuses,
            order,
            results,
            ..
        } = run;
        let agents: Vec<AgentRunStatus> = order
            .iter()
            .filter_map(|name| statuses.remove(name))
            .collect();
        let status = RunStatus::from_results(&results);
        info!(
            status = ?status,
            platforms = results.len(),
            mentions = results.iter().map(|r| r.mentions_found).sum::<usize>(),
            "scan run finished"
        );

        ScanRunReport {
            status,
            results,
            agents,
        }
    }
}
