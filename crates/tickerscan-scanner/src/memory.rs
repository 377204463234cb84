//! Memory measurement for admission control and pressure checks.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, RefreshKind, System};
use tracing::debug;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Source of the current memory use in megabytes.
#[async_trait::async_trait]
pub trait MemoryProbe: Send + Sync {
    /// Memory currently in use, in MB
    async fn used_mb(&self) -> u64;
}

/// Resident memory of a process and every process descended from it.
///
/// Rooted at the current process by default, so browser children launched
/// by agents are counted.
#[derive(Debug, Clone)]
pub struct ProcessTreeProbe {
    root: Option<Pid>,
}

impl ProcessTreeProbe {
    /// Probe rooted at the current process.
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: sysinfo::get_current_pid().ok(),
        }
    }

    /// Probe rooted at `pid`.
    #[must_use]
    pub fn for_pid(pid: u32) -> Self {
        Self {
            root: Some(Pid::from_u32(pid)),
        }
    }
}

impl Default for ProcessTreeProbe {
    fn default() -> Self {
        Self::new()
    }
}

fn process_tree_bytes(root: Pid) -> u64 {
    let mut system = System::new_with_specifics(RefreshKind::nothing());
    system.refresh_processes_specifics(
        ProcessesToUpdate::All,
        true,
        ProcessRefreshKind::nothing().with_memory(),
    );

    let mut children: HashMap<Pid, Vec<Pid>> = HashMap::new();
    for (pid, process) in system.processes() {
        if let Some(parent) = process.parent() {
            children.entry(parent).or_default().push(*pid);
        }
    }

    let mut seen = HashSet::new();
    let mut stack = vec![root];
    let mut total = 0;
    while let Some(pid) = stack.pop() {
        if !seen.insert(pid) {
            continue;
        }
        if let Some(process) = system.process(pid) {
            total += process.memory();
        }
        if let Some(kids) = children.get(&pid) {
            stack.extend(kids.iter().copied());
        }
    }
    total
}

#[async_trait::async_trait]
impl MemoryProbe for ProcessTreeProbe {
    async fn used_mb(&self) -> u64 {
        let Some(root) = self.root else {
            return 0;
        };
        match tokio::task::spawn_blocking(move || process_tree_bytes(root)).await {
            Ok(bytes) => bytes / BYTES_PER_MB,
            Err(e) => {
                debug!(error = %e, "process memory probe join failed");
                0
            }
        }
    }
}

/// Probe reporting a settable value.
#[derive(Debug, Default)]
pub struct FixedProbe {
    mb: AtomicU64,
}

impl FixedProbe {
    /// Probe reporting `mb`.
    #[must_use]
    pub fn new(mb: u64) -> Self {
        Self {
            mb: AtomicU64::new(mb),
        }
    }

    /// Change the reported value.
    pub fn set(&self, mb: u64) {
        self.mb.store(mb, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl MemoryProbe for FixedProbe {
    async fn used_mb(&self) -> u64 {
        self.mb.load(Ordering::SeqCst)
    }
}
