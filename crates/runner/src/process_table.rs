//! Process table snapshots.
//!
//! Stop and the orphan sweep both ask the same question, "which processes
//! matching this browser signature exist within this scope", and both go
//! through [`ProcessTable::find`]. All calls here read `/proc` (or the
//! platform equivalent) synchronously; async callers use the `*_blocking`
//! helpers via `spawn_blocking`.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use fanfinder_core::browser::BrowserSignature;
use sysinfo::{Pid, System};

/// One row of a process table snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub parent: Option<u32>,
    pub name: String,
    pub cmd: Vec<String>,
    pub age: Duration,
}

/// Which processes a search covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Every descendant of this pid, at any depth. The pid itself is excluded.
    DescendantsOf(u32),
    /// The whole table.
    Everything,
}

/// Result of killing one previously found process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillOutcome {
    Killed,
    /// Already exited, or the pid now belongs to something else.
    Gone,
    Failed,
}

pub struct ProcessTable {
    processes: Vec<ProcessInfo>,
}

impl ProcessTable {
    /// Read the current process table.
    pub fn snapshot() -> Self {
        let mut system = System::new();
        system.refresh_processes();
        let processes = system
            .processes()
            .iter()
            .map(|(pid, process)| ProcessInfo {
                pid: pid.as_u32(),
                parent: process.parent().map(|p| p.as_u32()),
                name: process.name().to_string(),
                cmd: process.cmd().to_vec(),
                age: Duration::from_secs(process.run_time()),
            })
            .collect();
        Self { processes }
    }

    /// Build a table from known rows.
    pub fn from_rows(processes: Vec<ProcessInfo>) -> Self {
        Self { processes }
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    pub fn contains(&self, pid: u32) -> bool {
        self.processes.iter().any(|p| p.pid == pid)
    }

    /// Whether the process has lost the parent that started it: no parent,
    /// a parent no longer in the table, or reparented to init.
    pub fn is_orphaned(&self, process: &ProcessInfo) -> bool {
        match process.parent {
            None | Some(0) | Some(1) => true,
            Some(parent) => !self.contains(parent),
        }
    }

    /// Processes in `scope` whose name matches `signature`.
    pub fn find(&self, signature: &BrowserSignature, scope: Scope) -> Vec<ProcessInfo> {
        let descendants = match scope {
            Scope::DescendantsOf(root) => Some(self.descendants(root)),
            Scope::Everything => None,
        };
        self.processes
            .iter()
            .filter(|p| descendants.as_ref().map_or(true, |d| d.contains(&p.pid)))
            .filter(|p| signature.matches_name(&p.name))
            .cloned()
            .collect()
    }

    fn descendants(&self, root: u32) -> HashSet<u32> {
        let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
        for p in &self.processes {
            if let Some(parent) = p.parent {
                children.entry(parent).or_default().push(p.pid);
            }
        }

        let mut found = HashSet::new();
        let mut queue = vec![root];
        while let Some(pid) = queue.pop() {
            for &child in children.get(&pid).into_iter().flatten() {
                if child != root && found.insert(child) {
                    queue.push(child);
                }
            }
        }
        found
    }
}

/// Snapshot the table and find matching processes in `scope`.
pub fn find_blocking(signature: &BrowserSignature, scope: Scope) -> Vec<ProcessInfo> {
    ProcessTable::snapshot().find(signature, scope)
}

/// Kill each pid that still matches `signature` by name.
///
/// Pids are re-checked right before the kill so a recycled pid belonging
/// to an unrelated program is left alone.
pub fn kill_blocking(pids: &[u32], signature: &BrowserSignature) -> Vec<(u32, KillOutcome)> {
    let mut system = System::new();
    pids.iter()
        .map(|&raw| {
            let pid = Pid::from_u32(raw);
            if !system.refresh_process(pid) {
                return (raw, KillOutcome::Gone);
            }
            let outcome = match system.process(pid) {
                Some(process) if signature.matches_name(process.name()) => {
                    if process.kill() {
                        KillOutcome::Killed
                    } else {
                        KillOutcome::Failed
                    }
                }
                _ => KillOutcome::Gone,
            };
            (raw, outcome)
        })
        .collect()
}
