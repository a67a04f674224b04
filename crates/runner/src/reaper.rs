//! Orphaned browser sweep.
//!
//! Runs at startup (before any job is launched) and at shutdown (after all
//! jobs are stopped). A browser is reaped only if every condition holds:
//! its name matches the signature, its command line carries an automation
//! indicator, it has lost its parent, and its age is inside the configured
//! window. Anything that cannot be inspected is skipped.

use fanfinder_core::browser::BrowserSignature;
use serde::Serialize;

use crate::config::ReaperConfig;
use crate::process_table::{self, KillOutcome, ProcessInfo, ProcessTable, Scope};

/// What a sweep found and did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReapReport {
    /// Processes whose name matched the signature.
    pub scanned: usize,
    /// Of those, how many qualified as orphans.
    pub candidates: usize,
    pub killed: usize,
}

#[derive(Debug, Clone)]
pub struct OrphanReaper {
    signature: BrowserSignature,
    config: ReaperConfig,
}

impl OrphanReaper {
    pub fn new(signature: BrowserSignature, config: ReaperConfig) -> Self {
        Self { signature, config }
    }

    /// Whether a process should be reaped. `orphaned` comes from the table
    /// the process was read from.
    pub fn is_candidate(&self, process: &ProcessInfo, orphaned: bool) -> bool {
        orphaned
            && self.signature.matches_name(&process.name)
            && self.signature.has_automation_indicator(&process.cmd)
            && process.age >= self.config.min_age
            && process.age <= self.config.max_age
    }

    /// Pick the orphans out of a table.
    pub fn candidates(&self, table: &ProcessTable) -> (usize, Vec<ProcessInfo>) {
        let browsers = table.find(&self.signature, Scope::Everything);
        let scanned = browsers.len();
        let orphans = browsers
            .into_iter()
            .filter(|p| self.is_candidate(p, table.is_orphaned(p)))
            .collect();
        (scanned, orphans)
    }

    /// Snapshot, select and kill. Blocking.
    pub fn sweep_blocking(&self) -> ReapReport {
        let table = ProcessTable::snapshot();
        let (scanned, orphans) = self.candidates(&table);

        for orphan in &orphans {
            tracing::info!(
                pid = orphan.pid,
                name = %orphan.name,
                age_secs = orphan.age.as_secs(),
                "Reaping orphaned browser process"
            );
        }

        let pids: Vec<u32> = orphans.iter().map(|p| p.pid).collect();
        let killed = process_table::kill_blocking(&pids, &self.signature)
            .into_iter()
            .filter(|(_, outcome)| *outcome == KillOutcome::Killed)
            .count();

        ReapReport {
            scanned,
            candidates: orphans.len(),
            killed,
        }
    }

    /// [`sweep_blocking`](Self::sweep_blocking) on the blocking pool.
    pub async fn sweep(&self) -> ReapReport {
        let reaper = self.clone();
        match tokio::task::spawn_blocking(move || reaper.sweep_blocking()).await {
            Ok(report) => {
                if report.killed > 0 {
                    tracing::info!(killed = report.killed, "Cleaned up orphaned browser processes");
                } else {
                    tracing::debug!(scanned = report.scanned, "No orphaned browser processes");
                }
                report
            }
            Err(e) => {
                tracing::warn!(error = %e, "Orphan sweep failed");
                ReapReport::default()
            }
        }
    }
}
