//! Runner configuration.
//!
//! The API crate fills this in from environment variables; tests build it
//! directly with a scratch script directory and a short stop grace period.

use std::path::PathBuf;
use std::time::Duration;

use fanfinder_core::browser::BrowserSignature;

/// Directories probed, in order, for worker scripts.
pub const DEFAULT_SCRIPT_DIRS: &[&str] = &["app/scripts", "../scripts", "scripts", "../../scripts", "."];

/// How long a stopped job gets to exit after SIGTERM before it is killed.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);

/// Browsers younger than this are assumed to belong to a job still starting up.
pub const DEFAULT_ORPHAN_MIN_AGE: Duration = Duration::from_secs(60);

/// Browsers older than this are left alone.
pub const DEFAULT_ORPHAN_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Interpreter used to run worker scripts on this platform.
pub fn default_interpreter() -> &'static str {
    if cfg!(windows) {
        "python"
    } else {
        "python3"
    }
}

/// Age window for orphan sweeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaperConfig {
    pub min_age: Duration,
    pub max_age: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            min_age: DEFAULT_ORPHAN_MIN_AGE,
            max_age: DEFAULT_ORPHAN_MAX_AGE,
        }
    }
}

/// Everything the runner needs to launch and stop jobs.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Program that executes a worker script (`python3 <script> ...`).
    pub interpreter: String,
    /// Candidate script directories, probed in order.
    pub script_dirs: Vec<PathBuf>,
    /// Grace period between SIGTERM and SIGKILL when stopping a job.
    pub stop_grace: Duration,
    /// Recognises the browser processes jobs spawn.
    pub signature: BrowserSignature,
    /// Orphan sweep age window.
    pub reaper: ReaperConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter().to_string(),
            script_dirs: DEFAULT_SCRIPT_DIRS.iter().map(PathBuf::from).collect(),
            stop_grace: DEFAULT_STOP_GRACE,
            signature: BrowserSignature::default(),
            reaper: ReaperConfig::default(),
        }
    }
}
