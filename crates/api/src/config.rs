use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use fanfinder_runner::config::{
    default_interpreter, DEFAULT_ORPHAN_MAX_AGE, DEFAULT_ORPHAN_MIN_AGE, DEFAULT_SCRIPT_DIRS,
    DEFAULT_STOP_GRACE,
};
use fanfinder_runner::{ReaperConfig, RunnerConfig};

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Upper bound on post-shutdown cleanup (stopping jobs, sweeping) in seconds (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Job launching and teardown settings.
    pub runner: RunnerConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                                           |
    /// |------------------------|---------------------------------------------------|
    /// | `HOST`                 | `0.0.0.0`                                         |
    /// | `PORT`                 | `3000`                                            |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`                           |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                                              |
    /// | `SHUTDOWN_TIMEOUT_SECS`| `30`                                              |
    /// | `JOB_INTERPRETER`      | `python3` (`python` on Windows)                   |
    /// | `JOB_SCRIPT_DIRS`      | `app/scripts,../scripts,scripts,../../scripts,.`  |
    /// | `JOB_STOP_GRACE_SECS`  | `5`                                               |
    /// | `ORPHAN_MIN_AGE_SECS`  | `60`                                              |
    /// | `ORPHAN_MAX_AGE_SECS`  | `86400`                                           |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = parse_var("PORT", 3000);

        let cors_origins = list_var("CORS_ORIGINS")
            .unwrap_or_else(|| vec!["http://localhost:5173".to_string()]);

        let request_timeout_secs: u64 = parse_var("REQUEST_TIMEOUT_SECS", 30);
        let shutdown_timeout_secs: u64 = parse_var("SHUTDOWN_TIMEOUT_SECS", 30);

        let interpreter =
            std::env::var("JOB_INTERPRETER").unwrap_or_else(|_| default_interpreter().into());
        let script_dirs: Vec<PathBuf> = list_var("JOB_SCRIPT_DIRS")
            .map(|dirs| dirs.into_iter().map(PathBuf::from).collect())
            .unwrap_or_else(|| DEFAULT_SCRIPT_DIRS.iter().map(PathBuf::from).collect());

        let runner = RunnerConfig {
            interpreter,
            script_dirs,
            stop_grace: Duration::from_secs(parse_var(
                "JOB_STOP_GRACE_SECS",
                DEFAULT_STOP_GRACE.as_secs(),
            )),
            reaper: ReaperConfig {
                min_age: Duration::from_secs(parse_var(
                    "ORPHAN_MIN_AGE_SECS",
                    DEFAULT_ORPHAN_MIN_AGE.as_secs(),
                )),
                max_age: Duration::from_secs(parse_var(
                    "ORPHAN_MAX_AGE_SECS",
                    DEFAULT_ORPHAN_MAX_AGE.as_secs(),
                )),
            },
            ..RunnerConfig::default()
        };

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            runner,
        }
    }
}

/// Parse `name` if set. Panics on a malformed value so misconfiguration
/// fails at startup.
fn parse_var<T>(name: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|e| panic!("{name} must be a valid {}: {e}", std::any::type_name::<T>())),
        Err(_) => default,
    }
}

/// Comma-separated list, or `None` if unset or empty.
fn list_var(name: &str) -> Option<Vec<String>> {
    let items: Vec<String> = std::env::var(name)
        .ok()?
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    (!items.is_empty()).then_some(items)
}
