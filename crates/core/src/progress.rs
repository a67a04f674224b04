//! Collection progress parsing for worker output lines.
//!
//! Workers report each collected user on its own line, e.g.
//! `New user found: alice123 (7/50 - 14.0%)`. The percentage is taken as
//! reported; it is not recomputed from the counts.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// Regex pattern for a progress line. Either verb phrase, any case.
pub const PROGRESS_PATTERN: &str =
    r"(?i)(?:collected user|new user found):\s*(\S+)\s*\((\d+)/(\d+)\s*-\s*([\d.]+)%\)";

/// Compiled progress regex. Compiled once, reused forever.
static PROGRESS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(PROGRESS_PATTERN).expect("valid regex"));

/// Progress reported by one matching output line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressLine {
    pub username: String,
    pub collected: u32,
    pub target: u32,
    pub percent: f64,
}

/// Parse a progress line. Returns `None` for every other line.
pub fn parse_progress(line: &str) -> Option<ProgressLine> {
    let caps = PROGRESS_RE.captures(line)?;
    Some(ProgressLine {
        username: caps[1].to_string(),
        collected: caps[2].parse().ok()?,
        target: caps[3].parse().ok()?,
        percent: caps[4].parse().ok()?,
    })
}
