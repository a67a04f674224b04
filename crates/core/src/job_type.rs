//! Job types and their per-type launch conventions.
//!
//! Every decision that depends on the kind of job (script file name,
//! job-specific command-line knob, which other types a finished job
//! unblocks) lives on [`JobType`], so adding a new worker is a local change.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Valid job type strings.
pub const JOB_TYPE_DISCOVERY: &str = "discovery";
pub const JOB_TYPE_KEYWORD: &str = "keyword";

/// All valid job type strings.
pub const VALID_JOB_TYPES: &[&str] = &[JOB_TYPE_DISCOVERY, JOB_TYPE_KEYWORD];

/// Default `--posts-per-filter` value for discovery jobs.
pub const DEFAULT_POSTS_PER_FILTER: u32 = 100;

/// Default `--posts-per-keyword` value for keyword jobs.
pub const DEFAULT_POSTS_PER_KEYWORD: u32 = 50;

// ---------------------------------------------------------------------------
// JobType
// ---------------------------------------------------------------------------

/// The kind of automation worker a job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Discovery,
    Keyword,
}

impl JobType {
    /// Every known job type, in display order.
    pub const ALL: &'static [JobType] = &[JobType::Discovery, JobType::Keyword];

    /// The wire / instance-key representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Discovery => JOB_TYPE_DISCOVERY,
            Self::Keyword => JOB_TYPE_KEYWORD,
        }
    }

    /// Upper-case label used in log prefixes (`[DISCOVERY INSTANCE 2]`).
    pub fn label(self) -> &'static str {
        match self {
            Self::Discovery => "DISCOVERY",
            Self::Keyword => "KEYWORD",
        }
    }

    /// File name of the worker script for this job type.
    pub fn script_file_name(self) -> &'static str {
        match self {
            Self::Discovery => "discoverySearch.py",
            Self::Keyword => "keywordSearch.py",
        }
    }

    /// Command-line flag carrying this type's per-job knob.
    pub fn knob_flag(self) -> &'static str {
        match self {
            Self::Discovery => "--posts-per-filter",
            Self::Keyword => "--posts-per-keyword",
        }
    }

    /// Job types other than this one.
    ///
    /// When an instance of `self` ends, the UI may lift its serialization
    /// policy for each of these.
    pub fn others(self) -> impl Iterator<Item = JobType> {
        Self::ALL.iter().copied().filter(move |t| *t != self)
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            JOB_TYPE_DISCOVERY => Ok(Self::Discovery),
            JOB_TYPE_KEYWORD => Ok(Self::Keyword),
            _ => Err(CoreError::Validation(format!(
                "Invalid job type '{s}'. Must be one of: {}",
                VALID_JOB_TYPES.join(", ")
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
