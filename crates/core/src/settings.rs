//! The settings bag submitted with a start request.
//!
//! Only `model_id` and `target_users` are required. The per-type knobs have
//! defaults, and any other keys are carried along untouched in `extra`.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;
use crate::job_type::{JobType, DEFAULT_POSTS_PER_FILTER, DEFAULT_POSTS_PER_KEYWORD};

/// Settings forwarded to the worker's command line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct JobSettings {
    /// Model account the worker fetches credentials for.
    #[serde(default)]
    #[validate(length(min = 1, message = "Please select a model"))]
    pub model_id: String,

    /// Number of users the worker should collect before exiting.
    #[serde(default)]
    #[validate(range(min = 1, message = "Target users must be at least 1"))]
    pub target_users: u32,

    /// Discovery knob: posts examined per filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posts_per_filter: Option<u32>,

    /// Keyword knob: posts examined per keyword.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posts_per_keyword: Option<u32>,

    /// Run the browser without a visible window.
    #[serde(default)]
    pub headless: bool,

    /// Keys the backend does not interpret.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl JobSettings {
    /// Check the required fields, returning a message suitable for the UI.
    pub fn check(&self) -> Result<(), CoreError> {
        if self.model_id.trim().is_empty() {
            return Err(CoreError::Validation("Please select a model".to_string()));
        }
        self.validate()
            .map_err(|e| CoreError::Validation(e.to_string()))
    }

    /// The job-specific knob value for `job_type`, falling back to its default.
    pub fn knob_value(&self, job_type: JobType) -> u32 {
        match job_type {
            JobType::Discovery => self.posts_per_filter.unwrap_or(DEFAULT_POSTS_PER_FILTER),
            JobType::Keyword => self.posts_per_keyword.unwrap_or(DEFAULT_POSTS_PER_KEYWORD),
        }
    }

    /// Worker arguments (everything after the script path).
    ///
    /// ```text
    /// --model-id <id> --target-users <n> <knob-flag> <n> [--headless] --gui
    /// ```
    pub fn to_args(&self, job_type: JobType) -> Vec<String> {
        let mut args = vec![
            "--model-id".to_string(),
            self.model_id.clone(),
            "--target-users".to_string(),
            self.target_users.to_string(),
            job_type.knob_flag().to_string(),
            self.knob_value(job_type).to_string(),
        ];
        if self.headless {
            args.push("--headless".to_string());
        }
        args.push("--gui".to_string());
        args
    }
}
