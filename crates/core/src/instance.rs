//! Instance keys: the unique name of one running job.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::job_type::JobType;

/// Identifies one running job as `{job_type}-{instance_number}`.
///
/// Instance numbers are chosen by the caller and start at 1. Two keys are
/// equal exactly when their string forms are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawInstanceKey")]
pub struct InstanceKey {
    pub job_type: JobType,
    pub instance_number: u32,
}

/// Unchecked wire form; deserialization goes through [`InstanceKey::new`].
#[derive(Deserialize)]
struct RawInstanceKey {
    job_type: JobType,
    instance_number: u32,
}

impl TryFrom<RawInstanceKey> for InstanceKey {
    type Error = CoreError;

    fn try_from(raw: RawInstanceKey) -> Result<Self, Self::Error> {
        Self::new(raw.job_type, raw.instance_number)
    }
}

impl InstanceKey {
    /// Build a key, rejecting instance number 0.
    pub fn new(job_type: JobType, instance_number: u32) -> Result<Self, CoreError> {
        if instance_number == 0 {
            return Err(CoreError::Validation(
                "Instance number must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            job_type,
            instance_number,
        })
    }

    /// Log prefix used for every line this instance writes to the server log.
    pub fn log_prefix(&self) -> String {
        format!(
            "[{} INSTANCE {}]",
            self.job_type.label(),
            self.instance_number
        )
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.job_type, self.instance_number)
    }
}

impl FromStr for InstanceKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (job_type, number) = s.rsplit_once('-').ok_or_else(|| {
            CoreError::Validation(format!("Invalid instance key '{s}'"))
        })?;
        let instance_number = number
            .parse::<u32>()
            .map_err(|_| CoreError::Validation(format!("Invalid instance number in '{s}'")))?;
        Self::new(job_type.parse()?, instance_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_as_type_dash_number() {
        let key = InstanceKey::new(JobType::Discovery, 3).unwrap();
        assert_eq!(key.to_string(), "discovery-3");
    }

    #[test]
    fn zero_instance_number_rejected() {
        assert!(InstanceKey::new(JobType::Keyword, 0).is_err());
    }

    #[test]
    fn parses_own_display_form() {
        let key: InstanceKey = "keyword-12".parse().unwrap();
        assert_eq!(key.job_type, JobType::Keyword);
        assert_eq!(key.instance_number, 12);
    }

    #[test]
    fn rejects_malformed_keys() {
        assert!("keyword".parse::<InstanceKey>().is_err());
        assert!("keyword-x".parse::<InstanceKey>().is_err());
        assert!("crawler-1".parse::<InstanceKey>().is_err());
    }

    #[test]
    fn same_type_different_number_are_distinct() {
        let a = InstanceKey::new(JobType::Discovery, 1).unwrap();
        let b = InstanceKey::new(JobType::Discovery, 2).unwrap();
        let c = InstanceKey::new(JobType::Keyword, 1).unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn deserializing_checks_instance_number() {
        let key: InstanceKey =
            serde_json::from_str(r#"{"job_type":"discovery","instance_number":2}"#).unwrap();
        assert_eq!(key.to_string(), "discovery-2");

        let err = serde_json::from_str::<InstanceKey>(
            r#"{"job_type":"discovery","instance_number":0}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("at least 1"));
    }

    #[test]
    fn log_prefix_uses_label() {
        let key = InstanceKey::new(JobType::Keyword, 2).unwrap();
        assert_eq!(key.log_prefix(), "[KEYWORD INSTANCE 2]");
    }
}
