//! Automation browser signature.
//!
//! Workers drive a Chrome-family browser. When a job is stopped, or when the
//! server starts after a crash, those browser processes are found by name and
//! by the flags automation tools put on their command line. Both lookups use
//! the single [`BrowserSignature`] defined here.

use serde::{Deserialize, Serialize};

/// Process-name fragments of automation browsers (lower case).
pub const BROWSER_PROCESS_NAMES: &[&str] = &["chrome", "chromium", "chromedriver"];

/// Command-line fragments that mark a browser as automation-launched (lower case).
pub const AUTOMATION_INDICATORS: &[&str] = &[
    "--test-type",
    "--disable-blink-features=automationcontrolled",
    "--disable-dev-shm-usage",
    "--no-sandbox",
    "undetected-chromedriver",
];

/// Name and command-line fragments identifying automation browser processes.
///
/// Matching is case-insensitive substring matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserSignature {
    pub process_names: Vec<String>,
    pub automation_indicators: Vec<String>,
}

impl BrowserSignature {
    /// Build a signature from arbitrary fragments; they are lower-cased here.
    pub fn new<N, I>(process_names: N, automation_indicators: I) -> Self
    where
        N: IntoIterator,
        N::Item: AsRef<str>,
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        Self {
            process_names: process_names
                .into_iter()
                .map(|s| s.as_ref().to_lowercase())
                .collect(),
            automation_indicators: automation_indicators
                .into_iter()
                .map(|s| s.as_ref().to_lowercase())
                .collect(),
        }
    }

    /// Whether a process name looks like an automation browser.
    pub fn matches_name(&self, process_name: &str) -> bool {
        let name = process_name.to_lowercase();
        self.process_names.iter().any(|n| name.contains(n.as_str()))
    }

    /// Whether a command line carries at least one automation indicator.
    pub fn has_automation_indicator<S: AsRef<str>>(&self, cmdline: &[S]) -> bool {
        if cmdline.is_empty() {
            return false;
        }
        let joined = cmdline
            .iter()
            .map(|s| s.as_ref())
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        self.automation_indicators
            .iter()
            .any(|i| joined.contains(i.as_str()))
    }
}

impl Default for BrowserSignature {
    fn default() -> Self {
        Self::new(BROWSER_PROCESS_NAMES, AUTOMATION_INDICATORS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chrome_family_names_match() {
        let sig = BrowserSignature::default();
        assert!(sig.matches_name("chrome"));
        assert!(sig.matches_name("Google Chrome Helper"));
        assert!(sig.matches_name("chromedriver"));
        assert!(sig.matches_name("chromium-browser"));
        assert!(!sig.matches_name("firefox"));
        assert!(!sig.matches_name("python3"));
    }

    #[test]
    fn indicators_are_case_insensitive() {
        let sig = BrowserSignature::default();
        let cmd = ["/opt/chrome", "--disable-blink-features=AutomationControlled"];
        assert!(sig.has_automation_indicator(&cmd));
    }

    #[test]
    fn plain_browser_has_no_indicator() {
        let sig = BrowserSignature::default();
        let cmd = ["/opt/chrome", "--profile-directory=Default"];
        assert!(!sig.has_automation_indicator(&cmd));
        let empty: [&str; 0] = [];
        assert!(!sig.has_automation_indicator(&empty));
    }

    #[test]
    fn custom_signature_lowercases_fragments() {
        let sig = BrowserSignature::new(["Sleep"], ["--MARK"]);
        assert!(sig.matches_name("sleep"));
        assert!(sig.has_automation_indicator(&["x", "--mark"]));
    }
}
