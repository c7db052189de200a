//! Probe results and their classification.

use std::fmt;

/// What a single probe produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Non-empty response text (trimmed)
    Success(String),
    /// The query completed but returned nothing
    Empty,
    /// The query failed; carries the full error chain
    Error(String),
    /// Nothing was sent (`--dry-run`)
    DryRun,
}

impl ProbeOutcome {
    /// Classify a transport query result
    pub fn classify(result: anyhow::Result<String>) -> Self {
        match result {
            Ok(text) => {
                let text = text.trim();
                if text.is_empty() {
                    ProbeOutcome::Empty
                } else {
                    ProbeOutcome::Success(text.to_string())
                }
            }
            Err(e) => ProbeOutcome::Error(format!("{:#}", e)),
        }
    }

    /// Whether the instrument answered with text
    pub fn is_success(&self) -> bool {
        matches!(self, ProbeOutcome::Success(_))
    }

    /// Short machine-readable status
    pub fn status(&self) -> &'static str {
        match self {
            ProbeOutcome::Success(_) => "success",
            ProbeOutcome::Empty => "empty",
            ProbeOutcome::Error(_) => "error",
            ProbeOutcome::DryRun => "dry-run",
        }
    }

    /// Response text or error message
    pub fn detail(&self) -> &str {
        match self {
            ProbeOutcome::Success(text) | ProbeOutcome::Error(text) => text,
            ProbeOutcome::Empty | ProbeOutcome::DryRun => "",
        }
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeOutcome::Success(text) => write!(f, "✅ {}", text),
            ProbeOutcome::Empty => f.write_str("⚠️ Empty"),
            ProbeOutcome::Error(msg) => write!(f, "❌ {}", msg),
            ProbeOutcome::DryRun => f.write_str("💤 (dry-run)"),
        }
    }
}

/// One probed command and its outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRecord {
    /// Command as sent
    pub command: String,
    /// Classified result
    pub outcome: ProbeOutcome,
}

impl ProbeRecord {
    /// Pair a command with its outcome
    pub fn new(command: impl Into<String>, outcome: ProbeOutcome) -> Self {
        Self {
            command: command.into(),
            outcome,
        }
    }

    /// `(command, rendered outcome)`, the form written to logs
    pub fn rendered(&self) -> (String, String) {
        (self.command.clone(), self.outcome.to_string())
    }
}

/// Accumulated state of one probing run
#[derive(Debug, Clone, Default)]
pub struct ProbeRun {
    /// Every probed command, in order
    pub results: Vec<ProbeRecord>,
    /// Newly answering commands (discovery modes)
    pub discovered: Vec<ProbeRecord>,
    /// Commands withheld by a skip pattern
    pub skipped: Vec<String>,
    /// The run stopped on Ctrl+C
    pub interrupted: bool,
}

impl ProbeRun {
    /// Count of results with the given status
    pub fn count(&self, status: &str) -> usize {
        self.results
            .iter()
            .filter(|r| r.outcome.status() == status)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Context};

    #[test]
    fn test_classify_success() {
        let outcome = ProbeOutcome::classify(Ok(" 1.0\n".to_string()));
        assert_eq!(outcome, ProbeOutcome::Success("1.0".to_string()));
        assert_eq!(outcome.to_string(), "✅ 1.0");
    }

    #[test]
    fn test_classify_empty_is_not_success() {
        let outcome = ProbeOutcome::classify(Ok("  \r\n".to_string()));
        assert_eq!(outcome, ProbeOutcome::Empty);
        assert!(!outcome.is_success());
        assert_eq!(outcome.to_string(), "⚠️ Empty");
    }

    #[test]
    fn test_classify_error_keeps_chain() {
        let err: anyhow::Result<String> = Err(anyhow!("VI_ERROR_TMO")).context("query :SYS:ERR?");
        let outcome = ProbeOutcome::classify(err);
        assert_eq!(outcome.status(), "error");
        assert!(outcome.detail().contains("VI_ERROR_TMO"));
        assert!(outcome.to_string().starts_with("❌ query :SYS:ERR?"));
    }

    #[test]
    fn test_dry_run_render() {
        assert_eq!(ProbeOutcome::DryRun.to_string(), "💤 (dry-run)");
        assert_eq!(ProbeOutcome::DryRun.detail(), "");
    }
}
