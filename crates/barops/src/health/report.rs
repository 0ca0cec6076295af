//! Health check results and the aggregated report.

use std::fmt;

use colored::Colorize;
use serde::{Deserialize, Serialize};

/// The result of a single check.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Fail,
    Skip,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => write!(f, "OK"),
            Self::Fail => write!(f, "FAIL"),
            Self::Skip => write!(f, "SKIP"),
        }
    }
}

/// Which tier a check belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CheckKind {
    Liveness,
    Functional,
    Webhook,
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Liveness => write!(f, "liveness"),
            Self::Functional => write!(f, "functional"),
            Self::Webhook => write!(f, "webhook"),
        }
    }
}

/// One check of one service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub service: String,
    pub kind: CheckKind,
    pub status: CheckStatus,
    pub details: String,
}

impl CheckResult {
    #[must_use]
    pub fn pass(service: &str, kind: CheckKind, details: impl Into<String>) -> Self {
        Self::new(service, kind, CheckStatus::Pass, details)
    }

    #[must_use]
    pub fn fail(service: &str, kind: CheckKind, details: impl Into<String>) -> Self {
        Self::new(service, kind, CheckStatus::Fail, details)
    }

    #[must_use]
    pub fn skip(service: &str, kind: CheckKind, details: impl Into<String>) -> Self {
        Self::new(service, kind, CheckStatus::Skip, details)
    }

    fn new(service: &str, kind: CheckKind, status: CheckStatus, details: impl Into<String>) -> Self {
        Self {
            service: service.to_string(),
            kind,
            status,
            details: details.into(),
        }
    }

    /// Plain report line, e.g. `OK gateway liveness: HTTP 200`.
    #[must_use]
    pub fn line(&self) -> String {
        format!("{} {} {}: {}", self.status, self.service, self.kind, self.details)
    }
}

/// Aggregated results, in declared service order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthReport {
    pub results: Vec<CheckResult>,
}

impl HealthReport {
    #[must_use]
    pub fn count(&self, status: CheckStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    #[must_use]
    pub fn passed(&self) -> usize {
        self.count(CheckStatus::Pass)
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(CheckStatus::Fail)
    }

    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.failed() == 0
    }

    /// Results of one tier.
    pub fn of_kind(&self, kind: CheckKind) -> impl Iterator<Item = &CheckResult> {
        self.results.iter().filter(move |r| r.kind == kind)
    }

    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.results.iter().map(CheckResult::line).collect()
    }

    /// Print every line with status colors, followed by a summary.
    pub fn print(&self) {
        for result in &self.results {
            let status = match result.status {
                CheckStatus::Pass => result.status.to_string().green().bold(),
                CheckStatus::Fail => result.status.to_string().red().bold(),
                CheckStatus::Skip => result.status.to_string().bright_black().bold(),
            };
            println!(
                "  {status:<4} {} {} {}",
                result.service.cyan(),
                result.kind.to_string().bright_black(),
                result.details
            );
        }
        println!();
        println!(
            "  {} passed, {} failed, {} skipped",
            self.passed().to_string().green(),
            self.failed().to_string().red(),
            self.count(CheckStatus::Skip).to_string().bright_black()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_and_counts() {
        let report = HealthReport {
            results: vec![
                CheckResult::pass("gateway", CheckKind::Liveness, "HTTP 200"),
                CheckResult::fail("rag", CheckKind::Liveness, "HTTP 503"),
                CheckResult::skip("lockbox", CheckKind::Functional, "no functional contract"),
            ],
        };
        assert_eq!(
            report.lines(),
            vec![
                "OK gateway liveness: HTTP 200",
                "FAIL rag liveness: HTTP 503",
                "SKIP lockbox functional: no functional contract",
            ]
        );
        assert_eq!(report.passed(), 1);
        assert_eq!(report.failed(), 1);
        assert!(!report.is_healthy());
        assert_eq!(report.of_kind(CheckKind::Liveness).count(), 2);
    }
}
