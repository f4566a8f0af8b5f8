//! Verification report

use super::checks::{CheckResult, Issue, Severity};
use super::repair::RepairResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportStatus {
    Pass,
    PassWithFixes,
    Fail,
    CriticalFail,
}

impl ReportStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportStatus::Pass => "PASS",
            ReportStatus::PassWithFixes => "PASS_WITH_FIXES",
            ReportStatus::Fail => "FAIL",
            ReportStatus::CriticalFail => "CRITICAL_FAIL",
        }
    }

    pub fn is_ready(self) -> bool {
        matches!(self, ReportStatus::Pass | ReportStatus::PassWithFixes)
    }
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The graph must not be handed to consumers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConsistencyError {
    #[error("{count} critical issue(s), first: {first}")]
    Critical { count: usize, first: String },

    #[error("{count} blocking issue(s) remain, first: {first}")]
    Blocking { count: usize, first: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub timestamp: DateTime<Utc>,
    pub status: ReportStatus,
    pub checks_passed: usize,
    pub checks_failed: usize,
    pub total_issues: usize,
    pub issues_by_severity: BTreeMap<String, usize>,
    pub fixes_applied: usize,
    pub repair_passes: usize,
    pub blocking_issues: Vec<String>,
    pub warnings: Vec<String>,
    pub checks: Vec<CheckResult>,
    pub fixes: Vec<RepairResult>,
}

impl VerificationReport {
    /// Summarize the final check results and the repairs that led there.
    pub fn new(checks: Vec<CheckResult>, fixes: Vec<RepairResult>, repair_passes: usize) -> Self {
        let issues: Vec<&Issue> = checks.iter().flat_map(|c| c.issues.iter()).collect();

        let mut issues_by_severity = BTreeMap::new();
        for issue in &issues {
            *issues_by_severity
                .entry(issue.severity.as_str().to_string())
                .or_insert(0) += 1;
        }

        let (blocking, warnings): (Vec<&Issue>, Vec<&Issue>) =
            issues.iter().copied().partition(|i| i.is_blocking());
        let fixes_applied = fixes.iter().filter(|f| f.success).count();

        let status = if issues.iter().any(|i| i.severity == Severity::Critical) {
            ReportStatus::CriticalFail
        } else if issues.iter().any(|i| i.severity >= Severity::Medium) {
            ReportStatus::Fail
        } else if fixes_applied > 0 {
            ReportStatus::PassWithFixes
        } else {
            ReportStatus::Pass
        };

        Self {
            timestamp: Utc::now(),
            status,
            checks_passed: checks.iter().filter(|c| c.passed).count(),
            checks_failed: checks.iter().filter(|c| !c.passed).count(),
            total_issues: issues.len(),
            issues_by_severity,
            fixes_applied,
            repair_passes,
            blocking_issues: blocking.iter().map(|i| describe(i)).collect(),
            warnings: warnings.iter().map(|i| describe(i)).collect(),
            checks,
            fixes,
        }
    }

    pub fn issues(&self) -> impl Iterator<Item = &Issue> {
        self.checks.iter().flat_map(|c| c.issues.iter())
    }

    pub fn check(&self, name: &str) -> Option<&CheckResult> {
        self.checks.iter().find(|c| c.name == name)
    }

    pub fn is_ready(&self) -> bool {
        self.status.is_ready()
    }

    /// 0 when the graph may be used, 1 otherwise
    pub fn exit_code(&self) -> i32 {
        if self.is_ready() {
            0
        } else {
            1
        }
    }

    /// Gate for consumers of the graph.
    pub fn ensure_ready(&self) -> Result<(), ConsistencyError> {
        let critical: Vec<&Issue> = self
            .issues()
            .filter(|i| i.severity == Severity::Critical)
            .collect();
        if let Some(first) = critical.first() {
            return Err(ConsistencyError::Critical {
                count: critical.len(),
                first: describe(first),
            });
        }
        let remaining: Vec<&Issue> = self
            .issues()
            .filter(|i| i.severity >= Severity::Medium)
            .collect();
        if let Some(first) = remaining.first() {
            return Err(ConsistencyError::Blocking {
                count: remaining.len(),
                first: describe(first),
            });
        }
        Ok(())
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Verification report ({})\n", self.timestamp.to_rfc3339()));
        out.push_str(&format!("Status: {}\n", self.status));
        out.push_str(&format!(
            "Checks: {} passed, {} failed\n",
            self.checks_passed, self.checks_failed
        ));
        if self.total_issues > 0 {
            let counts: Vec<String> = self
                .issues_by_severity
                .iter()
                .map(|(severity, count)| format!("{}={}", severity, count))
                .collect();
            out.push_str(&format!("Issues: {} ({})\n", self.total_issues, counts.join(", ")));
        }
        if self.repair_passes > 0 {
            out.push_str(&format!(
                "Repairs: {} applied over {} pass(es)\n",
                self.fixes_applied, self.repair_passes
            ));
        }

        out.push('\n');
        for check in &self.checks {
            out.push_str(&format!(
                "  [{}] {} ({} issue(s))\n",
                if check.passed { "PASS" } else { "FAIL" },
                check.name,
                check.issues.len()
            ));
        }

        if !self.blocking_issues.is_empty() {
            out.push_str("\nBlocking issues:\n");
            for issue in &self.blocking_issues {
                out.push_str(&format!("  - {}\n", issue));
            }
        }
        if !self.warnings.is_empty() {
            out.push_str("\nWarnings:\n");
            for warning in self.warnings.iter().take(20) {
                out.push_str(&format!("  - {}\n", warning));
            }
            if self.warnings.len() > 20 {
                out.push_str(&format!("  ... and {} more\n", self.warnings.len() - 20));
            }
        }
        let failed: Vec<&RepairResult> = self.fixes.iter().filter(|f| !f.success).collect();
        if !failed.is_empty() {
            out.push_str("\nFailed repairs:\n");
            for fix in failed {
                out.push_str(&format!("  - {:?}: {}\n", fix.action, fix.message));
            }
        }
        out
    }
}

fn describe(issue: &Issue) -> String {
    format!("[{}] {}: {}", issue.severity, issue.check, issue.message)
}
