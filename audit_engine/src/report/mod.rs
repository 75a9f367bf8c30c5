//! # Evaluation Result Types
//!
//! Verdicts, per-control results and the run-level report envelope. Designed
//! for JSON serialization into compliance pipelines; the report always
//! accounts for every control handed to the run, including skipped ones.

use audit_controls::{ControlDefinition, Severity, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one assertion against one resource instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VerdictOutcome {
    Pass,
    Fail,
    NotApplicable,
    Error,
}

impl VerdictOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::NotApplicable => "not-applicable",
            Self::Error => "error",
        }
    }
}

/// Result of one assertion against one resource instance. Immutable once
/// produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub outcome: VerdictOutcome,

    /// Resource identifier plus field trail, e.g.
    /// `us-central1/prod/default-pool:management.auto_repair`.
    pub resource: String,

    /// Value actually observed; absent for not-applicable and fetch errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<Value>,

    /// Rendered expectation; omitted for sensitive assertions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,

    pub message: String,
}

impl Verdict {
    pub fn pass(resource: impl Into<String>, actual: Value, expected: Option<String>) -> Self {
        Self {
            outcome: VerdictOutcome::Pass,
            resource: resource.into(),
            actual: Some(actual),
            expected,
            message: "requirement satisfied".to_string(),
        }
    }

    pub fn fail(
        resource: impl Into<String>,
        actual: Value,
        expected: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            outcome: VerdictOutcome::Fail,
            resource: resource.into(),
            actual: Some(actual),
            expected,
            message: message.into(),
        }
    }

    pub fn not_applicable(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            outcome: VerdictOutcome::NotApplicable,
            resource: resource.into(),
            actual: None,
            expected: None,
            message: message.into(),
        }
    }

    pub fn error(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            outcome: VerdictOutcome::Error,
            resource: resource.into(),
            actual: None,
            expected: None,
            message: message.into(),
        }
    }
}

/// Aggregated outcome for an entire control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ControlOutcome {
    Pass,
    Fail,
    NotApplicable,
    Error,
    /// Run was cancelled before this control started.
    Skipped,
}

impl ControlOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::NotApplicable => "not-applicable",
            Self::Error => "error",
            Self::Skipped => "skipped",
        }
    }
}

/// All verdicts of one control reduced to a single outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlResult {
    pub control_id: String,
    pub title: String,

    /// Effective impact: forced to `none` when the control is not applicable.
    pub severity: Severity,

    pub scored: bool,
    pub outcome: ControlOutcome,
    pub verdicts: Vec<Verdict>,
    pub duration_ms: u64,
}

impl ControlResult {
    pub fn not_applicable(control: &ControlDefinition, message: impl Into<String>) -> Self {
        Self {
            control_id: control.id.clone(),
            title: control.title.clone(),
            // Impact forced to none, as the benchmark does for vacuous
            // sections.
            severity: Severity::None,
            scored: control.scored,
            outcome: ControlOutcome::NotApplicable,
            verdicts: vec![Verdict::not_applicable(control.id.clone(), message)],
            duration_ms: 0,
        }
    }

    pub fn skipped(control: &ControlDefinition) -> Self {
        Self {
            control_id: control.id.clone(),
            title: control.title.clone(),
            severity: control.severity,
            scored: control.scored,
            outcome: ControlOutcome::Skipped,
            verdicts: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn failed_verdicts(&self) -> impl Iterator<Item = &Verdict> {
        self.verdicts
            .iter()
            .filter(|v| v.outcome == VerdictOutcome::Fail)
    }
}

/// Flat counters across all control results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTotals {
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
    pub not_applicable: u32,
    pub errors: u32,
    pub skipped: u32,
}

impl RunTotals {
    fn count(results: &[ControlResult]) -> Self {
        let mut totals = Self {
            total: results.len() as u32,
            ..Self::default()
        };
        for result in results {
            match result.outcome {
                ControlOutcome::Pass => totals.passed += 1,
                ControlOutcome::Fail => totals.failed += 1,
                ControlOutcome::NotApplicable => totals.not_applicable += 1,
                ControlOutcome::Error => totals.errors += 1,
                ControlOutcome::Skipped => totals.skipped += 1,
            }
        }
        totals
    }
}

/// Overall run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// No failures, no faults.
    Compliant,

    /// At least one control failed.
    NonCompliant,

    /// No failures, but errors or skipped controls prevent a clean verdict.
    Partial,
}

/// Complete result envelope for one evaluation run.
#[derive(Debug, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique identifier for this run.
    pub run_id: String,

    pub project_id: String,

    #[serde(default)]
    pub cis_version: String,

    /// Host the audit ran from.
    pub host: String,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,

    pub status: RunStatus,
    pub totals: RunTotals,
    pub results: Vec<ControlResult>,
}

impl RunReport {
    /// Build the report envelope around a finished result set.
    pub fn new(
        project_id: impl Into<String>,
        cis_version: impl Into<String>,
        started_at: DateTime<Utc>,
        results: Vec<ControlResult>,
    ) -> Self {
        let finished_at = Utc::now();
        let totals = RunTotals::count(&results);
        let status = if totals.failed > 0 {
            RunStatus::NonCompliant
        } else if totals.errors > 0 || totals.skipped > 0 {
            RunStatus::Partial
        } else {
            RunStatus::Compliant
        };

        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            project_id: project_id.into(),
            cis_version: cis_version.into(),
            host: hostname::get()
                .unwrap_or_else(|_| std::ffi::OsString::from("unknown"))
                .to_string_lossy()
                .to_string(),
            started_at,
            finished_at,
            duration_ms: (finished_at - started_at).num_milliseconds().max(0) as u64,
            status,
            totals,
            results,
        }
    }

    /// Failure policy for exit codes: any errored or skipped control breaches,
    /// and any failed scored control at or above `threshold` breaches.
    pub fn breaches(&self, threshold: Severity) -> bool {
        if self.totals.errors > 0 || self.totals.skipped > 0 {
            return true;
        }
        self.results.iter().any(|result| {
            result.outcome == ControlOutcome::Fail
                && result.scored
                && result.severity >= threshold
        })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_json_compact(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ============================================================================
// REPORT SINKS
// ============================================================================

/// Receives control results as they complete and the final report envelope.
/// Formatting and exit-code decisions live behind this trait.
pub trait ReportSink {
    fn accept(&mut self, result: &ControlResult);

    fn finish(&mut self, _report: &RunReport) {}
}

/// Sink that buffers results in memory, for tests and embedders.
#[derive(Default)]
pub struct CollectingSink {
    pub results: Vec<ControlResult>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReportSink for CollectingSink {
    fn accept(&mut self, result: &ControlResult) {
        self.results.push(result.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audit_controls::ControlDefinition;

    fn result(id: &str, severity: Severity, outcome: ControlOutcome) -> ControlResult {
        ControlResult {
            control_id: id.to_string(),
            title: format!("control {}", id),
            severity,
            scored: true,
            outcome,
            verdicts: Vec::new(),
            duration_ms: 1,
        }
    }

    #[test]
    fn test_totals_and_status() {
        let report = RunReport::new(
            "sample-project",
            "1.1.0",
            Utc::now(),
            vec![
                result("5.5.1", Severity::Low, ControlOutcome::Pass),
                result("5.5.2", Severity::Medium, ControlOutcome::Fail),
                result("5.7.1", Severity::Low, ControlOutcome::NotApplicable),
            ],
        );
        assert_eq!(report.totals.total, 3);
        assert_eq!(report.totals.failed, 1);
        assert_eq!(report.status, RunStatus::NonCompliant);
    }

    #[test]
    fn test_partial_status_on_errors() {
        let report = RunReport::new(
            "sample-project",
            "1.1.0",
            Utc::now(),
            vec![
                result("5.5.1", Severity::Low, ControlOutcome::Pass),
                result("5.5.2", Severity::Medium, ControlOutcome::Error),
            ],
        );
        assert_eq!(report.status, RunStatus::Partial);
        assert!(report.breaches(Severity::High));
    }

    #[test]
    fn test_breach_threshold() {
        let report = RunReport::new(
            "sample-project",
            "1.1.0",
            Utc::now(),
            vec![result("5.5.1", Severity::Low, ControlOutcome::Fail)],
        );
        assert!(report.breaches(Severity::Low));
        assert!(!report.breaches(Severity::Medium));
    }

    #[test]
    fn test_not_applicable_forces_severity_none() {
        let control = ControlDefinition::new("5.5.2", "Auto-repair", Severity::Medium);
        let result = ControlResult::not_applicable(&control, "no clusters");
        assert_eq!(result.severity, Severity::None);
        assert_eq!(result.outcome, ControlOutcome::NotApplicable);
        assert_eq!(result.verdicts.len(), 1);
    }

    #[test]
    fn test_json_round_trip() {
        let report = RunReport::new(
            "sample-project",
            "1.1.0",
            Utc::now(),
            vec![result("5.5.1", Severity::Low, ControlOutcome::Pass)],
        );
        let json = report.to_json().unwrap();
        let parsed: RunReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.totals, report.totals);
        assert_eq!(parsed.results.len(), 1);
    }
}
