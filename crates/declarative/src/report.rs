//! Execution records, run reports and validation reports

use crate::error::ExecutionError;
use crate::types::{Action, ErrorMode, ProbeResult, Resource, ResourceKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a single planned action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecStatus {
    Succeeded,
    Failed,
    Skipped,
}

/// Per-action outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub action: Action,
    pub status: ExecStatus,
    /// Attempts made; 0 when the action was never tried
    pub attempts: u32,
    /// Last error for failures, reason for skips
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Fallback substitution used by the final attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
    /// How to fix a failure, when the applier knows
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advice: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ExecutionRecord {
    pub fn succeeded(action: Action, attempts: u32, fallback: Option<String>) -> Self {
        Self {
            action,
            status: ExecStatus::Succeeded,
            attempts,
            error: None,
            fallback,
            advice: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(
        action: Action,
        attempts: u32,
        error: impl Into<String>,
        fallback: Option<String>,
    ) -> Self {
        Self {
            action,
            status: ExecStatus::Failed,
            attempts,
            error: Some(error.into()),
            fallback,
            advice: None,
            timestamp: Utc::now(),
        }
    }

    pub fn skipped(action: Action, reason: impl Into<String>) -> Self {
        Self {
            action,
            status: ExecStatus::Skipped,
            attempts: 0,
            error: Some(reason.into()),
            fallback: None,
            advice: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_advice(mut self, advice: Option<String>) -> Self {
        self.advice = advice;
        self
    }

    pub fn is_failed(&self) -> bool {
        self.status == ExecStatus::Failed
    }

    /// Typed error for a failed record
    pub fn execution_error(&self) -> Option<ExecutionError> {
        if !self.is_failed() {
            return None;
        }
        Some(ExecutionError {
            resource_id: self.action.resource_id.clone(),
            operation: self.action.operation,
            attempts: self.attempts,
            message: self.error.clone().unwrap_or_default(),
        })
    }
}

/// Summary of execution results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl ExecuteSummary {
    pub fn from_records(records: &[ExecutionRecord]) -> Self {
        let mut summary = Self::default();
        for record in records {
            summary.add_record(record);
        }
        summary
    }

    pub fn add_record(&mut self, record: &ExecutionRecord) {
        match record.status {
            ExecStatus::Succeeded => self.succeeded += 1,
            ExecStatus::Failed => self.failed += 1,
            ExecStatus::Skipped => self.skipped += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.skipped
    }

    /// Check if execution was fully successful (no failures)
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Pass/fail classification of a re-probed resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Pass,
    Fail,
}

/// Validation detail for one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceCheck {
    pub resource_id: String,
    pub kind: ResourceKind,
    pub target: String,
    pub description: String,
    pub verdict: Verdict,
    pub observed_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe_error: Option<String>,
}

/// Result of re-probing a resource set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub results: Vec<ResourceCheck>,
}

impl ValidationReport {
    /// Classify probe results, matched to resources by id
    pub fn from_probes(resources: &[Resource], probes: &[ProbeResult]) -> Self {
        let mut report = Self::default();

        for (resource, probe) in resources.iter().zip(probes) {
            debug_assert_eq!(resource.id, probe.resource_id);
            let verdict = if probe.matches_desired {
                report.passed += 1;
                Verdict::Pass
            } else {
                report.failed += 1;
                Verdict::Fail
            };

            report.results.push(ResourceCheck {
                resource_id: resource.id.clone(),
                kind: resource.kind,
                target: resource.target.clone(),
                description: resource.description(),
                verdict,
                observed_value: probe.observed_value.clone(),
                probe_error: probe.probe_error.clone(),
            });
        }

        report.total = report.results.len();
        report
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &ResourceCheck> {
        self.results.iter().filter(|c| c.verdict == Verdict::Fail)
    }

    pub fn check(&self, resource_id: &str) -> Option<&ResourceCheck> {
        self.results.iter().find(|c| c.resource_id == resource_id)
    }
}

/// Everything a reconciliation run observed and did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub mode: ErrorMode,
    pub dry_run: bool,
    /// The run stopped early because cancellation was requested
    pub cancelled: bool,
    /// Probe results taken before planning
    #[serde(default)]
    pub probes: Vec<ProbeResult>,
    /// Execution records, in plan order
    pub records: Vec<ExecutionRecord>,
    /// Re-probe after execution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationReport>,
}

impl RunReport {
    pub fn new(mode: ErrorMode, dry_run: bool) -> Self {
        let now = Utc::now();
        Self {
            started_at: now,
            finished_at: now,
            mode,
            dry_run,
            cancelled: false,
            probes: Vec::new(),
            records: Vec::new(),
            validation: None,
        }
    }

    pub fn summary(&self) -> ExecuteSummary {
        ExecuteSummary::from_records(&self.records)
    }

    pub fn record(&self, resource_id: &str) -> Option<&ExecutionRecord> {
        self.records
            .iter()
            .find(|r| r.action.resource_id == resource_id)
    }

    /// Success is judged by the final validation when one was taken
    pub fn is_success(&self) -> bool {
        match &self.validation {
            Some(validation) => validation.is_success(),
            None => self.summary().is_success(),
        }
    }
}
