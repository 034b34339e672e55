//! Human and JSON rendering of plans, runs and validations

use anyhow::{Context, Result};
use colored::Colorize;
use declarative::{
    ExecStatus, Operation, PlanSummary, Preview, ProbeResult, Resource, RunReport,
    ValidationReport, Verdict,
};
use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::ui;

const VALUE_WIDTH: usize = 24;

fn operation_marker(operation: Operation) -> colored::ColoredString {
    match operation {
        Operation::Install => "+".green().bold(),
        Operation::Modify => "~".yellow().bold(),
        Operation::Remove => "-".red().bold(),
    }
}

fn observed(probe: Option<&ProbeResult>) -> String {
    match probe {
        None => String::new(),
        Some(p) if p.probe_error.is_some() => "probe failed".to_string(),
        Some(p) if !p.present => "absent".to_string(),
        Some(p) => p
            .observed_value
            .as_deref()
            .map_or_else(|| "present".to_string(), |v| ui::truncate(v, VALUE_WIDTH)),
    }
}

/// Planned actions, one line each, with what the probe saw
///
/// With `verbose`, resources that already match are listed too.
pub fn print_plan(resources: &[Resource], preview: &Preview, verbose: bool) {
    let summary = PlanSummary::from_actions(&preview.actions);

    ui::section("Plan");
    if verbose {
        for probe in preview.probes.iter().filter(|p| p.matches_desired) {
            println!("  {} {}", "=".dimmed(), probe.resource_id.dimmed());
        }
    }
    if !summary.has_changes() {
        ui::success("All resources already match the declared state");
        return;
    }

    for action in &preview.actions {
        let resource = resources.iter().find(|r| r.id == action.resource_id);
        let probe = preview
            .probes
            .iter()
            .find(|p| p.resource_id == action.resource_id);
        let description = resource.map(Resource::description).unwrap_or_default();

        println!(
            "  {} {:<20} {} {}",
            operation_marker(action.operation),
            action.resource_id.bold(),
            description,
            format!("(now: {})", observed(probe)).dimmed()
        );
        if let Some(error) = probe.and_then(|p| p.probe_error.as_deref()) {
            ui::dim(error);
        }
    }

    println!();
    println!(
        "  {} to install, {} to modify, {} to remove",
        summary.installs.to_string().green(),
        summary.modifies.to_string().yellow(),
        summary.removes.to_string().red()
    );
}

/// Per-resource PASS/FAIL lines and totals
pub fn print_validation(report: &ValidationReport) {
    ui::section("Validation");
    for check in &report.results {
        let verdict = match check.verdict {
            Verdict::Pass => "PASS".green().bold(),
            Verdict::Fail => "FAIL".red().bold(),
        };
        let seen = match (&check.probe_error, &check.observed_value) {
            (Some(error), _) => error.clone(),
            (None, Some(value)) => ui::truncate(value, VALUE_WIDTH),
            (None, None) => String::new(),
        };
        println!(
            "  {verdict} {:<20} {} {}",
            check.resource_id,
            check.description,
            seen.dimmed()
        );
    }

    println!();
    let totals = format!(
        "{} passed, {} failed, {} total",
        report.passed, report.failed, report.total
    );
    if report.is_success() {
        ui::success(&totals);
    } else {
        ui::error(&totals);
    }
}

/// Execution counts, failures and the final validation
pub fn print_run(report: &RunReport) {
    let summary = report.summary();

    ui::section(if report.dry_run { "Dry run" } else { "Execution" });
    if summary.total() == 0 {
        ui::dim("no actions");
    } else {
        ui::kv("Succeeded", &summary.succeeded.to_string());
        ui::kv("Failed", &summary.failed.to_string());
        ui::kv("Skipped", &summary.skipped.to_string());
    }

    let fallbacks: Vec<_> = report
        .records
        .iter()
        .filter(|r| r.status == ExecStatus::Succeeded && r.fallback.is_some())
        .collect();
    for record in fallbacks {
        ui::warn(&format!(
            "{} converged with fallback ({})",
            record.action.resource_id,
            record.fallback.as_deref().unwrap_or_default()
        ));
    }

    for record in report.records.iter().filter(|r| r.is_failed()) {
        if let Some(error) = record.execution_error() {
            ui::error(&error.to_string());
        }
        if let Some(advice) = &record.advice {
            ui::dim(advice);
        }
    }

    if report.cancelled {
        ui::warn("Run interrupted; remaining actions were skipped");
    }

    if let Some(validation) = &report.validation {
        print_validation(validation);
    }
}

/// Pretty JSON on stdout
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", to_json(value)?);
    Ok(())
}

/// Pretty JSON to a file
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    fs::write(path, to_json(value)? + "\n")
        .with_context(|| format!("Failed to write report to {}", path.display()))?;
    log::info!("report written to {}", path.display());
    Ok(())
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("Failed to serialize report")
}
