//! End-to-end reconciliation: validate, probe, plan, execute, re-validate

use crate::context::{CancelToken, ProgressCallback};
use crate::error::ConfigError;
use crate::executor::{Applier, execute};
use crate::model;
use crate::planner::plan;
use crate::probe::{Prober, probe_all};
use crate::report::RunReport;
use crate::types::{Action, ExecuteOptions, ProbeResult, Resource};
use crate::validator::validate_run_with_jobs;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Probe results and the plan derived from them, without applying anything
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preview {
    pub probes: Vec<ProbeResult>,
    pub actions: Vec<Action>,
}

/// Probe and plan without mutating the system
///
/// Fails before any probe runs when the resource set is malformed.
pub fn preview<P: Prober + ?Sized>(
    resources: &[Resource],
    prober: &P,
    jobs: usize,
) -> Result<Preview, ConfigError> {
    model::validate(resources)?;
    let probes = probe_all(prober, resources, jobs);
    let actions = plan(resources, &probes)?;
    Ok(Preview { probes, actions })
}

/// Converge the system to the declared resources
///
/// The returned report holds the initial probes, one record per planned
/// action, and a final validation. Its success is judged by that
/// validation alone, so a failed action whose resource nonetheless ends up
/// satisfied does not fail the run.
pub fn reconcile<S, P>(
    resources: &[Resource],
    system: &S,
    opts: &ExecuteOptions,
    progress: &mut P,
    cancel: &CancelToken,
) -> Result<RunReport, ConfigError>
where
    S: Prober + Applier + ?Sized,
    P: ProgressCallback + ?Sized,
{
    let started_at = Utc::now();
    let preview = preview(resources, system, opts.jobs)?;

    let mut report = reconcile_preview(resources, system, preview, opts, progress, cancel);
    report.started_at = started_at;
    Ok(report)
}

/// Apply the actions of an earlier [`preview`], then validate
///
/// The previewed plan runs as shown, without observing again; only the
/// final validation observes the system. `resources` must be the set the
/// preview was taken from.
pub fn reconcile_preview<S, P>(
    resources: &[Resource],
    system: &S,
    preview: Preview,
    opts: &ExecuteOptions,
    progress: &mut P,
    cancel: &CancelToken,
) -> RunReport
where
    S: Prober + Applier + ?Sized,
    P: ProgressCallback + ?Sized,
{
    let started_at = Utc::now();
    let Preview { probes, actions } = preview;

    log::info!(
        "{} of {} resource(s) need changes",
        actions.len(),
        resources.len()
    );

    let mut report = execute(resources, &actions, system, opts, progress, cancel);
    report.started_at = started_at;
    report.probes = probes;
    report.validation = Some(validate_run_with_jobs(resources, system, opts.jobs));
    report.finished_at = Utc::now();
    report
}
