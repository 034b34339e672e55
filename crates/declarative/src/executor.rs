//! Execution engine - applies planned actions with retry, fallback and
//! error-mode handling

use crate::context::{CancelToken, ProgressCallback};
use crate::model::dependency_levels;
use crate::report::{ExecutionRecord, RunReport};
use crate::types::{Action, ErrorMode, ExecuteOptions, Operation, Resource, RetryPolicy};
use anyhow::Result;
use chrono::Utc;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::thread;

const SKIP_DRY_RUN: &str = "dry run";
const SKIP_CANCELLED: &str = "cancelled";
const SKIP_FAIL_FAST: &str = "not attempted after an earlier failure (fail-fast)";

/// Applies the kind-specific mutation for one action
///
/// Implementations receive the resource to converge (possibly a fallback
/// substitute) and the operation chosen by the planner.
pub trait Applier: Send + Sync {
    fn apply(&self, resource: &Resource, operation: Operation) -> Result<()>;

    /// Whether repeating the same attempt could succeed
    ///
    /// A permanent failure ends the retries early unless the next attempt
    /// uses a fallback substitute.
    fn is_transient(&self, _error: &anyhow::Error) -> bool {
        true
    }

    /// Remediation hint recorded next to a final failure
    fn advice(&self, _error: &anyhow::Error) -> Option<String> {
        None
    }
}

impl<A: Applier + ?Sized> Applier for &A {
    fn apply(&self, resource: &Resource, operation: Operation) -> Result<()> {
        (**self).apply(resource, operation)
    }

    fn is_transient(&self, error: &anyhow::Error) -> bool {
        (**self).is_transient(error)
    }

    fn advice(&self, error: &anyhow::Error) -> Option<String> {
        (**self).advice(error)
    }
}

/// Execute actions in plan order
///
/// # Arguments
/// * `resources` - The declared resources the actions refer to
/// * `actions` - Output of [`crate::plan`]
/// * `applier` - Performs the mutations
/// * `opts` - Retry policy, error mode, dry run and worker count
/// * `progress` - Progress callback
/// * `cancel` - Checked before each action (or each wave)
///
/// # Returns
/// A run report holding one record per action, in plan order. Probe and
/// validation sections are left empty.
pub fn execute<A, P>(
    resources: &[Resource],
    actions: &[Action],
    applier: &A,
    opts: &ExecuteOptions,
    progress: &mut P,
    cancel: &CancelToken,
) -> RunReport
where
    A: Applier + ?Sized,
    P: ProgressCallback + ?Sized,
{
    let mut report = RunReport::new(opts.mode, opts.dry_run);
    let lookup: HashMap<&str, &Resource> =
        resources.iter().map(|r| (r.id.as_str(), r)).collect();

    let waves = schedule(resources, actions, opts.jobs);
    let pool = if opts.jobs > 1 && waves.iter().any(|w| w.len() > 1) {
        match rayon::ThreadPoolBuilder::new().num_threads(opts.jobs).build() {
            Ok(pool) => Some(pool),
            Err(e) => {
                log::warn!("Failed to create apply thread pool, running sequentially: {e}");
                None
            }
        }
    } else {
        None
    };

    progress.on_run_start(actions.len());

    let mut records: BTreeMap<usize, ExecutionRecord> = BTreeMap::new();
    let mut halted: Option<&'static str> = None;

    for wave in waves {
        if halted.is_none() && cancel.is_cancelled() {
            log::warn!("Cancellation requested; skipping remaining actions");
            report.cancelled = true;
            halted = Some(SKIP_CANCELLED);
        }

        let skip_reason = halted.or(if opts.dry_run { Some(SKIP_DRY_RUN) } else { None });
        if let Some(reason) = skip_reason {
            for idx in wave {
                let record = ExecutionRecord::skipped(actions[idx].clone(), reason);
                progress.on_action_complete(&record);
                records.insert(idx, record);
            }
            continue;
        }

        for &idx in &wave {
            if let Some(resource) = lookup.get(actions[idx].resource_id.as_str()) {
                progress.on_action_start(&actions[idx], resource);
            }
        }

        let results: Vec<(usize, ExecutionRecord)> = match &pool {
            Some(pool) if wave.len() > 1 => pool.install(|| {
                wave.par_iter()
                    .map(|&idx| {
                        let mut quiet = |_: u32, _: &str| {};
                        let record =
                            run_action(&actions[idx], &lookup, applier, &opts.retry, &mut quiet);
                        (idx, record)
                    })
                    .collect()
            }),
            _ => {
                let mut out = Vec::with_capacity(wave.len());
                for &idx in &wave {
                    let action = &actions[idx];
                    let mut on_retry = |attempt: u32, error: &str| {
                        progress.on_retry(action, attempt, error);
                    };
                    let record = run_action(action, &lookup, applier, &opts.retry, &mut on_retry);
                    out.push((idx, record));
                }
                out
            }
        };

        for (idx, record) in results {
            progress.on_action_complete(&record);
            if record.is_failed() && opts.mode == ErrorMode::FailFast {
                halted = Some(SKIP_FAIL_FAST);
            }
            records.insert(idx, record);
        }
    }

    progress.on_run_complete();

    report.records = records.into_values().collect();
    report.finished_at = Utc::now();
    report
}

/// Group action indices into waves that may run together
///
/// Sequential mode is one action per wave in plan order. With more than
/// one job, actions are grouped by dependency level over the full resource
/// graph, so no two actions in a wave are connected by a dependency path
/// and every wave starts after the previous one has finished.
fn schedule(resources: &[Resource], actions: &[Action], jobs: usize) -> Vec<Vec<usize>> {
    let sequential = || (0..actions.len()).map(|i| vec![i]).collect();

    if jobs <= 1 {
        return sequential();
    }

    let levels = match dependency_levels(resources) {
        Ok(levels) => levels,
        Err(e) => {
            log::warn!("Cannot compute dependency levels ({e}); running sequentially");
            return sequential();
        }
    };
    let level_of: HashMap<&str, usize> = resources
        .iter()
        .zip(&levels)
        .map(|(r, &level)| (r.id.as_str(), level))
        .collect();

    let mut waves: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (idx, action) in actions.iter().enumerate() {
        let level = level_of
            .get(action.resource_id.as_str())
            .copied()
            .unwrap_or(0);
        waves.entry(level).or_default().push(idx);
    }
    waves.into_values().collect()
}

/// Apply one action with bounded retries
///
/// Attempts after the first use the resource's fallback substitute when
/// the policy allows it.
fn run_action<A: Applier + ?Sized>(
    action: &Action,
    lookup: &HashMap<&str, &Resource>,
    applier: &A,
    policy: &RetryPolicy,
    on_retry: &mut dyn FnMut(u32, &str),
) -> ExecutionRecord {
    let Some(resource) = lookup.get(action.resource_id.as_str()).copied() else {
        return ExecutionRecord::failed(
            action.clone(),
            0,
            format!("resource {} is not declared", action.resource_id),
            None,
        );
    };

    let max_attempts = policy.max_attempts.max(1);
    let substitute = if policy.fallback {
        resource.fallback()
    } else {
        None
    };

    let mut last_error = String::new();
    let mut last_fallback = None;
    let mut advice = None;
    let mut attempts = 0;

    for attempt in 1..=max_attempts {
        attempts = attempt;
        let (target, fallback) = match &substitute {
            Some(sub) if attempt > 1 => (sub, Some(resource.fallback_label())),
            _ => (resource, None),
        };

        match applier.apply(target, action.operation) {
            Ok(()) => {
                log::info!(
                    "{} {} succeeded on attempt {attempt}",
                    action.operation,
                    action.resource_id
                );
                return ExecutionRecord::succeeded(action.clone(), attempt, fallback);
            }
            Err(e) => {
                last_error = format!("{e:#}");
                last_fallback = fallback;
                advice = applier.advice(&e);
                log::warn!(
                    "{} {} attempt {attempt}/{max_attempts} failed: {last_error}",
                    action.operation,
                    action.resource_id
                );

                let switches_to_fallback = attempt == 1 && substitute.is_some();
                if attempt < max_attempts && !switches_to_fallback && !applier.is_transient(&e) {
                    log::info!(
                        "{} {}: permanent failure, not retrying",
                        action.operation,
                        action.resource_id
                    );
                    break;
                }

                if attempt < max_attempts {
                    on_retry(attempt, &last_error);
                    let delay = policy.delay_for_attempt(attempt - 1);
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                }
            }
        }
    }

    ExecutionRecord::failed(action.clone(), attempts, last_error, last_fallback)
        .with_advice(advice)
}
