//! Validator - re-probes every resource and classifies it PASS or FAIL

use crate::probe::{Prober, probe_all};
use crate::report::ValidationReport;
use crate::types::Resource;

/// Re-probe all resources sequentially
///
/// Pure with respect to system state: calling it twice without an
/// intervening change yields identical reports.
pub fn validate_run<P: Prober + ?Sized>(resources: &[Resource], prober: &P) -> ValidationReport {
    validate_run_with_jobs(resources, prober, 1)
}

/// Re-probe all resources on up to `jobs` workers
pub fn validate_run_with_jobs<P: Prober + ?Sized>(
    resources: &[Resource],
    prober: &P,
    jobs: usize,
) -> ValidationReport {
    let probes = probe_all(prober, resources, jobs);
    let report = ValidationReport::from_probes(resources, &probes);
    log::info!(
        "validation: {} passed, {} failed of {}",
        report.passed,
        report.failed,
        report.total
    );
    report
}
