//! Probe layer - read-only queries of current system state

use crate::types::{Observation, ProbeResult, Resource};
use anyhow::Result;
use rayon::prelude::*;

/// Reads the current state of a resource from the live system
///
/// Implementations dispatch on [`Resource::kind`] and must never mutate
/// system state. Errors are allowed here; [`probe`] turns them into a
/// recorded `probe_error` so a batch is never aborted.
pub trait Prober: Send + Sync {
    fn observe(&self, resource: &Resource) -> Result<Observation>;
}

impl<P: Prober + ?Sized> Prober for &P {
    fn observe(&self, resource: &Resource) -> Result<Observation> {
        (**self).observe(resource)
    }
}

/// Probe a single resource; total over its domain
pub fn probe<P: Prober + ?Sized>(prober: &P, resource: &Resource) -> ProbeResult {
    match prober.observe(resource) {
        Ok(observed) => ProbeResult::from_observation(resource, &observed),
        Err(e) => {
            log::warn!("probe of {} failed: {:#}", resource.id, e);
            ProbeResult::from_error(resource, format!("{e:#}"))
        }
    }
}

/// Probe every resource, in declaration order
///
/// With `jobs > 1` probes run on a bounded thread pool; results keep the
/// order of `resources` either way.
pub fn probe_all<P: Prober + ?Sized>(
    prober: &P,
    resources: &[Resource],
    jobs: usize,
) -> Vec<ProbeResult> {
    if jobs <= 1 || resources.len() <= 1 {
        return resources.iter().map(|r| probe(prober, r)).collect();
    }

    match rayon::ThreadPoolBuilder::new().num_threads(jobs).build() {
        Ok(pool) => pool.install(|| resources.par_iter().map(|r| probe(prober, r)).collect()),
        Err(e) => {
            log::warn!("Failed to create probe thread pool, probing sequentially: {e}");
            resources.iter().map(|r| probe(prober, r)).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DesiredState, ResourceKind};

    struct FixedProber;

    impl Prober for FixedProber {
        fn observe(&self, resource: &Resource) -> Result<Observation> {
            match resource.target.as_str() {
                "installed" => Ok(Observation::present(Some("1.0".into()))),
                "broken" => anyhow::bail!("dpkg-query: command not found"),
                _ => Ok(Observation::absent()),
            }
        }
    }

    fn pkg(id: &str, target: &str) -> Resource {
        Resource::new(id, ResourceKind::PackageInstalled, target)
            .with_desired(DesiredState::present().with_value("1.0"))
    }

    #[test]
    fn test_probe_matches() {
        let result = probe(&FixedProber, &pkg("a", "installed"));
        assert!(result.present);
        assert!(result.matches_desired);
        assert_eq!(result.observed_value.as_deref(), Some("1.0"));
    }

    #[test]
    fn test_probe_error_captured() {
        let result = probe(&FixedProber, &pkg("a", "broken"));
        assert!(!result.matches_desired);
        assert!(result.probe_error.unwrap().contains("command not found"));
    }

    #[test]
    fn test_probe_all_keeps_order_in_parallel() {
        let resources: Vec<_> = (0..32)
            .map(|i| {
                let target = if i % 3 == 0 { "installed" } else { "missing" };
                pkg(&format!("r{i}"), target)
            })
            .collect();

        let sequential = probe_all(&FixedProber, &resources, 1);
        let parallel = probe_all(&FixedProber, &resources, 4);

        assert_eq!(sequential, parallel);
        assert_eq!(parallel[5].resource_id, "r5");
        assert!(parallel[3].matches_desired);
        assert!(!parallel[4].matches_desired);
    }
}
