//! End-to-end reconciliation scenarios against an in-memory system

use anyhow::{Result, bail};
use declarative::{
    Applier, CancelToken, ConfigError, DesiredState, ErrorMode, ExecStatus, ExecuteOptions,
    NoProgress, Observation, Operation, Prober, ProgressCallback, Resource, ResourceKind,
    RetryPolicy, Verdict, plan, probe_all, reconcile, validate_run,
};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Default)]
struct State {
    files: HashMap<String, Vec<u8>>,
    packages: HashMap<String, String>,
    loaded: HashSet<String>,
}

/// A machine held entirely in memory
#[derive(Default)]
struct FakeSystem {
    state: Mutex<State>,
    /// Package versions the repository can serve; anything else fails
    available: HashMap<String, Vec<String>>,
    /// Packages whose install always fails
    broken: HashSet<String>,
    probes: AtomicUsize,
}

impl FakeSystem {
    fn with_package(mut self, name: &str, versions: &[&str]) -> Self {
        self.available.insert(
            name.to_string(),
            versions.iter().map(|v| (*v).to_string()).collect(),
        );
        self
    }

    fn with_broken(mut self, name: &str) -> Self {
        self.broken.insert(name.to_string());
        self
    }

    fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

impl Prober for FakeSystem {
    fn observe(&self, resource: &Resource) -> Result<Observation> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        let observed = match resource.kind {
            ResourceKind::FileContent => match state.files.get(&resource.target) {
                Some(bytes) => {
                    Observation::present(Some(blake3::hash(bytes).to_hex().to_string()))
                }
                None => Observation::absent(),
            },
            ResourceKind::PackageInstalled | ResourceKind::PipPackageVersion => {
                match state.packages.get(&resource.target) {
                    Some(version) => Observation::present(Some(version.clone())),
                    None => Observation::absent(),
                }
            }
            ResourceKind::KernelModuleLoaded => {
                if state.loaded.contains(&resource.target) {
                    Observation::present(None)
                } else {
                    Observation::absent()
                }
            }
            other => bail!("{other} is not modelled"),
        };
        Ok(observed)
    }
}

impl Applier for FakeSystem {
    fn apply(&self, resource: &Resource, operation: Operation) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        match (resource.kind, operation) {
            (ResourceKind::FileContent, Operation::Remove) => {
                state.files.remove(&resource.target);
            }
            (ResourceKind::FileContent, _) => {
                let Some(content) = &resource.desired.content else {
                    bail!("no content for {}", resource.target);
                };
                state
                    .files
                    .insert(resource.target.clone(), content.clone().into_bytes());
            }
            (ResourceKind::PackageInstalled, Operation::Remove) => {
                state.packages.remove(&resource.target);
            }
            (ResourceKind::PackageInstalled, _) => {
                if self.broken.contains(&resource.target) {
                    bail!("E: Unable to locate package {}", resource.target);
                }
                let versions = self.available.get(&resource.target).cloned().unwrap_or_default();
                let version = match &resource.desired.value {
                    Some(pinned) if versions.contains(pinned) => pinned.clone(),
                    Some(pinned) => {
                        bail!("E: Version '{pinned}' for '{}' was not found", resource.target)
                    }
                    None => match versions.last() {
                        Some(latest) => latest.clone(),
                        None => bail!("E: Unable to locate package {}", resource.target),
                    },
                };
                state.packages.insert(resource.target.clone(), version);
            }
            (ResourceKind::KernelModuleLoaded, Operation::Remove) => {
                state.loaded.remove(&resource.target);
            }
            (ResourceKind::KernelModuleLoaded, _) => {
                state.loaded.insert(resource.target.clone());
            }
            (other, _) => bail!("{other} is not modelled"),
        }
        Ok(())
    }
}

fn immediate() -> ExecuteOptions {
    ExecuteOptions {
        retry: RetryPolicy::immediate(2),
        ..Default::default()
    }
}

fn pkg(id: &str) -> Resource {
    Resource::new(id, ResourceKind::PackageInstalled, id)
}

#[test]
fn file_is_provisioned_then_passes_with_expected_hash() {
    let content = "mali_csffw.bin firmware blob\n";
    let expected = blake3::hash(content.as_bytes()).to_hex().to_string();
    let resources = vec![
        Resource::new("fw-file", ResourceKind::FileContent, "/lib/firmware/mali_csffw.bin")
            .with_desired(
                DesiredState::present()
                    .with_value(expected.clone())
                    .with_content(content),
            ),
    ];
    let system = FakeSystem::default();

    let report = reconcile(
        &resources,
        &system,
        &immediate(),
        &mut NoProgress,
        &CancelToken::new(),
    )
    .unwrap();

    assert!(!report.probes[0].present);
    let record = report.record("fw-file").unwrap();
    assert_eq!(record.action.operation, Operation::Install);
    assert_eq!(record.status, ExecStatus::Succeeded);

    let check = report.validation.as_ref().unwrap().check("fw-file").unwrap();
    assert_eq!(check.verdict, Verdict::Pass);
    assert_eq!(check.observed_value.as_deref(), Some(expected.as_str()));
    assert!(report.is_success());
}

#[test]
fn continue_on_error_attempts_every_action() {
    let system = FakeSystem::default()
        .with_broken("a")
        .with_package("b", &["1.0"]);
    let resources = vec![pkg("a"), pkg("b")];

    let report = reconcile(
        &resources,
        &system,
        &immediate(),
        &mut NoProgress,
        &CancelToken::new(),
    )
    .unwrap();

    assert_eq!(report.record("a").unwrap().status, ExecStatus::Failed);
    assert_eq!(report.record("a").unwrap().attempts, 2);
    assert_eq!(report.record("b").unwrap().status, ExecStatus::Succeeded);

    let validation = report.validation.unwrap();
    assert_eq!(validation.check("a").unwrap().verdict, Verdict::Fail);
    assert_eq!(validation.check("b").unwrap().verdict, Verdict::Pass);
    assert_eq!(validation.failed, 1);
}

#[test]
fn fail_fast_skips_after_first_failure() {
    let system = FakeSystem::default()
        .with_broken("a")
        .with_package("b", &["1.0"]);
    let resources = vec![pkg("a"), pkg("b")];
    let opts = ExecuteOptions {
        mode: ErrorMode::FailFast,
        ..immediate()
    };

    let report = reconcile(&resources, &system, &opts, &mut NoProgress, &CancelToken::new())
        .unwrap();

    assert_eq!(report.record("a").unwrap().status, ExecStatus::Failed);
    let skipped = report.record("b").unwrap();
    assert_eq!(skipped.status, ExecStatus::Skipped);
    assert_eq!(skipped.attempts, 0);
    assert!(!system.state.lock().unwrap().packages.contains_key("b"));
}

#[test]
fn second_run_plans_nothing() {
    let system = FakeSystem::default()
        .with_package("libmali", &["1.9-1"])
        .with_package("clinfo", &["3.0"]);
    let resources = vec![
        pkg("libmali").with_desired(DesiredState::present().with_value("1.9-1")),
        pkg("clinfo").depends_on(["libmali"]),
        Resource::new("icd", ResourceKind::FileContent, "/etc/OpenCL/vendors/mali.icd")
            .with_desired(DesiredState::present().with_content("libmali.so\n"))
            .depends_on(["libmali"]),
    ];

    let first = reconcile(
        &resources,
        &system,
        &immediate(),
        &mut NoProgress,
        &CancelToken::new(),
    )
    .unwrap();
    assert!(first.is_success());
    assert_eq!(first.records.len(), 3);

    let probes = probe_all(&system, &resources, 1);
    assert!(plan(&resources, &probes).unwrap().is_empty());

    let second = reconcile(
        &resources,
        &system,
        &immediate(),
        &mut NoProgress,
        &CancelToken::new(),
    )
    .unwrap();
    assert!(second.records.is_empty());
    assert!(second.is_success());
}

#[test]
fn validation_is_stable_without_changes() {
    let system = FakeSystem::default().with_package("libmali", &["1.9-1"]);
    let resources = vec![pkg("libmali"), pkg("missing")];

    let first = validate_run(&resources, &system);
    let second = validate_run(&resources, &system);
    assert_eq!(first, second);
    assert_eq!(first.failed, 2);
}

#[test]
fn cycle_is_rejected_before_any_probe() {
    let system = FakeSystem::default();
    let resources = vec![
        pkg("a").depends_on(["b"]),
        pkg("b").depends_on(["a"]),
    ];

    let err = reconcile(
        &resources,
        &system,
        &immediate(),
        &mut NoProgress,
        &CancelToken::new(),
    )
    .unwrap_err();

    assert!(matches!(err, ConfigError::CyclicDependency { .. }));
    assert_eq!(system.probe_count(), 0);
}

#[test]
fn unknown_dependency_is_rejected() {
    let err = reconcile(
        &[pkg("a").depends_on(["nope"])],
        &FakeSystem::default(),
        &immediate(),
        &mut NoProgress,
        &CancelToken::new(),
    )
    .unwrap_err();
    assert_eq!(
        err,
        ConfigError::UnknownDependency {
            id: "a".into(),
            dependency: "nope".into()
        }
    );
}

#[test]
fn pinned_version_falls_back_to_unpinned() {
    let system = FakeSystem::default().with_package("libmali", &["1.9-1", "1.9-2"]);
    let resources = vec![pkg("libmali").with_desired(DesiredState::present().with_value("2.0-0"))];

    let report = reconcile(
        &resources,
        &system,
        &immediate(),
        &mut NoProgress,
        &CancelToken::new(),
    )
    .unwrap();

    let record = report.record("libmali").unwrap();
    assert_eq!(record.status, ExecStatus::Succeeded);
    assert_eq!(record.attempts, 2);
    assert_eq!(record.fallback.as_deref(), Some("unpinned"));

    // The pinned version is still what validation checks
    let check = report.validation.as_ref().unwrap().check("libmali").unwrap();
    assert_eq!(check.verdict, Verdict::Fail);
    assert_eq!(check.observed_value.as_deref(), Some("1.9-2"));
}

#[test]
fn declared_fallback_version_is_installed_on_retry() {
    let system = FakeSystem::default().with_package("libmali", &["1.9-1"]);
    let resources = vec![pkg("libmali").with_desired(
        DesiredState::present()
            .with_value("2.0-0")
            .with_fallback("1.9-1"),
    )];

    let report = reconcile(
        &resources,
        &system,
        &immediate(),
        &mut NoProgress,
        &CancelToken::new(),
    )
    .unwrap();

    let record = report.record("libmali").unwrap();
    assert_eq!(record.fallback.as_deref(), Some("version 1.9-1"));
    assert_eq!(
        system.state.lock().unwrap().packages.get("libmali").map(String::as_str),
        Some("1.9-1")
    );
}

/// Requests cancellation as soon as the first action finishes
struct CancelAfterFirst(CancelToken);

impl ProgressCallback for CancelAfterFirst {
    fn on_run_start(&mut self, _total: usize) {}
    fn on_action_start(&mut self, _action: &declarative::Action, _resource: &Resource) {}
    fn on_retry(&mut self, _action: &declarative::Action, _attempt: u32, _error: &str) {}
    fn on_action_complete(&mut self, _record: &declarative::ExecutionRecord) {
        self.0.cancel();
    }
    fn on_run_complete(&mut self) {}
}

#[test]
fn cancellation_skips_remaining_actions() {
    let system = FakeSystem::default()
        .with_package("a", &["1"])
        .with_package("b", &["1"])
        .with_package("c", &["1"]);
    let resources = vec![pkg("a"), pkg("b"), pkg("c")];
    let cancel = CancelToken::new();
    let mut progress = CancelAfterFirst(cancel.clone());

    let report = reconcile(&resources, &system, &immediate(), &mut progress, &cancel).unwrap();

    assert!(report.cancelled);
    assert_eq!(report.record("a").unwrap().status, ExecStatus::Succeeded);
    assert_eq!(report.record("b").unwrap().status, ExecStatus::Skipped);
    assert_eq!(report.record("c").unwrap().status, ExecStatus::Skipped);
    assert_eq!(report.validation.unwrap().failed, 2);
}

#[test]
fn concurrent_mode_converges_same_as_sequential() {
    let mut system = FakeSystem::default();
    let mut resources = vec![pkg("base")];
    system = system.with_package("base", &["1"]);
    for i in 0..6 {
        let name = format!("tool{i}");
        system = system.with_package(&name, &["1"]);
        resources.push(pkg(&name).depends_on(["base"]));
    }
    resources.push(
        Resource::new("loaded", ResourceKind::KernelModuleLoaded, "mali_kbase")
            .depends_on((0..6).map(|i| format!("tool{i}"))),
    );

    let opts = ExecuteOptions {
        jobs: 4,
        ..immediate()
    };
    let report = reconcile(&resources, &system, &opts, &mut NoProgress, &CancelToken::new())
        .unwrap();

    assert!(report.is_success());
    let order: Vec<_> = report
        .records
        .iter()
        .map(|r| r.action.resource_id.as_str())
        .collect();
    assert_eq!(order.first(), Some(&"base"));
    assert_eq!(order.last(), Some(&"loaded"));
}
