//! Core types for declarative resource management

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Category of system state a resource describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// OS package installed (optionally at a pinned version)
    PackageInstalled,
    /// File present with given content digest and permissions
    FileContent,
    /// Kernel module listed in a `modprobe.d` blacklist
    KernelModuleBlacklisted,
    /// Kernel module currently loaded
    KernelModuleLoaded,
    /// Variable set in an environment file
    EnvVarSet,
    /// Python package installed at a version
    PipPackageVersion,
}

impl ResourceKind {
    /// Stable snake_case name, as used in config files and reports
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PackageInstalled => "package_installed",
            Self::FileContent => "file_content",
            Self::KernelModuleBlacklisted => "kernel_module_blacklisted",
            Self::KernelModuleLoaded => "kernel_module_loaded",
            Self::EnvVarSet => "env_var_set",
            Self::PipPackageVersion => "pip_package_version",
        }
    }

    /// Whether `desired.value` is a version that can be relaxed on retry
    pub fn is_versioned(&self) -> bool {
        matches!(self, Self::PackageInstalled | Self::PipPackageVersion)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of the desired state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ensure {
    #[default]
    Present,
    Absent,
}

/// Kind-specific expected state of a resource
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DesiredState {
    #[serde(default)]
    pub ensure: Ensure,

    /// Version, blake3 digest or value string, depending on the kind
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// Inline file content (FileContent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Where content comes from: URL or path for files, artifact or
    /// remote reference for pip, environment file for env vars
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Permission bits (FileContent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<u32>,

    /// Version substituted on retry attempts; unpinned when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
}

impl DesiredState {
    pub fn present() -> Self {
        Self::default()
    }

    pub fn absent() -> Self {
        Self {
            ensure: Ensure::Absent,
            ..Self::default()
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = Some(fallback.into());
        self
    }
}

/// A declared unit of desired system state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Stable unique name within a run (e.g. "mali-icd-file")
    pub id: String,
    pub kind: ResourceKind,
    /// Package name, file path, module name or variable name
    pub target: String,
    #[serde(default)]
    pub desired: DesiredState,
    /// Ids of resources that must be satisfied first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

impl Resource {
    pub fn new(id: impl Into<String>, kind: ResourceKind, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            target: target.into(),
            desired: DesiredState::present(),
            depends_on: Vec::new(),
        }
    }

    pub fn with_desired(mut self, desired: DesiredState) -> Self {
        self.desired = desired;
        self
    }

    pub fn depends_on<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Human-readable description of the desired state
    pub fn description(&self) -> String {
        let absent = self.desired.ensure == Ensure::Absent;
        let version = self
            .desired
            .value
            .as_deref()
            .map(|v| format!(" {v}"))
            .unwrap_or_default();

        match (self.kind, absent) {
            (ResourceKind::PackageInstalled, false) => {
                format!("Install package {}{}", self.target, version)
            }
            (ResourceKind::PackageInstalled, true) => format!("Remove package {}", self.target),
            (ResourceKind::FileContent, false) => format!("Provision file {}", self.target),
            (ResourceKind::FileContent, true) => format!("Delete file {}", self.target),
            (ResourceKind::KernelModuleBlacklisted, false) => {
                format!("Blacklist kernel module {}", self.target)
            }
            (ResourceKind::KernelModuleBlacklisted, true) => {
                format!("Allow kernel module {}", self.target)
            }
            (ResourceKind::KernelModuleLoaded, false) => {
                format!("Load kernel module {}", self.target)
            }
            (ResourceKind::KernelModuleLoaded, true) => {
                format!("Unload kernel module {}", self.target)
            }
            (ResourceKind::EnvVarSet, false) => format!("Set {}={}", self.target, version.trim()),
            (ResourceKind::EnvVarSet, true) => format!("Unset {}", self.target),
            (ResourceKind::PipPackageVersion, false) => {
                format!("Install Python package {}{}", self.target, version)
            }
            (ResourceKind::PipPackageVersion, true) => {
                format!("Uninstall Python package {}", self.target)
            }
        }
    }

    /// The value a probe must observe for this resource to be satisfied
    ///
    /// For files this is the blake3 digest, derived from inline content
    /// when no digest is declared. Kernel module kinds carry no value.
    pub fn expected_value(&self) -> Option<String> {
        match self.kind {
            ResourceKind::KernelModuleBlacklisted | ResourceKind::KernelModuleLoaded => None,
            ResourceKind::FileContent => self
                .desired
                .value
                .as_ref()
                .map(|v| v.to_ascii_lowercase())
                .or_else(|| {
                    self.desired
                        .content
                        .as_ref()
                        .map(|c| blake3::hash(c.as_bytes()).to_hex().to_string())
                }),
            _ => self.desired.value.clone(),
        }
    }

    /// Decide whether an observation satisfies the desired state
    pub fn is_satisfied_by(&self, observed: &Observation) -> bool {
        match self.desired.ensure {
            Ensure::Absent => !observed.present,
            Ensure::Present => {
                if !observed.present {
                    return false;
                }

                let value_ok = match self.expected_value() {
                    None => true,
                    Some(expected) => observed.value.as_deref().is_some_and(|actual| {
                        if self.kind == ResourceKind::FileContent {
                            actual.eq_ignore_ascii_case(&expected)
                        } else {
                            actual == expected
                        }
                    }),
                };

                let mode_ok = match (self.kind, self.desired.mode) {
                    (ResourceKind::FileContent, Some(mode)) => {
                        observed.mode.map(|m| m & 0o7777) == Some(mode & 0o7777)
                    }
                    _ => true,
                };

                value_ok && mode_ok
            }
        }
    }

    /// Substitute resource used on retry attempts
    ///
    /// Only versioned kinds with a pinned version have a fallback: the
    /// declared `fallback` version, or no version at all.
    pub fn fallback(&self) -> Option<Resource> {
        if !self.kind.is_versioned() || self.desired.ensure == Ensure::Absent {
            return None;
        }

        let pinned = self.desired.value.as_ref()?;
        if self.desired.fallback.as_ref() == Some(pinned) {
            return None;
        }

        let mut substitute = self.clone();
        substitute.desired.value = self.desired.fallback.clone();
        substitute.desired.fallback = None;
        Some(substitute)
    }

    /// Short label describing the fallback substitution
    pub fn fallback_label(&self) -> String {
        match &self.desired.fallback {
            Some(version) => format!("version {version}"),
            None => "unpinned".to_string(),
        }
    }
}

/// Raw state read from the system by a prober
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Observation {
    pub present: bool,
    /// Installed version, content digest or variable value
    pub value: Option<String>,
    /// Permission bits, for files
    pub mode: Option<u32>,
}

impl Observation {
    pub fn absent() -> Self {
        Self::default()
    }

    pub fn present(value: Option<String>) -> Self {
        Self {
            present: true,
            value,
            mode: None,
        }
    }

    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }
}

/// Immutable snapshot of a resource's current state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub resource_id: String,
    pub present: bool,
    pub observed_value: Option<String>,
    pub matches_desired: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe_error: Option<String>,
}

impl ProbeResult {
    pub fn from_observation(resource: &Resource, observed: &Observation) -> Self {
        Self {
            resource_id: resource.id.clone(),
            present: observed.present,
            observed_value: observed.value.clone(),
            matches_desired: resource.is_satisfied_by(observed),
            probe_error: None,
        }
    }

    /// A probe that could not determine state never counts as satisfied
    pub fn from_error(resource: &Resource, error: impl Into<String>) -> Self {
        Self {
            resource_id: resource.id.clone(),
            present: false,
            observed_value: None,
            matches_desired: false,
            probe_error: Some(error.into()),
        }
    }
}

/// Remediation performed by an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Install,
    Modify,
    Remove,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Install => "install",
            Self::Modify => "modify",
            Self::Remove => "remove",
        })
    }
}

/// A planned remediation step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub resource_id: String,
    pub operation: Operation,
    /// Position in the dependency-respecting execution order
    pub ordinal: usize,
}

/// What to do with the rest of the plan after an action fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorMode {
    #[default]
    ContinueOnError,
    FailFast,
}

impl fmt::Display for ErrorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ContinueOnError => "continue-on-error",
            Self::FailFast => "fail-fast",
        })
    }
}

/// Bounded retry with backoff and fallback substitution
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts per action, including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_factor: f64,
    /// Upper bound on any single delay
    pub max_delay: Duration,
    /// Use the resource's fallback on attempts after the first
    pub fallback: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_secs(2),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(60),
            fallback: true,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff_factor,
            ..Self::default()
        }
    }

    /// Retry without waiting between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, 1.0)
    }

    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay after a failed attempt (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        let capped = delay.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }
}

/// Options for execution
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Record every action as skipped instead of applying it
    pub dry_run: bool,
    /// Worker count for probes and independent actions; 1 is sequential
    pub jobs: usize,
    pub mode: ErrorMode,
    pub retry: RetryPolicy,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            jobs: 1,
            mode: ErrorMode::default(),
            retry: RetryPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pinned_package() -> Resource {
        Resource::new("mali", ResourceKind::PackageInstalled, "libmali")
            .with_desired(DesiredState::present().with_value("1.9-1"))
    }

    #[test]
    fn test_package_satisfied_only_at_pinned_version() {
        let r = pinned_package();
        assert!(r.is_satisfied_by(&Observation::present(Some("1.9-1".into()))));
        assert!(!r.is_satisfied_by(&Observation::present(Some("1.8-0".into()))));
        assert!(!r.is_satisfied_by(&Observation::absent()));
    }

    #[test]
    fn test_unpinned_package_accepts_any_version() {
        let r = Resource::new("git", ResourceKind::PackageInstalled, "git");
        assert!(r.is_satisfied_by(&Observation::present(Some("2.39".into()))));
        assert!(r.is_satisfied_by(&Observation::present(None)));
    }

    #[test]
    fn test_absent_resource_satisfied_when_missing() {
        let r = Resource::new("old", ResourceKind::PackageInstalled, "libmali-old")
            .with_desired(DesiredState::absent());
        assert!(r.is_satisfied_by(&Observation::absent()));
        assert!(!r.is_satisfied_by(&Observation::present(Some("1.0".into()))));
    }

    #[test]
    fn test_file_expected_value_from_content() {
        let r = Resource::new("icd", ResourceKind::FileContent, "/etc/OpenCL/vendors/mali.icd")
            .with_desired(DesiredState::present().with_content("libmali.so\n"));
        let digest = blake3::hash(b"libmali.so\n").to_hex().to_string();
        assert_eq!(r.expected_value(), Some(digest.clone()));
        assert!(r.is_satisfied_by(&Observation::present(Some(digest.to_uppercase()))));
    }

    #[test]
    fn test_file_mode_must_match_when_declared() {
        let digest = blake3::hash(b"x").to_hex().to_string();
        let r = Resource::new("f", ResourceKind::FileContent, "/tmp/f")
            .with_desired(DesiredState::present().with_value(&digest).with_mode(0o644));
        assert!(r.is_satisfied_by(&Observation::present(Some(digest.clone())).with_mode(0o100644)));
        assert!(!r.is_satisfied_by(&Observation::present(Some(digest.clone())).with_mode(0o600)));
        assert!(!r.is_satisfied_by(&Observation::present(Some(digest))));
    }

    #[test]
    fn test_kernel_module_ignores_value() {
        let r = Resource::new("blk", ResourceKind::KernelModuleBlacklisted, "panfrost");
        assert!(r.is_satisfied_by(&Observation::present(Some("/etc/modprobe.d/x.conf".into()))));
    }

    #[test]
    fn test_fallback_unpins_version() {
        let fallback = pinned_package().fallback().expect("pinned package has a fallback");
        assert_eq!(fallback.desired.value, None);
        assert_eq!(pinned_package().fallback_label(), "unpinned");
    }

    #[test]
    fn test_fallback_uses_declared_version() {
        let r = Resource::new("numpy", ResourceKind::PipPackageVersion, "numpy").with_desired(
            DesiredState::present()
                .with_value("1.26.4")
                .with_fallback("1.24.4"),
        );
        let fallback = r.fallback().expect("fallback");
        assert_eq!(fallback.desired.value.as_deref(), Some("1.24.4"));
        assert_eq!(r.fallback_label(), "version 1.24.4");
    }

    #[test]
    fn test_no_fallback_for_unversioned_kinds() {
        let r = Resource::new("env", ResourceKind::EnvVarSet, "DISPLAY")
            .with_desired(DesiredState::present().with_value(":0"));
        assert!(r.fallback().is_none());
        assert!(Resource::new("git", ResourceKind::PackageInstalled, "git").fallback().is_none());
    }

    #[test]
    fn test_probe_error_is_not_satisfied() {
        let result = ProbeResult::from_error(&pinned_package(), "dpkg-query not found");
        assert!(!result.matches_desired);
        assert!(!result.present);
        assert_eq!(result.probe_error.as_deref(), Some("dpkg-query not found"));
    }

    #[test]
    fn test_retry_delay_backoff() {
        let policy = RetryPolicy::new(4, Duration::from_secs(1), 2.0);
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(RetryPolicy::immediate(3).delay_for_attempt(2), Duration::ZERO);
    }

    #[test]
    fn test_retry_delay_capped() {
        let policy = RetryPolicy {
            max_delay: Duration::from_secs(5),
            ..RetryPolicy::new(10, Duration::from_secs(4), 2.0)
        };
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(5));
    }

    #[test]
    fn test_error_mode_serde_names() {
        assert_eq!(
            serde_json::to_string(&ErrorMode::FailFast).unwrap(),
            "\"fail-fast\""
        );
        assert_eq!(ErrorMode::default().to_string(), "continue-on-error");
    }
}
