//! # Declarative
//!
//! A reconciliation engine for declared system state.
//!
//! Callers describe the state a machine should be in as a set of typed
//! resources with dependencies. The engine observes the live system,
//! computes the minimal ordered set of actions needed to converge, applies
//! them with bounded retries, and re-observes everything to report a
//! PASS/FAIL verdict per resource.
//!
//! ## Core Concepts
//!
//! - **Resource**: A typed, identified piece of desired state (package,
//!   file, kernel module rule, environment variable, pip package)
//! - **Probe**: A read-only observation of one resource
//! - **Plan**: Dependency-ordered actions for the unsatisfied resources
//! - **Execute**: Applies actions with retry, fallback and an error mode
//! - **Validate**: Re-probes every resource after execution
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{
//!     reconcile, CancelToken, DesiredState, ExecuteOptions, NoProgress,
//!     Resource, ResourceKind,
//! };
//!
//! let resources = vec![
//!     Resource::new("mali-driver", ResourceKind::PackageInstalled, "libmali-valhall-g610")
//!         .with_desired(DesiredState::present().with_value("1.9-1")),
//!     Resource::new("mali-icd", ResourceKind::FileContent, "/etc/OpenCL/vendors/mali.icd")
//!         .with_desired(DesiredState::present().with_content("libmali.so\n"))
//!         .depends_on(["mali-driver"]),
//! ];
//!
//! // `system` implements both `Prober` and `Applier`
//! let report = reconcile(
//!     &resources,
//!     &system,
//!     &ExecuteOptions::default(),
//!     &mut NoProgress,
//!     &CancelToken::new(),
//! )?;
//! std::process::exit(if report.is_success() { 0 } else { 1 });
//! ```
//!
//! ## Provider Traits
//!
//! The crate uses traits for dependency injection:
//!
//! - [`Prober`]: Reads current state from the live system
//! - [`Applier`]: Performs kind-specific mutations
//! - [`ProgressCallback`]: Receives progress updates
//!
//! This keeps the engine free of any package manager, filesystem or UI
//! implementation, and lets tests drive it against in-memory systems.

pub mod context;
pub mod engine;
pub mod error;
pub mod executor;
pub mod model;
pub mod planner;
pub mod probe;
pub mod report;
pub mod types;
pub mod validator;

// Re-export main types at crate root
pub use context::{CancelToken, NoProgress, ProgressCallback};
pub use engine::{Preview, preview, reconcile, reconcile_preview};
pub use error::{ConfigError, ExecutionError};
pub use executor::{Applier, execute};
pub use model::{dependency_levels, topological_order, validate};
pub use planner::{PlanSummary, plan};
pub use probe::{Prober, probe, probe_all};
pub use report::{
    ExecStatus, ExecuteSummary, ExecutionRecord, ResourceCheck, RunReport, ValidationReport,
    Verdict,
};
pub use types::{
    Action, DesiredState, Ensure, ErrorMode, ExecuteOptions, Observation, Operation, ProbeResult,
    Resource, ResourceKind, RetryPolicy,
};
pub use validator::{validate_run, validate_run_with_jobs};
