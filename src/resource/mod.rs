//! Live-system probes and mutations for each resource kind
//!
//! [`System`] is the one implementation of the engine's `Prober` and
//! `Applier` traits used by the CLI. It dispatches on the resource kind to
//! the per-kind modules below, which talk to the OS through `syskit`.

mod env;
mod file;
mod kmod;
mod package;
mod pip;

use crate::config::SystemSettings;
use anyhow::{Context, Result};
use declarative::{Applier, Observation, Operation, Prober, Resource, ResourceKind};
use std::path::PathBuf;
use std::sync::Mutex;
use syskit::{ErrorCategory, SystemRunner};

/// The machine being reconciled
pub struct System {
    root: PathBuf,
    runner: SystemRunner,
    python: String,
    pip_args: Vec<String>,
    modprobe_dir: String,
    env_file: String,
    apt_update: bool,
    /// Set once `apt-get update` has succeeded in this run
    apt_updated: Mutex<bool>,
}

impl System {
    pub fn new(settings: &SystemSettings) -> Self {
        Self {
            root: PathBuf::from(&settings.root),
            runner: SystemRunner::new().with_sudo(settings.sudo),
            python: settings.python.clone(),
            pip_args: settings.pip_args.clone(),
            modprobe_dir: settings.modprobe_dir.clone(),
            env_file: settings.env_file.clone(),
            apt_update: settings.apt_update,
            apt_updated: Mutex::new(false),
        }
    }

    /// Ask for the sudo password up front when sudo is configured
    pub fn acquire_privileges(&self) -> Result<()> {
        if self.runner.uses_sudo() {
            crate::ui::info("Sudo required for package and module changes");
            self.runner
                .validate_sudo()
                .context("Failed to acquire sudo privileges")?;
        }
        Ok(())
    }

    /// Map an absolute system path under the configured root
    fn path(&self, absolute: &str) -> PathBuf {
        syskit::files::under_root(&self.root, absolute)
    }

    fn runner(&self) -> &SystemRunner {
        &self.runner
    }

    fn modprobe_dir(&self) -> PathBuf {
        self.path(&self.modprobe_dir)
    }

    fn proc_modules(&self) -> PathBuf {
        self.path("/proc/modules")
    }

    fn env_file_for(&self, resource: &Resource) -> PathBuf {
        self.path(resource.desired.source.as_deref().unwrap_or(&self.env_file))
    }

    /// Run `apt-get update` at most once per run, if configured
    fn refresh_package_lists(&self) -> Result<()> {
        if !self.apt_update {
            return Ok(());
        }
        let mut updated = match self.apt_updated.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !*updated {
            syskit::Apt::new(self.runner())
                .update()
                .context("apt-get update failed")?;
            *updated = true;
        }
        Ok(())
    }
}

impl Prober for System {
    fn observe(&self, resource: &Resource) -> Result<Observation> {
        let observed = match resource.kind {
            ResourceKind::PackageInstalled => package::observe(self, resource),
            ResourceKind::FileContent => file::observe(self, resource),
            ResourceKind::KernelModuleBlacklisted => kmod::observe_blacklist(self, resource),
            ResourceKind::KernelModuleLoaded => kmod::observe_loaded(self, resource),
            ResourceKind::EnvVarSet => env::observe(self, resource),
            ResourceKind::PipPackageVersion => pip::observe(self, resource),
        };
        observed.with_context(|| format!("Failed to probe {}", resource.id))
    }
}

impl Applier for System {
    fn apply(&self, resource: &Resource, operation: Operation) -> Result<()> {
        log::debug!("{operation} {} ({})", resource.id, resource.kind);
        let applied = match resource.kind {
            ResourceKind::PackageInstalled => package::apply(self, resource, operation),
            ResourceKind::FileContent => file::apply(self, resource, operation),
            ResourceKind::KernelModuleBlacklisted => {
                kmod::apply_blacklist(self, resource, operation)
            }
            ResourceKind::KernelModuleLoaded => kmod::apply_loaded(self, resource, operation),
            ResourceKind::EnvVarSet => env::apply(self, resource, operation),
            ResourceKind::PipPackageVersion => pip::apply(self, resource, operation),
        };
        applied.with_context(|| format!("Failed to {operation} {}", resource.id))
    }

    fn is_transient(&self, error: &anyhow::Error) -> bool {
        match system_error(error) {
            Some(e) => e.is_retryable() || e.category() == ErrorCategory::Other,
            None => true,
        }
    }

    fn advice(&self, error: &anyhow::Error) -> Option<String> {
        let category = system_error(error)?.category();
        (category != ErrorCategory::Other)
            .then(|| format!("{}: {}", category.description(), category.advice()))
    }
}

/// The categorized system error behind an apply failure, if any
fn system_error(error: &anyhow::Error) -> Option<&syskit::Error> {
    error.chain().find_map(|e| e.downcast_ref::<syskit::Error>())
}
