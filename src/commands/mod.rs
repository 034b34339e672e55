//! Subcommand implementations
//!
//! Each command returns whether the system matched its declaration, which
//! `main` maps to the process exit code.

pub mod plan;
pub mod reconcile;
pub mod validate;

use anyhow::Result;
use declarative::Resource;
use std::path::Path;

use crate::config::Config;
use crate::resource::System;

/// A loaded declaration file and the system it describes
pub struct Declaration {
    pub config: Config,
    pub resources: Vec<Resource>,
    pub system: System,
}

impl Declaration {
    pub fn load(path: &Path) -> Result<Self> {
        let config = Config::load(path)?;
        let resources = config.resources()?;
        let system = System::new(&config.system);
        Ok(Self {
            config,
            resources,
            system,
        })
    }

    /// Worker count: command line first, then `[engine].jobs`
    pub fn jobs(&self, flag: Option<usize>) -> usize {
        flag.unwrap_or(self.config.engine.jobs).max(1)
    }
}
