//! Variables in environment files

use super::System;
use anyhow::{Context, Result};
use declarative::{Observation, Operation, Resource};
use syskit::EnvFile;

pub fn observe(system: &System, resource: &Resource) -> Result<Observation> {
    let env = EnvFile::load(&system.env_file_for(resource))?;
    Ok(match env.get(&resource.target) {
        Some(value) => Observation::present(Some(value)),
        None => Observation::absent(),
    })
}

pub fn apply(system: &System, resource: &Resource, operation: Operation) -> Result<()> {
    let path = system.env_file_for(resource);
    let mut env = EnvFile::load(&path)?;

    match operation {
        Operation::Remove => {
            if !env.unset(&resource.target) {
                return Ok(());
            }
        }
        Operation::Install | Operation::Modify => {
            let value = resource
                .desired
                .value
                .as_deref()
                .context("no value declared")?;
            env.set(&resource.target, value);
        }
    }

    env.save(&path)?;
    log::info!("updated {} in {}", resource.target, path.display());
    Ok(())
}
