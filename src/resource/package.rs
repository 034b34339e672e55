//! OS packages through dpkg/apt

use super::System;
use anyhow::Result;
use declarative::{Observation, Operation, Resource};
use syskit::Apt;

pub fn observe(system: &System, resource: &Resource) -> Result<Observation> {
    let version = Apt::new(system.runner()).installed_version(&resource.target)?;
    Ok(match version {
        Some(v) => Observation::present(Some(v)),
        None => Observation::absent(),
    })
}

pub fn apply(system: &System, resource: &Resource, operation: Operation) -> Result<()> {
    let apt = Apt::new(system.runner());
    match operation {
        Operation::Remove => apt.remove(&resource.target)?,
        Operation::Install | Operation::Modify => {
            system.refresh_package_lists()?;
            apt.install(&resource.target, resource.desired.value.as_deref())?;
        }
    }
    Ok(())
}
