//! Python packages through `python -m pip`

use super::System;
use anyhow::Result;
use declarative::{Observation, Operation, Resource};
use syskit::{Pip, PipSpec};

fn pip(system: &System) -> Pip<&syskit::SystemRunner> {
    Pip::new(system.runner(), system.python.clone()).with_extra_args(system.pip_args.clone())
}

pub fn observe(system: &System, resource: &Resource) -> Result<Observation> {
    Ok(match pip(system).installed_version(&resource.target)? {
        Some(v) => Observation::present(Some(v)),
        None => Observation::absent(),
    })
}

pub fn apply(system: &System, resource: &Resource, operation: Operation) -> Result<()> {
    let pip = pip(system);
    match operation {
        Operation::Remove => pip.uninstall(&resource.target)?,
        Operation::Install | Operation::Modify => {
            let spec = PipSpec::from_parts(
                &resource.target,
                resource.desired.value.as_deref(),
                resource.desired.source.as_deref(),
            );
            pip.install(&spec)?;
        }
    }
    Ok(())
}
