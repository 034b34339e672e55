//! Kernel module blacklist entries and loaded state

use super::System;
use anyhow::Result;
use declarative::{Observation, Operation, Resource};
use syskit::Modprobe;
use syskit::kmod;

fn presence(present: bool) -> Observation {
    if present {
        Observation::present(None)
    } else {
        Observation::absent()
    }
}

pub fn observe_blacklist(system: &System, resource: &Resource) -> Result<Observation> {
    let blacklisted = kmod::is_blacklisted(&system.modprobe_dir(), &resource.target)?;
    Ok(presence(blacklisted))
}

pub fn apply_blacklist(system: &System, resource: &Resource, operation: Operation) -> Result<()> {
    let dir = system.modprobe_dir();
    match operation {
        Operation::Remove => kmod::remove_blacklist(&dir, &resource.target)?,
        Operation::Install | Operation::Modify => {
            kmod::write_blacklist(&dir, &resource.target)?;
        }
    }
    Ok(())
}

pub fn observe_loaded(system: &System, resource: &Resource) -> Result<Observation> {
    let loaded = kmod::is_loaded(&system.proc_modules(), &resource.target)?;
    Ok(presence(loaded))
}

pub fn apply_loaded(system: &System, resource: &Resource, operation: Operation) -> Result<()> {
    let modprobe = Modprobe::new(system.runner());
    match operation {
        Operation::Remove => modprobe.unload(&resource.target)?,
        Operation::Install | Operation::Modify => modprobe.load(&resource.target)?,
    }
    Ok(())
}
