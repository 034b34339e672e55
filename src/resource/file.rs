//! Files identified by content digest and permission bits

use super::System;
use anyhow::{Result, bail};
use declarative::{Observation, Operation, Resource};
use syskit::{MAX_DOWNLOAD_SIZE, files};

pub fn observe(system: &System, resource: &Resource) -> Result<Observation> {
    let path = system.path(&resource.target);
    Ok(match files::stat(&path)? {
        Some(state) => Observation::present(Some(state.digest)).with_mode(state.mode),
        None => Observation::absent(),
    })
}

pub fn apply(system: &System, resource: &Resource, operation: Operation) -> Result<()> {
    let path = system.path(&resource.target);
    if operation == Operation::Remove {
        files::remove(&path)?;
        return Ok(());
    }

    let expected = resource.expected_value();
    let mode = resource.desired.mode;

    // Content already right, only the mode differs
    if let (Some(state), Some(expected), Some(mode)) = (files::stat(&path)?, &expected, mode)
        && state.digest.eq_ignore_ascii_case(expected)
    {
        files::set_mode(&path, mode)?;
        log::info!("chmod {:o} {}", mode, path.display());
        return Ok(());
    }

    let bytes = match (&resource.desired.content, &resource.desired.source) {
        (Some(content), _) => content.clone().into_bytes(),
        (None, Some(source)) => syskit::fetch(source, MAX_DOWNLOAD_SIZE)?,
        (None, None) => bail!("no content or source declared for {}", resource.target),
    };

    if let Some(expected) = &expected {
        let actual = files::hash_bytes(&bytes);
        if !actual.eq_ignore_ascii_case(expected) {
            bail!("content digest mismatch: expected {expected}, got {actual}");
        }
    }

    files::write_atomic(&path, &bytes, mode)?;
    log::info!("wrote {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::tests::rooted;
    use declarative::{DesiredState, ResourceKind};
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn firmware(desired: DesiredState) -> Resource {
        Resource::new("fw", ResourceKind::FileContent, "/lib/firmware/mali_csffw.bin")
            .with_desired(desired)
    }

    #[test]
    fn test_provision_from_local_source() {
        let dir = TempDir::new().unwrap();
        let blob = dir.path().join("blob.bin");
        fs::write(&blob, b"csf firmware").unwrap();
        let system = rooted(&dir);

        let fw = firmware(
            DesiredState::present()
                .with_source(blob.to_string_lossy())
                .with_value(files::hash_bytes(b"csf firmware"))
                .with_mode(0o644),
        );

        assert!(!observe(&system, &fw).unwrap().present);
        apply(&system, &fw, Operation::Install).unwrap();

        let observed = observe(&system, &fw).unwrap();
        assert!(fw.is_satisfied_by(&observed));
        assert_eq!(
            fs::read(dir.path().join("lib/firmware/mali_csffw.bin")).unwrap(),
            b"csf firmware"
        );
    }

    #[test]
    fn test_digest_mismatch_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let system = rooted(&dir);
        let fw = firmware(
            DesiredState::present()
                .with_content("wrong bytes")
                .with_value(files::hash_bytes(b"right bytes")),
        );

        let err = apply(&system, &fw, Operation::Install).unwrap_err();
        assert!(err.to_string().contains("digest mismatch"));
        assert!(!dir.path().join("lib/firmware/mali_csffw.bin").exists());
    }

    #[test]
    fn test_mode_only_change() {
        let dir = TempDir::new().unwrap();
        let system = rooted(&dir);
        let fw = firmware(DesiredState::present().with_content("blob").with_mode(0o600));

        let path = dir.path().join("lib/firmware/mali_csffw.bin");
        files::write_atomic(&path, b"blob", Some(0o644)).unwrap();
        assert!(!fw.is_satisfied_by(&observe(&system, &fw).unwrap()));

        apply(&system, &fw, Operation::Modify).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o7777;
        assert_eq!(mode, 0o600);
        assert!(fw.is_satisfied_by(&observe(&system, &fw).unwrap()));
    }

    #[test]
    fn test_value_only_cannot_be_applied() {
        let dir = TempDir::new().unwrap();
        let system = rooted(&dir);
        let fw = firmware(DesiredState::present().with_value(files::hash_bytes(b"x")));

        assert!(apply(&system, &fw, Operation::Install).is_err());
    }

    #[test]
    fn test_remove() {
        let dir = TempDir::new().unwrap();
        let system = rooted(&dir);
        let path = dir.path().join("lib/firmware/mali_csffw.bin");
        files::write_atomic(&path, b"old", None).unwrap();

        let gone = firmware(DesiredState::absent());
        apply(&system, &gone, Operation::Remove).unwrap();
        assert!(!path.exists());
        assert!(gone.is_satisfied_by(&observe(&system, &gone).unwrap()));
    }
}
