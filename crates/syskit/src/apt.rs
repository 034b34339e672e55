//! Debian package queries (`dpkg-query`) and changes (`apt-get`).

use crate::command::Runner;
use crate::error::Result;

const STATUS_FORMAT: &str = "${Status}\t${Version}";

/// Package manager front-end.
pub struct Apt<R> {
    runner: R,
}

impl<R: Runner> Apt<R> {
    /// Create a front-end over the given runner.
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    /// Installed version of a package, `None` when not installed.
    ///
    /// Packages that were removed but left config files behind count as
    /// not installed.
    pub fn installed_version(&self, name: &str) -> Result<Option<String>> {
        let format = format!("-f={STATUS_FORMAT}");
        let output = self
            .runner
            .run("dpkg-query", &["-W", format.as_str(), name])?;

        if !output.success() {
            // dpkg-query exits 1 for packages it has never heard of
            if output.stderr.contains("no packages found matching") {
                return Ok(None);
            }
            return output.check("dpkg-query", Some(name)).map(|_| None);
        }

        Ok(parse_status(&output.stdout))
    }

    /// Install a package, optionally pinned to an exact version.
    ///
    /// Downgrades are allowed so that a pin can move the version either way.
    pub fn install(&self, name: &str, version: Option<&str>) -> Result<()> {
        let spec = match version {
            Some(v) => format!("{name}={v}"),
            None => name.to_string(),
        };
        log::info!("apt-get install {spec}");
        self.apt_get(&["install", "-y", "--allow-downgrades", spec.as_str()], name)
    }

    /// Remove a package.
    pub fn remove(&self, name: &str) -> Result<()> {
        log::info!("apt-get remove {name}");
        self.apt_get(&["remove", "-y", name], name)
    }

    /// Refresh package lists.
    pub fn update(&self) -> Result<()> {
        log::info!("apt-get update");
        self.apt_get(&["update"], "package lists")
    }

    fn apt_get(&self, args: &[&str], subject: &str) -> Result<()> {
        let mut full = vec!["DEBIAN_FRONTEND=noninteractive", "apt-get"];
        full.extend_from_slice(args);
        self.runner
            .run_privileged("env", &full)?
            .check("apt-get", Some(subject))?;
        Ok(())
    }
}

/// Parse `${Status}\t${Version}` output from `dpkg-query -W`.
pub fn parse_status(stdout: &str) -> Option<String> {
    let line = stdout.lines().find(|l| !l.trim().is_empty())?;
    let (status, version) = line.split_once('\t')?;

    let installed = status.split_whitespace().last() == Some("installed");
    let version = version.trim();
    if installed && !version.is_empty() {
        Some(version.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandOutput;
    use crate::command::testing::ScriptedRunner;

    #[test]
    fn test_parse_status() {
        assert_eq!(
            parse_status("install ok installed\t1.9-1\n"),
            Some("1.9-1".to_string())
        );
        assert_eq!(parse_status("deinstall ok config-files\t1.9-1"), None);
        assert_eq!(parse_status("install ok half-installed\t2.0"), None);
        assert_eq!(parse_status("unknown ok not-installed\t"), None);
        assert_eq!(parse_status(""), None);
    }

    #[test]
    fn test_installed_version_queries_dpkg() {
        let runner = ScriptedRunner::new([CommandOutput::ok("install ok installed\t3.0.0-1")]);
        let apt = Apt::new(&runner);

        assert_eq!(
            apt.installed_version("clinfo").unwrap().as_deref(),
            Some("3.0.0-1")
        );
        assert_eq!(
            runner.calls(),
            vec!["dpkg-query -W -f=${Status}\t${Version} clinfo"]
        );
        assert!(!runner.privileged(0));
    }

    #[test]
    fn test_unknown_package_is_not_installed() {
        let runner = ScriptedRunner::new([CommandOutput::failed(
            1,
            "dpkg-query: no packages found matching libnope",
        )]);
        assert_eq!(Apt::new(&runner).installed_version("libnope").unwrap(), None);
    }

    #[test]
    fn test_install_pinned() {
        let runner = ScriptedRunner::new([]);
        Apt::new(&runner)
            .install("libmali-valhall-g610", Some("1.9-1"))
            .unwrap();

        assert_eq!(
            runner.calls(),
            vec![
                "env DEBIAN_FRONTEND=noninteractive apt-get install -y --allow-downgrades \
                 libmali-valhall-g610=1.9-1"
            ]
        );
        assert!(runner.privileged(0));
    }

    #[test]
    fn test_install_failure_is_categorized() {
        let runner = ScriptedRunner::new([CommandOutput::failed(
            100,
            "E: Could not get lock /var/lib/dpkg/lock-frontend",
        )]);
        let err = Apt::new(&runner).install("clinfo", None).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_remove() {
        let runner = ScriptedRunner::new([]);
        Apt::new(&runner).remove("mesa-opencl-icd").unwrap();
        assert_eq!(
            runner.calls(),
            vec!["env DEBIAN_FRONTEND=noninteractive apt-get remove -y mesa-opencl-icd"]
        );
    }
}
