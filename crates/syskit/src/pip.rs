//! Python package queries and installs through `python -m pip`.

use crate::command::Runner;
use crate::error::Result;
use std::fmt;
use std::path::PathBuf;

/// What to hand to `pip install`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipSpec {
    /// Index requirement, pinned with `==` when a version is given
    Requirement {
        /// Distribution name
        name: String,
        /// Exact version
        version: Option<String>,
    },
    /// Local wheel or sdist
    Artifact(PathBuf),
    /// VCS or URL reference (`git+https://...`, `https://.../x.whl`)
    Remote(String),
}

impl PipSpec {
    /// Build a spec from a resource's name, version and optional source.
    ///
    /// A source containing `://` or starting with `git+` is remote;
    /// anything else is a local artifact path.
    pub fn from_parts(name: &str, version: Option<&str>, source: Option<&str>) -> Self {
        match source {
            Some(s) if s.contains("://") || s.starts_with("git+") => Self::Remote(s.to_string()),
            Some(path) => Self::Artifact(PathBuf::from(path)),
            None => Self::Requirement {
                name: name.to_string(),
                version: version.map(str::to_string),
            },
        }
    }

    /// Argument passed to pip.
    pub fn to_arg(&self) -> String {
        match self {
            Self::Requirement {
                name,
                version: Some(v),
            } => format!("{name}=={v}"),
            Self::Requirement {
                name,
                version: None,
            } => name.clone(),
            Self::Artifact(path) => path.display().to_string(),
            Self::Remote(reference) => reference.clone(),
        }
    }
}

impl fmt::Display for PipSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_arg())
    }
}

/// Pip front-end bound to one interpreter.
pub struct Pip<R> {
    runner: R,
    python: String,
    extra_args: Vec<String>,
}

impl<R: Runner> Pip<R> {
    /// Use the given interpreter (e.g. `python3` or a venv's `bin/python`).
    pub fn new(runner: R, python: impl Into<String>) -> Self {
        Self {
            runner,
            python: python.into(),
            extra_args: Vec::new(),
        }
    }

    /// Extra arguments for install and uninstall (e.g. `--break-system-packages`).
    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    /// Installed version of a distribution, `None` when not installed.
    pub fn installed_version(&self, name: &str) -> Result<Option<String>> {
        let output = self
            .runner
            .run(&self.python, &["-m", "pip", "show", name])?;

        if !output.success() {
            // pip show exits 1 with "Package(s) not found" on stderr
            if output.stderr.to_lowercase().contains("not found") {
                return Ok(None);
            }
            return output.check("pip", Some(name)).map(|_| None);
        }

        Ok(parse_show_version(&output.stdout))
    }

    /// Install a requirement, artifact or remote reference.
    pub fn install(&self, spec: &PipSpec) -> Result<()> {
        let arg = spec.to_arg();
        log::info!("pip install {arg}");
        self.pip(&["install"], &arg)
    }

    /// Uninstall a distribution.
    pub fn uninstall(&self, name: &str) -> Result<()> {
        log::info!("pip uninstall {name}");
        self.pip(&["uninstall", "-y"], name)
    }

    fn pip(&self, command: &[&str], subject: &str) -> Result<()> {
        let mut args = vec!["-m", "pip"];
        args.extend_from_slice(command);
        args.extend(self.extra_args.iter().map(String::as_str));
        args.push(subject);

        self.runner
            .run_privileged(&self.python, &args)?
            .check("pip", Some(subject))?;
        Ok(())
    }
}

/// Extract the `Version:` field from `pip show` output.
pub fn parse_show_version(stdout: &str) -> Option<String> {
    stdout.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        (key.trim().eq_ignore_ascii_case("version") && !value.trim().is_empty())
            .then(|| value.trim().to_string())
    })
}
