//! Resource declaration files
//!
//! A declaration file holds engine settings, system settings and the list of
//! resources. TOML and JSON are supported; the format is chosen by extension.

use anyhow::{Context, Result, bail};
use declarative::{
    DesiredState, Ensure, ErrorMode, ExecuteOptions, Resource, ResourceKind, RetryPolicy,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Declaration file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// Pick the format from the file extension; anything but `.json` is TOML
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Toml,
        }
    }

    pub fn parse(self, content: &str) -> Result<Config> {
        match self {
            Self::Toml => toml::from_str(content).context("Invalid TOML declaration"),
            Self::Json => serde_json::from_str(content).context("Invalid JSON declaration"),
        }
    }
}

/// `[engine]` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineSettings {
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub backoff_factor: f64,
    pub max_delay_ms: u64,
    pub fallback: bool,
    pub mode: ErrorMode,
    pub jobs: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            max_attempts: retry.max_attempts,
            retry_delay_ms: retry.base_delay.as_millis() as u64,
            backoff_factor: retry.backoff_factor,
            max_delay_ms: retry.max_delay.as_millis() as u64,
            fallback: retry.fallback,
            mode: ErrorMode::default(),
            jobs: 1,
        }
    }
}

impl EngineSettings {
    pub fn execute_options(&self) -> ExecuteOptions {
        ExecuteOptions {
            dry_run: false,
            jobs: self.jobs.max(1),
            mode: self.mode,
            retry: RetryPolicy {
                max_attempts: self.max_attempts.max(1),
                base_delay: Duration::from_millis(self.retry_delay_ms),
                backoff_factor: self.backoff_factor,
                max_delay: Duration::from_millis(self.max_delay_ms),
                fallback: self.fallback,
            },
        }
    }
}

/// `[system]` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SystemSettings {
    /// Filesystem root that file, module and environment paths resolve under
    pub root: String,
    /// Run state-changing commands through sudo
    pub sudo: bool,
    /// Interpreter used for `-m pip`
    pub python: String,
    /// Extra arguments for pip install/uninstall
    pub pip_args: Vec<String>,
    /// Run `apt-get update` once before the first package install
    pub apt_update: bool,
    pub modprobe_dir: String,
    /// Default environment file for env_var_set resources
    pub env_file: String,
}

impl Default for SystemSettings {
    fn default() -> Self {
        Self {
            root: "/".to_string(),
            sudo: false,
            python: "python3".to_string(),
            pip_args: Vec::new(),
            apt_update: false,
            modprobe_dir: "/etc/modprobe.d".to_string(),
            env_file: "/etc/environment".to_string(),
        }
    }
}

/// File permission bits, written as an integer or an octal string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileMode {
    Bits(u32),
    Octal(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid file mode '{0}': expected octal such as \"0644\"")]
pub struct InvalidMode(String);

impl FileMode {
    pub fn bits(&self) -> Result<u32, InvalidMode> {
        match self {
            Self::Bits(bits) => Ok(*bits),
            Self::Octal(text) => {
                let digits = text.trim();
                let digits = digits
                    .strip_prefix("0o")
                    .or_else(|| digits.strip_prefix("0O"))
                    .unwrap_or(digits);
                u32::from_str_radix(digits, 8).map_err(|_| InvalidMode(text.clone()))
            }
        }
    }
}

/// One `[[resource]]` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceDecl {
    pub id: String,
    pub kind: ResourceKind,
    pub target: String,
    #[serde(default)]
    pub ensure: Ensure,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub mode: Option<FileMode>,
    #[serde(default)]
    pub fallback: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl ResourceDecl {
    /// Build the engine resource, expanding paths relative to `base_dir`
    pub fn to_resource(&self, base_dir: &Path) -> Result<Resource> {
        let mut desired = match self.ensure {
            Ensure::Present => DesiredState::present(),
            Ensure::Absent => DesiredState::absent(),
        };
        desired.value = self.value.clone();
        desired.content = self.content.clone();
        desired.fallback = self.fallback.clone();
        desired.mode = self
            .mode
            .as_ref()
            .map(FileMode::bits)
            .transpose()
            .with_context(|| format!("resource '{}'", self.id))?;

        let target = match self.kind {
            ResourceKind::FileContent => expand(&self.target)?,
            _ => self.target.clone(),
        };

        desired.source = match (&self.source, self.kind) {
            (Some(source), ResourceKind::FileContent | ResourceKind::PipPackageVersion) => {
                Some(resolve_source(source, base_dir)?)
            }
            (Some(source), ResourceKind::EnvVarSet) => Some(expand(source)?),
            (Some(_), kind) => bail!("resource '{}': {kind} does not take a source", self.id),
            (None, _) => None,
        };

        Ok(Resource::new(&self.id, self.kind, target)
            .with_desired(desired)
            .depends_on(self.depends_on.iter().cloned()))
    }
}

/// A parsed declaration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub system: SystemSettings,
    #[serde(default, rename = "resource")]
    pub resources: Vec<ResourceDecl>,
    /// Directory relative sources resolve against
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl Config {
    /// Load and parse a declaration file
    pub fn load(path: &Path) -> Result<Self> {
        let path = PathBuf::from(expand(&path.to_string_lossy())?);
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Could not read {}", path.display()))?;

        let mut config = ConfigFormat::from_path(&path)
            .parse(&content)
            .with_context(|| format!("Could not parse {}", path.display()))?;

        config.base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        config.system.root = expand(&config.system.root)?;
        config.system.python = expand(&config.system.python)?;
        config.system.env_file = expand(&config.system.env_file)?;
        config.system.modprobe_dir = expand(&config.system.modprobe_dir)?;

        log::debug!(
            "loaded {} resource(s) from {}",
            config.resources.len(),
            path.display()
        );
        Ok(config)
    }

    /// Engine resources in declaration order
    pub fn resources(&self) -> Result<Vec<Resource>> {
        self.resources
            .iter()
            .map(|decl| decl.to_resource(&self.base_dir))
            .collect()
    }
}

/// Expand `~` and environment variables
fn expand(value: &str) -> Result<String> {
    shellexpand::full(value)
        .map(|s| s.into_owned())
        .with_context(|| format!("Could not expand '{value}'"))
}

/// Expand a source and anchor relative local paths at `base_dir`
fn resolve_source(source: &str, base_dir: &Path) -> Result<String> {
    if source.contains("://") || source.starts_with("git+") {
        return Ok(source.to_string());
    }
    let expanded = expand(source)?;
    let path = Path::new(&expanded);
    if path.is_absolute() {
        Ok(expanded)
    } else {
        Ok(base_dir.join(path).to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const BOARD: &str = r#"
[engine]
max_attempts = 3
retry_delay_ms = 0
mode = "fail-fast"
jobs = 2

[system]
python = "/opt/venv/bin/python"
pip_args = ["--no-cache-dir"]

[[resource]]
id = "mali-driver"
kind = "package_installed"
target = "libmali-valhall-g610"
value = "1.9-1"

[[resource]]
id = "mali-icd"
kind = "file_content"
target = "/etc/OpenCL/vendors/mali.icd"
content = "libmali.so\n"
mode = "0644"
depends_on = ["mali-driver"]

[[resource]]
id = "firmware"
kind = "file_content"
target = "/lib/firmware/mali_csffw.bin"
source = "blobs/mali_csffw.bin"

[[resource]]
id = "no-panfrost"
kind = "kernel_module_blacklisted"
target = "panfrost"

[[resource]]
id = "mesa-icd"
kind = "package_installed"
target = "mesa-opencl-icd"
ensure = "absent"
"#;

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ConfigFormat::from_path(Path::new("a.json")), ConfigFormat::Json);
        assert_eq!(ConfigFormat::from_path(Path::new("a.JSON")), ConfigFormat::Json);
        assert_eq!(ConfigFormat::from_path(Path::new("a.toml")), ConfigFormat::Toml);
        assert_eq!(ConfigFormat::from_path(Path::new("board")), ConfigFormat::Toml);
    }

    #[test]
    fn test_load_toml() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "board.toml", BOARD);

        let config = Config::load(&path).unwrap();
        assert_eq!(config.engine.max_attempts, 3);
        assert_eq!(config.engine.mode, ErrorMode::FailFast);
        assert_eq!(config.system.python, "/opt/venv/bin/python");
        assert_eq!(config.system.root, "/");

        let resources = config.resources().unwrap();
        assert_eq!(resources.len(), 5);
        assert_eq!(resources[0].desired.value.as_deref(), Some("1.9-1"));
        assert_eq!(resources[1].desired.mode, Some(0o644));
        assert_eq!(resources[1].depends_on, vec!["mali-driver"]);
        assert_eq!(
            resources[2].desired.source.as_deref(),
            Some(dir.path().join("blobs/mali_csffw.bin").to_str().unwrap())
        );
        assert_eq!(resources[4].desired.ensure, Ensure::Absent);
        assert!(declarative::validate(&resources).is_ok());
    }

    #[test]
    fn test_load_json() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "board.json",
            r#"{"resource": [{"id": "ocl", "kind": "env_var_set",
                "target": "OCL_ICD_VENDORS", "value": "/etc/OpenCL/vendors"}]}"#,
        );

        let config = Config::load(&path).unwrap();
        assert_eq!(config.engine, EngineSettings::default());
        let resources = config.resources().unwrap();
        assert_eq!(resources[0].kind, ResourceKind::EnvVarSet);
    }

    #[test]
    fn test_execute_options() {
        let engine = EngineSettings {
            jobs: 0,
            max_attempts: 0,
            retry_delay_ms: 500,
            ..Default::default()
        };
        let opts = engine.execute_options();
        assert_eq!(opts.jobs, 1);
        assert_eq!(opts.retry.max_attempts, 1);
        assert_eq!(opts.retry.base_delay, Duration::from_millis(500));
    }

    #[test]
    fn test_file_modes() {
        assert_eq!(FileMode::Bits(0o600).bits().unwrap(), 0o600);
        assert_eq!(FileMode::Octal("0755".into()).bits().unwrap(), 0o755);
        assert_eq!(FileMode::Octal("0o640".into()).bits().unwrap(), 0o640);
        assert!(FileMode::Octal("rw-r--r--".into()).bits().is_err());
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "bad.toml",
            "[[resource]]\nid = \"a\"\nkind = \"package_installed\"\n\
             target = \"a\"\nversion = \"1\"\n",
        );
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_source_on_module_rejected() {
        let decl = ResourceDecl {
            id: "m".into(),
            kind: ResourceKind::KernelModuleLoaded,
            target: "mali".into(),
            ensure: Ensure::Present,
            value: None,
            content: None,
            source: Some("x".into()),
            mode: None,
            fallback: None,
            depends_on: vec![],
        };
        assert!(decl.to_resource(Path::new(".")).is_err());
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = Config::load(&dir.path().join("nope.toml")).unwrap_err();
        assert!(format!("{err:#}").contains("Could not read"));
    }

    #[test]
    fn test_board_demo_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/board.toml");
        let config = Config::load(&path).unwrap();
        let resources = config.resources().unwrap();

        declarative::validate(&resources).unwrap();
        assert!(config.system.sudo);
        let order = declarative::topological_order(&resources).unwrap();
        let pos = |id: &str| order.iter().position(|&i| resources[i].id == id).unwrap();
        assert!(pos("mesa-icd") < pos("mali-driver"));
        assert!(pos("mali-firmware") < pos("mali-kbase"));
    }
}
