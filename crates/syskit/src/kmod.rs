//! Kernel modules: loaded state from `/proc/modules`, `modprobe.d`
//! blacklist entries, and `modprobe` load/unload.

use crate::command::Runner;
use crate::error::{Error, Result};
use crate::files;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Kernel module names treat `-` and `_` as the same character.
pub fn normalize(name: &str) -> String {
    name.replace('-', "_")
}

/// Module names listed in `/proc/modules` content.
pub fn parse_loaded(proc_modules: &str) -> Vec<String> {
    proc_modules
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .map(normalize)
        .collect()
}

/// Whether `module` appears in the given `/proc/modules` file.
pub fn is_loaded(proc_modules: &Path, module: &str) -> Result<bool> {
    let text = fs::read_to_string(proc_modules).map_err(|e| Error::io(proc_modules, e))?;
    let wanted = normalize(module);
    Ok(parse_loaded(&text).iter().any(|m| *m == wanted))
}

/// Modules named by `blacklist` directives in modprobe configuration text.
pub fn parse_blacklist(conf: &str) -> Vec<String> {
    conf.lines()
        .map(|line| line.split('#').next().unwrap_or("").trim())
        .filter_map(|line| {
            let mut words = line.split_whitespace();
            match (words.next(), words.next()) {
                (Some("blacklist"), Some(module)) => Some(normalize(module)),
                _ => None,
            }
        })
        .collect()
}

/// `.conf` files in a modprobe.d directory, sorted; missing dir is empty.
fn conf_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::io(dir, e)),
    };

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| Error::io(dir, e))?.path();
        if path.extension().is_some_and(|ext| ext == "conf") && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Files in `dir` that blacklist `module`.
pub fn blacklisted_in(dir: &Path, module: &str) -> Result<Vec<PathBuf>> {
    let wanted = normalize(module);
    let mut hits = Vec::new();
    for path in conf_files(dir)? {
        let text = fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
        if parse_blacklist(&text).contains(&wanted) {
            hits.push(path);
        }
    }
    Ok(hits)
}

/// Whether any `.conf` file in `dir` blacklists `module`.
pub fn is_blacklisted(dir: &Path, module: &str) -> Result<bool> {
    Ok(!blacklisted_in(dir, module)?.is_empty())
}

/// Path of the drop-in file written for a module.
pub fn blacklist_file(dir: &Path, module: &str) -> PathBuf {
    dir.join(format!("blacklist-{module}.conf"))
}

/// Write `blacklist-<module>.conf` into `dir`.
pub fn write_blacklist(dir: &Path, module: &str) -> Result<PathBuf> {
    let path = blacklist_file(dir, module);
    let contents = format!("blacklist {module}\n");
    files::write_atomic(&path, contents.as_bytes(), Some(0o644))?;
    log::info!("blacklisted {module} in {}", path.display());
    Ok(path)
}

/// Remove every `blacklist <module>` directive under `dir`.
///
/// Other lines are kept; a file left with no directives is deleted.
pub fn remove_blacklist(dir: &Path, module: &str) -> Result<()> {
    let wanted = normalize(module);

    for path in blacklisted_in(dir, module)? {
        let text = fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
        let kept: Vec<&str> = text
            .lines()
            .filter(|line| parse_blacklist(line) != [wanted.clone()])
            .collect();

        let has_directives = kept.iter().any(|line| {
            let body = line.split('#').next().unwrap_or("").trim();
            !body.is_empty()
        });

        if has_directives {
            let mut rewritten = kept.join("\n");
            rewritten.push('\n');
            files::write_atomic(&path, rewritten.as_bytes(), None)?;
        } else {
            files::remove(&path)?;
        }
        log::info!("removed blacklist entry for {module} from {}", path.display());
    }

    Ok(())
}

/// `modprobe` front-end.
pub struct Modprobe<R> {
    runner: R,
}

impl<R: Runner> Modprobe<R> {
    /// Create a front-end over the given runner.
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    /// Load a module.
    pub fn load(&self, module: &str) -> Result<()> {
        log::info!("modprobe {module}");
        self.runner
            .run_privileged("modprobe", &[module])?
            .check("modprobe", Some(module))?;
        Ok(())
    }

    /// Unload a module.
    pub fn unload(&self, module: &str) -> Result<()> {
        log::info!("modprobe -r {module}");
        self.runner
            .run_privileged("modprobe", &["-r", module])?
            .check("modprobe", Some(module))?;
        Ok(())
    }
}
