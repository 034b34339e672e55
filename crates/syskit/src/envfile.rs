//! `KEY=VALUE` environment files such as `/etc/environment`.
//!
//! Edits keep comments, blank lines and unrelated assignments intact.

use crate::error::Result;
use crate::files;
use std::path::Path;

/// An environment file held as its original lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvFile {
    lines: Vec<String>,
}

impl EnvFile {
    /// Parse file contents.
    pub fn parse(text: &str) -> Self {
        Self {
            lines: text.lines().map(str::to_string).collect(),
        }
    }

    /// Load a file; a missing file is empty.
    pub fn load(path: &Path) -> Result<Self> {
        Ok(files::read_optional(path)?
            .map(|text| Self::parse(&text))
            .unwrap_or_default())
    }

    /// Write the file back atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        files::write_atomic(path, self.render().as_bytes(), None)
    }

    /// Value of `key`; the last assignment wins, as in a shell.
    pub fn get(&self, key: &str) -> Option<String> {
        self.lines
            .iter()
            .filter_map(|line| parse_assignment(line))
            .filter(|(k, _)| *k == key)
            .map(|(_, v)| v)
            .last()
    }

    /// Set `key`, replacing its first assignment and dropping duplicates.
    pub fn set(&mut self, key: &str, value: &str) {
        let rendered = format!("{key}={}", quote(value));
        let mut replaced = false;

        self.lines.retain_mut(|line| {
            if !matches!(parse_assignment(line), Some((k, _)) if k == key) {
                return true;
            }
            if replaced {
                return false;
            }
            *line = rendered.clone();
            replaced = true;
            true
        });

        if !replaced {
            self.lines.push(rendered);
        }
    }

    /// Remove every assignment of `key`. Returns whether anything changed.
    pub fn unset(&mut self, key: &str) -> bool {
        let before = self.lines.len();
        self.lines
            .retain(|line| !matches!(parse_assignment(line), Some((k, _)) if k == key));
        self.lines.len() != before
    }

    /// File contents with a trailing newline.
    pub fn render(&self) -> String {
        let mut out = self.lines.join("\n");
        if !out.is_empty() {
            out.push('\n');
        }
        out
    }
}

/// Split an assignment line into key and unquoted value.
fn parse_assignment(line: &str) -> Option<(&str, String)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let line = line.strip_prefix("export ").unwrap_or(line).trim_start();
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() || key.contains(char::is_whitespace) {
        return None;
    }
    Some((key, unquote(value.trim())))
}

fn unquote(value: &str) -> String {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == last && (first == b'"' || first == b'\'') {
            let inner = &value[1..value.len() - 1];
            return if first == b'"' {
                inner.replace("\\\"", "\"").replace("\\\\", "\\")
            } else {
                inner.to_string()
            };
        }
    }
    value.to_string()
}

fn quote(value: &str) -> String {
    let plain = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./:,+@%".contains(c));
    if plain {
        value.to_string()
    } else {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    }
}
