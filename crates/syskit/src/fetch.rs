//! Fetching file contents from URLs or local paths.

use crate::error::{Error, Result};
use std::fs;
use std::path::Path;

/// Default cap on downloaded blobs (256 MiB).
pub const MAX_DOWNLOAD_SIZE: u64 = 256 * 1024 * 1024;

/// Where file content comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source<'a> {
    /// `http://` or `https://` URL
    Http(&'a str),
    /// Local filesystem path (plain or from a `file://` URL)
    Local(&'a Path),
}

impl<'a> Source<'a> {
    /// Classify a source string.
    pub fn parse(source: &'a str) -> Self {
        if source.starts_with("http://") || source.starts_with("https://") {
            Self::Http(source)
        } else if let Some(path) = source.strip_prefix("file://") {
            Self::Local(Path::new(path))
        } else {
            Self::Local(Path::new(source))
        }
    }
}

/// Read the bytes behind a source, capped at `limit` bytes for downloads.
pub fn fetch(source: &str, limit: u64) -> Result<Vec<u8>> {
    match Source::parse(source) {
        Source::Http(url) => download(url, limit),
        Source::Local(path) => fs::read(path).map_err(|e| Error::io(path, e)),
    }
}

fn download(url: &str, limit: u64) -> Result<Vec<u8>> {
    log::info!("downloading {url}");
    let agent = ureq::Agent::new_with_defaults();

    let mut response = agent
        .get(url)
        .header("User-Agent", "converge")
        .call()
        .map_err(|e| download_error(url, e))?;

    let bytes = response
        .body_mut()
        .with_config()
        .limit(limit)
        .read_to_vec()
        .map_err(|e| download_error(url, e))?;

    log::debug!("downloaded {} bytes from {url}", bytes.len());
    Ok(bytes)
}

fn download_error(url: &str, err: ureq::Error) -> Error {
    let message = match err {
        ureq::Error::StatusCode(code) => format!("HTTP {code}"),
        other => other.to_string(),
    };
    Error::Download {
        url: url.to_string(),
        message,
    }
}
