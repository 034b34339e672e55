//! # syskit
//!
//! Pure Rust helpers for reading and changing the state of a Debian-style
//! Linux system.
//!
//! This crate provides functionality for:
//! - Querying and installing OS packages (`dpkg-query`, `apt-get`)
//! - Querying and installing Python packages (`python -m pip`)
//! - Kernel modules: loaded state, `modprobe.d` blacklists, `modprobe`
//! - Editing `KEY=VALUE` environment files in place
//! - Hashing files and writing them atomically
//! - Fetching blobs over HTTP(S) or from local paths
//!
//! ## Example
//!
//! ```no_run
//! use syskit::{Apt, SystemRunner};
//!
//! let runner = SystemRunner::new().with_sudo(true);
//! runner.validate_sudo()?;
//!
//! let apt = Apt::new(&runner);
//! if apt.installed_version("clinfo")?.is_none() {
//!     apt.install("clinfo", None)?;
//! }
//! # Ok::<(), syskit::Error>(())
//! ```
//!
//! ## Errors
//!
//! Failures from system tools are classified into an [`ErrorCategory`] by
//! inspecting their stderr. A held dpkg lock or a network failure is
//! reported as retryable.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod apt;
pub mod command;
pub mod envfile;
pub mod error;
pub mod fetch;
pub mod files;
pub mod kmod;
pub mod pip;

pub use apt::Apt;
pub use command::{CommandOutput, Runner, SystemRunner};
pub use envfile::EnvFile;
pub use error::{Error, ErrorCategory, Result};
pub use fetch::{MAX_DOWNLOAD_SIZE, fetch};
pub use files::FileState;
pub use kmod::Modprobe;
pub use pip::{Pip, PipSpec};
