//! Error types for system operations.
//!
//! Errors are categorized so callers can tell transient failures (a held
//! dpkg lock, a flaky mirror) from permanent ones, and so users get advice
//! on how to fix what went wrong.

use std::path::PathBuf;
use thiserror::Error;

/// Categories of system errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Network-related errors (transient, retryable)
    Network,
    /// Package, version or module not found
    NotFound,
    /// Package database locked by another process (transient, retryable)
    Locked,
    /// Version or dependency conflict
    Conflict,
    /// Permission denied (may need sudo)
    Permission,
    /// Required program not installed
    CommandMissing,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network | Self::Locked)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "Network connectivity issue",
            Self::NotFound => "Not found",
            Self::Locked => "Package database locked",
            Self::Conflict => "Dependency conflict",
            Self::Permission => "Permission denied",
            Self::CommandMissing => "Required program missing",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Network => "Check network connectivity and package mirrors, then try again",
            Self::NotFound => "Verify the name and version, or run with apt_update enabled",
            Self::Locked => "Wait for the other package manager process to finish",
            Self::Conflict => "Resolve the conflicting packages or unpin the version",
            Self::Permission => "Run as root or enable sudo in the [system] table",
            Self::CommandMissing => "Install the missing program or fix PATH",
            Self::Other => "Check the error details for more information",
        }
    }
}

/// Errors that can occur while probing or mutating the system.
#[derive(Debug, Error)]
pub enum Error {
    /// Network-related error (mirror unreachable, DNS, timeout)
    #[error("network error: {message}")]
    Network {
        /// Detailed error message
        message: String,
    },

    /// Package, version or module not found
    #[error("not found: {name}")]
    NotFound {
        /// What could not be found
        name: String,
    },

    /// The dpkg/apt lock is held by another process
    #[error("package database locked: {message}")]
    Locked {
        /// Message from the package manager
        message: String,
    },

    /// Version or dependency conflict
    #[error("conflict: {message}")]
    Conflict {
        /// Description of the conflict
        message: String,
    },

    /// Permission denied
    #[error("permission denied: {message}")]
    Permission {
        /// Details about what permission was denied
        message: String,
    },

    /// Program not found in PATH
    #[error("command not found: {program}")]
    CommandMissing {
        /// Program that could not be executed
        program: String,
    },

    /// Command execution failed
    #[error("{message}: {stderr}")]
    CommandFailed {
        /// Description of what command failed
        message: String,
        /// Standard error output from the failed command
        stderr: String,
    },

    /// IO error on a specific path
    #[error("IO error at {path}: {source}")]
    Io {
        /// Path involved in the failed operation
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Download failed
    #[error("download of {url} failed: {message}")]
    Download {
        /// Source URL
        url: String,
        /// Failure detail
        message: String,
    },

    /// Unexpected output from a system tool or file
    #[error("cannot parse {what}: {message}")]
    Parse {
        /// What was being parsed
        what: String,
        /// Failure detail
        message: String,
    },
}

impl Error {
    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Network { .. } | Error::Download { .. } => ErrorCategory::Network,
            Error::NotFound { .. } => ErrorCategory::NotFound,
            Error::Locked { .. } => ErrorCategory::Locked,
            Error::Conflict { .. } => ErrorCategory::Conflict,
            Error::Permission { .. } => ErrorCategory::Permission,
            Error::CommandMissing { .. } => ErrorCategory::CommandMissing,
            Error::Io { source, .. } if source.kind() == std::io::ErrorKind::PermissionDenied => {
                ErrorCategory::Permission
            }
            _ => ErrorCategory::Other,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Attach a path to an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an error from the stderr of a failed apt, dpkg, pip or
    /// modprobe invocation.
    ///
    /// Analyzes stderr to categorize the error appropriately.
    pub fn from_command_output(program: &str, stderr: &str, subject: Option<&str>) -> Self {
        let stderr_lower = stderr.to_lowercase();
        let trimmed = stderr.trim().to_string();

        // Lock contention (but "unable to lock ... are you root?" is a permission problem)
        if !stderr_lower.contains("are you root")
            && (stderr_lower.contains("could not get lock")
            || stderr_lower.contains("unable to acquire the dpkg frontend lock")
            || stderr_lower.contains("unable to lock")
            || stderr_lower.contains("is another process using it"))
        {
            return Error::Locked { message: trimmed };
        }

        // Network errors
        if stderr_lower.contains("temporary failure resolving")
            || stderr_lower.contains("could not resolve")
            || stderr_lower.contains("failed to fetch")
            || stderr_lower.contains("connection refused")
            || stderr_lower.contains("connection reset")
            || stderr_lower.contains("timed out")
            || stderr_lower.contains("network is unreachable")
            || stderr_lower.contains("newconnectionerror")
            || stderr_lower.contains("hash sum mismatch")
        {
            return Error::Network { message: trimmed };
        }

        // Not found errors
        if stderr_lower.contains("unable to locate package")
            || stderr_lower.contains("has no installation candidate")
            || (stderr_lower.contains("version '") && stderr_lower.contains("was not found"))
            || stderr_lower.contains("no matching distribution found")
            || stderr_lower.contains("could not find a version that satisfies")
            || (stderr_lower.contains("module") && stderr_lower.contains("not found in directory"))
        {
            return Error::NotFound {
                name: subject.unwrap_or("unknown").to_string(),
            };
        }

        // Conflicts
        if stderr_lower.contains("unmet dependencies")
            || stderr_lower.contains("held broken packages")
            || stderr_lower.contains("conflicts")
            || stderr_lower.contains("dependency conflicts")
            || stderr_lower.contains("resolutionimpossible")
        {
            return Error::Conflict { message: trimmed };
        }

        // Permission errors
        if stderr_lower.contains("permission denied")
            || stderr_lower.contains("operation not permitted")
            || stderr_lower.contains("are you root")
            || stderr_lower.contains("a password is required")
            || stderr_lower.contains("externally-managed-environment")
        {
            return Error::Permission { message: trimmed };
        }

        // Default to command failed
        Error::CommandFailed {
            message: format!(
                "{program} failed{}",
                subject.map(|n| format!(" for {n}")).unwrap_or_default()
            ),
            stderr: trimmed,
        }
    }
}

/// Result type for system operations.
pub type Result<T> = std::result::Result<T, Error>;
