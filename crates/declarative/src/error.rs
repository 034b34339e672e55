//! Error taxonomy for reconciliation runs
//!
//! Only [`ConfigError`] aborts a run. Probe failures are captured on the
//! probe result and execution failures on the execution record.

use crate::types::Operation;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Invalid resource declarations, detected before any probe or mutation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Two resources share an id
    #[error("duplicate resource id: {id}")]
    DuplicateId { id: String },

    /// `depends_on` edges form a cycle
    #[error("dependency cycle: {}", .cycle.join(" -> "))]
    CyclicDependency {
        /// Ids along the cycle, first id repeated at the end
        cycle: Vec<String>,
    },

    /// A dependency names a resource that was never declared
    #[error("resource {id} depends on undeclared resource {dependency}")]
    UnknownDependency { id: String, dependency: String },

    /// Kind-specific shape error
    #[error("invalid resource {id}: {reason}")]
    InvalidResource { id: String, reason: String },
}

/// A mutation that still failed after exhausting its retries
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{operation} {resource_id} failed after {attempts} attempt(s): {message}")]
pub struct ExecutionError {
    pub resource_id: String,
    pub operation: Operation,
    pub attempts: u32,
    pub message: String,
}
