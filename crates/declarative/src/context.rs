//! Progress reporting and cancellation
//!
//! These let the engine report to any UI, and be stopped from any signal
//! source, without depending on a particular implementation.

use crate::report::ExecutionRecord;
use crate::types::{Action, Resource};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Progress callback for execution operations
///
/// Implement this trait to receive progress updates during execution.
pub trait ProgressCallback: Send {
    /// Called once before the first action
    fn on_run_start(&mut self, total: usize);

    /// Called when an action is about to be applied
    fn on_action_start(&mut self, action: &Action, resource: &Resource);

    /// Called after a failed attempt that will be retried
    fn on_retry(&mut self, action: &Action, attempt: u32, error: &str);

    /// Called when an action has a final record (including skips)
    fn on_action_complete(&mut self, record: &ExecutionRecord);

    /// Called once after the last action
    fn on_run_complete(&mut self);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_run_start(&mut self, _total: usize) {}
    fn on_action_start(&mut self, _action: &Action, _resource: &Resource) {}
    fn on_retry(&mut self, _action: &Action, _attempt: u32, _error: &str) {}
    fn on_action_complete(&mut self, _record: &ExecutionRecord) {}
    fn on_run_complete(&mut self) {}
}

/// Shared flag requesting that a run stop between actions
///
/// An action already in flight always completes.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing flag, e.g. one set from a signal handler
    pub fn from_flag(flag: Arc<AtomicBool>) -> Self {
        Self { flag }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_visible_through_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_from_flag() {
        let flag = Arc::new(AtomicBool::new(false));
        let token = CancelToken::from_flag(Arc::clone(&flag));
        flag.store(true, Ordering::SeqCst);
        assert!(token.is_cancelled());
    }
}
