//! Terminal progress for reconcile runs

use colored::Colorize;
use declarative::{Action, ExecStatus, ExecutionRecord, ProgressCallback, Resource};
use indicatif::{ProgressBar, ProgressStyle};

/// Progress bar over planned actions, with a status line per action
pub struct TerminalProgress {
    pb: Option<ProgressBar>,
    quiet: bool,
}

impl TerminalProgress {
    pub fn new(quiet: bool) -> Self {
        Self { pb: None, quiet }
    }

    fn println(&self, line: String) {
        if self.quiet {
            return;
        }
        match &self.pb {
            Some(pb) => pb.suspend(|| println!("{line}")),
            None => println!("{line}"),
        }
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_run_start(&mut self, total: usize) {
        if self.quiet || total == 0 {
            return;
        }
        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        self.pb = Some(pb);
    }

    fn on_action_start(&mut self, action: &Action, resource: &Resource) {
        if let Some(pb) = &self.pb {
            pb.set_message(format!("{} {}", action.operation, resource.id));
        }
    }

    fn on_retry(&mut self, action: &Action, attempt: u32, error: &str) {
        self.println(format!(
            "  {} {} attempt {} failed: {}",
            "↻".yellow(),
            action.resource_id,
            attempt,
            error.dimmed()
        ));
    }

    fn on_action_complete(&mut self, record: &ExecutionRecord) {
        let id = &record.action.resource_id;
        let op = record.action.operation;
        let line = match record.status {
            ExecStatus::Succeeded => match &record.fallback {
                Some(fallback) => format!(
                    "  {} {op} {id} {}",
                    "✓".green(),
                    format!("(fallback: {fallback})").yellow()
                ),
                None => format!("  {} {op} {id}", "✓".green()),
            },
            ExecStatus::Failed => format!(
                "  {} {op} {id}: {}",
                "✗".red(),
                record.error.as_deref().unwrap_or("failed")
            ),
            ExecStatus::Skipped => format!(
                "  {} {op} {id} {}",
                "○".dimmed(),
                format!("({})", record.error.as_deref().unwrap_or("skipped")).dimmed()
            ),
        };
        self.println(line);
        if let Some(pb) = &self.pb {
            pb.inc(1);
        }
    }

    fn on_run_complete(&mut self) {
        if let Some(pb) = self.pb.take() {
            pb.finish_and_clear();
        }
    }
}
