//! `converge reconcile`: probe, plan, confirm, apply, validate

use anyhow::{Context, Result};
use colored::Colorize;
use declarative::{ErrorMode, ExecuteOptions, PlanSummary};

use super::Declaration;
use crate::Context as AppContext;
use crate::cli::ReconcileArgs;
use crate::progress::TerminalProgress;
use crate::{report, signal, ui};

pub fn run(ctx: &AppContext, args: ReconcileArgs) -> Result<bool> {
    let decl = Declaration::load(&args.config)?;
    let opts = options(&decl, &args);
    let interactive = !args.json && !ctx.quiet;

    if interactive {
        ui::header("converge reconcile");
        ui::kv("Declaration", &args.config.display().to_string());
        ui::kv("Resources", &decl.resources.len().to_string());
        ui::kv("Mode", &opts.mode.to_string());
        if opts.dry_run {
            ui::kv("Dry run", "yes");
        }
    }

    let preview = declarative::preview(&decl.resources, &decl.system, opts.jobs)?;
    let summary = PlanSummary::from_actions(&preview.actions);

    if interactive {
        report::print_plan(&decl.resources, &preview, ctx.verbose > 0);
        println!();
    }

    if summary.has_changes() && !opts.dry_run {
        if !args.yes && interactive {
            let confirmed = dialoguer::Confirm::new()
                .with_prompt("Continue?")
                .default(true)
                .interact()
                .context("Failed to read confirmation")?;

            if !confirmed {
                ui::info("Aborted; nothing was changed");
                return Ok(false);
            }
        }
        decl.system.acquire_privileges()?;
    }

    let cancel = signal::cancel_on_interrupt();
    let mut progress = TerminalProgress::new(!interactive);
    let run = declarative::reconcile_preview(
        &decl.resources,
        &decl.system,
        preview,
        &opts,
        &mut progress,
        &cancel,
    );

    if let Some(path) = &args.report {
        report::write_json(path, &run)?;
    }

    if args.json {
        report::print_json(&run)?;
    } else if !ctx.quiet {
        report::print_run(&run);
        println!();
        if run.is_success() {
            println!("{}", "System converged".green().bold());
        } else if opts.dry_run {
            ui::info(&format!(
                "{} pending; run without --dry-run to apply",
                ui::plural(summary.total(), "change")
            ));
        }
    }

    Ok(run.is_success())
}

/// `[engine]` settings with command-line overrides applied
fn options(decl: &Declaration, args: &ReconcileArgs) -> ExecuteOptions {
    let mut opts = decl.config.engine.execute_options();
    opts.dry_run = args.dry_run;
    opts.jobs = decl.jobs(args.jobs);
    if args.fail_fast {
        opts.mode = ErrorMode::FailFast;
    }
    if let Some(attempts) = args.attempts {
        opts.retry.max_attempts = attempts.max(1);
    }
    if args.no_fallback {
        opts.retry.fallback = false;
    }
    opts
}
