//! `converge validate`: re-probe everything and report PASS/FAIL

use anyhow::Result;

use super::Declaration;
use crate::Context as AppContext;
use crate::cli::ValidateArgs;
use crate::{report, ui};

pub fn run(ctx: &AppContext, args: ValidateArgs) -> Result<bool> {
    let decl = Declaration::load(&args.config)?;
    declarative::validate(&decl.resources)?;

    let validation =
        declarative::validate_run_with_jobs(&decl.resources, &decl.system, decl.jobs(args.jobs));

    if let Some(path) = &args.report {
        report::write_json(path, &validation)?;
    }

    if args.json {
        report::print_json(&validation)?;
    } else if !ctx.quiet {
        ui::header("converge validate");
        ui::kv("Declaration", &args.config.display().to_string());
        report::print_validation(&validation);
    }

    Ok(validation.is_success())
}
