//! `converge plan`: probe and plan, never mutate

use anyhow::Result;
use declarative::PlanSummary;

use super::Declaration;
use crate::Context as AppContext;
use crate::cli::PlanArgs;
use crate::{report, ui};

pub fn run(ctx: &AppContext, args: PlanArgs) -> Result<bool> {
    let decl = Declaration::load(&args.config)?;
    let preview = declarative::preview(&decl.resources, &decl.system, decl.jobs(args.jobs))?;

    if args.json {
        report::print_json(&preview)?;
    } else if !ctx.quiet {
        ui::header("converge plan");
        ui::kv("Declaration", &args.config.display().to_string());
        ui::kv("Resources", &decl.resources.len().to_string());
        report::print_plan(&decl.resources, &preview, ctx.verbose > 0);
    }

    Ok(!PlanSummary::from_actions(&preview.actions).has_changes())
}
