use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "converge")]
#[command(version)]
#[command(about = "Converge a Linux board to a declared system state", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Probe, plan, apply and validate the declared resources
    Reconcile(ReconcileArgs),

    /// Re-probe every declared resource and report PASS/FAIL
    Validate(ValidateArgs),

    /// Show what reconcile would change, without changing anything
    Plan(PlanArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct ReconcileArgs {
    /// Resource declaration file (.toml or .json)
    pub config: PathBuf,

    /// Show what would change without applying anything
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Stop at the first failed action
    #[arg(long)]
    pub fail_fast: bool,

    /// Worker count for probes and independent actions
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Attempts per action, including the first
    #[arg(long)]
    pub attempts: Option<u32>,

    /// Never substitute an unpinned or fallback version on retry
    #[arg(long)]
    pub no_fallback: bool,

    /// Apply without asking for confirmation
    #[arg(short, long)]
    pub yes: bool,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,

    /// Also write the JSON run report to this file
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Resource declaration file (.toml or .json)
    pub config: PathBuf,

    /// Worker count for probes
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Print the validation report as JSON
    #[arg(long)]
    pub json: bool,

    /// Also write the JSON validation report to this file
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,
}

#[derive(Args)]
pub struct PlanArgs {
    /// Resource declaration file (.toml or .json)
    pub config: PathBuf,

    /// Worker count for probes
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Print probes and planned actions as JSON
    #[arg(long)]
    pub json: bool,
}
