mod execute;
mod output;

use clap::Args;
use std::error::Error;

use crate::cli::Context;
use crate::commands::{run_on_database, CommandRunner};
use crate::output::OutputFormat;

/// Remove relationship rows whose endpoints no longer exist
#[derive(Args, Debug)]
#[command(after_help = "\
Examples:
  erdb sweep --dry-run    # Count orphans without removing them
  erdb sweep              # Remove orphaned relationship rows")]
pub struct SweepCmd {
    /// Only count what would be removed
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

impl CommandRunner for SweepCmd {
    fn run(self, ctx: &Context, format: OutputFormat) -> Result<String, Box<dyn Error>> {
        run_on_database(self, ctx, format)
    }
}
