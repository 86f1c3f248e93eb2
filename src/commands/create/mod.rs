mod execute;
mod output;

use clap::Args;
use std::error::Error;

use crate::cli::Context;
use crate::commands::{run_on_database, CommandRunner};
use crate::output::OutputFormat;

/// Create every table and index the schema declares but the database lacks
#[derive(Args, Debug)]
#[command(after_help = "\
Examples:
  erdb create --schema genome.json              # Create missing tables
  erdb create --schema genome.json --dry-run    # Print the DDL that would run
  erdb create --schema genome.json --force      # Drop everything and recreate")]
pub struct CreateCmd {
    /// Drop every existing table first
    #[arg(long, default_value_t = false)]
    pub force: bool,

    /// Show what would be created without doing it
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

impl CommandRunner for CreateCmd {
    fn run(self, ctx: &Context, format: OutputFormat) -> Result<String, Box<dyn Error>> {
        run_on_database(self, ctx, format)
    }
}
