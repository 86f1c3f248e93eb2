mod execute;
mod output;

use clap::Args;
use std::error::Error;

use crate::cli::Context;
use crate::commands::{run_on_database, CommandRunner};
use crate::output::OutputFormat;

/// Drop every table in the database, including ones the schema does not name
#[derive(Args, Debug)]
#[command(after_help = "\
Examples:
  erdb drop-all --yes        # Drop every table
  erdb drop-all              # Only list what would be dropped")]
pub struct DropAllCmd {
    /// Actually drop; without it the tables are only listed
    #[arg(long, default_value_t = false)]
    pub yes: bool,
}

impl CommandRunner for DropAllCmd {
    fn run(self, ctx: &Context, format: OutputFormat) -> Result<String, Box<dyn Error>> {
        run_on_database(self, ctx, format)
    }
}
