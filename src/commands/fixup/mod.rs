mod execute;
mod output;

use clap::Args;
use std::error::Error;

use crate::cli::Context;
use crate::commands::{run_on_database, CommandRunner};
use crate::output::OutputFormat;

/// Repair tables and indexes that drifted from the schema
///
/// Missing tables are created. An empty table whose columns differ is dropped
/// and recreated. A table with rows and different columns is reported and left
/// alone; otherwise its indexes are added, dropped or rebuilt to match.
#[derive(Args, Debug)]
#[command(after_help = "\
Examples:
  erdb fixup                 # Every table
  erdb fixup Genome          # One relation, by logical name
  erdb fixup genome_alias    # One relation, by table name")]
pub struct FixupCmd {
    /// Relation or table name; every relation when omitted
    pub table: Option<String>,
}

impl CommandRunner for FixupCmd {
    fn run(self, ctx: &Context, format: OutputFormat) -> Result<String, Box<dyn Error>> {
        run_on_database(self, ctx, format)
    }
}
