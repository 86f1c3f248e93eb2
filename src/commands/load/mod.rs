mod execute;
mod output;

use clap::Args;
use std::error::Error;
use std::path::PathBuf;

use crate::cli::Context;
use crate::commands::{run_on_database, CommandRunner};
use crate::output::OutputFormat;

/// Load a relation from a tab-delimited file
///
/// Each line holds one row with the relation's columns in schema order, already
/// in stored form. `\N` stands for NULL.
#[derive(Args, Debug)]
#[command(after_help = "\
Examples:
  erdb load Genome genome.dtx                           # Append rows
  erdb load Genome genome.dtx --truncate                # Replace the table's rows
  erdb load Feature feature.dtx --defer-indexes         # Rebuild indexes after the load
  erdb load Feature feature.dtx --inspect               # Sort order and row estimate only")]
pub struct LoadCmd {
    /// Relation name (an entity's primary or secondary relation, or a relationship)
    pub relation: String,

    /// Tab-delimited load file
    pub file: PathBuf,

    /// Delete the relation's existing rows first
    #[arg(long, default_value_t = false)]
    pub truncate: bool,

    /// Drop the relation's indexes during the load and rebuild them after
    #[arg(long, default_value_t = false)]
    pub defer_indexes: bool,

    /// Print the `sort` options and the expected row count without loading
    #[arg(long, default_value_t = false)]
    pub inspect: bool,
}

impl CommandRunner for LoadCmd {
    fn run(self, ctx: &Context, format: OutputFormat) -> Result<String, Box<dyn Error>> {
        run_on_database(self, ctx, format)
    }
}
