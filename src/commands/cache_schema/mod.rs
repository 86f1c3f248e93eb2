mod execute;
mod output;

use clap::Args;
use std::error::Error;

use crate::cli::Context;
use crate::commands::{run_on_database, CommandRunner};
use crate::output::OutputFormat;

/// Store the compiled schema in the database
///
/// Later commands run without `--schema` open the database with the stored copy.
#[derive(Args, Debug)]
#[command(after_help = "\
Examples:
  erdb cache-schema --schema genome.json
  erdb query Genome                           # No --schema needed afterwards")]
pub struct CacheSchemaCmd {}

impl CommandRunner for CacheSchemaCmd {
    fn run(self, ctx: &Context, format: OutputFormat) -> Result<String, Box<dyn Error>> {
        if ctx.schema.is_none() {
            return Err("cache-schema needs a schema definition: pass --schema or set \"schema\" in .erdb.json".into());
        }
        run_on_database(self, ctx, format)
    }
}
