mod execute;
mod output;

use clap::Args;
use std::error::Error;

use crate::cli::Context;
use crate::commands::CommandRunner;
use crate::output::{OutputFormat, Outputable};

/// Compile the schema definition and summarize what it declares
#[derive(Args, Debug)]
#[command(after_help = "\
Examples:
  erdb check --schema genome.json            # Validate and summarize
  erdb check --schema genome.json --jumps    # Also list jump shortcuts
  erdb check --schema genome.json -f json    # Machine-readable summary")]
pub struct CheckCmd {
    /// List the jump table entries
    #[arg(long, default_value_t = false)]
    pub jumps: bool,
}

impl CommandRunner for CheckCmd {
    fn run(self, ctx: &Context, format: OutputFormat) -> Result<String, Box<dyn Error>> {
        let meta = ctx.metadata()?;
        Ok(self.inspect(&meta).format(format))
    }
}
