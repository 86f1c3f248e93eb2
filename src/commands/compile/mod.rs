mod execute;
mod output;

use clap::Args;
use std::error::Error;

use crate::cli::Context;
use crate::commands::CommandRunner;
use crate::output::{OutputFormat, Outputable};

/// Compile an object-name-list and filter into SQL without running it
#[derive(Args, Debug)]
#[command(after_help = "\
Examples:
  erdb compile 'Genome GenomeHasFeature Feature'
  erdb compile 'Genome Feature' --filter 'Genome(genus) = ? ORDER BY Feature(id)'
  erdb compile Drug --fields 'Drug(name)' --fields 'Drug(approved)'")]
pub struct CompileCmd {
    /// Space-separated object names, optionally with instance numbers (`Feature2`)
    pub objects: String,

    /// Filter clause: WHERE condition, ORDER BY and LIMIT
    #[arg(long, default_value = "")]
    pub filter: String,

    /// Fields to select as `Object(field)`; defaults to every field
    #[arg(long)]
    pub fields: Vec<String>,
}

impl CommandRunner for CompileCmd {
    fn run(self, ctx: &Context, format: OutputFormat) -> Result<String, Box<dyn Error>> {
        let meta = ctx.metadata()?;
        Ok(self.compile(&meta)?.format(format))
    }
}
