mod execute;
mod output;

use clap::{Args, ValueEnum};
use std::error::Error;

use crate::cli::Context;
use crate::commands::{run_on_database, CommandRunner};
use crate::delete::DeleteMode;
use crate::output::OutputFormat;

/// Which part of the cascade to delete
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum ModeArg {
    /// The instance and everything depending on it
    #[default]
    Full,
    /// Only the instance's own rows
    OnlyRoot,
    /// Everything depending on the instance, but not the instance
    KeepRoot,
}

impl From<ModeArg> for DeleteMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Full => DeleteMode::Full,
            ModeArg::OnlyRoot => DeleteMode::OnlyRoot,
            ModeArg::KeepRoot => DeleteMode::KeepRoot,
        }
    }
}

/// Delete an entity instance and everything that depends on it
#[derive(Args, Debug)]
#[command(after_help = "\
Examples:
  erdb delete Genome 83333.1                  # Genome, its features and their links
  erdb delete Genome 83333.1 --plan           # Show the delete paths, change nothing
  erdb delete Drug 17 --mode keep-root        # Remove what hangs off drug 17")]
pub struct DeleteCmd {
    /// Entity name
    pub entity: String,

    /// Key of the instance, as it appears in a load file
    pub id: String,

    #[arg(long, value_enum, default_value_t)]
    pub mode: ModeArg,

    /// Print the delete paths without deleting
    #[arg(long, default_value_t = false)]
    pub plan: bool,
}

impl CommandRunner for DeleteCmd {
    fn run(self, ctx: &Context, format: OutputFormat) -> Result<String, Box<dyn Error>> {
        run_on_database(self, ctx, format)
    }
}
