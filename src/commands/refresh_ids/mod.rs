mod execute;
mod output;

use clap::Args;
use std::error::Error;

use crate::cli::Context;
use crate::commands::{run_on_database, CommandRunner};
use crate::output::OutputFormat;

/// Rebuild the id counters of autocounter entities from their largest keys
#[derive(Args, Debug)]
#[command(after_help = "\
Examples:
  erdb refresh-ids                      # Reseed every counter
  erdb refresh-ids --reserve Drug=100   # Then reserve 100 Drug ids")]
pub struct RefreshIdsCmd {
    /// Reserve ids after refreshing, as ENTITY=COUNT
    #[arg(long, value_parser = parse_reservation)]
    pub reserve: Vec<(String, u64)>,
}

fn parse_reservation(s: &str) -> Result<(String, u64), String> {
    let (entity, count) = s
        .split_once('=')
        .ok_or_else(|| format!("expected ENTITY=COUNT, got '{s}'"))?;
    let count = count
        .parse::<u64>()
        .map_err(|e| format!("invalid count '{count}': {e}"))?;
    Ok((entity.to_string(), count))
}

impl CommandRunner for RefreshIdsCmd {
    fn run(self, ctx: &Context, format: OutputFormat) -> Result<String, Box<dyn Error>> {
        run_on_database(self, ctx, format)
    }
}
