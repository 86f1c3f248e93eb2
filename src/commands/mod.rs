//! Command definitions and implementations.
//!
//! Each command lives in its own module with:
//! - `mod.rs`: the clap arguments and the [`CommandRunner`] impl
//! - `execute.rs`: the [`Execute`] impl and its serializable result
//! - `output.rs`: the table rendering of that result

mod cache_schema;
mod check;
mod compile;
mod create;
mod delete;
mod drop_all;
mod fixup;
mod load;
mod query;
mod refresh_ids;
mod sweep;

pub use cache_schema::CacheSchemaCmd;
pub use check::CheckCmd;
pub use compile::CompileCmd;
pub use create::CreateCmd;
pub use delete::DeleteCmd;
pub use drop_all::DropAllCmd;
pub use fixup::FixupCmd;
pub use load::LoadCmd;
pub use query::QueryCmd;
pub use refresh_ids::RefreshIdsCmd;
pub use sweep::SweepCmd;

use clap::Subcommand;
use enum_dispatch::enum_dispatch;
use std::error::Error;

use crate::cli::Context;
use crate::database::ErDatabase;
use crate::output::{OutputFormat, Outputable};

/// Trait for executing commands with command-specific result types.
pub trait Execute {
    type Output: Outputable;

    fn execute(self, db: &ErDatabase) -> Result<Self::Output, Box<dyn Error>>;
}

/// Trait for running a command end to end and formatting its result.
#[enum_dispatch]
pub trait CommandRunner {
    fn run(self, ctx: &Context, format: OutputFormat) -> Result<String, Box<dyn Error>>;
}

#[derive(Subcommand, Debug)]
#[enum_dispatch(CommandRunner)]
pub enum Command {
    /// Compile the schema and summarize it
    Check(CheckCmd),

    /// Compile a query into SQL
    Compile(CompileCmd),

    /// Create every missing table and index
    Create(CreateCmd),

    /// Repair tables and indexes that differ from the schema
    Fixup(FixupCmd),

    /// Drop every table in the database
    DropAll(DropAllCmd),

    /// Remove relationship rows whose endpoints no longer exist
    Sweep(SweepCmd),

    /// Rebuild the id counters of autocounter entities
    RefreshIds(RefreshIdsCmd),

    /// Delete an entity instance and everything depending on it
    Delete(DeleteCmd),

    /// Load a relation from a tab-delimited file
    Load(LoadCmd),

    /// Run a query and print the matching rows
    Query(QueryCmd),

    /// Store the compiled schema in the database
    CacheSchema(CacheSchemaCmd),
}

/// Open the database and run an [`Execute`] command against it.
pub(crate) fn run_on_database<C: Execute>(
    cmd: C,
    ctx: &Context,
    format: OutputFormat,
) -> Result<String, Box<dyn Error>> {
    let db = ctx.open()?;
    let result = cmd.execute(&db)?;
    Ok(result.format(format))
}
