//! CLI argument definitions.
//!
//! This module contains the top-level CLI structure and the [`Context`]
//! commands run in. Individual command definitions are in the `commands`
//! module.

use clap::{ArgAction, Parser};
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use crate::commands::Command;
use crate::config::ConfigFile;
use crate::database::ErDatabase;
use crate::db::{DatabaseConfig, DEFAULT_MAX_RETRIES};
use crate::output::OutputFormat;
use crate::schema::{Metadata, SchemaDefinition, TypeRegistry};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Database URL or SQLite path (`:memory:`, `sqlite://path`, `postgres://...`).
    /// Overrides `.erdb.json` and `DATABASE_URL`.
    #[arg(long, global = true)]
    pub db: Option<String>,

    /// Schema definition (JSON). Overrides `.erdb.json`; without either the
    /// schema cached in the database is used
    #[arg(short, long, global = true)]
    pub schema: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t, global = true)]
    pub format: OutputFormat,

    /// Log more (`-v` info, `-vv` debug). `RUST_LOG` takes precedence
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Where a command finds its database and schema.
#[derive(Debug, Clone)]
pub struct Context {
    pub database: DatabaseConfig,
    pub schema: Option<PathBuf>,
    pub max_retries: u32,
}

impl Context {
    /// Combine command-line arguments with `.erdb.json` and the environment.
    pub fn resolve(args: &Args) -> Result<Self, Box<dyn Error>> {
        let file = ConfigFile::load_optional()?;
        let database = match &args.db {
            Some(url) => DatabaseConfig::from_url(url)?,
            None => DatabaseConfig::resolve()?,
        };
        let schema = args
            .schema
            .clone()
            .or_else(|| file.as_ref().and_then(|f| f.schema.clone()));
        let max_retries = file
            .as_ref()
            .and_then(|f| f.max_retries)
            .unwrap_or(DEFAULT_MAX_RETRIES);
        Ok(Self {
            database,
            schema,
            max_retries,
        })
    }

    /// Compile the configured schema definition.
    pub fn metadata(&self) -> Result<Arc<Metadata>, Box<dyn Error>> {
        let Some(path) = &self.schema else {
            return Err("No schema definition given: pass --schema or set \"schema\" in .erdb.json".into());
        };
        let definition = SchemaDefinition::from_file(path)?;
        let meta = Metadata::compile(&definition, Arc::new(TypeRegistry::standard()))?;
        Ok(Arc::new(meta))
    }

    /// Open the database, bound to the configured schema or else to the
    /// schema cached in the database.
    pub fn open(&self) -> Result<ErDatabase, Box<dyn Error>> {
        let db = if self.schema.is_some() {
            ErDatabase::open(&self.database, self.metadata()?)?
        } else {
            ErDatabase::open_cached(&self.database, Arc::new(TypeRegistry::standard()))?.ok_or(
                "No schema definition given and none cached in the database: \
                 pass --schema or run `erdb cache-schema` first",
            )?
        };
        Ok(db.with_max_retries(self.max_retries))
    }
}
