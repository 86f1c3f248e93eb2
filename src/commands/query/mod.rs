mod execute;
mod output;

use clap::Args;
use std::error::Error;

use crate::cli::Context;
use crate::commands::{run_on_database, CommandRunner};
use crate::db::Value;
use crate::output::OutputFormat;

/// Run a query and print the matching rows
#[derive(Args, Debug)]
#[command(after_help = "\
Examples:
  erdb query Genome
  erdb query 'Genome Feature' --filter 'Genome(id) = ?' --param 83333.1
  erdb query Drug --filter 'Drug(name) LIKE ? ORDER BY Drug(name) LIMIT 5' --param 'asp%'
  erdb query 'Genome Genome2Drug Drug' --count")]
pub struct QueryCmd {
    /// Space-separated object names, optionally with instance numbers (`Feature2`)
    pub objects: String,

    /// Filter clause: WHERE condition, ORDER BY and LIMIT
    #[arg(long, default_value = "")]
    pub filter: String,

    /// Value for the next `?` in the filter; integers are bound as numbers
    #[arg(short, long = "param")]
    pub params: Vec<String>,

    /// Fields to select as `Object(field)`; defaults to every field
    #[arg(long)]
    pub fields: Vec<String>,

    /// Only count the matching rows
    #[arg(long, default_value_t = false)]
    pub count: bool,
}

impl QueryCmd {
    fn bound_params(&self) -> Vec<Value> {
        self.params
            .iter()
            .map(|p| match p.parse::<i64>() {
                Ok(i) => Value::Int(i),
                Err(_) => Value::from(p.as_str()),
            })
            .collect()
    }
}

impl CommandRunner for QueryCmd {
    fn run(self, ctx: &Context, format: OutputFormat) -> Result<String, Box<dyn Error>> {
        run_on_database(self, ctx, format)
    }
}
