use clap::Parser;
use tracing_subscriber::EnvFilter;

use erdb::cli::{Args, Context};
use erdb::commands::CommandRunner;

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "erdb=info",
        _ => "erdb=debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(args.verbose);
    let ctx = Context::resolve(&args)?;
    let output = args.command.run(&ctx, args.format)?;
    println!("{}", output);
    Ok(())
}
