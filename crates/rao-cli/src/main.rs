use anyhow::Result;
use clap::Parser;
use rao_cli::cli::{Cli, Commands};
use tracing::error;
use tracing_subscriber::FmtSubscriber;

mod commands;

use crate::commands::{optimize, params, validate};

fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Optimize {
            case,
            params,
            out,
            threads,
        } => optimize::handle(case, params.as_deref(), out, threads),
        Commands::Params { out, format } => params::handle(out.as_deref(), (*format).into()),
        Commands::Validate { case, params } => validate::handle(case, params.as_deref()),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let result = run(&cli);
    if let Err(err) = &result {
        error!("command failed: {err:#}");
    }
    result
}
