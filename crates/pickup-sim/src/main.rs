use std::error::Error;

use clap::{Parser, Subcommand};
use commands::{
    build::{self, BuildArgs},
    burnin::{self, BurninArgs},
    record::{self, RecordArgs},
};

mod commands;
mod logging;

#[derive(Parser, Debug)]
#[command(name = "pickup-sim", about = "Pickup sweep composition CLI")]
struct Cli {
    /// Log progress at info level unless RUST_LOG says otherwise.
    #[arg(long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compose, validate and submit the experiment described by a plan.
    Build(BuildArgs),
    /// Print the burn-in entries resolved from a snapshot registry.
    Burnin(BurninArgs),
    /// Append one burn-in snapshot row to a registry.
    Record(RecordArgs),
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    match cli.command {
        Command::Build(args) => build::run(&args),
        Command::Burnin(args) => burnin::run(&args),
        Command::Record(args) => record::run(&args),
    }
}
