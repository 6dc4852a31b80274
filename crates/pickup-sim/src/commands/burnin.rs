use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use pickup_exp::{BurninIndex, Registry};

#[derive(Args, Debug)]
pub struct BurninArgs {
    #[arg(long)]
    pub store: PathBuf,
    /// Id of the burn-in experiment.
    #[arg(long)]
    pub experiment: String,
    /// Minimum simulated time (days) a snapshot must have reached.
    #[arg(long = "min-time")]
    pub min_time: f64,
}

pub fn run(args: &BurninArgs) -> Result<(), Box<dyn Error>> {
    let registry = Registry::from_path(&args.store);
    let index = BurninIndex::load(&registry, &args.experiment, args.min_time)?;
    println!("{}", serde_json::to_string_pretty(&index)?);
    Ok(())
}
