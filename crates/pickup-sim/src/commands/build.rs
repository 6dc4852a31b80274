use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use pickup_exp::{
    build_experiment, DirectorySubmitter, ExperimentPlan, ExperimentSubmitter, NoopValidator,
    PlatformTarget, Registry,
};
use tracing::info;

#[derive(Args, Debug)]
pub struct BuildArgs {
    /// YAML experiment plan.
    #[arg(long)]
    pub plan: PathBuf,
    /// Burn-in snapshot registry (`.sqlite`/`.db`, otherwise CSV).
    #[arg(long)]
    pub store: PathBuf,
    /// Job directory the experiment is written under.
    #[arg(long, default_value = "jobs")]
    pub out: PathBuf,
    /// Submit to the local scheduler instead of bridging from a container.
    #[arg(long)]
    pub local: bool,
}

pub fn run(args: &BuildArgs) -> Result<(), Box<dyn Error>> {
    let plan = ExperimentPlan::load(&args.plan)?;
    let registry = Registry::from_path(&args.store);
    let experiment = build_experiment(&plan, &registry, &NoopValidator)?;
    info!(
        experiment = experiment.name(),
        simulations = experiment.len(),
        "experiment built"
    );

    let platform = if args.local {
        PlatformTarget::local(&args.out)
    } else {
        PlatformTarget::bridged(&args.out)
    };
    let receipt = DirectorySubmitter.submit(&experiment, &platform)?;
    println!("{}", serde_json::to_string_pretty(&receipt)?);
    Ok(())
}
