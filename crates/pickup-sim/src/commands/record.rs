use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use pickup_core::{ErrorInfo, ParamValue, PickupError};
use pickup_exp::{registry_append, MetadataRow, Registry};

#[derive(Args, Debug)]
pub struct RecordArgs {
    #[arg(long)]
    pub store: PathBuf,
    #[arg(long)]
    pub experiment: String,
    /// Run number of the burn-in simulation.
    #[arg(long)]
    pub run: i64,
    /// Simulation working directory.
    #[arg(long)]
    pub path: String,
    /// Simulated time the snapshot was written at.
    #[arg(long)]
    pub time: f64,
    /// Serialized state file name.
    #[arg(long)]
    pub file: String,
    /// Extra parameters recorded with the snapshot, as `key=value`.
    #[arg(long = "extra", value_name = "KEY=VALUE", value_parser = parse_extra)]
    pub extra: Vec<(String, ParamValue)>,
}

pub fn run(args: &RecordArgs) -> Result<(), Box<dyn Error>> {
    let mut row = MetadataRow::new(
        args.experiment.as_str(),
        args.run,
        args.path.as_str(),
        args.time,
        args.file.as_str(),
    );
    for (key, value) in &args.extra {
        row = row.with_extra(key.as_str(), value.clone());
    }
    registry_append(&Registry::from_path(&args.store), &[row])?;
    Ok(())
}

/// Values are parsed as JSON when possible and kept as strings otherwise.
fn parse_extra(raw: &str) -> Result<(String, ParamValue), PickupError> {
    let Some((key, value)) = raw.split_once('=') else {
        return Err(PickupError::Serde(
            ErrorInfo::new("cli.extra", "expected KEY=VALUE").with_context("argument", raw),
        ));
    };
    let value = serde_json::from_str(value).unwrap_or_else(|_| ParamValue::from(value));
    Ok((key.trim().to_string(), value))
}
