use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use pickup_core::errors::{ErrorInfo, PickupError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::assemble::ExperimentDefinition;
use crate::serde::to_canonical_json_bytes;

/// Execution target an experiment is handed to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformTarget {
    pub name: String,
    pub job_directory: PathBuf,
    #[serde(default)]
    pub partition: Option<String>,
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default)]
    pub time_limit: Option<String>,
    #[serde(default)]
    pub modules: Vec<String>,
    #[serde(default = "PlatformTarget::default_max_running_jobs")]
    pub max_running_jobs: usize,
}

impl PlatformTarget {
    const fn default_max_running_jobs() -> usize {
        10
    }

    fn preset(name: &str, job_directory: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            job_directory: job_directory.into(),
            partition: None,
            account: None,
            time_limit: Some("2:00:00".to_string()),
            modules: vec!["singularity".to_string()],
            max_running_jobs: Self::default_max_running_jobs(),
        }
    }

    /// Jobs run on the submitting host's scheduler.
    pub fn local(job_directory: impl Into<PathBuf>) -> Self {
        Self::preset("SLURM_LOCAL", job_directory)
    }

    /// Jobs are bridged from a container to the host scheduler.
    pub fn bridged(job_directory: impl Into<PathBuf>) -> Self {
        Self::preset("SLURM_BRIDGED", job_directory)
    }
}

/// Outcome of handing an experiment to a submitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub experiment_id: String,
    pub simulations: usize,
    pub location: String,
    pub submitted_at: String,
}

/// Accepts assembled experiments for execution.
pub trait ExperimentSubmitter {
    fn submit(
        &self,
        experiment: &ExperimentDefinition,
        platform: &PlatformTarget,
    ) -> Result<SubmissionReceipt, PickupError>;
}

/// Materialises an experiment as a directory tree under the platform's job directory.
///
/// Layout: `<job_directory>/<experiment id>/experiment.json`, `platform.json`,
/// and one `sim_<index>/` directory per simulation holding `config.json` and
/// `tags.json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectorySubmitter;

impl ExperimentSubmitter for DirectorySubmitter {
    fn submit(
        &self,
        experiment: &ExperimentDefinition,
        platform: &PlatformTarget,
    ) -> Result<SubmissionReceipt, PickupError> {
        let root = platform.job_directory.join(experiment.id());
        create_dir(&root)?;
        write_json(&root.join("experiment.json"), experiment)?;
        write_json(&root.join("platform.json"), platform)?;
        for instance in experiment.simulations() {
            let sim_dir = root.join(format!("sim_{:04}", instance.index()));
            create_dir(&sim_dir)?;
            write_json(&sim_dir.join("config.json"), instance.configuration())?;
            let tags = json!({
                "id": instance.id(),
                "index": instance.index(),
                "coordinate": instance.coordinate(),
                "identity_key": instance.identity_key(),
            });
            write_json(&sim_dir.join("tags.json"), &tags)?;
        }
        let receipt = SubmissionReceipt {
            experiment_id: experiment.id().to_string(),
            simulations: experiment.len(),
            location: root.display().to_string(),
            submitted_at: Utc::now().to_rfc3339(),
        };
        info!(
            experiment = experiment.name(),
            id = experiment.id(),
            platform = %platform.name,
            location = %receipt.location,
            "submitted experiment"
        );
        Ok(receipt)
    }
}

fn create_dir(path: &Path) -> Result<(), PickupError> {
    fs::create_dir_all(path).map_err(|err| {
        PickupError::Serde(
            ErrorInfo::new("submit.create_dir", "failed to create experiment directory")
                .with_context("path", path.display().to_string())
                .with_hint(err.to_string()),
        )
    })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PickupError> {
    let bytes = to_canonical_json_bytes(value)?;
    fs::write(path, bytes).map_err(|err| {
        PickupError::Serde(
            ErrorInfo::new("submit.write", "failed to write experiment file")
                .with_context("path", path.display().to_string())
                .with_hint(err.to_string()),
        )
    })
}
