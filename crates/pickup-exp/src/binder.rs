use std::path::Path;
use std::sync::Arc;

use pickup_core::errors::{ErrorInfo, PickupError};
use pickup_core::{Configuration, ParamValue};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::axis::{AxisReport, SweepAxis};
use crate::burnin::{BurninEntry, BurninIndex};

/// Subdirectory of a burn-in simulation that holds its serialized state.
pub const DEFAULT_OUTPUT_SUBDIR: &str = "output";

/// Configuration keys the binder writes on every pickup configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingKeys {
    #[serde(default = "BindingKeys::default_path")]
    pub path: String,
    #[serde(default = "BindingKeys::default_filenames")]
    pub filenames: String,
    /// Reserved run identity key; equal values reproduce the same stochastic stream.
    #[serde(default = "BindingKeys::default_identity")]
    pub identity: String,
}

impl BindingKeys {
    fn default_path() -> String {
        "Serialized_Population_Path".to_string()
    }

    fn default_filenames() -> String {
        "Serialized_Population_Filenames".to_string()
    }

    fn default_identity() -> String {
        "Run_Number".to_string()
    }
}

impl Default for BindingKeys {
    fn default() -> Self {
        Self {
            path: Self::default_path(),
            filenames: Self::default_filenames(),
            identity: Self::default_identity(),
        }
    }
}

/// Joins a burn-in simulation directory with its output subdirectory.
pub fn join_output(artifact_path: &str, output_subdir: &str) -> String {
    Path::new(artifact_path)
        .join(output_subdir)
        .to_string_lossy()
        .into_owned()
}

/// Transfers one burn-in entry's identity and artifacts onto a configuration.
#[derive(Debug, Clone)]
pub struct BurninBinder {
    entries: Arc<[BurninEntry]>,
    keys: BindingKeys,
    output_subdir: String,
    extra_params: Vec<String>,
}

impl BurninBinder {
    pub fn new(index: BurninIndex) -> Self {
        Self {
            entries: index.into_entries().into(),
            keys: BindingKeys::default(),
            output_subdir: DEFAULT_OUTPUT_SUBDIR.to_string(),
            extra_params: Vec::new(),
        }
    }

    pub fn with_keys(mut self, keys: BindingKeys) -> Self {
        self.keys = keys;
        self
    }

    pub fn with_output_subdir(mut self, subdir: impl Into<String>) -> Self {
        self.output_subdir = subdir.into();
        self
    }

    /// Entry fields copied onto the configuration when the entry carries them.
    pub fn propagate<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_params.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn entries(&self) -> &[BurninEntry] {
        &self.entries
    }

    pub fn keys(&self) -> &BindingKeys {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Binds the entry at `index` (position in identity-key order).
    pub fn apply(
        &self,
        mut config: Configuration,
        index: usize,
    ) -> Result<(Configuration, AxisReport), PickupError> {
        let entry = self.entries.get(index).ok_or_else(|| {
            PickupError::Binding(
                ErrorInfo::new("binder.out_of_range", "burn-in index outside loaded entries")
                    .with_context("index", index.to_string())
                    .with_context("entries", self.entries.len().to_string()),
            )
        })?;
        if entry.artifact_path.trim().is_empty() {
            return Err(PickupError::Binding(
                ErrorInfo::new("binder.missing_artifact", "burn-in entry has no artifact path")
                    .with_context("index", index.to_string())
                    .with_context("identity_key", entry.identity_key.to_string()),
            ));
        }

        let state_path = join_output(&entry.artifact_path, &self.output_subdir);
        config.set(self.keys.path.clone(), state_path);
        if !entry.state_filenames.is_empty() {
            config.set(
                self.keys.filenames.clone(),
                ParamValue::from(entry.state_filenames.clone()),
            );
        }
        config.set(self.keys.identity.clone(), entry.identity_key);

        let mut report = AxisReport::new()
            .with(self.keys.identity.clone(), entry.identity_key)
            .with_identity(entry.identity_key);
        for name in &self.extra_params {
            match entry.extra_params.get(name) {
                Some(value) => {
                    config.set(name.clone(), value.clone());
                    report.values.insert(name.clone(), value.clone());
                }
                None => debug!(
                    identity_key = entry.identity_key,
                    param = %name,
                    "burn-in entry does not carry parameter; left unset"
                ),
            }
        }
        debug!(index, identity_key = entry.identity_key, "bound burn-in entry");
        Ok((config, report))
    }

    /// Wraps the binder as a sweep axis over every loaded entry.
    pub fn into_axis(self, name: impl Into<String>) -> BurninAxis {
        BurninAxis {
            name: name.into(),
            binder: self,
        }
    }
}

/// Sweep axis over `0..entries.len()` that delegates to a [`BurninBinder`].
#[derive(Debug, Clone)]
pub struct BurninAxis {
    name: String,
    binder: BurninBinder,
}

impl BurninAxis {
    pub fn binder(&self) -> &BurninBinder {
        &self.binder
    }
}

impl SweepAxis for BurninAxis {
    fn name(&self) -> &str {
        &self.name
    }

    fn len(&self) -> usize {
        self.binder.len()
    }

    fn apply(
        &self,
        config: Configuration,
        position: usize,
    ) -> Result<(Configuration, AxisReport), PickupError> {
        self.binder.apply(config, position)
    }

    fn binds_identity(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_index() -> BurninIndex {
        let mut first = BurninEntry::new(11, "/burnin/sim_a");
        first.state_filenames = vec!["state-03650.dtk".to_string()];
        first
            .extra_params
            .insert("x_Temporary_Larval_Habitat".to_string(), json!(0.8));
        let mut second = BurninEntry::new(4, "/burnin/sim_b");
        second.state_filenames = vec!["state-03650.dtk".to_string()];
        BurninIndex::from_entries("exp", 3650.0, vec![first, second]).expect("index")
    }

    #[test]
    fn binds_path_filenames_and_identity() {
        let binder = BurninBinder::new(sample_index());
        let (config, report) = binder.apply(Configuration::new(), 1).expect("bind");
        assert_eq!(
            config.get("Serialized_Population_Path"),
            Some(&json!(join_output("/burnin/sim_a", "output")))
        );
        assert_eq!(
            config.get("Serialized_Population_Filenames"),
            Some(&json!(["state-03650.dtk"]))
        );
        assert_eq!(config.get("Run_Number"), Some(&json!(11)));
        assert_eq!(report.identity_key, Some(11));
        assert_eq!(report.values["Run_Number"], json!(11));
    }

    #[test]
    fn extra_params_are_propagated_only_when_present() {
        let binder = BurninBinder::new(sample_index())
            .propagate(["x_Temporary_Larval_Habitat", "Base_Rainfall"]);
        let (with_extra, _) = binder.apply(Configuration::new(), 1).expect("bind");
        assert_eq!(with_extra.get("x_Temporary_Larval_Habitat"), Some(&json!(0.8)));
        assert!(!with_extra.contains_key("Base_Rainfall"));
        let (without, _) = binder.apply(Configuration::new(), 0).expect("bind");
        assert!(!without.contains_key("x_Temporary_Larval_Habitat"));
    }

    #[test]
    fn custom_keys_and_subdir_are_respected() {
        let keys = BindingKeys {
            path: "state_dir".to_string(),
            filenames: "state_files".to_string(),
            identity: "seed".to_string(),
        };
        let binder = BurninBinder::new(sample_index())
            .with_keys(keys)
            .with_output_subdir("checkpoints");
        let (config, _) = binder.apply(Configuration::new(), 0).expect("bind");
        assert_eq!(
            config.get("state_dir"),
            Some(&json!(join_output("/burnin/sim_b", "checkpoints")))
        );
        assert_eq!(config.get("seed"), Some(&json!(4)));
    }

    #[test]
    fn out_of_range_index_is_a_binding_error() {
        let binder = BurninBinder::new(sample_index());
        let err = binder.apply(Configuration::new(), 2).expect_err("range");
        assert_eq!(err.code(), "binder.out_of_range");
    }

    #[test]
    fn missing_artifact_path_is_a_binding_error() {
        let index =
            BurninIndex::from_entries("exp", 0.0, vec![BurninEntry::new(1, "  ")]).expect("index");
        let err = BurninBinder::new(index)
            .apply(Configuration::new(), 0)
            .expect_err("missing");
        assert!(matches!(err, PickupError::Binding(_)));
        assert_eq!(err.code(), "binder.missing_artifact");
    }
}
