use std::collections::BTreeMap;

use pickup_core::errors::{ErrorInfo, PickupError};
use pickup_core::ParamValue;
use serde::{Deserialize, Serialize};

/// One saved-state snapshot of one completed burn-in simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRow {
    pub experiment_id: String,
    /// Run identity (seed) of the simulation that wrote the snapshot.
    pub run_number: i64,
    /// Working directory of the simulation; the snapshot lives under its output subdirectory.
    pub sim_path: String,
    /// Simulated time at which the snapshot was written.
    pub snapshot_time: f64,
    pub state_filename: String,
    /// Additional per-simulation parameters recorded alongside the snapshot.
    #[serde(default)]
    pub extra: BTreeMap<String, ParamValue>,
}

impl MetadataRow {
    pub fn new(
        experiment_id: impl Into<String>,
        run_number: i64,
        sim_path: impl Into<String>,
        snapshot_time: f64,
        state_filename: impl Into<String>,
    ) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            run_number,
            sim_path: sim_path.into(),
            snapshot_time,
            state_filename: state_filename.into(),
            extra: BTreeMap::new(),
        }
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Read-only source of burn-in snapshot metadata.
pub trait MetadataStore {
    /// Returns every snapshot row recorded for `experiment_id`.
    ///
    /// Implementations may pre-filter on `min_elapsed_time`, but callers must
    /// not rely on it; the burn-in index applies the threshold itself.
    fn query(
        &self,
        experiment_id: &str,
        min_elapsed_time: f64,
    ) -> Result<Vec<MetadataRow>, PickupError>;
}

impl<S: MetadataStore + ?Sized> MetadataStore for &S {
    fn query(
        &self,
        experiment_id: &str,
        min_elapsed_time: f64,
    ) -> Result<Vec<MetadataRow>, PickupError> {
        (**self).query(experiment_id, min_elapsed_time)
    }
}

/// In-memory metadata store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryStore {
    rows: Vec<MetadataRow>,
}

impl MemoryStore {
    pub fn new(rows: Vec<MetadataRow>) -> Self {
        Self { rows }
    }

    pub fn push(&mut self, row: MetadataRow) {
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[MetadataRow] {
        &self.rows
    }
}

impl MetadataStore for MemoryStore {
    fn query(
        &self,
        experiment_id: &str,
        _min_elapsed_time: f64,
    ) -> Result<Vec<MetadataRow>, PickupError> {
        Ok(self
            .rows
            .iter()
            .filter(|row| row.experiment_id == experiment_id)
            .cloned()
            .collect())
    }
}

pub(crate) fn store_error(code: &str, message: &str, err: impl ToString) -> PickupError {
    PickupError::Store(ErrorInfo::new(code, message).with_hint(err.to_string()))
}
