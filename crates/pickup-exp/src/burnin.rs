use std::collections::BTreeMap;

use pickup_core::errors::{ErrorInfo, PickupError};
use pickup_core::ParamValue;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::store::{MetadataRow, MetadataStore};

/// Saved-state snapshot of one completed burn-in run, ready to be bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BurninEntry {
    /// Run number shared by the burn-in run and every pickup run bound to it.
    pub identity_key: i64,
    /// Simulation directory of the burn-in run.
    pub artifact_path: String,
    /// Serialized population files written at `snapshot_time`.
    #[serde(default)]
    pub state_filenames: Vec<String>,
    pub snapshot_time: f64,
    #[serde(default)]
    pub extra_params: BTreeMap<String, ParamValue>,
}

impl BurninEntry {
    pub fn new(identity_key: i64, artifact_path: impl Into<String>) -> Self {
        Self {
            identity_key,
            artifact_path: artifact_path.into(),
            state_filenames: Vec::new(),
            snapshot_time: 0.0,
            extra_params: BTreeMap::new(),
        }
    }
}

/// Immutable snapshot of the burn-in entries of one prior experiment,
/// ordered by ascending identity key.
///
/// Deserialized indexes go through [`BurninIndex::from_entries`], so they are
/// re-sorted and rejected when two entries share an identity key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "IndexRecord")]
pub struct BurninIndex {
    experiment_id: String,
    min_elapsed_time: f64,
    entries: Vec<BurninEntry>,
}

impl BurninIndex {
    /// Queries `store` once and resolves one entry per run that saved a
    /// snapshot at or after `min_elapsed_time`.
    pub fn load<S: MetadataStore + ?Sized>(
        store: &S,
        experiment_id: &str,
        min_elapsed_time: f64,
    ) -> Result<Self, PickupError> {
        if !min_elapsed_time.is_finite() {
            return Err(PickupError::Store(
                ErrorInfo::new("burnin.invalid_threshold", "elapsed time threshold must be finite")
                    .with_context("min_elapsed_time", min_elapsed_time.to_string()),
            ));
        }
        let rows = store.query(experiment_id, min_elapsed_time)?;
        let entries = resolve_entries(experiment_id, rows, min_elapsed_time)?;
        if entries.is_empty() {
            return Err(PickupError::NotFound(
                ErrorInfo::new(
                    "burnin.no_entries",
                    "source experiment has no snapshot at or after the threshold",
                )
                .with_context("experiment_id", experiment_id)
                .with_context("min_elapsed_time", min_elapsed_time.to_string()),
            ));
        }
        info!(
            experiment_id,
            min_elapsed_time,
            entries = entries.len(),
            "loaded burn-in index"
        );
        Ok(Self {
            experiment_id: experiment_id.to_string(),
            min_elapsed_time,
            entries,
        })
    }

    /// Builds an index from already-resolved entries, enforcing the same
    /// ordering and uniqueness rules as [`BurninIndex::load`].
    pub fn from_entries(
        experiment_id: impl Into<String>,
        min_elapsed_time: f64,
        mut entries: Vec<BurninEntry>,
    ) -> Result<Self, PickupError> {
        let experiment_id = experiment_id.into();
        entries.sort_by_key(|entry| entry.identity_key);
        for pair in entries.windows(2) {
            if pair[0].identity_key == pair[1].identity_key {
                return Err(duplicate_identity(
                    &experiment_id,
                    pair[0].identity_key,
                    &pair[0].artifact_path,
                    &pair[1].artifact_path,
                ));
            }
        }
        if entries.is_empty() {
            return Err(PickupError::NotFound(
                ErrorInfo::new("burnin.no_entries", "no burn-in entries supplied")
                    .with_context("experiment_id", experiment_id),
            ));
        }
        Ok(Self {
            experiment_id,
            min_elapsed_time,
            entries,
        })
    }

    pub fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    pub fn min_elapsed_time(&self) -> f64 {
        self.min_elapsed_time
    }

    pub fn entries(&self) -> &[BurninEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks an entry up by identity key rather than position.
    pub fn by_identity(&self, identity_key: i64) -> Option<&BurninEntry> {
        self.entries
            .binary_search_by_key(&identity_key, |entry| entry.identity_key)
            .ok()
            .map(|idx| &self.entries[idx])
    }

    pub fn into_entries(self) -> Vec<BurninEntry> {
        self.entries
    }
}

#[derive(Deserialize)]
struct IndexRecord {
    experiment_id: String,
    min_elapsed_time: f64,
    entries: Vec<BurninEntry>,
}

impl TryFrom<IndexRecord> for BurninIndex {
    type Error = PickupError;

    fn try_from(record: IndexRecord) -> Result<Self, Self::Error> {
        Self::from_entries(record.experiment_id, record.min_elapsed_time, record.entries)
    }
}

fn resolve_entries(
    experiment_id: &str,
    mut rows: Vec<MetadataRow>,
    min_elapsed_time: f64,
) -> Result<Vec<BurninEntry>, PickupError> {
    rows.retain(|row| row.experiment_id == experiment_id);
    rows.sort_by(|a, b| {
        a.run_number
            .cmp(&b.run_number)
            .then(a.snapshot_time.total_cmp(&b.snapshot_time))
            .then_with(|| a.state_filename.cmp(&b.state_filename))
    });

    let mut by_run: BTreeMap<i64, Vec<MetadataRow>> = BTreeMap::new();
    for row in rows {
        by_run.entry(row.run_number).or_default().push(row);
    }

    let mut entries = Vec::with_capacity(by_run.len());
    for (run_number, run_rows) in by_run {
        let sim_path = &run_rows[0].sim_path;
        if let Some(other) = run_rows.iter().find(|row| &row.sim_path != sim_path) {
            return Err(duplicate_identity(
                experiment_id,
                run_number,
                sim_path,
                &other.sim_path,
            ));
        }
        // Rows are sorted by time, so the first qualifying row is the earliest snapshot.
        let Some(selected_time) = run_rows
            .iter()
            .map(|row| row.snapshot_time)
            .find(|time| *time >= min_elapsed_time)
        else {
            warn!(
                experiment_id,
                run_number, min_elapsed_time, "burn-in run has no qualifying snapshot"
            );
            continue;
        };
        let mut entry = BurninEntry::new(run_number, sim_path.clone());
        entry.snapshot_time = selected_time;
        for row in run_rows
            .into_iter()
            .filter(|row| row.snapshot_time == selected_time)
        {
            if !row.state_filename.is_empty() {
                entry.state_filenames.push(row.state_filename);
            }
            entry.extra_params.extend(row.extra);
        }
        entries.push(entry);
    }
    Ok(entries)
}

fn duplicate_identity(
    experiment_id: &str,
    identity_key: i64,
    first: &str,
    second: &str,
) -> PickupError {
    PickupError::InconsistentState(
        ErrorInfo::new(
            "burnin.duplicate_identity",
            "identity key resolves to more than one artifact path",
        )
        .with_context("experiment_id", experiment_id)
        .with_context("identity_key", identity_key.to_string())
        .with_context("first_path", first)
        .with_context("second_path", second)
        .with_hint("burn-in metadata is ambiguous; re-export the source experiment"),
    )
}
