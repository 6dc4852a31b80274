use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, WriterBuilder};
use pickup_core::errors::{ErrorInfo, PickupError};
use pickup_core::ParamValue;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::serde::{from_json_slice, to_canonical_json_bytes};
use crate::store::{store_error, MetadataRow, MetadataStore};

/// Supported on-disk snapshot registries.
#[derive(Debug, Clone, PartialEq)]
pub enum Registry {
    Csv(PathBuf),
    Sqlite(PathBuf),
}

impl Registry {
    /// Construct a registry handle from a filesystem path.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("sqlite") | Some("db") => Registry::Sqlite(path),
            _ => Registry::Csv(path),
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Registry::Csv(path) | Registry::Sqlite(path) => path,
        }
    }
}

impl MetadataStore for Registry {
    fn query(
        &self,
        experiment_id: &str,
        _min_elapsed_time: f64,
    ) -> Result<Vec<MetadataRow>, PickupError> {
        let rows = match self {
            Registry::Csv(path) => query_csv(path, experiment_id)?,
            Registry::Sqlite(path) => query_sqlite(path, experiment_id)?,
        };
        debug!(
            registry = %self.path().display(),
            experiment_id,
            rows = rows.len(),
            "queried snapshot registry"
        );
        Ok(rows)
    }
}

/// Append snapshot rows to the registry backend.
pub fn registry_append(registry: &Registry, rows: &[MetadataRow]) -> Result<(), PickupError> {
    match registry {
        Registry::Csv(path) => append_csv(path, rows),
        Registry::Sqlite(path) => append_sqlite(path, rows),
    }
}

/// Flat CSV record; `extra` holds canonical JSON.
#[derive(Debug, Serialize, Deserialize)]
struct CsvRecord {
    experiment_id: String,
    run_number: i64,
    sim_path: String,
    snapshot_time: f64,
    state_filename: String,
    extra: String,
}

const COLUMNS: [&str; 6] = [
    "experiment_id",
    "run_number",
    "sim_path",
    "snapshot_time",
    "state_filename",
    "extra",
];

fn append_csv(path: &Path, rows: &[MetadataRow]) -> Result<(), PickupError> {
    ensure_parent(path)?;
    let file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .map_err(|err| {
            PickupError::Store(
                ErrorInfo::new("registry.open", "failed to open CSV registry")
                    .with_context("path", path.display().to_string())
                    .with_hint(err.to_string()),
            )
        })?;
    // A file that is new or was created empty still needs its header row.
    let needs_header = file
        .metadata()
        .map_err(|err| store_error("registry.metadata", "CSV registry failure", err))?
        .len()
        == 0;
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .from_writer(BufWriter::new(file));
    if needs_header {
        writer
            .write_record(COLUMNS)
            .map_err(|err| store_error("registry.write_header", "CSV registry failure", err))?;
    }
    for row in rows {
        let record = CsvRecord {
            experiment_id: row.experiment_id.clone(),
            run_number: row.run_number,
            sim_path: row.sim_path.clone(),
            snapshot_time: row.snapshot_time,
            state_filename: row.state_filename.clone(),
            extra: canonical_string(&row.extra)?,
        };
        writer
            .serialize(&record)
            .map_err(|err| store_error("registry.write_row", "CSV registry failure", err))?;
    }
    writer
        .flush()
        .map_err(|err| store_error("registry.flush", "CSV registry failure", err))?;
    Ok(())
}

fn query_csv(path: &Path, experiment_id: &str) -> Result<Vec<MetadataRow>, PickupError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|err| store_error("registry.read", "CSV registry failure", err))?;
    let mut rows = Vec::new();
    for result in reader.deserialize::<CsvRecord>() {
        let record =
            result.map_err(|err| store_error("registry.record", "malformed CSV record", err))?;
        if record.experiment_id != experiment_id {
            continue;
        }
        rows.push(MetadataRow {
            experiment_id: record.experiment_id,
            run_number: record.run_number,
            sim_path: record.sim_path,
            snapshot_time: record.snapshot_time,
            state_filename: record.state_filename,
            extra: parse_extra(&record.extra)?,
        });
    }
    Ok(rows)
}

fn open_sqlite(path: &Path) -> Result<Connection, PickupError> {
    let conn = Connection::open(path).map_err(|err| {
        PickupError::Store(
            ErrorInfo::new("registry.sqlite_open", "failed to open sqlite registry")
                .with_context("path", path.display().to_string())
                .with_hint(err.to_string()),
        )
    })?;
    conn.execute_batch(
        r#"CREATE TABLE IF NOT EXISTS snapshots (
            experiment_id TEXT NOT NULL,
            run_number INTEGER NOT NULL,
            sim_path TEXT NOT NULL,
            snapshot_time REAL NOT NULL,
            state_filename TEXT NOT NULL,
            extra TEXT NOT NULL
        );"#,
    )
    .map_err(|err| store_error("registry.sqlite_schema", "failed to ensure registry schema", err))?;
    Ok(conn)
}

fn append_sqlite(path: &Path, rows: &[MetadataRow]) -> Result<(), PickupError> {
    ensure_parent(path)?;
    let mut conn = open_sqlite(path)?;
    let tx = conn.transaction().map_err(|err| {
        store_error("registry.sqlite_transaction", "failed to start transaction", err)
    })?;
    for row in rows {
        tx.execute(
            r#"INSERT INTO snapshots (experiment_id, run_number, sim_path, snapshot_time, state_filename, extra)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
            params![
                &row.experiment_id,
                row.run_number,
                &row.sim_path,
                row.snapshot_time,
                &row.state_filename,
                canonical_string(&row.extra)?,
            ],
        )
        .map_err(|err| store_error("registry.sqlite_insert", "failed to append registry row", err))?;
    }
    tx.commit()
        .map_err(|err| store_error("registry.sqlite_commit", "failed to commit registry rows", err))?;
    Ok(())
}

fn query_sqlite(path: &Path, experiment_id: &str) -> Result<Vec<MetadataRow>, PickupError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let conn = open_sqlite(path)?;
    let mut stmt = conn
        .prepare(
            r#"SELECT experiment_id, run_number, sim_path, snapshot_time, state_filename, extra
             FROM snapshots WHERE experiment_id = ?1
             ORDER BY run_number, snapshot_time, state_filename"#,
        )
        .map_err(|err| store_error("registry.sqlite_prepare", "failed to prepare registry query", err))?;
    let raw = stmt
        .query_map([experiment_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })
        .map_err(|err| store_error("registry.sqlite_query", "failed to execute registry query", err))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| store_error("registry.sqlite_row", "failed to fetch registry row", err))?;
    raw.into_iter()
        .map(
            |(experiment_id, run_number, sim_path, snapshot_time, state_filename, extra)| {
                Ok(MetadataRow {
                    experiment_id,
                    run_number,
                    sim_path,
                    snapshot_time,
                    state_filename,
                    extra: parse_extra(&extra)?,
                })
            },
        )
        .collect()
}

fn canonical_string(extra: &BTreeMap<String, ParamValue>) -> Result<String, PickupError> {
    let bytes = to_canonical_json_bytes(extra)?;
    String::from_utf8(bytes)
        .map_err(|err| store_error("registry.canonical", "failed to encode canonical json", err))
}

fn parse_extra(text: &str) -> Result<BTreeMap<String, ParamValue>, PickupError> {
    if text.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    from_json_slice(text.as_bytes())
}

fn ensure_parent(path: &Path) -> Result<(), PickupError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|err| {
                PickupError::Store(
                    ErrorInfo::new("registry.create", "failed to create registry directory")
                        .with_context("path", parent.display().to_string())
                        .with_hint(err.to_string()),
                )
            })?;
        }
    }
    Ok(())
}
