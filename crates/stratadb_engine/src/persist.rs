//! JSON persistence of committed snapshots.

use crate::error::EngineResult;
use crate::snapshot::Snapshot;
use crate::table::{Row, Table, TableDef};
use crate::types::{RowKey, TableId, Version};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const SNAPSHOT_FILE: &str = "snapshot.json";

#[derive(Serialize, Deserialize)]
struct PersistedTable {
    id: TableId,
    def: TableDef,
    next_key: u64,
    rows: Vec<(RowKey, Row)>,
}

#[derive(Serialize, Deserialize)]
struct PersistedSnapshot {
    version: Version,
    schema_version: u64,
    tables: Vec<Option<PersistedTable>>,
}

fn snapshot_path(dir: &Path) -> PathBuf {
    dir.join(SNAPSHOT_FILE)
}

/// Writes `snapshot` under `dir`, replacing the previous file atomically.
pub(crate) fn save(dir: &Path, snapshot: &Snapshot) -> EngineResult<()> {
    fs::create_dir_all(dir)?;
    let persisted = PersistedSnapshot {
        version: snapshot.version(),
        schema_version: snapshot.schema_version(),
        tables: snapshot
            .table_slots()
            .map(|slot| {
                slot.map(|t| PersistedTable {
                    id: t.id(),
                    def: t.def().clone(),
                    next_key: t.next_key(),
                    rows: t.rows().map(|(k, r)| (k, r.clone())).collect(),
                })
            })
            .collect(),
    };
    let tmp = dir.join(format!("{SNAPSHOT_FILE}.tmp"));
    fs::write(&tmp, serde_json::to_vec(&persisted)?)?;
    fs::rename(&tmp, snapshot_path(dir))?;
    Ok(())
}

/// Loads the snapshot stored under `dir`, if one exists.
pub(crate) fn load(dir: &Path) -> EngineResult<Option<Snapshot>> {
    let path = snapshot_path(dir);
    if !path.exists() {
        return Ok(None);
    }
    let persisted: PersistedSnapshot = serde_json::from_slice(&fs::read(&path)?)?;
    let mut tables = Vec::with_capacity(persisted.tables.len());
    for slot in persisted.tables {
        tables.push(match slot {
            Some(t) => Some(Table::from_parts(t.id, t.def, t.rows, t.next_key)?),
            None => None,
        });
    }
    Ok(Some(Snapshot::from_tables(
        persisted.version,
        persisted.schema_version,
        tables,
    )))
}
