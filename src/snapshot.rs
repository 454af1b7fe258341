//! Columnar, categorical snapshot of a population table.
//!
//! Each column stores a sorted dictionary of its distinct values plus one
//! optional code per row. The snapshot is written with bincode next to the
//! CSV output and can be previewed without re-running the pipeline.

use std::{
    collections::BTreeSet,
    fs::{self, File},
    io::BufWriter,
    path::Path,
};

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    data::Value,
    error::{ImputeError, Result},
    frame::{AttributeTable, RowId},
};

const SNAPSHOT_VERSION: u32 = 1;
pub const SNAPSHOT_FILE: &str = "population.snapshot";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotColumn {
    pub name: String,
    pub categories: Vec<Value>,
    pub codes: Vec<Option<u32>>,
}

impl SnapshotColumn {
    pub fn value(&self, row: usize) -> Option<&Value> {
        let code = (*self.codes.get(row)?)?;
        self.categories.get(code as usize)
    }

    pub fn missing(&self) -> usize {
        self.codes.iter().filter(|c| c.is_none()).count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationSnapshot {
    version: u32,
    pub created_at: DateTime<Utc>,
    pub row_ids: Vec<RowId>,
    pub columns: Vec<SnapshotColumn>,
}

impl PopulationSnapshot {
    pub fn from_table(table: &AttributeTable) -> Self {
        let columns = table
            .columns()
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                let categories = table
                    .records()
                    .iter()
                    .filter_map(|r| r.get(idx))
                    .cloned()
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect::<Vec<_>>();
                let codes = table
                    .records()
                    .iter()
                    .map(|r| {
                        r.get(idx).and_then(|v| {
                            categories.binary_search(v).ok().map(|pos| pos as u32)
                        })
                    })
                    .collect();
                SnapshotColumn {
                    name: name.clone(),
                    categories,
                    codes,
                }
            })
            .collect();
        Self {
            version: SNAPSHOT_VERSION,
            created_at: Utc::now(),
            row_ids: table.ids().collect(),
            columns,
        }
    }

    pub fn len(&self) -> usize {
        self.row_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.row_ids.is_empty()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn to_table(&self) -> Result<AttributeTable> {
        let mut table = AttributeTable::new(self.column_names())
            .map_err(|e| ImputeError::Configuration(format!("snapshot: {e}")))?;
        for (row, &id) in self.row_ids.iter().enumerate() {
            let values = self
                .columns
                .iter()
                .map(|c| c.value(row).cloned())
                .collect();
            table
                .push(id, values)
                .map_err(|e| ImputeError::Configuration(format!("snapshot: {e}")))?;
        }
        Ok(table)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| ImputeError::io(parent, e))?;
        }
        let file = File::create(path).map_err(|e| ImputeError::io(path, e))?;
        let mut writer = BufWriter::new(file);
        bincode::serde::encode_into_std_write(self, &mut writer, bincode::config::standard())
            .map_err(|e| {
                ImputeError::io(path, std::io::Error::other(format!("encoding snapshot: {e}")))
            })?;
        debug!("Snapshot of {} row(s) written to {:?}", self.len(), path);
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| ImputeError::io(path, e))?;
        let (snapshot, _): (Self, usize) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard()).map_err(
                |e| ImputeError::io(path, std::io::Error::other(format!("decoding snapshot: {e}"))),
            )?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(ImputeError::io(
                path,
                std::io::Error::other(format!(
                    "unsupported snapshot version {} (expected {SNAPSHOT_VERSION})",
                    snapshot.version
                )),
            ));
        }
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> AttributeTable {
        let mut table = AttributeTable::new(vec!["age".into(), "hours".into()]).unwrap();
        table
            .push(4, vec![Some(Value::text("25-29")), Some(Value::Number(40.0))])
            .unwrap();
        table
            .push(9, vec![Some(Value::text("20-24")), None])
            .unwrap();
        table
            .push(2, vec![Some(Value::text("25-29")), Some(Value::Number(12.5))])
            .unwrap();
        table
    }

    #[test]
    fn columns_use_sorted_dictionaries() {
        let snapshot = PopulationSnapshot::from_table(&table());
        let age = &snapshot.columns[0];
        assert_eq!(age.categories, vec![Value::text("20-24"), Value::text("25-29")]);
        assert_eq!(age.codes, vec![Some(1), Some(0), Some(1)]);
        assert_eq!(snapshot.columns[1].missing(), 1);
        assert_eq!(snapshot.row_ids, vec![4, 9, 2]);
    }

    #[test]
    fn save_and_load_preserve_the_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SNAPSHOT_FILE);
        let original = table();
        PopulationSnapshot::from_table(&original).save(&path).unwrap();
        let loaded = PopulationSnapshot::load(&path).unwrap();
        assert_eq!(loaded.to_table().unwrap(), original);
    }
}
