//! In-memory attribute tables with stable row identity.
//!
//! Every record carries a [`RowId`] assigned when the table is loaded. Stages
//! project, partition and re-assemble tables freely; joins back onto the
//! population are always keyed by that identity, never by position.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::Value;

pub type RowId = u64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RowId,
    pub values: Vec<Option<Value>>,
}

impl Record {
    pub fn get(&self, column: usize) -> Option<&Value> {
        self.values.get(column).and_then(|v| v.as_ref())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeTable {
    columns: Vec<String>,
    records: Vec<Record>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("row {id} has {found} value(s), expected {expected}")]
    WidthMismatch { id: RowId, expected: usize, found: usize },
    #[error("column '{0}' appears twice")]
    DuplicateColumn(String),
    #[error("row identity {0} appears twice")]
    DuplicateRow(RowId),
    #[error("column '{0}' not found")]
    UnknownColumn(String),
}

impl AttributeTable {
    pub fn new(columns: Vec<String>) -> Result<Self, TableError> {
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.as_str()) {
                return Err(TableError::DuplicateColumn(column.clone()));
            }
        }
        Ok(Self {
            columns,
            records: Vec::new(),
        })
    }

    /// Builds a table whose row identities are the row positions.
    pub fn from_rows(
        columns: Vec<String>,
        rows: Vec<Vec<Option<Value>>>,
    ) -> Result<Self, TableError> {
        let mut table = Self::new(columns)?;
        for (idx, values) in rows.into_iter().enumerate() {
            table.push(idx as RowId, values)?;
        }
        Ok(table)
    }

    pub fn push(&mut self, id: RowId, values: Vec<Option<Value>>) -> Result<(), TableError> {
        if values.len() != self.columns.len() {
            return Err(TableError::WidthMismatch {
                id,
                expected: self.columns.len(),
                found: values.len(),
            });
        }
        self.records.push(Record { id, values });
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = RowId> + '_ {
        self.records.iter().map(|r| r.id)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Names from `wanted` that this table does not carry.
    pub fn missing_columns<'a>(&self, wanted: &'a [String]) -> Vec<&'a str> {
        wanted
            .iter()
            .filter(|name| !self.has_column(name))
            .map(String::as_str)
            .collect()
    }

    pub fn column_indices(&self, names: &[String]) -> Result<Vec<usize>, TableError> {
        names
            .iter()
            .map(|name| {
                self.column_index(name)
                    .ok_or_else(|| TableError::UnknownColumn(name.clone()))
            })
            .collect()
    }

    /// True when the column exists and at least one record holds a value.
    pub fn has_values(&self, name: &str) -> bool {
        match self.column_index(name) {
            Some(idx) => self.records.iter().any(|r| r.values[idx].is_some()),
            None => false,
        }
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.records.get(row).and_then(|r| r.get(idx))
    }

    pub fn column_values<'a>(
        &'a self,
        name: &str,
    ) -> Result<impl Iterator<Item = Option<&'a Value>> + use<'a>, TableError> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| TableError::UnknownColumn(name.to_string()))?;
        Ok(self.records.iter().map(move |r| r.get(idx)))
    }

    /// Projects the table onto `names`, keeping row identity and order.
    pub fn select(&self, names: &[String]) -> Result<AttributeTable, TableError> {
        let indices = self.column_indices(names)?;
        let mut projected = AttributeTable::new(names.to_vec())?;
        projected.records = self
            .records
            .iter()
            .map(|record| Record {
                id: record.id,
                values: indices.iter().map(|&i| record.values[i].clone()).collect(),
            })
            .collect();
        Ok(projected)
    }

    /// Splits the records into those matching `predicate` and the rest.
    pub fn partition<F>(&self, mut predicate: F) -> (AttributeTable, AttributeTable)
    where
        F: FnMut(&Record) -> bool,
    {
        let (matched, rest): (Vec<Record>, Vec<Record>) =
            self.records.iter().cloned().partition(|r| predicate(r));
        (
            AttributeTable {
                columns: self.columns.clone(),
                records: matched,
            },
            AttributeTable {
                columns: self.columns.clone(),
                records: rest,
            },
        )
    }

    /// Adds an all-missing column if absent and returns its index.
    pub fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(idx) = self.column_index(name) {
            return idx;
        }
        self.columns.push(name.to_string());
        for record in &mut self.records {
            record.values.push(None);
        }
        self.columns.len() - 1
    }

    pub fn set(&mut self, row: usize, column: usize, value: Option<Value>) {
        self.records[row].values[column] = value;
    }

    /// Appends the records of `other`, aligning its columns by name. Columns
    /// that `other` lacks are missing on the appended records.
    pub fn append_aligned(&mut self, other: &AttributeTable) -> Result<(), TableError> {
        let mut known: HashSet<RowId> = self.ids().collect();
        let mapping = self
            .columns
            .iter()
            .map(|name| other.column_index(name))
            .collect::<Vec<_>>();
        for name in other.columns() {
            if !self.has_column(name) {
                return Err(TableError::UnknownColumn(name.clone()));
            }
        }
        for record in other.records() {
            if !known.insert(record.id) {
                return Err(TableError::DuplicateRow(record.id));
            }
            let values = mapping
                .iter()
                .map(|source| source.and_then(|i| record.values[i].clone()))
                .collect();
            self.records.push(Record {
                id: record.id,
                values,
            });
        }
        Ok(())
    }

    pub fn position_index(&self) -> HashMap<RowId, usize> {
        self.records
            .iter()
            .enumerate()
            .map(|(pos, r)| (r.id, pos))
            .collect()
    }

    /// Records rendered as display strings, missing cells as empty strings.
    pub fn display_rows(&self, limit: Option<usize>) -> Vec<Vec<String>> {
        self.records
            .iter()
            .take(limit.unwrap_or(usize::MAX))
            .map(|record| {
                record
                    .values
                    .iter()
                    .map(|v| v.as_ref().map(Value::as_display).unwrap_or_default())
                    .collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AttributeTable {
        AttributeTable::from_rows(
            vec!["age".into(), "gender".into()],
            vec![
                vec![Some(Value::text("20-24")), Some(Value::text("Male"))],
                vec![Some(Value::text("25-29")), None],
                vec![Some(Value::text("30-34")), Some(Value::text("Female"))],
            ],
        )
        .unwrap()
    }

    #[test]
    fn select_keeps_identity_and_order() {
        let projected = sample().select(&["gender".to_string()]).unwrap();
        assert_eq!(projected.columns(), ["gender".to_string()]);
        assert_eq!(projected.ids().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(projected.value(2, "gender"), Some(&Value::text("Female")));
    }

    #[test]
    fn partition_splits_by_predicate() {
        let table = sample();
        let gender = table.column_index("gender").unwrap();
        let (present, missing) = table.partition(|r| r.get(gender).is_some());
        assert_eq!(present.ids().collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(missing.ids().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn append_aligned_fills_absent_columns_with_missing() {
        let table = sample();
        let (mut left, right) = table.partition(|r| r.id == 0);
        left.ensure_column("income");
        left.append_aligned(&right).unwrap();
        assert_eq!(left.len(), 3);
        assert_eq!(left.value(1, "income"), None);
        assert_eq!(left.value(1, "age"), Some(&Value::text("25-29")));
    }

    #[test]
    fn append_aligned_rejects_duplicate_identity() {
        let table = sample();
        let mut copy = table.clone();
        assert_eq!(
            copy.append_aligned(&table),
            Err(TableError::DuplicateRow(0))
        );
    }

    #[test]
    fn has_values_ignores_all_missing_columns() {
        let mut table = sample();
        table.ensure_column("income");
        assert!(table.has_column("income"));
        assert!(!table.has_values("income"));
        assert!(table.has_values("gender"));
    }

    #[test]
    fn push_rejects_wrong_width() {
        let mut table = AttributeTable::new(vec!["a".into()]).unwrap();
        let err = table.push(0, vec![None, None]).unwrap_err();
        assert_eq!(err.to_string(), "row 0 has 2 value(s), expected 1");
    }

    #[test]
    fn duplicate_columns_are_named_in_the_error() {
        let err = AttributeTable::new(vec!["a".into(), "a".into()]).unwrap_err();
        assert_eq!(err, TableError::DuplicateColumn("a".into()));
        assert_eq!(err.to_string(), "column 'a' appears twice");
    }
}
