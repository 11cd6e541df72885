//! Table definitions and row storage.

use crate::error::{EngineError, EngineResult};
use crate::types::{RowKey, TableId, Version};
use crate::value::{ColumnType, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Definition of one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name, unique within its table.
    pub name: String,
    /// Storage type.
    pub column_type: ColumnType,
    /// Whether the column may hold null.
    pub nullable: bool,
    /// Whether queries may rely on an index for this column.
    pub indexed: bool,
}

impl ColumnDef {
    /// Creates a non-nullable, unindexed column.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: false,
            indexed: false,
        }
    }

    /// Sets whether the column is nullable.
    #[must_use]
    pub fn nullable(mut self, value: bool) -> Self {
        self.nullable = value;
        self
    }

    /// Sets whether the column is indexed.
    #[must_use]
    pub fn indexed(mut self, value: bool) -> Self {
        self.indexed = value;
        self
    }

    /// Returns the value a new row holds in this column.
    #[must_use]
    pub fn initial_value(&self) -> Value {
        if self.nullable && !matches!(self.column_type, ColumnType::List(_)) {
            Value::Null
        } else {
            self.column_type.default_value()
        }
    }
}

/// Definition of a table: its name, ordered columns and primary key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    /// Table name.
    pub name: String,
    /// Ordered columns.
    pub columns: Vec<ColumnDef>,
    /// Name of the primary-key column, if any.
    pub primary_key: Option<String>,
}

impl TableDef {
    /// Creates a table definition without columns.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: None,
        }
    }

    /// Appends a column.
    #[must_use]
    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    /// Sets the primary-key column by name.
    #[must_use]
    pub fn primary_key(mut self, name: impl Into<String>) -> Self {
        self.primary_key = Some(name.into());
        self
    }

    /// Looks up a column index by name.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Returns the index of the primary-key column.
    #[must_use]
    pub fn primary_key_index(&self) -> Option<usize> {
        self.primary_key
            .as_deref()
            .and_then(|name| self.column_index(name))
    }
}

/// Hashable projection of a primary-key value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum IndexKey {
    Null,
    Int(i64),
    String(String),
}

impl IndexKey {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(IndexKey::Null),
            Value::Int(v) => Some(IndexKey::Int(*v)),
            Value::String(s) => Some(IndexKey::String(s.clone())),
            _ => None,
        }
    }
}

/// One stored row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    values: Vec<Value>,
    modified: Version,
}

impl Row {
    pub(crate) fn new(values: Vec<Value>, modified: Version) -> Self {
        Self { values, modified }
    }

    /// Returns all column values in column order.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Returns one column value.
    #[must_use]
    pub fn value(&self, column: usize) -> Option<&Value> {
        self.values.get(column)
    }

    /// Returns the version of the last write to this row.
    #[must_use]
    pub fn modified(&self) -> Version {
        self.modified
    }
}

/// A table: definition plus rows in key order.
///
/// Tables are shared between snapshots behind an `Arc` and cloned on first
/// write, so a snapshot never observes later mutations.
#[derive(Debug, Clone)]
pub struct Table {
    id: TableId,
    def: TableDef,
    rows: BTreeMap<RowKey, Row>,
    next_key: u64,
    pk_column: Option<usize>,
    pk_index: HashMap<IndexKey, RowKey>,
}

impl Table {
    pub(crate) fn new(id: TableId, def: TableDef) -> Self {
        let pk_column = def.primary_key_index();
        Self {
            id,
            def,
            rows: BTreeMap::new(),
            next_key: 1,
            pk_column,
            pk_index: HashMap::new(),
        }
    }

    /// Rebuilds a table from persisted or migrated parts.
    pub(crate) fn from_parts(
        id: TableId,
        def: TableDef,
        rows: Vec<(RowKey, Row)>,
        next_key: u64,
    ) -> EngineResult<Self> {
        let mut table = Self::new(id, def);
        table.next_key = next_key;
        for (key, row) in rows {
            if row.values.len() != table.def.columns.len() {
                return Err(EngineError::ColumnOutOfRange {
                    table: id,
                    column: row.values.len(),
                });
            }
            for (column, value) in row.values.iter().enumerate() {
                table.validate(column, value)?;
            }
            table.index_primary_key(key, &row.values)?;
            table.next_key = table.next_key.max(key.as_u64() + 1);
            table.rows.insert(key, row);
        }
        Ok(table)
    }

    /// Returns the table ID.
    #[must_use]
    pub fn id(&self) -> TableId {
        self.id
    }

    /// Returns the table definition.
    #[must_use]
    pub fn def(&self) -> &TableDef {
        &self.def
    }

    /// Returns the table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.def.name
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the next key that will be allocated.
    #[must_use]
    pub fn next_key(&self) -> u64 {
        self.next_key
    }

    /// Iterates rows in table order (ascending key).
    pub fn rows(&self) -> impl Iterator<Item = (RowKey, &Row)> {
        self.rows.iter().map(|(k, r)| (*k, r))
    }

    /// Returns all keys in table order.
    #[must_use]
    pub fn keys(&self) -> Vec<RowKey> {
        self.rows.keys().copied().collect()
    }

    /// Returns a row by key.
    #[must_use]
    pub fn row(&self, key: RowKey) -> Option<&Row> {
        self.rows.get(&key)
    }

    /// Checks if a row exists.
    #[must_use]
    pub fn contains(&self, key: RowKey) -> bool {
        self.rows.contains_key(&key)
    }

    /// Finds a row by primary-key value.
    #[must_use]
    pub fn find_by_primary_key(&self, value: &Value) -> Option<RowKey> {
        IndexKey::from_value(value).and_then(|k| self.pk_index.get(&k).copied())
    }

    /// Checks a value against a column's type and nullability.
    pub(crate) fn validate(&self, column: usize, value: &Value) -> EngineResult<()> {
        let def = self
            .def
            .columns
            .get(column)
            .ok_or(EngineError::ColumnOutOfRange {
                table: self.id,
                column,
            })?;
        if value.is_null() {
            if def.nullable || matches!(def.column_type, ColumnType::Link { .. }) {
                return Ok(());
            }
            return Err(EngineError::not_nullable(&def.name));
        }
        if def.column_type.admits(value, def.nullable) {
            Ok(())
        } else {
            Err(EngineError::type_mismatch(
                &def.name,
                def.column_type.to_string(),
                value.type_name(),
            ))
        }
    }

    fn index_primary_key(&mut self, key: RowKey, values: &[Value]) -> EngineResult<()> {
        let Some(pk) = self.pk_column else {
            return Ok(());
        };
        let index_key = IndexKey::from_value(&values[pk]).ok_or_else(|| {
            EngineError::type_mismatch(&self.def.columns[pk].name, "int or string", values[pk].type_name())
        })?;
        if self.pk_index.contains_key(&index_key) {
            return Err(EngineError::DuplicatePrimaryKey {
                table: self.def.name.clone(),
                value: values[pk].to_string(),
            });
        }
        self.pk_index.insert(index_key, key);
        Ok(())
    }

    pub(crate) fn insert_row(&mut self, values: Vec<Value>, version: Version) -> EngineResult<RowKey> {
        let key = RowKey::new(self.next_key);
        self.index_primary_key(key, &values)?;
        self.next_key += 1;
        self.rows.insert(key, Row::new(values, version));
        Ok(key)
    }

    pub(crate) fn remove_row(&mut self, key: RowKey) -> Option<Row> {
        let row = self.rows.remove(&key)?;
        if let Some(pk) = self.pk_column {
            if let Some(index_key) = IndexKey::from_value(&row.values[pk]) {
                self.pk_index.remove(&index_key);
            }
        }
        Some(row)
    }

    pub(crate) fn set_value(
        &mut self,
        key: RowKey,
        column: usize,
        value: Value,
        version: Version,
    ) -> EngineResult<()> {
        self.validate(column, &value)?;
        let table = self.id;
        if self.pk_column == Some(column) {
            let old = self
                .rows
                .get(&key)
                .ok_or(EngineError::RowNotFound { table, key })?
                .values[column]
                .clone();
            if old != value {
                if let Some(old_key) = IndexKey::from_value(&old) {
                    self.pk_index.remove(&old_key);
                }
                let mut candidate = vec![Value::Null; self.def.columns.len()];
                candidate[column] = value.clone();
                if let Err(e) = self.index_primary_key(key, &candidate) {
                    if let Some(old_key) = IndexKey::from_value(&old) {
                        self.pk_index.insert(old_key, key);
                    }
                    return Err(e);
                }
            }
        }
        let row = self
            .rows
            .get_mut(&key)
            .ok_or(EngineError::RowNotFound { table, key })?;
        row.values[column] = value;
        row.modified = version;
        Ok(())
    }

    /// Moves the key counter forward to at least `floor`.
    pub(crate) fn raise_next_key(&mut self, floor: u64) {
        self.next_key = self.next_key.max(floor);
    }

    /// Applies `f` to every row, stamping rows it reports as changed.
    pub(crate) fn update_rows<F>(&mut self, version: Version, mut f: F)
    where
        F: FnMut(&mut Vec<Value>) -> bool,
    {
        for row in self.rows.values_mut() {
            if f(&mut row.values) {
                row.modified = version;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> Table {
        let def = TableDef::new("Person")
            .column(ColumnDef::new("id", ColumnType::Int).indexed(true))
            .column(ColumnDef::new("name", ColumnType::String))
            .column(ColumnDef::new("nick", ColumnType::String).nullable(true))
            .primary_key("id");
        Table::new(TableId::new(0), def)
    }

    fn row(id: i64, name: &str) -> Vec<Value> {
        vec![Value::Int(id), Value::String(name.into()), Value::Null]
    }

    #[test]
    fn keys_are_never_reused() {
        let mut t = people();
        let a = t.insert_row(row(1, "a"), Version::new(1)).unwrap();
        t.remove_row(a);
        let b = t.insert_row(row(2, "b"), Version::new(2)).unwrap();
        assert_ne!(a, b);
        assert!(!t.contains(a));
    }

    #[test]
    fn duplicate_primary_key_rejected() {
        let mut t = people();
        t.insert_row(row(1, "a"), Version::new(1)).unwrap();
        let err = t.insert_row(row(1, "b"), Version::new(1)).unwrap_err();
        assert!(matches!(err, EngineError::DuplicatePrimaryKey { .. }));
    }

    #[test]
    fn primary_key_lookup_follows_updates() {
        let mut t = people();
        let key = t.insert_row(row(1, "a"), Version::new(1)).unwrap();
        t.set_value(key, 0, Value::Int(7), Version::new(2)).unwrap();
        assert_eq!(t.find_by_primary_key(&Value::Int(7)), Some(key));
        assert_eq!(t.find_by_primary_key(&Value::Int(1)), None);
        assert_eq!(t.row(key).unwrap().modified(), Version::new(2));
    }

    #[test]
    fn validate_rejects_null_and_wrong_type() {
        let t = people();
        assert!(matches!(
            t.validate(1, &Value::Null),
            Err(EngineError::NotNullable { .. })
        ));
        assert!(matches!(
            t.validate(1, &Value::Int(3)),
            Err(EngineError::TypeMismatch { .. })
        ));
        assert!(t.validate(2, &Value::Null).is_ok());
    }
}
