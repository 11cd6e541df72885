//! Immutable, versioned views of the store.

use crate::error::{EngineError, EngineResult};
use crate::table::{Row, Table};
use crate::types::{RowKey, TableId, Version};
use crate::value::{ColumnType, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

/// Sort direction for one sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Smallest first; nulls first.
    Ascending,
    /// Largest first; nulls last.
    Descending,
}

/// Ordered list of (column, direction) sort keys.
///
/// Ties are broken by table order, so sorting is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortSpec {
    keys: Vec<(usize, SortOrder)>,
}

impl SortSpec {
    /// Creates an empty sort specification.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a sort key.
    #[must_use]
    pub fn then_by(mut self, column: usize, order: SortOrder) -> Self {
        self.keys.push((column, order));
        self
    }

    /// Returns the sort keys.
    #[must_use]
    pub fn keys(&self) -> &[(usize, SortOrder)] {
        &self.keys
    }

    /// Returns true if no sort key is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Read-only view of one row, handed to query predicates.
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    table: &'a Table,
    key: RowKey,
    row: &'a Row,
}

impl<'a> RowView<'a> {
    /// Returns the row key.
    #[must_use]
    pub fn key(&self) -> RowKey {
        self.key
    }

    /// Returns the table the row belongs to.
    #[must_use]
    pub fn table(&self) -> &'a Table {
        self.table
    }

    /// Returns a column value by index.
    #[must_use]
    pub fn get(&self, column: usize) -> Option<&'a Value> {
        self.row.value(column)
    }

    /// Returns a column value by name.
    #[must_use]
    pub fn get_named(&self, name: &str) -> Option<&'a Value> {
        self.table
            .def()
            .column_index(name)
            .and_then(|c| self.row.value(c))
    }
}

/// A consistent, immutable view of every table at one version.
///
/// Cloning a snapshot is cheap: tables are shared until a write transaction
/// touches them.
#[derive(Debug, Clone)]
pub struct Snapshot {
    version: Version,
    schema_version: u64,
    tables: Vec<Option<Arc<Table>>>,
    by_name: HashMap<String, TableId>,
}

impl Snapshot {
    pub(crate) fn empty() -> Self {
        Self {
            version: Version::INITIAL,
            schema_version: 0,
            tables: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    pub(crate) fn from_tables(version: Version, schema_version: u64, tables: Vec<Option<Table>>) -> Self {
        let mut by_name = HashMap::new();
        for table in tables.iter().flatten() {
            by_name.insert(table.name().to_string(), table.id());
        }
        Self {
            version,
            schema_version,
            tables: tables.into_iter().map(|t| t.map(Arc::new)).collect(),
            by_name,
        }
    }

    /// Returns the version this snapshot reflects.
    #[must_use]
    pub fn version(&self) -> Version {
        self.version
    }

    /// Returns the application schema version recorded in the store.
    #[must_use]
    pub fn schema_version(&self) -> u64 {
        self.schema_version
    }

    /// Returns a table by ID.
    #[must_use]
    pub fn table(&self, id: TableId) -> Option<&Table> {
        self.tables.get(id.index()).and_then(|t| t.as_deref())
    }

    /// Resolves a table name to its ID.
    #[must_use]
    pub fn table_id(&self, name: &str) -> Option<TableId> {
        self.by_name.get(name).copied()
    }

    /// Returns a table by name.
    #[must_use]
    pub fn table_by_name(&self, name: &str) -> Option<&Table> {
        self.table_id(name).and_then(|id| self.table(id))
    }

    /// Iterates all live tables in ID order.
    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.iter().filter_map(|t| t.as_deref())
    }

    fn require(&self, id: TableId) -> EngineResult<&Table> {
        self.table(id)
            .ok_or_else(|| EngineError::TableNotFound(id.to_string()))
    }

    /// Checks whether a row exists at this version.
    #[must_use]
    pub fn contains(&self, table: TableId, key: RowKey) -> bool {
        self.table(table).is_some_and(|t| t.contains(key))
    }

    /// Returns a row by key.
    #[must_use]
    pub fn row(&self, table: TableId, key: RowKey) -> Option<&Row> {
        self.table(table).and_then(|t| t.row(key))
    }

    /// Returns a read-only view of one row.
    #[must_use]
    pub fn row_view(&self, table: TableId, key: RowKey) -> Option<RowView<'_>> {
        let t = self.table(table)?;
        let row = t.row(key)?;
        Some(RowView { table: t, key, row })
    }

    /// Reads one cell.
    pub fn get(&self, table: TableId, key: RowKey, column: usize) -> EngineResult<&Value> {
        let row = self
            .require(table)?
            .row(key)
            .ok_or(EngineError::RowNotFound { table, key })?;
        row.value(column)
            .ok_or(EngineError::ColumnOutOfRange { table, column })
    }

    /// Returns all row keys of a table in table order.
    pub fn keys(&self, table: TableId) -> EngineResult<Vec<RowKey>> {
        Ok(self.require(table)?.keys())
    }

    /// Evaluates a predicate over a table and returns the matching keys.
    ///
    /// Without a sort specification, keys are returned in table order.
    pub fn query(
        &self,
        table: TableId,
        predicate: &dyn Fn(&RowView<'_>) -> bool,
        sort: Option<&SortSpec>,
    ) -> EngineResult<Vec<RowKey>> {
        let t = self.require(table)?;
        let mut matches: Vec<RowView<'_>> = t
            .rows()
            .map(|(key, row)| RowView { table: t, key, row })
            .filter(|view| predicate(view))
            .collect();
        if let Some(spec) = sort.filter(|s| !s.is_empty()) {
            for (column, _) in spec.keys() {
                if *column >= t.def().columns.len() {
                    return Err(EngineError::ColumnOutOfRange {
                        table,
                        column: *column,
                    });
                }
            }
            matches.sort_by(|a, b| compare_rows(a.row, b.row, spec));
        }
        Ok(matches.into_iter().map(|v| v.key).collect())
    }

    /// Returns the keys of rows in `source` whose `column` links to `target`.
    pub fn backlinks(&self, source: TableId, column: usize, target: RowKey) -> EngineResult<Vec<RowKey>> {
        let t = self.require(source)?;
        let def = t
            .def()
            .columns
            .get(column)
            .ok_or(EngineError::ColumnOutOfRange {
                table: source,
                column,
            })?;
        if def.column_type.link_target().is_none() {
            return Err(EngineError::type_mismatch(
                &def.name,
                "link or link list",
                def.column_type.to_string(),
            ));
        }
        Ok(t.rows()
            .filter(|(_, row)| match row.value(column) {
                Some(Value::Link(k)) => *k == target,
                Some(Value::LinkList(keys)) => keys.contains(&target),
                _ => false,
            })
            .map(|(key, _)| key)
            .collect())
    }

    pub(crate) fn table_slots(&self) -> impl Iterator<Item = Option<&Table>> {
        self.tables.iter().map(|t| t.as_deref())
    }

    pub(crate) fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    pub(crate) fn set_schema_version(&mut self, schema_version: u64) {
        self.schema_version = schema_version;
    }

    pub(crate) fn table_mut(&mut self, id: TableId) -> EngineResult<&mut Table> {
        self.tables
            .get_mut(id.index())
            .and_then(|t| t.as_mut())
            .map(Arc::make_mut)
            .ok_or_else(|| EngineError::TableNotFound(id.to_string()))
    }

    pub(crate) fn push_table(&mut self, table: Table) {
        let index = table.id().index();
        if self.tables.len() <= index {
            self.tables.resize(index + 1, None);
        }
        self.by_name.insert(table.name().to_string(), table.id());
        self.tables[index] = Some(Arc::new(table));
    }

    pub(crate) fn replace_table(&mut self, table: Table) {
        let index = table.id().index();
        self.by_name.insert(table.name().to_string(), table.id());
        self.tables[index] = Some(Arc::new(table));
    }

    pub(crate) fn remove_table(&mut self, id: TableId) -> Option<Arc<Table>> {
        let removed = self.tables.get_mut(id.index())?.take()?;
        self.by_name.remove(removed.name());
        Some(removed)
    }

    pub(crate) fn next_table_id(&self) -> TableId {
        TableId::new(self.tables.len() as u32)
    }

    /// Removes every reference to `target` from link columns pointing at `table_name`.
    pub(crate) fn unlink(&mut self, table_name: &str, target: RowKey, version: Version) -> EngineResult<()> {
        let ids: Vec<TableId> = self.tables().map(Table::id).collect();
        for id in ids {
            let columns: Vec<usize> = self
                .require(id)?
                .def()
                .columns
                .iter()
                .enumerate()
                .filter(|(_, c)| c.column_type.link_target() == Some(table_name))
                .map(|(i, _)| i)
                .collect();
            if columns.is_empty() {
                continue;
            }
            let references = self.require(id)?.rows().any(|(_, row)| {
                columns.iter().any(|c| match row.value(*c) {
                    Some(Value::Link(k)) => *k == target,
                    Some(Value::LinkList(keys)) => keys.contains(&target),
                    _ => false,
                })
            });
            if !references {
                continue;
            }
            let defs: Vec<ColumnType> = {
                let t = self.require(id)?;
                columns
                    .iter()
                    .map(|c| t.def().columns[*c].column_type.clone())
                    .collect()
            };
            self.table_mut(id)?.update_rows(version, |values| {
                let mut changed = false;
                for (c, ty) in columns.iter().zip(&defs) {
                    let cell = &mut values[*c];
                    let hit = match &mut *cell {
                        Value::Link(k) => *k == target && matches!(ty, ColumnType::Link { .. }),
                        Value::LinkList(keys) => {
                            let before = keys.len();
                            keys.retain(|k| *k != target);
                            keys.len() != before
                        }
                        _ => false,
                    };
                    if hit && matches!(cell, Value::Link(_)) {
                        *cell = Value::Null;
                    }
                    changed |= hit;
                }
                changed
            });
        }
        Ok(())
    }
}

fn compare_rows(a: &Row, b: &Row, spec: &SortSpec) -> Ordering {
    for (column, order) in spec.keys() {
        let (x, y) = (a.value(*column), b.value(*column));
        let ord = match (x, y) {
            (Some(x), Some(y)) => x.sort_cmp(y),
            _ => Ordering::Equal,
        };
        let ord = match order {
            SortOrder::Ascending => ord,
            SortOrder::Descending => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}
