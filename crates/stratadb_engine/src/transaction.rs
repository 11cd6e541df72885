//! Write transactions.

use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};
use crate::snapshot::Snapshot;
use crate::table::{Row, Table, TableDef};
use crate::types::{RowKey, TableId, Version};
use crate::value::{ColumnType, Value};
use std::sync::Arc;
use tracing::{debug, trace};

/// State of a write transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is active and can perform operations.
    Active,
    /// Transaction has been committed.
    Committed,
    /// Transaction has been rolled back.
    RolledBack,
}

/// The single active write transaction of an engine.
///
/// Holds the engine's writer slot for its whole lifetime and mutates a
/// private copy-on-write snapshot. Nothing is visible to other readers until
/// [`commit`](Self::commit); dropping an active transaction rolls it back.
pub struct WriteTransaction {
    engine: Arc<Engine>,
    working: Snapshot,
    version: Version,
    state: TransactionState,
}

impl WriteTransaction {
    pub(crate) fn new(engine: Arc<Engine>, base: Snapshot) -> Self {
        let version = base.version().next();
        Self {
            engine,
            working: base,
            version,
            state: TransactionState::Active,
        }
    }

    /// Returns the working snapshot, including uncommitted writes.
    #[must_use]
    pub fn snapshot(&self) -> &Snapshot {
        &self.working
    }

    /// Returns the version this transaction commits as.
    #[must_use]
    pub fn version(&self) -> Version {
        self.version
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Checks if the transaction is still active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    fn ensure_active(&self) -> EngineResult<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(EngineError::TransactionClosed)
        }
    }

    /// Creates an empty table.
    pub fn create_table(&mut self, def: TableDef) -> EngineResult<TableId> {
        self.ensure_active()?;
        if self.working.table_id(&def.name).is_some() {
            return Err(EngineError::TableExists(def.name));
        }
        let id = self.engine.reserve_table(self.working.next_table_id());
        debug!(table = %def.name, %id, "creating table");
        self.working.push_table(Table::new(id, def));
        Ok(id)
    }

    /// Replaces a table's definition and rows, keeping its ID.
    ///
    /// Row keys are preserved so links into the table survive; the key
    /// counter never moves backwards.
    pub fn replace_table(
        &mut self,
        id: TableId,
        def: TableDef,
        rows: Vec<(RowKey, Vec<Value>)>,
    ) -> EngineResult<()> {
        self.ensure_active()?;
        let old = self
            .working
            .table(id)
            .ok_or_else(|| EngineError::TableNotFound(id.to_string()))?;
        let next_key = old.next_key();
        let old_name = old.name().to_string();
        let version = self.version;
        let rows = rows
            .into_iter()
            .map(|(key, values)| (key, Row::new(values, version)))
            .collect();
        let table = Table::from_parts(id, def, rows, next_key)?;
        debug!(table = %table.name(), %id, rows = table.len(), "replacing table");
        if old_name != table.name() {
            self.working.remove_table(id);
        }
        self.working.replace_table(table);
        Ok(())
    }

    /// Drops a table. Its ID is never reused.
    pub fn drop_table(&mut self, id: TableId) -> EngineResult<()> {
        self.ensure_active()?;
        let removed = self
            .working
            .remove_table(id)
            .ok_or_else(|| EngineError::TableNotFound(id.to_string()))?;
        debug!(table = %removed.name(), %id, "dropped table");
        Ok(())
    }

    /// Records the application schema version.
    pub fn set_schema_version(&mut self, schema_version: u64) -> EngineResult<()> {
        self.ensure_active()?;
        self.working.set_schema_version(schema_version);
        Ok(())
    }

    /// Allocates a new row filled with column defaults.
    ///
    /// Tables with a primary key require its value up front; it is checked
    /// for uniqueness before the row becomes visible in the working snapshot.
    pub fn create_row(&mut self, table: TableId, primary_key: Option<Value>) -> EngineResult<RowKey> {
        self.ensure_active()?;
        let version = self.version;
        let t = self.working.table_mut(table)?;
        let mut values: Vec<Value> = t.def().columns.iter().map(|c| c.initial_value()).collect();
        match (t.def().primary_key_index(), primary_key) {
            (Some(pk), Some(value)) => {
                t.validate(pk, &value)?;
                values[pk] = value;
            }
            (Some(_), None) => {
                return Err(EngineError::MissingPrimaryKey {
                    table: t.name().to_string(),
                })
            }
            (None, Some(_)) => {
                return Err(EngineError::NoPrimaryKey {
                    table: t.name().to_string(),
                })
            }
            (None, None) => {}
        }
        let key = t.insert_row(values, version)?;
        self.engine.reserve_key(table, key.as_u64() + 1);
        trace!(%table, %key, "created row");
        Ok(key)
    }

    /// Deletes a row and removes every link pointing at it.
    pub fn delete_row(&mut self, table: TableId, key: RowKey) -> EngineResult<()> {
        self.ensure_active()?;
        let version = self.version;
        let t = self.working.table_mut(table)?;
        let name = t.name().to_string();
        t.remove_row(key)
            .ok_or(EngineError::RowNotFound { table, key })?;
        self.working.unlink(&name, key, version)?;
        trace!(%table, %key, "deleted row");
        Ok(())
    }

    /// Writes one cell.
    ///
    /// Link values must reference existing rows of the column's target table.
    pub fn set(&mut self, table: TableId, key: RowKey, column: usize, value: Value) -> EngineResult<()> {
        self.ensure_active()?;
        let column_type = self
            .working
            .table(table)
            .ok_or_else(|| EngineError::TableNotFound(table.to_string()))?
            .def()
            .columns
            .get(column)
            .map(|c| c.column_type.clone())
            .ok_or(EngineError::ColumnOutOfRange { table, column })?;
        if let ColumnType::Link { target } | ColumnType::LinkList { target } = &column_type {
            let target_id = self
                .working
                .table_id(target)
                .ok_or_else(|| EngineError::TableNotFound(target.clone()))?;
            let missing = match &value {
                Value::Link(k) => (!self.working.contains(target_id, *k)).then_some(*k),
                Value::LinkList(keys) => keys
                    .iter()
                    .find(|k| !self.working.contains(target_id, **k))
                    .copied(),
                _ => None,
            };
            if let Some(k) = missing {
                return Err(EngineError::RowNotFound {
                    table: target_id,
                    key: k,
                });
            }
        }
        let version = self.version;
        self.working
            .table_mut(table)?
            .set_value(key, column, value, version)
    }

    /// Commits the transaction, publishing a new version.
    ///
    /// After this returns, the changes are visible to every new reader and
    /// the writer slot is free.
    pub fn commit(mut self) -> EngineResult<Version> {
        self.ensure_active()?;
        let mut snapshot = std::mem::replace(&mut self.working, Snapshot::empty());
        snapshot.set_version(self.version);
        self.state = TransactionState::Committed;
        self.engine.publish(snapshot)
    }

    /// Discards every change and frees the writer slot.
    pub fn rollback(mut self) {
        self.abandon();
    }

    fn abandon(&mut self) {
        if self.is_active() {
            self.state = TransactionState::RolledBack;
            debug!(version = %self.version, "rolled back write transaction");
            self.engine.release_writer();
        }
    }
}

impl Drop for WriteTransaction {
    fn drop(&mut self) {
        self.abandon();
    }
}

impl std::fmt::Debug for WriteTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteTransaction")
            .field("version", &self.version)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::ColumnDef;
    use proptest::prelude::*;

    fn setup() -> (Arc<Engine>, TableId, TableId) {
        let engine = Engine::in_memory();
        let mut txn = engine.begin_write(None).unwrap();
        let dog = txn
            .create_table(TableDef::new("Dog").column(ColumnDef::new("name", ColumnType::String)))
            .unwrap();
        let person = txn
            .create_table(
                TableDef::new("Person")
                    .column(ColumnDef::new("id", ColumnType::Int))
                    .column(ColumnDef::new(
                        "dog",
                        ColumnType::Link {
                            target: "Dog".into(),
                        },
                    ))
                    .column(ColumnDef::new(
                        "dogs",
                        ColumnType::LinkList {
                            target: "Dog".into(),
                        },
                    ))
                    .primary_key("id"),
            )
            .unwrap();
        txn.commit().unwrap();
        (engine, dog, person)
    }

    #[test]
    fn create_row_requires_primary_key() {
        let (engine, _, person) = setup();
        let mut txn = engine.begin_write(None).unwrap();
        assert!(matches!(
            txn.create_row(person, None),
            Err(EngineError::MissingPrimaryKey { .. })
        ));
        let key = txn.create_row(person, Some(Value::Int(1))).unwrap();
        assert!(txn.snapshot().contains(person, key));
    }

    #[test]
    fn delete_nullifies_links() {
        let (engine, dog, person) = setup();
        let mut txn = engine.begin_write(None).unwrap();
        let rex = txn.create_row(dog, None).unwrap();
        let ann = txn.create_row(person, Some(Value::Int(1))).unwrap();
        txn.set(person, ann, 1, Value::Link(rex)).unwrap();
        txn.set(person, ann, 2, Value::LinkList(vec![rex, rex])).unwrap();
        txn.commit().unwrap();

        let mut txn = engine.begin_write(None).unwrap();
        txn.delete_row(dog, rex).unwrap();
        txn.commit().unwrap();

        let snap = engine.latest();
        assert_eq!(snap.get(person, ann, 1).unwrap(), &Value::Null);
        assert_eq!(snap.get(person, ann, 2).unwrap(), &Value::LinkList(vec![]));
    }

    #[test]
    fn link_to_missing_row_rejected() {
        let (engine, _, person) = setup();
        let mut txn = engine.begin_write(None).unwrap();
        let ann = txn.create_row(person, Some(Value::Int(1))).unwrap();
        assert!(matches!(
            txn.set(person, ann, 1, Value::Link(RowKey::new(42))),
            Err(EngineError::RowNotFound { .. })
        ));
    }

    #[test]
    fn rollback_discards_changes() {
        let (engine, dog, _) = setup();
        let before = engine.current_version();
        let mut txn = engine.begin_write(None).unwrap();
        txn.create_row(dog, None).unwrap();
        txn.rollback();
        assert_eq!(engine.current_version(), before);
        assert_eq!(engine.latest().keys(dog).unwrap().len(), 0);
    }

    #[test]
    fn drop_releases_writer() {
        let (engine, dog, _) = setup();
        {
            let mut txn = engine.begin_write(None).unwrap();
            txn.create_row(dog, None).unwrap();
        }
        assert!(!engine.is_write_locked());
        let txn = engine.begin_write(None).unwrap();
        txn.commit().unwrap();
    }

    #[test]
    fn rolled_back_keys_are_not_reused() {
        let (engine, dog, _) = setup();
        let mut txn = engine.begin_write(None).unwrap();
        let discarded = txn.create_row(dog, None).unwrap();
        txn.rollback();

        let mut txn = engine.begin_write(None).unwrap();
        let kept = txn.create_row(dog, None).unwrap();
        assert_ne!(discarded, kept);
    }

    #[test]
    fn readers_keep_their_snapshot() {
        let (engine, dog, _) = setup();
        let reader = engine.latest();
        let mut txn = engine.begin_write(None).unwrap();
        txn.create_row(dog, None).unwrap();
        txn.commit().unwrap();
        assert_eq!(reader.keys(dog).unwrap().len(), 0);
        assert_eq!(engine.latest().keys(dog).unwrap().len(), 1);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn deleting_targets_leaves_no_dangling_links(
            picks in prop::collection::vec(0_usize..5, 0..10),
            doomed in prop::collection::vec(any::<bool>(), 5),
        ) {
            let (engine, dog, person) = setup();
            let mut txn = engine.begin_write(None).unwrap();
            let dogs: Vec<RowKey> = (0..5).map(|_| txn.create_row(dog, None).unwrap()).collect();
            let owner = txn.create_row(person, Some(Value::Int(1))).unwrap();
            let linked: Vec<RowKey> = picks.iter().map(|i| dogs[*i]).collect();
            txn.set(person, owner, 1, Value::Link(dogs[0])).unwrap();
            txn.set(person, owner, 2, Value::LinkList(linked.clone())).unwrap();
            for (key, gone) in dogs.iter().zip(&doomed) {
                if *gone {
                    txn.delete_row(dog, *key).unwrap();
                }
            }
            txn.commit().unwrap();

            let snap = engine.latest();
            let survivors: Vec<RowKey> = linked
                .into_iter()
                .filter(|k| snap.contains(dog, *k))
                .collect();
            prop_assert_eq!(snap.get(person, owner, 2).unwrap(), &Value::LinkList(survivors));
            let single = if doomed[0] { Value::Null } else { Value::Link(dogs[0]) };
            prop_assert_eq!(snap.get(person, owner, 1).unwrap(), &single);
        }
    }
}
