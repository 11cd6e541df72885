//! Row handles and the typed row accessor.
//!
//! Every read and write of a managed field passes through [`RowAccessor`].
//! The accessor never caches liveness: each call resolves the row against
//! the realm's current snapshot, so a deleted row fails with
//! [`CoreError::ObjectInvalidated`] instead of aliasing another row.

use crate::error::{CoreError, CoreResult};
use crate::realm::Realm;
use crate::value::FieldValue;
use std::fmt;
use stratadb_engine::{EngineError, RowKey, StoreId, TableId, Value};

/// Identity of one row: store, table and stable row key.
///
/// Keys are never reused within a store, so a handle to a deleted row can
/// never resolve to a different row later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowHandle {
    store: StoreId,
    table: TableId,
    key: RowKey,
}

impl RowHandle {
    pub(crate) fn new(store: StoreId, table: TableId, key: RowKey) -> Self {
        Self { store, table, key }
    }

    /// Returns the store the row lives in.
    #[must_use]
    pub fn store(&self) -> StoreId {
        self.store
    }

    /// Returns the table.
    #[must_use]
    pub fn table(&self) -> TableId {
        self.table
    }

    /// Returns the row key.
    #[must_use]
    pub fn key(&self) -> RowKey {
        self.key
    }
}

impl fmt::Display for RowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.table, self.key)
    }
}

/// Typed get/set primitives on one row, keyed by column index.
pub struct RowAccessor<'r> {
    realm: &'r Realm,
    row: RowHandle,
}

impl<'r> RowAccessor<'r> {
    /// Binds an accessor to a row of `realm`'s store.
    pub fn new(realm: &'r Realm, row: RowHandle) -> CoreResult<Self> {
        if row.store != realm.store_id() {
            return Err(CoreError::invalid_operation(
                "row handle belongs to a different store",
            ));
        }
        Ok(Self { realm, row })
    }

    /// Returns the row handle.
    #[must_use]
    pub fn row(&self) -> RowHandle {
        self.row
    }

    /// Checks that the row exists in the realm's current snapshot.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.realm
            .read(|snap| snap.contains(self.row.table, self.row.key))
            .unwrap_or(false)
    }

    fn map_err(&self, err: EngineError) -> CoreError {
        match err {
            EngineError::RowNotFound { table, key }
                if table == self.row.table && key == self.row.key =>
            {
                CoreError::ObjectInvalidated
            }
            other => other.into(),
        }
    }

    /// Reads a raw column value.
    pub fn get_value(&self, column: usize) -> CoreResult<Value> {
        self.realm
            .read(|snap| snap.get(self.row.table, self.row.key, column).cloned())?
            .map_err(|e| self.map_err(e))
    }

    /// Reads a column as `T`.
    ///
    /// # Errors
    ///
    /// `TypeMismatch` if the stored value is of another type or does not fit `T`.
    pub fn get<T: FieldValue>(&self, column: usize) -> CoreResult<T> {
        let (value, name) = self
            .realm
            .read(|snap| {
                let value = snap.get(self.row.table, self.row.key, column)?.clone();
                let name = snap
                    .table(self.row.table)
                    .and_then(|t| t.def().columns.get(column))
                    .map(|c| c.name.clone())
                    .unwrap_or_default();
                Ok::<_, EngineError>((value, name))
            })?
            .map_err(|e| self.map_err(e))?;
        T::from_value(&value, &name)
    }

    /// Writes a raw column value.
    ///
    /// # Errors
    ///
    /// - `IllegalMutationOutsideWriteScope` if no write scope is open
    /// - `TypeMismatch` / `NotNullable` if the store rejects the value
    pub fn set_value(&self, column: usize, value: Value) -> CoreResult<()> {
        self.realm
            .write_op(|txn| txn.set(self.row.table, self.row.key, column, value))?
            .map_err(|e| self.map_err(e))
    }

    /// Writes a column from `T`.
    pub fn set<T: FieldValue>(&self, column: usize, value: T) -> CoreResult<()> {
        self.set_value(column, value.into_value())
    }
}

impl fmt::Debug for RowAccessor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowAccessor").field("row", &self.row).finish()
    }
}
