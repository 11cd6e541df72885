//! Schema versioning and migration callbacks.
//!
//! When the declared schema differs from the stored one in a way that
//! loses or reinterprets data, opening a realm requires a higher schema
//! version and a [`Migration`]. The migration runs inside the same write
//! transaction that rewrites the tables, so a failing migration leaves the
//! store untouched.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use stratadb_core::{Config, MigrationContext, Value};
//!
//! let config = Config::new()
//!     .model::<Person>()
//!     .schema_version(2)
//!     .migration(|ctx: &mut MigrationContext<'_>| {
//!         ctx.rename_field("Person", "fullName", "name");
//!         ctx.transform("Person", "age", |old| {
//!             let years = old.get("birthYear").and_then(Value::as_int).unwrap_or(2000);
//!             Ok(Value::Int(2024 - years))
//!         });
//!         Ok(())
//!     });
//! ```

use super::reconcile::{reconcile, MigrationPlan};
use super::types::Schema;
use crate::error::{CoreError, CoreResult};
use std::collections::HashMap;
use stratadb_engine::{RowKey, RowView, Snapshot, TableId, Value, WriteTransaction};
use tracing::{debug, info};

/// A user-supplied schema migration.
pub trait Migration: Send + Sync {
    /// Registers transformations for the data of the previous schema.
    ///
    /// Called once, before any table is rewritten.
    fn migrate(&self, ctx: &mut MigrationContext<'_>) -> CoreResult<()>;
}

impl<F> Migration for F
where
    F: Fn(&mut MigrationContext<'_>) -> CoreResult<()> + Send + Sync,
{
    fn migrate(&self, ctx: &mut MigrationContext<'_>) -> CoreResult<()> {
        self(ctx)
    }
}

/// An operation recorded during a migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOperation {
    /// A field value converter was registered.
    Transform {
        /// Class name.
        class: String,
        /// Field name.
        field: String,
    },
    /// A field was renamed.
    RenameField {
        /// Class name.
        class: String,
        /// Stored field name.
        from: String,
        /// Declared field name.
        to: String,
    },
    /// A stored class was deleted.
    DeleteClass {
        /// Class name.
        class: String,
    },
}

/// Read-only view of one object as stored under the previous schema.
#[derive(Debug, Clone, Copy)]
pub struct OldObject<'s> {
    view: RowView<'s>,
}

impl<'s> OldObject<'s> {
    /// Returns the stored row key.
    #[must_use]
    pub fn key(&self) -> RowKey {
        self.view.key()
    }

    /// Returns a field value by its stored name.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&'s Value> {
        self.view.get_named(field)
    }
}

type Transform<'a> = Box<dyn Fn(&OldObject<'_>) -> CoreResult<Value> + 'a>;

/// What a migration callback can see and register.
pub struct MigrationContext<'a> {
    old_version: u64,
    new_version: u64,
    plan: &'a MigrationPlan,
    old_schema: &'a Schema,
    new_schema: &'a Schema,
    old: &'a Snapshot,
    transforms: HashMap<(String, String), Transform<'a>>,
    renames: HashMap<(String, String), String>,
    deleted: Vec<String>,
    operations: Vec<MigrationOperation>,
}

impl<'a> MigrationContext<'a> {
    /// Returns the stored schema version.
    #[must_use]
    pub fn old_version(&self) -> u64 {
        self.old_version
    }

    /// Returns the declared schema version.
    #[must_use]
    pub fn new_version(&self) -> u64 {
        self.new_version
    }

    /// Returns the structural differences being migrated.
    #[must_use]
    pub fn plan(&self) -> &MigrationPlan {
        self.plan
    }

    /// Returns the stored schema.
    #[must_use]
    pub fn old_schema(&self) -> &Schema {
        self.old_schema
    }

    /// Returns the declared schema.
    #[must_use]
    pub fn new_schema(&self) -> &Schema {
        self.new_schema
    }

    /// Returns the operations registered so far.
    #[must_use]
    pub fn operations(&self) -> &[MigrationOperation] {
        &self.operations
    }

    /// Returns the number of stored objects of `class`.
    #[must_use]
    pub fn count(&self, class: &str) -> usize {
        self.old.table_by_name(class).map_or(0, |t| t.len())
    }

    /// Visits every stored object of `class` in table order.
    pub fn enumerate<F>(&self, class: &str, mut f: F) -> CoreResult<()>
    where
        F: FnMut(&OldObject<'_>) -> CoreResult<()>,
    {
        let table = self
            .old
            .table_by_name(class)
            .ok_or_else(|| CoreError::ClassNotFound {
                class: class.to_string(),
            })?;
        for (key, _) in table.rows() {
            let view = self.view(table.id(), key)?;
            f(&OldObject { view })?;
        }
        Ok(())
    }

    fn view(&self, table: TableId, key: RowKey) -> CoreResult<RowView<'a>> {
        self.old
            .row_view(table, key)
            .ok_or_else(|| CoreError::migration_failed(format!("row {key} vanished")))
    }

    /// Computes the new value of `class.field` for every stored object.
    ///
    /// The closure sees the object as stored; its result is validated against
    /// the declared field type.
    pub fn transform<F>(&mut self, class: &str, field: &str, f: F)
    where
        F: Fn(&OldObject<'_>) -> CoreResult<Value> + 'a,
    {
        self.operations.push(MigrationOperation::Transform {
            class: class.to_string(),
            field: field.to_string(),
        });
        self.transforms
            .insert((class.to_string(), field.to_string()), Box::new(f));
    }

    /// Carries the stored values of `from` over into the declared field `to`.
    pub fn rename_field(&mut self, class: &str, from: &str, to: &str) {
        self.operations.push(MigrationOperation::RenameField {
            class: class.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        });
        self.renames
            .insert((class.to_string(), to.to_string()), from.to_string());
    }

    /// Drops a stored class that is no longer declared.
    pub fn delete_class(&mut self, class: &str) {
        self.operations.push(MigrationOperation::DeleteClass {
            class: class.to_string(),
        });
        self.deleted.push(class.to_string());
    }
}

/// Rewrites the stored tables to match `declared`, running `migration` first.
pub(crate) fn apply(
    txn: &mut WriteTransaction,
    declared: &Schema,
    migration: Option<&dyn Migration>,
    new_version: u64,
) -> CoreResult<()> {
    let old = txn.snapshot().clone();
    let old_schema = Schema::from_snapshot(&old);
    let plan = reconcile(&old_schema, declared);
    let mut ctx = MigrationContext {
        old_version: old.schema_version(),
        new_version,
        plan: &plan,
        old_schema: &old_schema,
        new_schema: declared,
        old: &old,
        transforms: HashMap::new(),
        renames: HashMap::new(),
        deleted: Vec::new(),
        operations: Vec::new(),
    };
    if let Some(migration) = migration {
        info!(
            from = ctx.old_version,
            to = new_version,
            steps = plan.steps().len(),
            "running migration"
        );
        migration.migrate(&mut ctx)?;
    }

    for class in declared.classes() {
        let Some(stored) = old.table_by_name(&class.name) else {
            debug!(class = %class.name, "creating class");
            txn.create_table(class.table_def(None))?;
            continue;
        };
        let def = class.table_def(Some(stored.def()));
        let transformed = ctx.transforms.keys().any(|(c, _)| *c == class.name);
        if def == *stored.def() && !transformed {
            continue;
        }
        debug!(class = %class.name, rows = stored.len(), "rewriting class");
        let mut rows = Vec::with_capacity(stored.len());
        for (key, row) in stored.rows() {
            let object = OldObject {
                view: ctx.view(stored.id(), key)?,
            };
            let mut values = Vec::with_capacity(def.columns.len());
            for column in &def.columns {
                let path = (class.name.clone(), column.name.clone());
                if let Some(transform) = ctx.transforms.get(&path) {
                    values.push(transform(&object)?);
                    continue;
                }
                let source = ctx.renames.get(&path).unwrap_or(&column.name);
                let carried = stored
                    .def()
                    .column_index(source)
                    .filter(|i| stored.def().columns[*i].column_type == column.column_type)
                    .and_then(|i| row.value(i))
                    .filter(|v| !v.is_null() || column.nullable || column.column_type.link_target().is_some());
                values.push(carried.cloned().unwrap_or_else(|| column.initial_value()));
            }
            rows.push((key, values));
        }
        txn.replace_table(stored.id(), def, rows)?;
    }

    for class in &ctx.deleted {
        if declared.class(class).is_some() {
            return Err(CoreError::migration_failed(format!(
                "cannot delete declared class '{class}'"
            )));
        }
        if let Some(id) = txn.snapshot().table_id(class) {
            debug!(%class, "deleting class");
            txn.drop_table(id)?;
        }
    }

    txn.set_schema_version(new_version)?;
    Ok(())
}
