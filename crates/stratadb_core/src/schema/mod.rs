//! Schema model: declared classes, derived schemas, reconciliation and migration.

mod derive;
mod descriptor;
mod migration;
mod reconcile;
mod types;

pub use derive::derive_schema;
pub(crate) use descriptor::ClassInfo;
pub use descriptor::{ClassDescriptor, FieldDescriptor};
pub(crate) use migration::apply as apply_migration;
pub use migration::{Migration, MigrationContext, MigrationOperation, OldObject};
pub use reconcile::{reconcile, MigrationPlan, MigrationStep};
pub use types::{ClassSpec, FieldSpec, FieldType, Schema};
