//! Diffing a stored schema against a declared one.

use super::types::{ClassSpec, FieldType, Schema};
use std::fmt;

/// One structural difference between the stored and declared schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationStep {
    /// A class is declared but not stored.
    AddClass {
        /// Class name.
        class: String,
    },
    /// A field is declared but not stored.
    AddField {
        /// Class name.
        class: String,
        /// Field name.
        field: String,
        /// Whether the new field is nullable.
        nullable: bool,
    },
    /// A stored field is no longer declared.
    RemoveField {
        /// Class name.
        class: String,
        /// Field name.
        field: String,
    },
    /// A field's type changed.
    ChangeFieldType {
        /// Class name.
        class: String,
        /// Field name.
        field: String,
        /// Stored type.
        from: FieldType,
        /// Declared type.
        to: FieldType,
    },
    /// A field's nullability changed.
    ChangeNullability {
        /// Class name.
        class: String,
        /// Field name.
        field: String,
        /// Declared nullability.
        nullable: bool,
    },
    /// A field gained or lost its index.
    ChangeIndex {
        /// Class name.
        class: String,
        /// Field name.
        field: String,
        /// Declared indexing.
        indexed: bool,
    },
    /// The primary key moved to another field or was added or removed.
    ChangePrimaryKey {
        /// Class name.
        class: String,
        /// Stored primary key.
        from: Option<String>,
        /// Declared primary key.
        to: Option<String>,
    },
}

impl MigrationStep {
    /// Returns the `Class` or `Class.field` path the step affects.
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            MigrationStep::AddClass { class } | MigrationStep::ChangePrimaryKey { class, .. } => {
                class.clone()
            }
            MigrationStep::AddField { class, field, .. }
            | MigrationStep::RemoveField { class, field }
            | MigrationStep::ChangeFieldType { class, field, .. }
            | MigrationStep::ChangeNullability { class, field, .. }
            | MigrationStep::ChangeIndex { class, field, .. } => format!("{class}.{field}"),
        }
    }

    /// Returns the class the step affects.
    #[must_use]
    pub fn class(&self) -> &str {
        match self {
            MigrationStep::AddClass { class }
            | MigrationStep::ChangePrimaryKey { class, .. }
            | MigrationStep::AddField { class, .. }
            | MigrationStep::RemoveField { class, .. }
            | MigrationStep::ChangeFieldType { class, .. }
            | MigrationStep::ChangeNullability { class, .. }
            | MigrationStep::ChangeIndex { class, .. } => class,
        }
    }

    /// Returns true if the step loses or reinterprets no stored data.
    #[must_use]
    pub fn is_additive(&self) -> bool {
        match self {
            MigrationStep::AddClass { .. } | MigrationStep::ChangeIndex { .. } => true,
            MigrationStep::AddField { nullable, .. } => *nullable,
            _ => false,
        }
    }
}

impl fmt::Display for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationStep::AddClass { .. } => f.write_str("class added"),
            MigrationStep::AddField { nullable: true, .. } => f.write_str("nullable field added"),
            MigrationStep::AddField { nullable: false, .. } => {
                f.write_str("non-nullable field added")
            }
            MigrationStep::RemoveField { .. } => f.write_str("field removed"),
            MigrationStep::ChangeFieldType { from, to, .. } => {
                write!(f, "type changed from {from} to {to}")
            }
            MigrationStep::ChangeNullability { nullable: true, .. } => {
                f.write_str("field became nullable")
            }
            MigrationStep::ChangeNullability { nullable: false, .. } => {
                f.write_str("field became required")
            }
            MigrationStep::ChangeIndex { indexed: true, .. } => f.write_str("index added"),
            MigrationStep::ChangeIndex { indexed: false, .. } => f.write_str("index removed"),
            MigrationStep::ChangePrimaryKey { from, to, .. } => write!(
                f,
                "primary key changed from {} to {}",
                from.as_deref().unwrap_or("none"),
                to.as_deref().unwrap_or("none")
            ),
        }
    }
}

/// The ordered steps that take a stored schema to a declared one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationPlan {
    steps: Vec<MigrationStep>,
}

impl MigrationPlan {
    /// Returns the steps.
    #[must_use]
    pub fn steps(&self) -> &[MigrationStep] {
        &self.steps
    }

    /// Returns true if the schemas match.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Returns true if every step is additive.
    #[must_use]
    pub fn is_additive(&self) -> bool {
        self.steps.iter().all(MigrationStep::is_additive)
    }

    /// Returns the first step that needs an explicit migration.
    #[must_use]
    pub fn first_blocking(&self) -> Option<&MigrationStep> {
        self.steps.iter().find(|s| !s.is_additive())
    }

    /// Returns true if any step touches `class`.
    #[must_use]
    pub fn touches(&self, class: &str) -> bool {
        self.steps.iter().any(|s| s.class() == class)
    }
}

/// Diffs the stored schema against the declared one.
///
/// Only stored fields are compared: back-links live in the declared schema
/// alone. Stored classes that are no longer declared are left as they are.
/// Field order does not matter; fields are matched by name.
#[must_use]
pub fn reconcile(existing: &Schema, declared: &Schema) -> MigrationPlan {
    let mut steps = Vec::new();
    for class in declared.classes() {
        match existing.class(&class.name) {
            None => steps.push(MigrationStep::AddClass {
                class: class.name.clone(),
            }),
            Some(stored) => diff_class(stored, class, &mut steps),
        }
    }
    MigrationPlan { steps }
}

fn diff_class(stored: &ClassSpec, declared: &ClassSpec, steps: &mut Vec<MigrationStep>) {
    let class = &declared.name;
    let stored_pk = stored.primary_key().map(|f| f.name.clone());
    let declared_pk = declared.primary_key().map(|f| f.name.clone());
    if stored_pk != declared_pk {
        steps.push(MigrationStep::ChangePrimaryKey {
            class: class.clone(),
            from: stored_pk,
            to: declared_pk,
        });
    }

    for field in declared.persisted_fields() {
        let Some(old) = stored.field(&field.name) else {
            steps.push(MigrationStep::AddField {
                class: class.clone(),
                field: field.name.clone(),
                nullable: field.nullable,
            });
            continue;
        };
        if old.field_type != field.field_type {
            steps.push(MigrationStep::ChangeFieldType {
                class: class.clone(),
                field: field.name.clone(),
                from: old.field_type.clone(),
                to: field.field_type.clone(),
            });
            continue;
        }
        if old.nullable != field.nullable {
            steps.push(MigrationStep::ChangeNullability {
                class: class.clone(),
                field: field.name.clone(),
                nullable: field.nullable,
            });
        }
        if old.indexed != field.indexed {
            steps.push(MigrationStep::ChangeIndex {
                class: class.clone(),
                field: field.name.clone(),
                indexed: field.indexed,
            });
        }
    }

    for old in stored.persisted_fields() {
        if declared.field(&old.name).map_or(true, |f| !f.field_type.is_persisted()) {
            steps.push(MigrationStep::RemoveField {
                class: class.clone(),
                field: old.name.clone(),
            });
        }
    }
}
