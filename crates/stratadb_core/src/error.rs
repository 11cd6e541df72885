//! Error types for StrataDB core.

use stratadb_engine::EngineError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Problems found while deriving a schema from class descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// A class declares more than one primary-key field.
    #[error("class '{class}' declares more than one primary key")]
    DuplicatePrimaryKey {
        /// Class name.
        class: String,
    },

    /// A field has a type the store cannot hold.
    #[error("field '{class}.{field}' has unsupported type {field_type}")]
    UnsupportedFieldType {
        /// Class name.
        class: String,
        /// Field name.
        field: String,
        /// Rendered field type.
        field_type: String,
    },

    /// A link or list field names a class that is not part of the schema.
    #[error("field '{class}.{field}' links to undeclared class '{target}'")]
    DanglingLinkTarget {
        /// Class name.
        class: String,
        /// Field name.
        field: String,
        /// The missing target class.
        target: String,
    },

    /// A back-link field does not point at a forward link to its class.
    #[error("back-link '{class}.{field}' is invalid: {reason}")]
    InvalidBackLink {
        /// Class name.
        class: String,
        /// Field name.
        field: String,
        /// What is wrong with the referenced link.
        reason: String,
    },

    /// A primary key has a type other than integer or string.
    #[error("primary key '{class}.{field}' must be an integer or string")]
    InvalidPrimaryKey {
        /// Class name.
        class: String,
        /// Field name.
        field: String,
    },

    /// Two classes share a name.
    #[error("class '{class}' is declared twice")]
    DuplicateClass {
        /// Class name.
        class: String,
    },

    /// Two fields of one class share a name.
    #[error("field '{class}.{field}' is declared twice")]
    DuplicateField {
        /// Class name.
        class: String,
        /// Field name.
        field: String,
    },
}

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The declared schema is invalid.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// The stored schema differs from the declared one and no migration covers it.
    #[error("migration required at '{path}': {reason}")]
    MigrationRequired {
        /// `Class` or `Class.field` that changed.
        path: String,
        /// Description of the change.
        reason: String,
    },

    /// The migration callback failed.
    #[error("migration failed: {message}")]
    MigrationFailed {
        /// Description of the failure.
        message: String,
    },

    /// A field was written outside a write scope.
    #[error("cannot modify managed objects outside of a write transaction")]
    IllegalMutationOutsideWriteScope,

    /// A lifecycle operation needs an open write scope.
    #[error("this operation requires an open write transaction")]
    WriteScopeRequired,

    /// The writer slot could not be acquired in time.
    #[error("timed out waiting for the write lock")]
    WriteTimeout,

    /// The primary key of a managed object cannot change.
    #[error("primary key '{field}' cannot be changed after the object is managed")]
    ImmutablePrimaryKey {
        /// Primary-key field name.
        field: String,
    },

    /// A value does not match the field's type.
    #[error("type mismatch on '{column}': expected {expected}, got {actual}")]
    TypeMismatch {
        /// Column or field name.
        column: String,
        /// Expected type.
        expected: String,
        /// Actual type or value.
        actual: String,
    },

    /// Null written to a non-nullable field.
    #[error("field '{column}' is not nullable")]
    NotNullable {
        /// Column or field name.
        column: String,
    },

    /// A managed object or collection was used from a context other than its own.
    #[error("realm objects can only be accessed from the context that created them")]
    CrossContextAccess,

    /// The object's row was deleted or its realm was closed.
    #[error("object is no longer valid")]
    ObjectInvalidated,

    /// Index outside a collection's bounds.
    #[error("index {index} out of bounds for collection of size {len}")]
    IndexOutOfBounds {
        /// Requested index.
        index: usize,
        /// Collection size.
        len: usize,
    },

    /// Mutation of a read-only collection.
    #[error("{0} collections are read-only")]
    UnsupportedMutation(&'static str),

    /// A row with the same primary key already exists.
    #[error("primary key {value} already exists in '{class}'")]
    PrimaryKeyConflict {
        /// Class name.
        class: String,
        /// Rendered primary-key value.
        value: String,
    },

    /// An update-or-insert was requested for a class without a primary key.
    #[error("class '{class}' has no primary key")]
    NoPrimaryKey {
        /// Class name.
        class: String,
    },

    /// The class is not part of this realm's schema.
    #[error("class '{class}' is not part of the schema")]
    ClassNotFound {
        /// Class name.
        class: String,
    },

    /// The field does not exist on the class.
    #[error("class '{class}' has no field '{field}'")]
    FieldNotFound {
        /// Class name.
        class: String,
        /// Field name.
        field: String,
    },

    /// The realm was closed.
    #[error("realm is closed")]
    RealmClosed,

    /// Invalid operation.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },

    /// Any other engine failure.
    #[error("engine error: {0}")]
    Engine(#[source] EngineError),
}

impl CoreError {
    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates a migration failed error.
    pub fn migration_failed(message: impl Into<String>) -> Self {
        Self::MigrationFailed {
            message: message.into(),
        }
    }

    /// Creates a type mismatch error.
    pub fn type_mismatch(
        column: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            column: column.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Creates a field-not-found error.
    pub fn field_not_found(class: impl Into<String>, field: impl Into<String>) -> Self {
        Self::FieldNotFound {
            class: class.into(),
            field: field.into(),
        }
    }
}

impl From<EngineError> for CoreError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::TypeMismatch {
                column,
                expected,
                actual,
            } => Self::TypeMismatch {
                column,
                expected,
                actual,
            },
            EngineError::NotNullable { column } => Self::NotNullable { column },
            EngineError::WriteTimeout => Self::WriteTimeout,
            EngineError::DuplicatePrimaryKey { table, value } => Self::PrimaryKeyConflict {
                class: table,
                value,
            },
            EngineError::NoPrimaryKey { table } => Self::NoPrimaryKey { class: table },
            EngineError::WriterHeldByCurrentThread => {
                Self::invalid_operation("a write transaction is already open on this thread")
            }
            other => Self::Engine(other),
        }
    }
}
