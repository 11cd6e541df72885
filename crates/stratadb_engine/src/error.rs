//! Error types for engine operations.

use crate::types::{RowKey, TableId};
use std::io;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur in engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// An I/O error occurred while persisting or loading a snapshot.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The persisted snapshot could not be encoded or decoded.
    #[error("snapshot encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// The table does not exist in this snapshot.
    #[error("table not found: {0}")]
    TableNotFound(String),

    /// A table with this name already exists.
    #[error("table already exists: {0}")]
    TableExists(String),

    /// The row does not exist (deleted, or never existed in this snapshot).
    #[error("row {key} not found in {table}")]
    RowNotFound {
        /// The table searched.
        table: TableId,
        /// The missing row key.
        key: RowKey,
    },

    /// Column index is out of range for the table.
    #[error("column {column} out of range for {table}")]
    ColumnOutOfRange {
        /// The table addressed.
        table: TableId,
        /// The requested column index.
        column: usize,
    },

    /// The value does not match the column's type.
    #[error("type mismatch on column '{column}': expected {expected}, got {actual}")]
    TypeMismatch {
        /// Column name.
        column: String,
        /// Expected type name.
        expected: String,
        /// Actual type name.
        actual: String,
    },

    /// Null written to a non-nullable column.
    #[error("column '{column}' is not nullable")]
    NotNullable {
        /// Column name.
        column: String,
    },

    /// A row with the same primary key already exists.
    #[error("duplicate primary key {value} in table '{table}'")]
    DuplicatePrimaryKey {
        /// Table name.
        table: String,
        /// Rendered primary key value.
        value: String,
    },

    /// A row was created without the table's primary-key value.
    #[error("table '{table}' requires a primary key value")]
    MissingPrimaryKey {
        /// Table name.
        table: String,
    },

    /// A primary-key value was supplied for a table without a primary key.
    #[error("table '{table}' has no primary key")]
    NoPrimaryKey {
        /// Table name.
        table: String,
    },

    /// The calling thread already holds the writer slot.
    #[error("write transaction already open on this thread")]
    WriterHeldByCurrentThread,

    /// The exclusive writer slot could not be acquired in time.
    #[error("timed out waiting for the write lock")]
    WriteTimeout,

    /// The transaction was already committed or rolled back.
    #[error("transaction is no longer active")]
    TransactionClosed,
}

impl EngineError {
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

    /// Creates a not-nullable error.
    pub fn not_nullable(column: impl Into<String>) -> Self {
        Self::NotNullable {
            column: column.into(),
        }
    }
}
