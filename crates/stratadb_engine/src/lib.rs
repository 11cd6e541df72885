//! # StrataDB Engine
//!
//! Versioned row store underneath StrataDB.
//!
//! The engine knows nothing about application types. It stores named
//! tables of typed columns, hands out immutable snapshots, and serializes
//! writers through a single exclusive slot.
//!
//! ## Design Principles
//!
//! - Every commit produces a strictly increasing [`Version`]
//! - Snapshots are immutable and cheap to clone (tables are shared copy-on-write)
//! - Row keys are stable for the lifetime of a row and never reused
//! - Deleting a row removes every link that pointed at it
//! - At most one [`WriteTransaction`] exists at a time
//!
//! ## Example
//!
//! ```rust
//! use stratadb_engine::{ColumnDef, ColumnType, Engine, TableDef, Value};
//!
//! let engine = Engine::in_memory();
//! let mut txn = engine.begin_write(None).unwrap();
//! let dogs = txn
//!     .create_table(TableDef::new("Dog").column(ColumnDef::new("name", ColumnType::String)))
//!     .unwrap();
//! let rex = txn.create_row(dogs, None).unwrap();
//! txn.set(dogs, rex, 0, Value::String("Rex".into())).unwrap();
//! txn.commit().unwrap();
//!
//! let snapshot = engine.latest();
//! assert_eq!(snapshot.get(dogs, rex, 0).unwrap().as_str(), Some("Rex"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod engine;
mod error;
mod feed;
mod persist;
mod snapshot;
mod table;
mod transaction;
mod types;
mod value;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{EngineError, EngineResult};
pub use feed::VersionFeed;
pub use snapshot::{RowView, Snapshot, SortOrder, SortSpec};
pub use table::{ColumnDef, Row, Table, TableDef};
pub use transaction::{TransactionState, WriteTransaction};
pub use types::{RowKey, StoreId, TableId, Version};
pub use value::{ColumnType, Value};
