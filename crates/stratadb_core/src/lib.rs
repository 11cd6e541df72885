//! # StrataDB Core
//!
//! Object mapping on top of the StrataDB engine.
//!
//! Applications declare model classes, open a [`Realm`] per execution
//! context, and work with [`Object`]s and live [`Collection`]s. An object
//! is either unmanaged (plain in-memory values) or managed (every field
//! access goes to a row of the realm's current snapshot).
//!
//! ## Design Principles
//!
//! - A realm reads exactly one committed version until it advances
//! - Writes happen only inside a write scope; at most one is open per store
//! - Collections are re-evaluated lazily and never mix two versions
//! - Listeners run synchronously on the realm's context, in registration order
//! - A deleted row invalidates its objects; links to it read as null
//!
//! ## Example
//!
//! ```rust
//! use stratadb_core::{ClassDescriptor, Config, FieldDescriptor, FieldType, Realm};
//! use stratadb_engine::Engine;
//!
//! let dog = ClassDescriptor::new("Dog").field(FieldDescriptor::new("name", FieldType::String));
//! let engine = Engine::in_memory();
//! let realm = Realm::open(&engine, Config::new().class(dog)).unwrap();
//!
//! let dogs = realm.objects_dynamic("Dog").unwrap();
//! realm
//!     .write(|r| {
//!         let rex = r.create_object_dynamic("Dog", None)?;
//!         rex.set("name", "Rex".to_string())
//!     })
//!     .unwrap();
//! assert_eq!(dogs.len().unwrap(), 1);
//! assert_eq!(dogs.get(0).unwrap().get::<String>("name").unwrap(), "Rex");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod accessor;
mod collection;
mod config;
mod error;
mod lifecycle;
mod notify;
mod object;
mod query;
mod realm;
mod schema;
mod value;

pub use accessor::{RowAccessor, RowHandle};
pub use collection::{ChangeSet, Collection, Move};
pub use config::Config;
pub use error::{CoreError, CoreResult, SchemaError};
pub use notify::{ListenerToken, ObjectEvent};
pub use object::{AsObject, FieldDispatch, FromObject, LinkResolution, ManagedState, Model, Object};
pub use query::{Query, QueryRow};
pub use realm::Realm;
pub use schema::{
    derive_schema, reconcile, ClassDescriptor, ClassSpec, FieldDescriptor, FieldSpec, FieldType,
    Migration, MigrationContext, MigrationOperation, MigrationPlan, MigrationStep, OldObject, Schema,
};
pub use value::FieldValue;

pub use stratadb_engine::{Engine, EngineConfig, RowKey, SortOrder, Value, Version};
