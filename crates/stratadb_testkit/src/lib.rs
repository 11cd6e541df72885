//! # StrataDB Testkit
//!
//! Test utilities for StrataDB.
//!
//! This crate provides:
//! - Model classes covering every field kind
//! - Realm fixtures and listener recorders
//! - Property-based test generators using proptest
//! - Concurrent writer stress helpers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use stratadb_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_realm() {
//!     with_temp_realm(|realm| {
//!         let people = realm.objects::<Person>().unwrap();
//!         // ... test operations
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod models;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::models::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use models::*;
pub use stress::*;
