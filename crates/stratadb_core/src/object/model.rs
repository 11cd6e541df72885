//! Traits implemented by declared model classes.
//!
//! A model class is a thin typed wrapper around an [`Object`]. Its
//! accessors call into the object, which decides once, at construction,
//! whether a field lives in memory or in a row.
//!
//! ```rust,ignore
//! #[derive(Clone)]
//! struct Dog(Object);
//!
//! impl FromObject for Dog {
//!     fn from_object(object: Object) -> Self { Dog(object) }
//! }
//! impl AsObject for Dog {
//!     fn as_object(&self) -> &Object { &self.0 }
//! }
//! impl Model for Dog {
//!     const CLASS_NAME: &'static str = "Dog";
//!     fn describe() -> ClassDescriptor {
//!         ClassDescriptor::new("Dog").field(FieldDescriptor::new("name", FieldType::String))
//!     }
//! }
//!
//! impl Dog {
//!     fn name(&self) -> CoreResult<String> { self.0.get("name") }
//!     fn set_name(&self, name: &str) -> CoreResult<()> { self.0.set("name", name.to_string()) }
//! }
//! ```

use super::Object;
use crate::accessor::RowHandle;
use crate::collection::Collection;
use crate::error::CoreResult;
use crate::realm::Realm;
use crate::schema::ClassDescriptor;
use stratadb_engine::Value;

/// Builds a typed wrapper from an object.
pub trait FromObject: Sized {
    /// Wraps `object`. The object's class is checked by the caller.
    fn from_object(object: Object) -> Self;
}

/// Exposes the object behind a typed wrapper.
pub trait AsObject {
    /// Returns the wrapped object.
    fn as_object(&self) -> &Object;
}

/// A declared model class.
pub trait Model: FromObject + AsObject + Clone + Send + 'static {
    /// Class name, matching [`Model::describe`].
    const CLASS_NAME: &'static str;

    /// Describes the class's fields.
    fn describe() -> ClassDescriptor;

    /// Creates an unmanaged instance with every field at its initial value.
    #[must_use]
    fn new_unmanaged() -> Self {
        Self::from_object(Object::unmanaged(Self::describe()))
    }
}

impl FromObject for Object {
    fn from_object(object: Object) -> Self {
        object
    }
}

impl AsObject for Object {
    fn as_object(&self) -> &Object {
        self
    }
}

/// Has managed state.
pub trait ManagedState {
    /// Returns true if backed by a row.
    fn is_managed(&self) -> bool;

    /// Returns true unless the backing row was deleted or the realm closed.
    /// Unmanaged instances are always valid.
    fn is_valid(&self) -> bool;

    /// Returns the owning realm of a managed instance.
    fn realm(&self) -> Option<Realm>;

    /// Returns the backing row of a managed instance.
    fn row_handle(&self) -> Option<RowHandle>;
}

/// Supports field dispatch by name.
pub trait FieldDispatch {
    /// Reads a value field.
    fn get_field(&self, field: &str) -> CoreResult<Value>;

    /// Writes a value field.
    fn set_field(&self, field: &str, value: Value) -> CoreResult<()>;
}

/// Supports link resolution.
pub trait LinkResolution {
    /// Resolves a single-link field.
    fn resolve_link(&self, field: &str) -> CoreResult<Option<Object>>;

    /// Resolves a link-list or back-link field.
    fn resolve_list(&self, field: &str) -> CoreResult<Collection<Object>>;
}

impl<T: AsObject + ?Sized> ManagedState for T {
    fn is_managed(&self) -> bool {
        self.as_object().is_managed()
    }

    fn is_valid(&self) -> bool {
        self.as_object().is_valid()
    }

    fn realm(&self) -> Option<Realm> {
        self.as_object().realm()
    }

    fn row_handle(&self) -> Option<RowHandle> {
        self.as_object().row_handle()
    }
}

impl<T: AsObject + ?Sized> FieldDispatch for T {
    fn get_field(&self, field: &str) -> CoreResult<Value> {
        self.as_object().get_named(field)
    }

    fn set_field(&self, field: &str, value: Value) -> CoreResult<()> {
        self.as_object().set_named(field, value)
    }
}

impl<T: AsObject + ?Sized> LinkResolution for T {
    fn resolve_link(&self, field: &str) -> CoreResult<Option<Object>> {
        self.as_object().get_link(field)
    }

    fn resolve_list(&self, field: &str) -> CoreResult<Collection<Object>> {
        self.as_object().get_list(field)
    }
}
