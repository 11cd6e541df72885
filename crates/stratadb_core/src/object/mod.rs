//! Declared object instances.
//!
//! An [`Object`] is either unmanaged (fields held in memory) or managed
//! (fields delegated to a row through the [`RowAccessor`]). The branch is
//! fixed when the object is constructed: inserting an unmanaged object
//! yields a *new* managed object rather than switching the old one over.
//!
//! Fields marked ignored are always held in memory, on managed objects too.

mod model;

pub use model::{AsObject, FieldDispatch, FromObject, LinkResolution, ManagedState, Model};

use crate::accessor::{RowAccessor, RowHandle};
use crate::collection::{Collection, LiveCollection};
use crate::error::{CoreError, CoreResult};
use crate::notify::{ListenerToken, ObjectEvent, Target};
use crate::realm::{ClassBinding, Realm};
use crate::schema::{ClassDescriptor, ClassInfo, FieldDescriptor, FieldType};
use crate::value::{list_from_value, list_into_value, FieldValue};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use stratadb_engine::{RowKey, Value};
use tracing::trace;

/// An instance of a declared class.
///
/// Cloning is cheap and yields another reference to the same instance.
#[derive(Clone)]
pub struct Object {
    inner: Arc<ObjectInner>,
}

pub(crate) struct ObjectInner {
    class: Arc<ClassInfo>,
    storage: Storage,
}

enum Storage {
    Unmanaged(Mutex<Fields>),
    Managed(Managed),
}

struct Managed {
    realm: Realm,
    binding: Arc<ClassBinding>,
    row: RowHandle,
    invalidated: AtomicBool,
    /// Ignored fields.
    local: Mutex<Fields>,
    /// Link-list and back-link collections, created on first access.
    collections: Mutex<HashMap<usize, LiveCollection>>,
    observed: Mutex<Observed>,
}

/// In-memory field storage.
struct Fields {
    slots: Vec<Slot>,
    /// Which fields were assigned since construction.
    set: Vec<bool>,
}

impl Fields {
    fn new(class: &ClassInfo) -> Self {
        Self {
            slots: class.fields().iter().map(initial_slot).collect(),
            set: vec![false; class.fields().len()],
        }
    }
}

/// One in-memory field.
#[derive(Clone)]
pub(crate) enum Slot {
    Value(Value),
    Link(Option<Object>),
    Links(Arc<Mutex<Vec<Object>>>),
    BackLinks,
}

fn initial_slot(field: &FieldDescriptor) -> Slot {
    if field.ignored {
        return Slot::Value(field.initial_value());
    }
    match field.field_type {
        FieldType::Object(_) => Slot::Link(None),
        FieldType::LinkList(_) => Slot::Links(Arc::new(Mutex::new(Vec::new()))),
        FieldType::BackLink { .. } => Slot::BackLinks,
        _ => Slot::Value(field.initial_value()),
    }
}

/// Field values last reported to object listeners.
#[derive(Default)]
struct Observed {
    initialized: bool,
    /// `None` once the row is gone.
    values: Option<Vec<Value>>,
    pass: Option<(u64, Option<ObjectEvent>)>,
}

enum Route<'a> {
    Local(&'a Mutex<Fields>),
    Row(&'a Managed, usize),
    Derived(&'a Managed),
}

fn is_value_field(field: &FieldDescriptor) -> bool {
    field.ignored || field.field_type.is_primitive() || matches!(field.field_type, FieldType::List(_))
}

fn wrong_kind(field: &FieldDescriptor, expected: &str) -> CoreError {
    CoreError::type_mismatch(&field.name, expected, field.field_type.to_string())
}

fn check_value(field: &FieldDescriptor, value: &Value) -> CoreResult<()> {
    if field.ignored {
        return Ok(());
    }
    let Some(column_type) = field.field_type.column_type() else {
        return Err(wrong_kind(field, "value field"));
    };
    if value.is_null() {
        return if field.nullable {
            Ok(())
        } else {
            Err(CoreError::NotNullable {
                column: field.name.clone(),
            })
        };
    }
    if column_type.admits(value, field.nullable) {
        Ok(())
    } else {
        Err(CoreError::type_mismatch(
            &field.name,
            column_type.to_string(),
            value.type_name(),
        ))
    }
}

impl Object {
    /// Creates an unmanaged instance of a described class.
    #[must_use]
    pub fn unmanaged(descriptor: ClassDescriptor) -> Self {
        Self::unmanaged_from(Arc::new(ClassInfo::new(descriptor)))
    }

    pub(crate) fn unmanaged_from(class: Arc<ClassInfo>) -> Self {
        let fields = Fields::new(&class);
        Self {
            inner: Arc::new(ObjectInner {
                class,
                storage: Storage::Unmanaged(Mutex::new(fields)),
            }),
        }
    }

    pub(crate) fn managed(realm: Realm, binding: Arc<ClassBinding>, key: RowKey) -> Self {
        let row = RowHandle::new(realm.store_id(), binding.table, key);
        let class = Arc::clone(&binding.info);
        let local = Fields::new(&class);
        Self {
            inner: Arc::new(ObjectInner {
                class,
                storage: Storage::Managed(Managed {
                    realm,
                    binding,
                    row,
                    invalidated: AtomicBool::new(false),
                    local: Mutex::new(local),
                    collections: Mutex::new(HashMap::new()),
                    observed: Mutex::new(Observed::default()),
                }),
            }),
        }
    }

    /// Returns the class name.
    #[must_use]
    pub fn class_name(&self) -> &str {
        self.inner.class.name()
    }

    /// Returns true if the object is backed by a row.
    #[must_use]
    pub fn is_managed(&self) -> bool {
        matches!(self.inner.storage, Storage::Managed(_))
    }

    /// Returns false once the backing row is deleted or the realm is closed.
    ///
    /// Unmanaged objects are always valid. Calling this from another
    /// context returns false.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        match &self.inner.storage {
            Storage::Unmanaged(_) => true,
            Storage::Managed(m) => {
                !m.invalidated.load(Ordering::Acquire)
                    && m.realm
                        .read(|snap| snap.contains(m.row.table(), m.row.key()))
                        .unwrap_or(false)
            }
        }
    }

    /// Returns the owning realm of a managed object.
    #[must_use]
    pub fn realm(&self) -> Option<Realm> {
        self.managed_state().map(|m| m.realm.clone())
    }

    /// Returns the backing row of a managed object.
    #[must_use]
    pub fn row_handle(&self) -> Option<RowHandle> {
        self.managed_state().map(|m| m.row)
    }

    /// Reads a primitive or primitive-list field.
    pub fn get<T: FieldValue>(&self, field: &str) -> CoreResult<T> {
        let value = self.get_named(field)?;
        T::from_value(&value, field)
    }

    /// Writes a primitive or primitive-list field.
    pub fn set<T: FieldValue>(&self, field: &str, value: T) -> CoreResult<()> {
        self.set_named(field, value.into_value())
    }

    /// Reads a value field as a raw [`Value`].
    ///
    /// # Errors
    ///
    /// - `FieldNotFound` for an undeclared field
    /// - `TypeMismatch` for link, link-list and back-link fields
    /// - `ObjectInvalidated` if the row was deleted
    /// - `CrossContextAccess` from another context
    pub fn get_named(&self, field: &str) -> CoreResult<Value> {
        let index = self.field_index(field)?;
        let descriptor = self.inner.class.field(index);
        if !is_value_field(descriptor) {
            return Err(wrong_kind(descriptor, "value field"));
        }
        match self.route(index)? {
            Route::Local(fields) => match &fields.lock().slots[index] {
                Slot::Value(value) => Ok(value.clone()),
                _ => Err(wrong_kind(descriptor, "value field")),
            },
            Route::Row(m, column) => RowAccessor::new(&m.realm, m.row)?.get_value(column),
            Route::Derived(_) => Err(wrong_kind(descriptor, "value field")),
        }
    }

    /// Writes a value field from a raw [`Value`].
    ///
    /// # Errors
    ///
    /// - `ImmutablePrimaryKey` for the primary key of a managed object
    /// - `IllegalMutationOutsideWriteScope` for a managed field outside a write
    /// - `TypeMismatch` / `NotNullable` if the value does not fit the field
    pub fn set_named(&self, field: &str, value: Value) -> CoreResult<()> {
        let index = self.field_index(field)?;
        let descriptor = self.inner.class.field(index);
        if !is_value_field(descriptor) {
            return Err(wrong_kind(descriptor, "value field"));
        }
        match self.route(index)? {
            Route::Local(fields) => {
                check_value(descriptor, &value)?;
                let mut fields = fields.lock();
                fields.slots[index] = Slot::Value(value);
                fields.set[index] = true;
                Ok(())
            }
            Route::Row(m, column) => {
                if descriptor.primary_key {
                    return Err(CoreError::ImmutablePrimaryKey {
                        field: descriptor.name.clone(),
                    });
                }
                RowAccessor::new(&m.realm, m.row)?.set_value(column, value)
            }
            Route::Derived(_) => Err(wrong_kind(descriptor, "value field")),
        }
    }

    /// Resolves a single-link field. A broken or unset link reads as `None`.
    pub fn get_link<T: FromObject>(&self, field: &str) -> CoreResult<Option<T>> {
        let index = self.field_index(field)?;
        let descriptor = self.inner.class.field(index);
        let FieldType::Object(target) = &descriptor.field_type else {
            return Err(wrong_kind(descriptor, "link"));
        };
        let object = match self.route(index)? {
            Route::Local(fields) => match &fields.lock().slots[index] {
                Slot::Link(object) => object.clone(),
                _ => return Err(wrong_kind(descriptor, "link")),
            },
            Route::Row(m, column) => match RowAccessor::new(&m.realm, m.row)?.get_value(column)? {
                Value::Link(key) => {
                    let binding = m.realm.binding(target)?;
                    Some(Object::managed(m.realm.clone(), binding, key))
                }
                Value::Null => None,
                other => {
                    return Err(CoreError::type_mismatch(field, "link", other.type_name()));
                }
            },
            Route::Derived(_) => return Err(wrong_kind(descriptor, "link")),
        };
        Ok(object.map(T::from_object))
    }

    /// Sets or clears a single-link field.
    ///
    /// On a managed object an unmanaged target is copied into the realm
    /// first (updating by primary key when the target class has one).
    ///
    /// # Errors
    ///
    /// `TypeMismatch` if the target is of another class.
    pub fn set_link<T: AsObject>(&self, field: &str, target: Option<&T>) -> CoreResult<()> {
        let index = self.field_index(field)?;
        let descriptor = self.inner.class.field(index);
        let FieldType::Object(target_class) = &descriptor.field_type else {
            return Err(wrong_kind(descriptor, "link"));
        };
        let target = target.map(AsObject::as_object);
        if let Some(object) = target {
            if object.class_name() != target_class {
                return Err(CoreError::type_mismatch(
                    field,
                    target_class.as_str(),
                    object.class_name(),
                ));
            }
        }
        match self.route(index)? {
            Route::Local(fields) => {
                let mut fields = fields.lock();
                fields.slots[index] = Slot::Link(target.cloned());
                fields.set[index] = true;
                Ok(())
            }
            Route::Row(m, column) => {
                let value = match target {
                    Some(object) => Value::Link(m.realm.link_key(object)?),
                    None => Value::Null,
                };
                RowAccessor::new(&m.realm, m.row)?.set_value(column, value)
            }
            Route::Derived(_) => Err(wrong_kind(descriptor, "link")),
        }
    }

    /// Returns the collection behind a link-list or back-link field.
    ///
    /// On a managed object this is a live collection, created on first
    /// access and cached for the lifetime of the instance. Back-link
    /// collections are read-only.
    pub fn get_list<T: FromObject + AsObject>(&self, field: &str) -> CoreResult<Collection<T>> {
        let index = self.field_index(field)?;
        self.live_list(index).map(Collection::new)
    }

    fn live_list(&self, index: usize) -> CoreResult<LiveCollection> {
        let descriptor = self.inner.class.field(index);
        match (&descriptor.field_type, self.route(index)?) {
            (FieldType::LinkList(target), Route::Local(fields)) => match &fields.lock().slots[index] {
                Slot::Links(items) => Ok(LiveCollection::detached(target.clone(), Arc::clone(items))),
                _ => Err(wrong_kind(descriptor, "link list")),
            },
            (FieldType::LinkList(target), Route::Row(m, column)) => {
                if let Some(cached) = m.collections.lock().get(&index) {
                    return Ok(cached.clone());
                }
                let binding = m.realm.binding(target)?;
                let list = LiveCollection::link_list(m.realm.clone(), binding, m.row, column);
                m.collections.lock().insert(index, list.clone());
                Ok(list)
            }
            (FieldType::BackLink { class, .. }, Route::Derived(m)) => {
                if let Some(cached) = m.collections.lock().get(&index) {
                    return Ok(cached.clone());
                }
                let source = m.binding.backlinks[index].ok_or_else(|| {
                    CoreError::invalid_operation(format!(
                        "back-link '{}' is not bound",
                        descriptor.name
                    ))
                })?;
                let binding = m.realm.binding(class)?;
                let list = LiveCollection::backlinks(m.realm.clone(), binding, source.column, m.row);
                m.collections.lock().insert(index, list.clone());
                Ok(list)
            }
            (FieldType::BackLink { .. }, _) => Err(CoreError::invalid_operation(
                "back-links are only available on managed objects",
            )),
            _ => Err(wrong_kind(descriptor, "link list")),
        }
    }

    /// Reads a primitive-list field.
    pub fn get_values<T: FieldValue>(&self, field: &str) -> CoreResult<Vec<T>> {
        let value = self.get_named(field)?;
        list_from_value(&value, field)
    }

    /// Replaces a primitive-list field.
    pub fn set_values<T: FieldValue>(&self, field: &str, items: Vec<T>) -> CoreResult<()> {
        self.set_named(field, list_into_value(items))
    }

    /// Deletes the backing row. Requires an open write scope.
    pub fn delete_from_realm(&self) -> CoreResult<()> {
        let m = self
            .managed_state()
            .ok_or_else(|| CoreError::invalid_operation("cannot delete an unmanaged object"))?;
        m.realm.delete(self)
    }

    /// Registers a listener for field changes and invalidation of this object.
    ///
    /// The listener runs on every notification pass in which a persisted
    /// field of the row changed, or once with [`ObjectEvent::Invalidated`]
    /// when the row is gone.
    pub fn add_listener<F>(&self, listener: F) -> CoreResult<ListenerToken>
    where
        F: FnMut(&ObjectEvent) + Send + 'static,
    {
        let m = self
            .managed_state()
            .ok_or_else(|| CoreError::invalid_operation("listeners require a managed object"))?;
        let current = m
            .realm
            .read(|snap| snap.row(m.row.table(), m.row.key()).map(|r| r.values().to_vec()))?
            .ok_or(CoreError::ObjectInvalidated)?;
        let target = Target::Object(Arc::downgrade(&self.inner));
        let coordinator = m.realm.coordinator();
        {
            let mut observed = m.observed.lock();
            if !observed.initialized || !coordinator.is_observed(&target) {
                *observed = Observed {
                    initialized: true,
                    values: Some(current),
                    pass: None,
                };
            }
        }
        Ok(coordinator.register_object(target, Box::new(listener)))
    }

    pub(crate) fn from_inner(inner: Arc<ObjectInner>) -> Self {
        Self { inner }
    }

    /// Compares the row with the values last reported and returns the event
    /// to dispatch for notification pass `pass`.
    pub(crate) fn pass_event(&self, pass: u64) -> Option<ObjectEvent> {
        let m = self.managed_state()?;
        let mut observed = m.observed.lock();
        if let Some((p, event)) = &observed.pass {
            if *p == pass {
                return event.clone();
            }
        }
        let current = m
            .realm
            .read(|snap| snap.row(m.row.table(), m.row.key()).map(|r| r.values().to_vec()))
            .ok()?;
        let event = match (&observed.values, &current) {
            (None, _) => None,
            (Some(_), None) => {
                m.invalidated.store(true, Ordering::Release);
                trace!(row = %m.row, "object invalidated");
                Some(ObjectEvent::Invalidated)
            }
            (Some(old), Some(new)) => {
                let fields: Vec<String> = m
                    .binding
                    .columns
                    .iter()
                    .enumerate()
                    .filter_map(|(i, column)| {
                        let column = (*column)?;
                        (old.get(column) != new.get(column))
                            .then(|| self.inner.class.field(i).name.clone())
                    })
                    .collect();
                (!fields.is_empty()).then_some(ObjectEvent::Changed { fields })
            }
        };
        observed.values = current;
        observed.pass = Some((pass, event.clone()));
        event
    }

    pub(crate) fn class_info(&self) -> &Arc<ClassInfo> {
        &self.inner.class
    }

    pub(crate) fn binding(&self) -> Option<&Arc<ClassBinding>> {
        self.managed_state().map(|m| &m.binding)
    }

    /// Address of the shared instance, used as identity for unmanaged graphs.
    pub(crate) fn identity(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    /// Returns a copy of an in-memory slot of an unmanaged object.
    pub(crate) fn slot(&self, index: usize) -> Option<Slot> {
        match &self.inner.storage {
            Storage::Unmanaged(fields) => fields.lock().slots.get(index).cloned(),
            Storage::Managed(_) => None,
        }
    }

    pub(crate) fn is_set(&self, index: usize) -> bool {
        match &self.inner.storage {
            Storage::Unmanaged(fields) => fields.lock().set.get(index).copied().unwrap_or(false),
            Storage::Managed(_) => true,
        }
    }

    /// Fills a slot of an unmanaged object and marks it set.
    pub(crate) fn fill(&self, index: usize, slot: Slot) {
        if let Storage::Unmanaged(fields) = &self.inner.storage {
            let mut fields = fields.lock();
            fields.slots[index] = slot;
            fields.set[index] = true;
        }
    }

    fn managed_state(&self) -> Option<&Managed> {
        match &self.inner.storage {
            Storage::Managed(m) => Some(m),
            Storage::Unmanaged(_) => None,
        }
    }

    fn field_index(&self, field: &str) -> CoreResult<usize> {
        self.inner
            .class
            .index_of(field)
            .ok_or_else(|| CoreError::field_not_found(self.class_name(), field))
    }

    fn route(&self, index: usize) -> CoreResult<Route<'_>> {
        match &self.inner.storage {
            Storage::Unmanaged(fields) => Ok(Route::Local(fields)),
            Storage::Managed(m) => {
                m.realm.check()?;
                if self.inner.class.field(index).ignored {
                    return Ok(Route::Local(&m.local));
                }
                Ok(match m.binding.columns[index] {
                    Some(column) => Route::Row(m, column),
                    None => Route::Derived(m),
                })
            }
        }
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        match (self.row_handle(), other.row_handle()) {
            (Some(a), Some(b)) => a == b,
            (None, None) => Arc::ptr_eq(&self.inner, &other.inner),
            _ => false,
        }
    }
}

impl Eq for Object {}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("class", &self.class_name())
            .field("row", &self.row_handle())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::schema::FieldDescriptor;
    use stratadb_engine::Engine;

    fn dog() -> ClassDescriptor {
        ClassDescriptor::new("Dog")
            .field(FieldDescriptor::new("name", FieldType::String))
            .field(FieldDescriptor::new("age", FieldType::Integer).default_value(Value::Int(1)))
            .field(FieldDescriptor::new("nickname", FieldType::String).nullable(true))
            .field(FieldDescriptor::values("tags", FieldType::String))
            .field(FieldDescriptor::new("scratch", FieldType::Other("Buffer".into())).ignored(true))
    }

    fn owner() -> ClassDescriptor {
        ClassDescriptor::new("Owner")
            .field(FieldDescriptor::new("id", FieldType::String).primary_key(true))
            .field(FieldDescriptor::link("dog", "Dog"))
            .field(FieldDescriptor::list("dogs", "Dog"))
    }

    fn realm() -> Realm {
        Realm::open(&Engine::in_memory(), Config::new().class(dog()).class(owner())).unwrap()
    }

    #[test]
    fn unmanaged_fields_start_at_initial_values() {
        let dog = Object::unmanaged(dog());
        assert_eq!(dog.get::<i64>("age").unwrap(), 1);
        assert_eq!(dog.get::<String>("name").unwrap(), "");
        assert_eq!(dog.get::<Option<String>>("nickname").unwrap(), None);
        assert!(dog.get_values::<String>("tags").unwrap().is_empty());
        assert!(!dog.is_managed());
        assert!(dog.is_valid());
    }

    #[test]
    fn unmanaged_writes_are_type_checked() {
        let dog = Object::unmanaged(dog());
        dog.set("name", "Rex".to_string()).unwrap();
        assert!(matches!(dog.set("age", "old".to_string()), Err(CoreError::TypeMismatch { .. })));
        assert!(matches!(dog.set_named("name", Value::Null), Err(CoreError::NotNullable { .. })));
        assert!(matches!(dog.get::<i64>("weight"), Err(CoreError::FieldNotFound { .. })));
        assert!(matches!(
            dog.set_values("tags", vec![Some("good".to_string()), None]),
            Err(CoreError::TypeMismatch { .. })
        ));
        assert!(dog.is_set(0));
        assert!(!dog.is_set(1));
    }

    #[test]
    fn managed_fields_go_through_the_row() {
        let realm = realm();
        realm.begin_write().unwrap();
        let dog = realm.create_object_dynamic("Dog", None).unwrap();
        assert_eq!(dog.get::<i64>("age").unwrap(), 1);
        dog.set("name", "Rex".to_string()).unwrap();
        dog.set_values("tags", vec!["good".to_string()]).unwrap();
        realm.commit_write().unwrap();

        let same = realm.objects_dynamic("Dog").unwrap().get(0).unwrap();
        assert_eq!(same, dog);
        assert_eq!(same.get::<String>("name").unwrap(), "Rex");
        assert_eq!(same.get_values::<String>("tags").unwrap(), vec!["good".to_string()]);
        assert!(matches!(
            dog.set("name", "Max".to_string()),
            Err(CoreError::IllegalMutationOutsideWriteScope)
        ));
    }

    #[test]
    fn ignored_fields_stay_in_memory() {
        let realm = realm();
        realm.begin_write().unwrap();
        let dog = realm.create_object_dynamic("Dog", None).unwrap();
        realm.commit_write().unwrap();

        dog.set_named("scratch", Value::Binary(vec![1, 2])).unwrap();
        assert_eq!(dog.get_named("scratch").unwrap(), Value::Binary(vec![1, 2]));
        let other = realm.objects_dynamic("Dog").unwrap().get(0).unwrap();
        assert_eq!(other.get_named("scratch").unwrap(), Value::Null);
    }

    #[test]
    fn managed_primary_key_is_immutable() {
        let realm = realm();
        realm.begin_write().unwrap();
        let owner = realm
            .create_object_dynamic("Owner", Some(Value::String("ann".into())))
            .unwrap();
        let err = owner.set("id", "bob".to_string()).unwrap_err();
        assert!(matches!(err, CoreError::ImmutablePrimaryKey { field } if field == "id"));
        realm.cancel_write().unwrap();
    }

    #[test]
    fn links_resolve_and_break_to_none() {
        let realm = realm();
        realm.begin_write().unwrap();
        let owner = realm
            .create_object_dynamic("Owner", Some(Value::String("ann".into())))
            .unwrap();
        let rex = Object::unmanaged(dog());
        rex.set("name", "Rex".to_string()).unwrap();
        owner.set_link("dog", Some(&rex)).unwrap();
        realm.commit_write().unwrap();

        let dog: Object = owner.get_link("dog").unwrap().unwrap();
        assert!(dog.is_managed());
        assert_eq!(dog.get::<String>("name").unwrap(), "Rex");

        realm.write(|r| r.delete(&dog)).unwrap();
        assert!(owner.get_link::<Object>("dog").unwrap().is_none());
        assert!(!dog.is_valid());
        assert!(matches!(dog.get::<String>("name"), Err(CoreError::ObjectInvalidated)));
    }

    #[test]
    fn link_to_wrong_class_fails() {
        let realm = realm();
        realm.begin_write().unwrap();
        let owner = realm
            .create_object_dynamic("Owner", Some(Value::String("ann".into())))
            .unwrap();
        let other = Object::unmanaged(ClassDescriptor::new("Owner"));
        assert!(matches!(
            owner.set_link("dog", Some(&other)),
            Err(CoreError::TypeMismatch { .. })
        ));
        realm.cancel_write().unwrap();
    }

    #[test]
    fn list_fields_are_cached_per_instance() {
        let realm = realm();
        realm.begin_write().unwrap();
        let owner = realm
            .create_object_dynamic("Owner", Some(Value::String("ann".into())))
            .unwrap();
        let first = owner.get_list::<Object>("dogs").unwrap();
        first.add(&Object::unmanaged(dog())).unwrap();
        let second = owner.get_list::<Object>("dogs").unwrap();
        assert_eq!(second.len().unwrap(), 1);
        realm.commit_write().unwrap();
    }

    #[test]
    fn access_from_another_thread_is_rejected() {
        let realm = realm();
        realm.begin_write().unwrap();
        let dog = realm.create_object_dynamic("Dog", None).unwrap();
        realm.commit_write().unwrap();

        let result = std::thread::spawn(move || dog.get::<String>("name")).join().unwrap();
        assert!(matches!(result, Err(CoreError::CrossContextAccess)));
    }
}
