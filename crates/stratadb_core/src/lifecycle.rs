//! Moving objects between memory and the store.
//!
//! Copying in walks an unmanaged object graph, creating or updating one row
//! per distinct instance; shared instances and cycles map to the same row.
//! Copying out does the reverse up to a depth limit, sharing one unmanaged
//! copy per row.

use crate::error::{CoreError, CoreResult};
use crate::object::{AsObject, FromObject, Model, Object, Slot};
use crate::realm::Realm;
use crate::accessor::RowHandle;
use crate::schema::{FieldDescriptor, FieldType};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use stratadb_engine::{EngineError, RowKey, Value};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CopyMode {
    /// Always create rows; an existing primary key is a conflict.
    Insert,
    /// Update the row with the same primary key, creating it if missing.
    Update { partial: bool },
}

struct CopyIn<'r> {
    realm: &'r Realm,
    mode: CopyMode,
    visited: HashMap<usize, RowKey>,
}

impl<'r> CopyIn<'r> {
    fn new(realm: &'r Realm, mode: CopyMode) -> Self {
        Self {
            realm,
            mode,
            visited: HashMap::new(),
        }
    }

    fn copy(&mut self, object: &Object) -> CoreResult<RowKey> {
        if let Some(handle) = object.row_handle() {
            return self.realm.managed_key(object, handle);
        }
        if let Some(key) = self.visited.get(&object.identity()) {
            return Ok(*key);
        }

        let binding = self.realm.binding(object.class_name())?;
        let info = Arc::clone(object.class_info());
        let table = binding.table;
        let primary_key = info.primary_key().and_then(|i| match object.slot(i) {
            Some(Slot::Value(value)) => Some(value),
            _ => None,
        });

        let existing = match (self.mode, &primary_key) {
            (CopyMode::Update { .. }, Some(value)) => self
                .realm
                .read(|snap| snap.table(table).and_then(|t| t.find_by_primary_key(value)))?,
            _ => None,
        };
        let key = match existing {
            Some(key) => key,
            None => self.realm.write_op(|txn| txn.create_row(table, primary_key))??,
        };
        self.visited.insert(object.identity(), key);

        let keep_unset = matches!(self.mode, CopyMode::Update { partial: true }) && existing.is_some();
        for (index, field) in info.fields().iter().enumerate() {
            if field.ignored || field.primary_key {
                continue;
            }
            let Some(column) = binding.column_of(&field.name) else {
                continue;
            };
            if keep_unset && !object.is_set(index) {
                continue;
            }
            let value = match object.slot(index) {
                Some(Slot::Value(value)) => value,
                Some(Slot::Link(None)) => Value::Null,
                Some(Slot::Link(Some(target))) => Value::Link(self.copy_link(field, &target)?),
                Some(Slot::Links(items)) => {
                    let items = items.lock().clone();
                    let keys = items
                        .iter()
                        .map(|target| self.copy_link(field, target))
                        .collect::<CoreResult<Vec<_>>>()?;
                    Value::LinkList(keys)
                }
                Some(Slot::BackLinks) | None => continue,
            };
            self.realm.write_op(|txn| txn.set(table, key, column, value))??;
        }
        Ok(key)
    }

    fn copy_link(&mut self, field: &FieldDescriptor, target: &Object) -> CoreResult<RowKey> {
        let expected = field.field_type.link_target().unwrap_or_default();
        if target.class_name() != expected {
            return Err(CoreError::type_mismatch(
                &field.name,
                expected,
                target.class_name(),
            ));
        }
        self.copy(target)
    }
}

struct CopyOut {
    max_depth: usize,
    copies: HashMap<RowHandle, Object>,
}

impl CopyOut {
    fn copy(&mut self, object: &Object, depth: usize) -> CoreResult<Object> {
        let Some(handle) = object.row_handle() else {
            return Ok(object.clone());
        };
        if let Some(copy) = self.copies.get(&handle) {
            return Ok(copy.clone());
        }
        let info = Arc::clone(object.class_info());
        let copy = Object::unmanaged_from(Arc::clone(&info));
        self.copies.insert(handle, copy.clone());

        for (index, field) in info.fields().iter().enumerate() {
            if field.ignored {
                continue;
            }
            let slot = match &field.field_type {
                FieldType::BackLink { .. } => continue,
                FieldType::Object(_) => {
                    if depth >= self.max_depth {
                        continue;
                    }
                    let target = object.get_link::<Object>(&field.name)?;
                    Slot::Link(match target {
                        Some(target) => Some(self.copy(&target, depth + 1)?),
                        None => None,
                    })
                }
                FieldType::LinkList(_) => {
                    if depth >= self.max_depth {
                        continue;
                    }
                    let items = object.get_list::<Object>(&field.name)?.snapshot()?;
                    let copies = items
                        .iter()
                        .map(|target| self.copy(target, depth + 1))
                        .collect::<CoreResult<Vec<_>>>()?;
                    Slot::Links(Arc::new(Mutex::new(copies)))
                }
                _ => Slot::Value(object.get_named(&field.name)?),
            };
            copy.fill(index, slot);
        }
        Ok(copy)
    }
}

impl Realm {
    /// Creates a managed object of `T`, with descriptor defaults applied.
    pub fn create_object<T: Model>(&self, primary_key: Option<Value>) -> CoreResult<T> {
        self.create_object_dynamic(T::CLASS_NAME, primary_key)
            .map(T::from_object)
    }

    /// Creates a managed object of a class, by name.
    ///
    /// # Errors
    ///
    /// - `WriteScopeRequired` outside a write scope
    /// - `PrimaryKeyConflict` if the primary key is taken
    pub fn create_object_dynamic(&self, class: &str, primary_key: Option<Value>) -> CoreResult<Object> {
        self.require_write()?;
        let binding = self.binding(class)?;
        let table = binding.table;
        let defaults: Vec<(usize, Value)> = binding
            .info
            .fields()
            .iter()
            .enumerate()
            .filter(|(_, f)| !f.primary_key)
            .filter_map(|(i, f)| Some((binding.columns[i]?, f.default.clone()?)))
            .collect();
        let key = self.write_op(|txn| -> CoreResult<RowKey> {
            let key = txn.create_row(table, primary_key)?;
            for (column, value) in defaults {
                txn.set(table, key, column, value)?;
            }
            Ok(key)
        })??;
        debug!(%class, %key, "object created");
        Ok(Object::managed(self.clone(), binding, key))
    }

    /// Copies an unmanaged object graph into the realm.
    ///
    /// Returns the managed counterpart of `object`. A managed object of this
    /// realm is returned as is.
    ///
    /// # Errors
    ///
    /// - `WriteScopeRequired` outside a write scope
    /// - `PrimaryKeyConflict` if any object's primary key is taken
    pub fn insert<T: FromObject + AsObject>(&self, object: &T) -> CoreResult<T> {
        self.copy_in(object.as_object(), CopyMode::Insert)
            .map(T::from_object)
    }

    /// Copies an unmanaged object graph into the realm, overwriting rows
    /// with matching primary keys.
    ///
    /// # Errors
    ///
    /// `NoPrimaryKey` if the class of `object` declares none.
    pub fn insert_or_update<T: FromObject + AsObject>(&self, object: &T) -> CoreResult<T> {
        self.copy_in(object.as_object(), CopyMode::Update { partial: false })
            .map(T::from_object)
    }

    /// Like [`Realm::insert_or_update`], but fields never set on an
    /// unmanaged instance keep their stored value.
    pub fn insert_or_update_partial<T: FromObject + AsObject>(&self, object: &T) -> CoreResult<T> {
        self.copy_in(object.as_object(), CopyMode::Update { partial: true })
            .map(T::from_object)
    }

    /// Deletes a managed object's row. Links to it become null and it is
    /// removed from every link list.
    pub fn delete<T: AsObject>(&self, object: &T) -> CoreResult<()> {
        self.require_write()?;
        let object = object.as_object();
        let handle = object
            .row_handle()
            .ok_or_else(|| CoreError::invalid_operation("cannot delete an unmanaged object"))?;
        self.managed_key(object, handle)?;
        self.write_op(|txn| txn.delete_row(handle.table(), handle.key()))?
            .map_err(|err| match err {
                EngineError::RowNotFound { .. } => CoreError::ObjectInvalidated,
                other => other.into(),
            })?;
        debug!(row = %handle, "object deleted");
        Ok(())
    }

    /// Deletes every object of `T`.
    pub fn delete_all<T: Model>(&self) -> CoreResult<()> {
        self.objects::<T>()?.delete_all()
    }

    /// Returns an unmanaged deep copy of a managed object.
    ///
    /// Links deeper than `max_depth` are left unset. Rows reached twice are
    /// copied once, so shared targets and cycles are preserved.
    ///
    /// # Errors
    ///
    /// - `InvalidOperation` for an unmanaged object
    /// - `ObjectInvalidated` if the row was deleted
    pub fn copy_from_realm<T: FromObject + AsObject>(&self, object: &T, max_depth: usize) -> CoreResult<T> {
        self.check()?;
        let object = object.as_object();
        let handle = object
            .row_handle()
            .ok_or_else(|| CoreError::invalid_operation("object is not managed"))?;
        self.managed_key(object, handle)?;
        if !object.is_valid() {
            return Err(CoreError::ObjectInvalidated);
        }
        let mut copier = CopyOut {
            max_depth,
            copies: HashMap::new(),
        };
        let copy = copier.copy(object, 0)?;
        debug!(row = %handle, objects = copier.copies.len(), "object copied out");
        Ok(T::from_object(copy))
    }

    /// Returns the row a link to `object` should point at, copying an
    /// unmanaged object in first.
    ///
    /// # Errors
    ///
    /// `IllegalMutationOutsideWriteScope` outside a write scope.
    pub(crate) fn link_key(&self, object: &Object) -> CoreResult<RowKey> {
        if let Some(handle) = object.row_handle() {
            return self.managed_key(object, handle);
        }
        if !self.is_in_write() {
            return Err(CoreError::IllegalMutationOutsideWriteScope);
        }
        let binding = self.binding(object.class_name())?;
        let mode = if binding.info.primary_key().is_some() {
            CopyMode::Update { partial: false }
        } else {
            CopyMode::Insert
        };
        CopyIn::new(self, mode).copy(object)
    }

    fn copy_in(&self, object: &Object, mode: CopyMode) -> CoreResult<Object> {
        self.require_write()?;
        if let Some(handle) = object.row_handle() {
            self.managed_key(object, handle)?;
            return Ok(object.clone());
        }
        let binding = self.binding(object.class_name())?;
        if matches!(mode, CopyMode::Update { .. }) && binding.info.primary_key().is_none() {
            return Err(CoreError::NoPrimaryKey {
                class: object.class_name().to_string(),
            });
        }
        let mut copier = CopyIn::new(self, mode);
        let key = copier.copy(object)?;
        debug!(
            class = object.class_name(),
            %key,
            objects = copier.visited.len(),
            "object graph copied in"
        );
        Ok(Object::managed(self.clone(), binding, key))
    }

    /// Returns the key of a managed object, which must belong to this realm.
    fn managed_key(&self, object: &Object, handle: RowHandle) -> CoreResult<RowKey> {
        match object.realm() {
            Some(realm) if realm == *self => Ok(handle.key()),
            _ if handle.store() == self.store_id() => Err(CoreError::CrossContextAccess),
            _ => Err(CoreError::invalid_operation(
                "object belongs to a different store",
            )),
        }
    }

    fn require_write(&self) -> CoreResult<()> {
        self.check()?;
        if self.is_in_write() {
            Ok(())
        } else {
            Err(CoreError::WriteScopeRequired)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::schema::ClassDescriptor;
    use stratadb_engine::Engine;

    #[derive(Debug, Clone, PartialEq)]
    struct Person(Object);

    impl FromObject for Person {
        fn from_object(object: Object) -> Self {
            Person(object)
        }
    }

    impl AsObject for Person {
        fn as_object(&self) -> &Object {
            &self.0
        }
    }

    impl Model for Person {
        const CLASS_NAME: &'static str = "Person";

        fn describe() -> ClassDescriptor {
            ClassDescriptor::new("Person")
                .field(FieldDescriptor::new("id", FieldType::Integer).primary_key(true))
                .field(FieldDescriptor::new("name", FieldType::String))
                .field(FieldDescriptor::new("age", FieldType::Integer).default_value(Value::Int(18)))
                .field(FieldDescriptor::link("best_friend", "Person"))
                .field(FieldDescriptor::list("friends", "Person"))
                .field(FieldDescriptor::new("note", FieldType::Other("Note".into())).ignored(true))
        }
    }

    fn person(id: i64, name: &str) -> Person {
        let p = Person::new_unmanaged();
        p.0.set("id", id).unwrap();
        p.0.set("name", name.to_string()).unwrap();
        p
    }

    fn realm() -> Realm {
        Realm::open(&Engine::in_memory(), Config::new().model::<Person>()).unwrap()
    }

    #[test]
    fn insert_requires_write_scope() {
        let realm = realm();
        assert!(matches!(
            realm.insert(&person(1, "Ann")),
            Err(CoreError::WriteScopeRequired)
        ));
        assert!(matches!(
            realm.create_object::<Person>(Some(Value::Int(1))),
            Err(CoreError::WriteScopeRequired)
        ));
    }

    #[test]
    fn create_object_applies_defaults() {
        let realm = realm();
        let p = realm
            .write(|r| r.create_object::<Person>(Some(Value::Int(1))))
            .unwrap();
        assert_eq!(p.0.get::<i64>("age").unwrap(), 18);
        assert_eq!(p.0.get::<String>("name").unwrap(), "");
    }

    #[test]
    fn insert_copies_shared_graph_once() {
        let realm = realm();
        let ann = person(1, "Ann");
        let bob = person(2, "Bob");
        ann.0.set_link("best_friend", Some(&bob)).unwrap();
        bob.0.set_link("best_friend", Some(&ann)).unwrap();
        ann.0.get_list::<Person>("friends").unwrap().add(&bob).unwrap();

        let managed = realm.write(|r| r.insert(&ann)).unwrap();
        assert!(managed.0.is_managed());
        assert!(!ann.0.is_managed());
        assert_eq!(realm.objects::<Person>().unwrap().len().unwrap(), 2);

        let friend: Person = managed.0.get_link("best_friend").unwrap().unwrap();
        assert_eq!(friend.0.get::<String>("name").unwrap(), "Bob");
        let back: Person = friend.0.get_link("best_friend").unwrap().unwrap();
        assert_eq!(back, managed);
        assert_eq!(managed.0.get_list::<Person>("friends").unwrap().get(0).unwrap(), friend);
    }

    #[test]
    fn insert_rejects_taken_primary_key() {
        let realm = realm();
        realm.write(|r| r.insert(&person(1, "Ann"))).unwrap();
        let err = realm.write(|r| r.insert(&person(1, "Other"))).unwrap_err();
        assert!(matches!(err, CoreError::PrimaryKeyConflict { .. }));
        assert_eq!(realm.objects::<Person>().unwrap().len().unwrap(), 1);
    }

    #[test]
    fn update_overwrites_and_partial_keeps_unset() {
        let realm = realm();
        realm
            .write(|r| {
                let p = person(1, "Ann");
                p.0.set("age", 40_i64)?;
                r.insert(&p)
            })
            .unwrap();

        let full = person(1, "Annie");
        realm.write(|r| r.insert_or_update(&full)).unwrap();
        let stored = realm.find_by_primary_key::<Person>(1_i64).unwrap().unwrap();
        assert_eq!(stored.0.get::<String>("name").unwrap(), "Annie");
        assert_eq!(stored.0.get::<i64>("age").unwrap(), 18);

        realm
            .write(|r| {
                r.insert_or_update(&{
                    let p = person(1, "Annie");
                    p.0.set("age", 41_i64)?;
                    p
                })
            })
            .unwrap();
        let partial = Person::new_unmanaged();
        partial.0.set("id", 1_i64).unwrap();
        partial.0.set("name", "Ann".to_string()).unwrap();
        realm.write(|r| r.insert_or_update_partial(&partial)).unwrap();
        assert_eq!(stored.0.get::<String>("name").unwrap(), "Ann");
        assert_eq!(stored.0.get::<i64>("age").unwrap(), 41);
        assert_eq!(realm.objects::<Person>().unwrap().len().unwrap(), 1);
    }

    #[test]
    fn update_needs_primary_key() {
        let realm = Realm::open(
            &Engine::in_memory(),
            Config::new().class(ClassDescriptor::new("Tag").field(FieldDescriptor::new("label", FieldType::String))),
        )
        .unwrap();
        let tag = Object::unmanaged(ClassDescriptor::new("Tag").field(FieldDescriptor::new("label", FieldType::String)));
        let err = realm.write(|r| r.insert_or_update(&tag)).unwrap_err();
        assert!(matches!(err, CoreError::NoPrimaryKey { class } if class == "Tag"));
    }

    #[test]
    fn delete_invalidates_object() {
        let realm = realm();
        let ann = realm.write(|r| r.insert(&person(1, "Ann"))).unwrap();
        assert!(matches!(realm.delete(&ann), Err(CoreError::WriteScopeRequired)));
        realm.write(|r| r.delete(&ann)).unwrap();
        assert!(!ann.0.is_valid());
        assert!(matches!(
            ann.0.get::<String>("name"),
            Err(CoreError::ObjectInvalidated)
        ));
        let err = realm.write(|r| r.delete(&ann)).unwrap_err();
        assert!(matches!(err, CoreError::ObjectInvalidated));
        assert!(matches!(
            realm.write(|r| r.delete(&person(2, "Bob"))),
            Err(CoreError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn copy_out_respects_depth_and_identity() {
        let realm = realm();
        let ann = person(1, "Ann");
        let bob = person(2, "Bob");
        let cid = person(3, "Cid");
        ann.0.set_link("best_friend", Some(&bob)).unwrap();
        bob.0.set_link("best_friend", Some(&cid)).unwrap();
        cid.0.set_link("best_friend", Some(&ann)).unwrap();
        let managed = realm.write(|r| r.insert(&ann)).unwrap();

        let shallow = realm.copy_from_realm(&managed, 1).unwrap();
        assert!(!shallow.0.is_managed());
        let friend: Person = shallow.0.get_link("best_friend").unwrap().unwrap();
        assert_eq!(friend.0.get::<String>("name").unwrap(), "Bob");
        assert!(friend.0.get_link::<Person>("best_friend").unwrap().is_none());

        let deep = realm.copy_from_realm(&managed, 10).unwrap();
        let cycle = deep
            .0
            .get_link::<Person>("best_friend")
            .and_then(|b| b.unwrap().0.get_link::<Person>("best_friend"))
            .and_then(|c| c.unwrap().0.get_link::<Person>("best_friend"))
            .unwrap()
            .unwrap();
        assert_eq!(cycle, deep);

        deep.0.set("name", "Changed".to_string()).unwrap();
        assert_eq!(managed.0.get::<String>("name").unwrap(), "Ann");
        assert!(matches!(
            realm.copy_from_realm(&ann, 1),
            Err(CoreError::InvalidOperation { .. })
        ));
    }
}
