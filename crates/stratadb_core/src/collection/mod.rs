//! Live collections.
//!
//! A live collection is a sequence of row keys defined by a criterion:
//! every row of a table, the rows matching a query, the entries of a
//! link-list column, or the rows linking back to one row. The sequence is
//! recomputed lazily, at most once per realm generation, so a collection
//! always reflects exactly one version of the store.
//!
//! Collections with listeners additionally keep the sequence they last
//! reported. The notification coordinator diffs against it on every pass.

mod diff;
mod typed;

pub use diff::{ChangeSet, Move};
pub use typed::Collection;

use crate::accessor::RowHandle;
use crate::error::{CoreError, CoreResult};
use crate::notify::{ListenerToken, Target};
use crate::object::Object;
use crate::realm::{ClassBinding, Realm};
use crate::schema::FieldType;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use stratadb_engine::{EngineError, RowKey, RowView, Snapshot, SortSpec, TableId, Value, Version};
use tracing::trace;

/// Row filter evaluated by the engine.
pub(crate) type Predicate = Arc<dyn Fn(&RowView<'_>) -> bool + Send + Sync>;

#[derive(Clone)]
pub(crate) struct LiveCollection {
    inner: Arc<CollectionInner>,
}

pub(crate) enum CollectionInner {
    Live(Live),
    /// The link list of an unmanaged object.
    Detached {
        class: String,
        items: Arc<Mutex<Vec<Object>>>,
    },
}

pub(crate) struct Live {
    realm: Realm,
    element: Arc<ClassBinding>,
    source: Source,
    state: Mutex<SyncState>,
}

enum Source {
    Table,
    Query {
        predicate: Predicate,
        sort: Option<SortSpec>,
    },
    LinkList {
        owner: RowHandle,
        column: usize,
    },
    BackLinks {
        column: usize,
        target: RowHandle,
    },
}

#[derive(Default)]
struct SyncState {
    rows: Vec<RowKey>,
    /// Realm generation `rows` was computed at; `None` while pending.
    synced: Option<u64>,
    /// What listeners last saw.
    baseline: Option<Baseline>,
    pass: Option<(u64, Option<ChangeSet>)>,
}

struct Baseline {
    rows: Vec<RowKey>,
    version: Version,
    /// Rows already written by the open transaction, with the values they
    /// held when the baseline was taken.
    pending: HashMap<RowKey, Vec<Value>>,
}

impl Baseline {
    fn capture(snap: &Snapshot, table: TableId, rows: Vec<RowKey>) -> Self {
        let version = snap.version();
        let pending = rows
            .iter()
            .filter_map(|key| {
                let row = snap.row(table, *key)?;
                (row.modified() > version).then(|| (*key, row.values().to_vec()))
            })
            .collect();
        Self { rows, version, pending }
    }

    fn is_modified(&self, snap: &Snapshot, table: TableId, key: RowKey) -> bool {
        snap.row(table, key).is_some_and(|row| {
            row.modified() > self.version
                && self.pending.get(&key).map_or(true, |values| values.as_slice() != row.values())
        })
    }
}

impl Live {
    fn compute(&self, snap: &Snapshot) -> CoreResult<Vec<RowKey>> {
        let table = self.element.table;
        let rows = match &self.source {
            Source::Table => snap.keys(table)?,
            Source::Query { predicate, sort } => snap.query(table, &**predicate, sort.as_ref())?,
            Source::LinkList { owner, column } => match snap.get(owner.table(), owner.key(), *column) {
                Ok(Value::LinkList(keys)) => keys.clone(),
                Ok(other) => {
                    return Err(CoreError::type_mismatch(
                        format!("column {column}"),
                        "link list",
                        other.type_name(),
                    ))
                }
                Err(EngineError::RowNotFound { .. }) => return Err(CoreError::ObjectInvalidated),
                Err(e) => return Err(e.into()),
            },
            Source::BackLinks { column, target } => {
                if !snap.contains(target.table(), target.key()) {
                    return Err(CoreError::ObjectInvalidated);
                }
                snap.backlinks(table, *column, target.key())?
            }
        };
        Ok(rows)
    }

    fn ordered(&self) -> bool {
        match &self.source {
            Source::LinkList { .. } => true,
            Source::Query { sort, .. } => sort.as_ref().is_some_and(|s| !s.is_empty()),
            Source::Table | Source::BackLinks { .. } => false,
        }
    }

    fn kind(&self) -> &'static str {
        match self.source {
            Source::Table => "table",
            Source::Query { .. } => "query result",
            Source::LinkList { .. } => "link list",
            Source::BackLinks { .. } => "back-link",
        }
    }

    fn sync(&self) -> CoreResult<()> {
        self.realm.prepare()?;
        let generation = self.realm.generation();
        if self.state.lock().synced == Some(generation) {
            return Ok(());
        }
        let rows = self.realm.read(|snap| self.compute(snap))??;
        let mut state = self.state.lock();
        state.rows = rows;
        state.synced = Some(generation);
        Ok(())
    }

    fn with_rows<R>(&self, f: impl FnOnce(&[RowKey]) -> R) -> CoreResult<R> {
        self.sync()?;
        Ok(f(&self.state.lock().rows))
    }

    fn object(&self, key: RowKey) -> Object {
        Object::managed(self.realm.clone(), Arc::clone(&self.element), key)
    }

    fn key_of(&self, object: &Object) -> Option<RowKey> {
        let handle = object.row_handle()?;
        (handle.store() == self.realm.store_id() && handle.table() == self.element.table)
            .then_some(handle.key())
    }
}

fn unsupported(kind: &'static str) -> CoreError {
    CoreError::UnsupportedMutation(kind)
}

fn out_of_bounds(index: usize, len: usize) -> CoreError {
    CoreError::IndexOutOfBounds { index, len }
}

impl LiveCollection {
    fn live(realm: Realm, element: Arc<ClassBinding>, source: Source) -> Self {
        Self {
            inner: Arc::new(CollectionInner::Live(Live {
                realm,
                element,
                source,
                state: Mutex::new(SyncState::default()),
            })),
        }
    }

    pub(crate) fn table(realm: Realm, element: Arc<ClassBinding>) -> Self {
        Self::live(realm, element, Source::Table)
    }

    pub(crate) fn query(
        realm: Realm,
        element: Arc<ClassBinding>,
        predicate: Predicate,
        sort: Option<SortSpec>,
    ) -> Self {
        Self::live(realm, element, Source::Query { predicate, sort })
    }

    pub(crate) fn link_list(realm: Realm, element: Arc<ClassBinding>, owner: RowHandle, column: usize) -> Self {
        Self::live(realm, element, Source::LinkList { owner, column })
    }

    pub(crate) fn backlinks(realm: Realm, element: Arc<ClassBinding>, column: usize, target: RowHandle) -> Self {
        Self::live(realm, element, Source::BackLinks { column, target })
    }

    pub(crate) fn detached(class: String, items: Arc<Mutex<Vec<Object>>>) -> Self {
        Self {
            inner: Arc::new(CollectionInner::Detached { class, items }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<CollectionInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn class_name(&self) -> &str {
        match &*self.inner {
            CollectionInner::Live(live) => live.element.info.name(),
            CollectionInner::Detached { class, .. } => class,
        }
    }

    pub(crate) fn is_managed(&self) -> bool {
        matches!(&*self.inner, CollectionInner::Live(_))
    }

    pub(crate) fn is_valid(&self) -> bool {
        match &*self.inner {
            CollectionInner::Live(live) => live.sync().is_ok(),
            CollectionInner::Detached { .. } => true,
        }
    }

    pub(crate) fn len(&self) -> CoreResult<usize> {
        match &*self.inner {
            CollectionInner::Live(live) => live.with_rows(<[RowKey]>::len),
            CollectionInner::Detached { items, .. } => Ok(items.lock().len()),
        }
    }

    pub(crate) fn get(&self, index: usize) -> CoreResult<Object> {
        match &*self.inner {
            CollectionInner::Live(live) => {
                let key = live.with_rows(|rows| rows.get(index).copied().ok_or(out_of_bounds(index, rows.len())))??;
                Ok(live.object(key))
            }
            CollectionInner::Detached { items, .. } => {
                let items = items.lock();
                items.get(index).cloned().ok_or(out_of_bounds(index, items.len()))
            }
        }
    }

    pub(crate) fn objects(&self) -> CoreResult<Vec<Object>> {
        match &*self.inner {
            CollectionInner::Live(live) => {
                let rows = live.with_rows(<[RowKey]>::to_vec)?;
                Ok(rows.into_iter().map(|key| live.object(key)).collect())
            }
            CollectionInner::Detached { items, .. } => Ok(items.lock().clone()),
        }
    }

    pub(crate) fn index_of(&self, object: &Object) -> CoreResult<Option<usize>> {
        match &*self.inner {
            CollectionInner::Live(live) => {
                let Some(key) = live.key_of(object) else {
                    return Ok(None);
                };
                live.with_rows(|rows| rows.iter().position(|k| *k == key))
            }
            CollectionInner::Detached { items, .. } => Ok(items.lock().iter().position(|o| o == object)),
        }
    }

    fn check_class(&self, object: &Object) -> CoreResult<()> {
        if object.class_name() == self.class_name() {
            Ok(())
        } else {
            Err(CoreError::type_mismatch(
                "element",
                self.class_name(),
                object.class_name(),
            ))
        }
    }

    /// Resolves the link-list this collection mutates.
    fn mutable_list(&self) -> CoreResult<(&Live, RowHandle, usize)> {
        match &*self.inner {
            CollectionInner::Live(live) => match live.source {
                Source::LinkList { owner, column } => Ok((live, owner, column)),
                _ => Err(unsupported(live.kind())),
            },
            CollectionInner::Detached { .. } => Err(CoreError::invalid_operation(
                "detached lists are mutated in memory",
            )),
        }
    }

    /// Runs `f` on the stored key list and writes the result back.
    fn edit<R>(&self, f: impl FnOnce(&mut Vec<RowKey>) -> CoreResult<R>) -> CoreResult<R> {
        let (live, owner, column) = self.mutable_list()?;
        live.realm.write_op(|txn| {
            let mut keys = match txn.snapshot().get(owner.table(), owner.key(), column) {
                Ok(Value::LinkList(keys)) => keys.clone(),
                Ok(other) => {
                    return Err(CoreError::type_mismatch(
                        format!("column {column}"),
                        "link list",
                        other.type_name(),
                    ))
                }
                Err(EngineError::RowNotFound { .. }) => return Err(CoreError::ObjectInvalidated),
                Err(e) => return Err(e.into()),
            };
            let result = f(&mut keys)?;
            txn.set(owner.table(), owner.key(), column, Value::LinkList(keys))?;
            Ok(result)
        })?
    }

    fn element_key(&self, object: &Object) -> CoreResult<RowKey> {
        self.check_class(object)?;
        let (live, _, _) = self.mutable_list()?;
        live.realm.link_key(object)
    }

    pub(crate) fn add(&self, object: &Object) -> CoreResult<()> {
        if let CollectionInner::Detached { items, .. } = &*self.inner {
            self.check_class(object)?;
            items.lock().push(object.clone());
            return Ok(());
        }
        let key = self.element_key(object)?;
        self.edit(|keys| {
            keys.push(key);
            Ok(())
        })
    }

    pub(crate) fn insert(&self, index: usize, object: &Object) -> CoreResult<()> {
        if let CollectionInner::Detached { items, .. } = &*self.inner {
            self.check_class(object)?;
            let mut items = items.lock();
            if index > items.len() {
                return Err(out_of_bounds(index, items.len()));
            }
            items.insert(index, object.clone());
            return Ok(());
        }
        let key = self.element_key(object)?;
        self.edit(|keys| {
            if index > keys.len() {
                return Err(out_of_bounds(index, keys.len()));
            }
            keys.insert(index, key);
            Ok(())
        })
    }

    pub(crate) fn set(&self, index: usize, object: &Object) -> CoreResult<Object> {
        if let CollectionInner::Detached { items, .. } = &*self.inner {
            self.check_class(object)?;
            let mut items = items.lock();
            let len = items.len();
            let slot = items.get_mut(index).ok_or(out_of_bounds(index, len))?;
            return Ok(std::mem::replace(slot, object.clone()));
        }
        let key = self.element_key(object)?;
        let (live, _, _) = self.mutable_list()?;
        let previous = self.edit(|keys| {
            let len = keys.len();
            let slot = keys.get_mut(index).ok_or(out_of_bounds(index, len))?;
            Ok(std::mem::replace(slot, key))
        })?;
        Ok(live.object(previous))
    }

    pub(crate) fn remove(&self, index: usize) -> CoreResult<Object> {
        if let CollectionInner::Detached { items, .. } = &*self.inner {
            let mut items = items.lock();
            if index >= items.len() {
                return Err(out_of_bounds(index, items.len()));
            }
            return Ok(items.remove(index));
        }
        let (live, _, _) = self.mutable_list()?;
        let removed = self.edit(|keys| {
            if index >= keys.len() {
                return Err(out_of_bounds(index, keys.len()));
            }
            Ok(keys.remove(index))
        })?;
        Ok(live.object(removed))
    }

    pub(crate) fn remove_object(&self, object: &Object) -> CoreResult<bool> {
        if let CollectionInner::Detached { items, .. } = &*self.inner {
            let mut items = items.lock();
            return Ok(match items.iter().position(|o| o == object) {
                Some(i) => {
                    items.remove(i);
                    true
                }
                None => false,
            });
        }
        let (live, _, _) = self.mutable_list()?;
        let Some(key) = live.key_of(object) else {
            return Ok(false);
        };
        self.edit(|keys| {
            Ok(match keys.iter().position(|k| *k == key) {
                Some(i) => {
                    keys.remove(i);
                    true
                }
                None => false,
            })
        })
    }

    pub(crate) fn clear(&self) -> CoreResult<()> {
        if let CollectionInner::Detached { items, .. } = &*self.inner {
            items.lock().clear();
            return Ok(());
        }
        self.edit(|keys| {
            keys.clear();
            Ok(())
        })
    }

    pub(crate) fn move_item(&self, from: usize, to: usize) -> CoreResult<()> {
        fn shift<T>(items: &mut Vec<T>, from: usize, to: usize) -> CoreResult<()> {
            let len = items.len();
            if from >= len {
                return Err(out_of_bounds(from, len));
            }
            if to >= len {
                return Err(out_of_bounds(to, len));
            }
            let item = items.remove(from);
            items.insert(to, item);
            Ok(())
        }
        if let CollectionInner::Detached { items, .. } = &*self.inner {
            return shift(&mut items.lock(), from, to);
        }
        self.edit(|keys| shift(keys, from, to))
    }

    /// Deletes every row in the collection.
    pub(crate) fn delete_all(&self) -> CoreResult<()> {
        let CollectionInner::Live(live) = &*self.inner else {
            return Err(CoreError::invalid_operation(
                "cannot delete the elements of an unmanaged list",
            ));
        };
        if !live.realm.is_in_write() {
            return Err(CoreError::WriteScopeRequired);
        }
        let rows = live.with_rows(<[RowKey]>::to_vec)?;
        let table = live.element.table;
        let deleted = live.realm.write_op(|txn| -> CoreResult<usize> {
            let mut deleted = 0;
            for key in rows {
                if txn.snapshot().contains(table, key) {
                    txn.delete_row(table, key)?;
                    deleted += 1;
                }
            }
            Ok(deleted)
        })??;
        trace!(%table, deleted, "deleted collection rows");
        Ok(())
    }

    /// Reads one field of every element.
    fn field_values(&self, field: &str) -> CoreResult<(Option<FieldType>, Vec<Value>)> {
        match &*self.inner {
            CollectionInner::Live(live) => {
                let info = &live.element.info;
                let index = info
                    .index_of(field)
                    .ok_or_else(|| CoreError::field_not_found(info.name(), field))?;
                let column = live.element.columns[index]
                    .ok_or_else(|| CoreError::type_mismatch(field, "stored field", "derived field"))?;
                let rows = live.with_rows(<[RowKey]>::to_vec)?;
                let table = live.element.table;
                let values = live.realm.read(|snap| {
                    rows.iter()
                        .filter_map(|key| snap.get(table, *key, column).ok().cloned())
                        .collect()
                })?;
                Ok((Some(info.field(index).field_type.clone()), values))
            }
            CollectionInner::Detached { items, .. } => {
                let items = items.lock().clone();
                let field_type = items.first().and_then(|o| {
                    let info = o.class_info();
                    info.index_of(field).map(|i| info.field(i).field_type.clone())
                });
                let values = items
                    .iter()
                    .map(|o| o.get_named(field))
                    .collect::<CoreResult<Vec<_>>>()?;
                Ok((field_type, values))
            }
        }
    }

    fn numeric_values(&self, field: &str, allow_timestamp: bool) -> CoreResult<(Option<FieldType>, Vec<Value>)> {
        let (field_type, values) = self.field_values(field)?;
        let accepted = |t: &FieldType| {
            matches!(t, FieldType::Integer | FieldType::Double | FieldType::Float)
                || (allow_timestamp && *t == FieldType::Timestamp)
        };
        if let Some(t) = &field_type {
            if !accepted(t) {
                return Err(CoreError::type_mismatch(field, "numeric field", t.to_string()));
            }
        }
        Ok((field_type, values.into_iter().filter(|v| !v.is_null()).collect()))
    }

    pub(crate) fn min(&self, field: &str) -> CoreResult<Option<Value>> {
        let (_, values) = self.numeric_values(field, true)?;
        Ok(values.into_iter().min_by(Value::sort_cmp))
    }

    pub(crate) fn max(&self, field: &str) -> CoreResult<Option<Value>> {
        let (_, values) = self.numeric_values(field, true)?;
        Ok(values.into_iter().max_by(Value::sort_cmp))
    }

    /// Integer fields sum to `Int` (saturating); floating-point fields to `Double`.
    pub(crate) fn sum(&self, field: &str) -> CoreResult<Value> {
        let (field_type, values) = self.numeric_values(field, false)?;
        if matches!(field_type, Some(FieldType::Double | FieldType::Float)) {
            return Ok(Value::Double(values.iter().filter_map(Value::as_f64).sum()));
        }
        Ok(Value::Int(
            values
                .iter()
                .filter_map(Value::as_int)
                .fold(0_i64, i64::saturating_add),
        ))
    }

    pub(crate) fn average(&self, field: &str) -> CoreResult<Option<f64>> {
        let (_, values) = self.numeric_values(field, false)?;
        if values.is_empty() {
            return Ok(None);
        }
        let total: f64 = values.iter().filter_map(Value::as_f64).sum();
        #[allow(clippy::cast_precision_loss)]
        Ok(Some(total / values.len() as f64))
    }

    pub(crate) fn add_listener(&self, listener: Box<dyn FnMut(&ChangeSet) + Send>) -> CoreResult<ListenerToken> {
        let CollectionInner::Live(live) = &*self.inner else {
            return Err(CoreError::invalid_operation(
                "listeners require a managed collection",
            ));
        };
        live.realm.prepare()?;
        let table = live.element.table;
        let baseline = live
            .realm
            .read(|snap| live.compute(snap).map(|rows| Baseline::capture(snap, table, rows)))??;
        let target = Target::Collection(Arc::downgrade(&self.inner));
        let coordinator = live.realm.coordinator();
        {
            let mut state = live.state.lock();
            if state.baseline.is_none() || !coordinator.is_observed(&target) {
                state.rows = baseline.rows.clone();
                state.baseline = Some(baseline);
                state.synced = Some(live.realm.generation());
                state.pass = None;
            }
        }
        Ok(coordinator.register_collection(target, listener))
    }

    /// Resynchronizes against the realm's current snapshot and returns the
    /// changes since the last report, once per notification pass.
    pub(crate) fn pass_changes(&self, pass: u64) -> Option<ChangeSet> {
        let CollectionInner::Live(live) = &*self.inner else {
            return None;
        };
        let mut state = live.state.lock();
        if let Some((p, changes)) = &state.pass {
            if *p == pass {
                return changes.clone();
            }
        }
        let (changes, next) = {
            let baseline = state.baseline.as_ref()?;
            live.realm
                .read(|snap| {
                    let table = live.element.table;
                    let rows = match live.compute(snap) {
                        Ok(rows) => rows,
                        Err(CoreError::ObjectInvalidated) => {
                            let changes = ChangeSet::cleared(baseline.rows.len());
                            return Some((changes, Baseline::capture(snap, table, Vec::new())));
                        }
                        Err(_) => return None,
                    };
                    let changes = ChangeSet::compute(&baseline.rows, &rows, live.ordered(), |key| {
                        baseline.is_modified(snap, table, key)
                    });
                    Some((changes, Baseline::capture(snap, table, rows)))
                })
                .ok()
                .flatten()?
        };
        let changes = (!changes.is_empty()).then_some(changes);
        state.rows = next.rows.clone();
        state.baseline = Some(next);
        state.synced = Some(live.realm.generation());
        state.pass = Some((pass, changes.clone()));
        changes
    }
}

impl PartialEq for LiveCollection {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
