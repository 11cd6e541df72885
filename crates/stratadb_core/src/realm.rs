//! The realm: one execution context's handle on a store.
//!
//! A realm pins a snapshot of the store and only moves to a newer one at
//! well-defined points: when it commits, when [`Realm::refresh`] is
//! called, or on access when auto-refresh is enabled. Every advance runs
//! one notification pass.
//!
//! A realm is bound to the thread that opened it. Its objects and
//! collections fail with [`CoreError::CrossContextAccess`] anywhere else;
//! other threads open their own realm on the same [`Engine`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use stratadb_core::{Config, Realm};
//! use stratadb_engine::Engine;
//!
//! let engine = Engine::in_memory();
//! let realm = Realm::open(&engine, Config::new().model::<Dog>())?;
//! let rex = realm.write(|r| {
//!     let dog = Dog::new_unmanaged();
//!     dog.set_name("Rex")?;
//!     r.insert(&dog)
//! })?;
//! assert_eq!(realm.objects::<Dog>()?.len()?, 1);
//! ```

use crate::collection::{Collection, LiveCollection};
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::notify::{ListenerToken, NotificationCoordinator};
use crate::object::{Model, Object};
use crate::query::Query;
use crate::schema::{apply_migration, derive_schema, reconcile, ClassDescriptor, ClassInfo, FieldType, MigrationStep, Schema};
use crate::value::FieldValue;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use stratadb_engine::{Engine, Snapshot, StoreId, TableId, Version, WriteTransaction};
use tracing::{debug, info, trace};

/// A declared class resolved against the stored tables.
#[derive(Debug)]
pub(crate) struct ClassBinding {
    pub(crate) info: Arc<ClassInfo>,
    pub(crate) table: TableId,
    /// Column of each declared field; `None` for ignored and derived fields.
    pub(crate) columns: Vec<Option<usize>>,
    /// Source column of each back-link field.
    pub(crate) backlinks: Vec<Option<BackLinkSource>>,
}

impl ClassBinding {
    pub(crate) fn column_of(&self, field: &str) -> Option<usize> {
        self.info.index_of(field).and_then(|i| self.columns[i])
    }
}

/// The forward link a back-link field inverts. The source table is the
/// table of the back-link's element class.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BackLinkSource {
    pub(crate) column: usize,
}

fn bind(snapshot: &Snapshot, models: &[ClassDescriptor]) -> CoreResult<HashMap<String, Arc<ClassBinding>>> {
    let mut bindings = HashMap::with_capacity(models.len());
    for descriptor in models {
        let table = snapshot
            .table_by_name(&descriptor.name)
            .ok_or_else(|| CoreError::ClassNotFound {
                class: descriptor.name.clone(),
            })?;
        let info = Arc::new(ClassInfo::new(descriptor.clone()));
        let columns = info
            .fields()
            .iter()
            .map(|f| {
                if f.ignored || !f.field_type.is_persisted() {
                    None
                } else {
                    table.def().column_index(&f.name)
                }
            })
            .collect();
        let backlinks = info
            .fields()
            .iter()
            .map(|f| match &f.field_type {
                FieldType::BackLink { class, field } if !f.ignored => snapshot
                    .table_by_name(class)
                    .and_then(|t| t.def().column_index(field))
                    .map(|column| BackLinkSource { column }),
                _ => None,
            })
            .collect();
        bindings.insert(
            descriptor.name.clone(),
            Arc::new(ClassBinding {
                info,
                table: table.id(),
                columns,
                backlinks,
            }),
        );
    }
    Ok(bindings)
}

fn is_fresh(snapshot: &Snapshot) -> bool {
    snapshot.tables().next().is_none()
}

fn migration_required(step: &MigrationStep) -> CoreError {
    CoreError::MigrationRequired {
        path: step.path(),
        reason: step.to_string(),
    }
}

/// Decides whether opening needs a schema write, failing if the stored
/// schema cannot be brought in line with the declared one.
fn needs_update(snapshot: &Snapshot, declared: &Schema, config: &Config) -> CoreResult<bool> {
    let stored_version = snapshot.schema_version();
    if is_fresh(snapshot) {
        return Ok(!declared.is_empty() || config.schema_version != stored_version);
    }
    if config.schema_version < stored_version {
        return Err(CoreError::invalid_operation(format!(
            "schema version {} is lower than the stored version {stored_version}",
            config.schema_version
        )));
    }
    let plan = reconcile(&Schema::from_snapshot(snapshot), declared);
    let migrating = config.schema_version > stored_version && config.migration.is_some();
    if !migrating {
        if let Some(step) = plan.first_blocking() {
            return Err(migration_required(step));
        }
        if let Some(step) = plan.steps().first().filter(|_| !config.allow_additive_migration) {
            return Err(migration_required(step));
        }
    }
    if !plan.is_empty() {
        debug!(
            steps = plan.steps().len(),
            additive = plan.is_additive(),
            "stored schema differs from declared schema"
        );
    }
    Ok(!plan.is_empty() || config.schema_version != stored_version)
}

struct State {
    snapshot: Arc<Snapshot>,
    write: Option<WriteTransaction>,
}

struct RealmInner {
    engine: Arc<Engine>,
    schema: Arc<Schema>,
    bindings: HashMap<String, Arc<ClassBinding>>,
    schema_version: u64,
    auto_refresh: bool,
    write_timeout: Option<Duration>,
    context: ThreadId,
    state: Mutex<State>,
    /// Bumped whenever the visible data may have changed.
    generation: AtomicU64,
    closed: AtomicBool,
    /// Commit wakeups; taken on close.
    versions: Mutex<Option<Receiver<Version>>>,
    coordinator: NotificationCoordinator,
}

/// A handle on a store for one execution context.
///
/// Cloning yields another reference to the same realm.
#[derive(Clone)]
pub struct Realm {
    inner: Arc<RealmInner>,
}

/// Cancels the write scope unless disarmed.
struct WriteGuard<'a> {
    realm: &'a Realm,
    armed: bool,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        if self.armed && self.realm.is_in_write() {
            // Cancelling a scope this context holds cannot fail.
            let _ = self.realm.cancel_write();
        }
    }
}

impl Realm {
    /// Opens a realm on `engine` for the calling thread.
    ///
    /// The declared classes are derived into a schema and reconciled with
    /// the stored one. A fresh store gets every table created. Otherwise:
    /// - a lower schema version than the stored one is rejected
    /// - changes that lose or reinterpret data need a higher schema version
    ///   and a migration
    /// - additive changes need `allow_additive_migration` or a migration
    ///
    /// # Errors
    ///
    /// `Schema`, `MigrationRequired`, `MigrationFailed`, `WriteTimeout`.
    pub fn open(engine: &Arc<Engine>, config: Config) -> CoreResult<Self> {
        let declared = derive_schema(&config.models)?;
        let versions = engine.subscribe();

        if needs_update(&engine.latest(), &declared, &config)? {
            let mut txn = engine.begin_write(config.write_timeout)?;
            if needs_update(txn.snapshot(), &declared, &config)? {
                let migration = if is_fresh(txn.snapshot()) {
                    None
                } else {
                    config.migration.as_deref()
                };
                apply_migration(&mut txn, &declared, migration, config.schema_version)?;
                let version = txn.commit()?;
                info!(%version, schema_version = config.schema_version, "schema updated");
            } else {
                txn.rollback();
            }
        }

        let snapshot = engine.latest();
        let bindings = bind(&snapshot, &config.models)?;
        info!(
            store = %engine.id(),
            version = %snapshot.version(),
            classes = bindings.len(),
            "realm opened"
        );
        Ok(Self {
            inner: Arc::new(RealmInner {
                engine: Arc::clone(engine),
                schema: Arc::new(declared),
                bindings,
                schema_version: config.schema_version,
                auto_refresh: config.auto_refresh,
                write_timeout: config.write_timeout,
                context: thread::current().id(),
                state: Mutex::new(State {
                    snapshot,
                    write: None,
                }),
                generation: AtomicU64::new(0),
                closed: AtomicBool::new(false),
                versions: Mutex::new(Some(versions)),
                coordinator: NotificationCoordinator::new(),
            }),
        })
    }

    /// Returns the engine.
    #[must_use]
    pub fn engine(&self) -> &Arc<Engine> {
        &self.inner.engine
    }

    /// Returns the derived schema. Shared and immutable.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.inner.schema
    }

    /// Returns the schema version the realm was opened with.
    #[must_use]
    pub fn schema_version(&self) -> u64 {
        self.inner.schema_version
    }

    /// Returns the store identity.
    #[must_use]
    pub fn store_id(&self) -> StoreId {
        self.inner.engine.id()
    }

    /// Returns the version the realm currently reads.
    pub fn version(&self) -> CoreResult<Version> {
        self.read(Snapshot::version)
    }

    /// Returns true once [`Realm::close`] was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Returns true while a write scope is open.
    #[must_use]
    pub fn is_in_write(&self) -> bool {
        self.inner.state.lock().write.is_some()
    }

    /// Runs `f` inside a write scope.
    ///
    /// The scope commits when `f` returns `Ok` and rolls back when it
    /// returns an error or panics.
    pub fn write<R>(&self, f: impl FnOnce(&Realm) -> CoreResult<R>) -> CoreResult<R> {
        self.begin_write()?;
        let mut guard = WriteGuard {
            realm: self,
            armed: true,
        };
        let value = f(self)?;
        guard.armed = false;
        if !self.is_in_write() {
            return Err(CoreError::invalid_operation(
                "the write scope was closed inside the write block",
            ));
        }
        self.commit_write()?;
        Ok(value)
    }

    /// Opens a write scope, waiting for the writer slot.
    ///
    /// If another context committed in the meantime, the realm first
    /// advances to that version and runs a notification pass.
    ///
    /// # Errors
    ///
    /// - `InvalidOperation` if a write scope is already open
    /// - `WriteTimeout` if the slot is not free within the configured timeout
    pub fn begin_write(&self) -> CoreResult<()> {
        self.check()?;
        if self.is_in_write() {
            return Err(CoreError::invalid_operation(
                "a write transaction is already open",
            ));
        }
        let txn = self.inner.engine.begin_write(self.inner.write_timeout)?;
        let advanced = {
            let mut state = self.inner.state.lock();
            let latest = self.inner.engine.latest();
            let advanced = latest.version() > state.snapshot.version();
            state.snapshot = latest;
            state.write = Some(txn);
            advanced
        };
        self.bump();
        trace!(advanced, "write scope opened");
        if advanced {
            self.drain_feed();
            self.inner.coordinator.run_pass(self);
        }
        Ok(())
    }

    /// Commits the open write scope and notifies listeners.
    pub fn commit_write(&self) -> CoreResult<Version> {
        self.check()?;
        let txn = self
            .inner
            .state
            .lock()
            .write
            .take()
            .ok_or_else(|| CoreError::invalid_operation("no write transaction is open"))?;
        let result = txn.commit();
        self.bump();
        let version = result?;
        self.inner.state.lock().snapshot = self.inner.engine.latest();
        self.drain_feed();
        self.inner.coordinator.run_pass(self);
        Ok(version)
    }

    /// Rolls back the open write scope.
    pub fn cancel_write(&self) -> CoreResult<()> {
        self.check()?;
        let txn = self
            .inner
            .state
            .lock()
            .write
            .take()
            .ok_or_else(|| CoreError::invalid_operation("no write transaction is open"))?;
        txn.rollback();
        self.bump();
        trace!("write scope cancelled");
        Ok(())
    }

    /// Advances to the latest committed version.
    ///
    /// Returns true if the realm moved. Listeners run before this returns.
    pub fn refresh(&self) -> CoreResult<bool> {
        self.check()?;
        if self.is_in_write() {
            return Err(CoreError::invalid_operation(
                "cannot refresh inside a write transaction",
            ));
        }
        self.advance()
    }

    /// Blocks until another context commits, then refreshes.
    ///
    /// Returns false if `timeout` elapsed first.
    pub fn wait_for_change(&self, timeout: Option<Duration>) -> CoreResult<bool> {
        if self.refresh()? {
            return Ok(true);
        }
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            let received = {
                let guard = self.inner.versions.lock();
                let Some(versions) = guard.as_ref() else {
                    return Err(CoreError::RealmClosed);
                };
                match deadline {
                    Some(deadline) => {
                        let remaining = deadline.saturating_duration_since(Instant::now());
                        match versions.recv_timeout(remaining) {
                            Ok(version) => version,
                            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => {
                                return Ok(false);
                            }
                        }
                    }
                    None => match versions.recv() {
                        Ok(version) => version,
                        Err(_) => return Ok(false),
                    },
                }
            };
            trace!(%received, "version received");
            if self.advance()? {
                return Ok(true);
            }
        }
    }

    /// Closes the realm: rolls back an open write scope and drops every
    /// listener. Objects and collections of the realm become unusable.
    pub fn close(&self) -> CoreResult<()> {
        if thread::current().id() != self.inner.context {
            return Err(CoreError::CrossContextAccess);
        }
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Some(txn) = self.inner.state.lock().write.take() {
            txn.rollback();
        }
        self.inner.versions.lock().take();
        self.inner.coordinator.clear();
        self.bump();
        debug!(store = %self.store_id(), "realm closed");
        Ok(())
    }

    /// Returns a live collection of every object of `T`.
    pub fn objects<T: Model>(&self) -> CoreResult<Collection<T>> {
        self.check()?;
        let binding = self.binding(T::CLASS_NAME)?;
        Ok(Collection::new(LiveCollection::table(self.clone(), binding)))
    }

    /// Returns a live collection of every object of a class, by name.
    pub fn objects_dynamic(&self, class: &str) -> CoreResult<Collection<Object>> {
        self.check()?;
        let binding = self.binding(class)?;
        Ok(Collection::new(LiveCollection::table(self.clone(), binding)))
    }

    /// Starts a query over `T`.
    pub fn query<T: Model>(&self) -> CoreResult<Query<T>> {
        self.check()?;
        Ok(Query::new(self.clone(), self.binding(T::CLASS_NAME)?))
    }

    /// Starts a query over a class, by name.
    pub fn query_dynamic(&self, class: &str) -> CoreResult<Query<Object>> {
        self.check()?;
        Ok(Query::new(self.clone(), self.binding(class)?))
    }

    /// Looks an object up by primary key.
    ///
    /// # Errors
    ///
    /// `NoPrimaryKey` if `T` declares none.
    pub fn find_by_primary_key<T: Model>(&self, value: impl FieldValue) -> CoreResult<Option<T>> {
        let binding = self.binding(T::CLASS_NAME)?;
        if binding.info.primary_key().is_none() {
            return Err(CoreError::NoPrimaryKey {
                class: T::CLASS_NAME.to_string(),
            });
        }
        let value = value.into_value();
        let table = binding.table;
        let key = self.read(|snap| snap.table(table).and_then(|t| t.find_by_primary_key(&value)))?;
        Ok(key.map(|key| T::from_object(Object::managed(self.clone(), binding, key))))
    }

    /// Registers a listener called with the new version after every
    /// advance, once the collection and object listeners ran.
    pub fn add_change_listener<F>(&self, listener: F) -> CoreResult<ListenerToken>
    where
        F: FnMut(Version) + Send + 'static,
    {
        self.check()?;
        Ok(self.inner.coordinator.register_realm(Box::new(listener)))
    }

    /// Removes every listener registered on this realm, its collections
    /// and its objects.
    pub fn remove_all_listeners(&self) -> CoreResult<()> {
        self.check()?;
        self.inner.coordinator.clear();
        Ok(())
    }

    /// Fails unless called on the realm's own context while it is open.
    pub(crate) fn check(&self) -> CoreResult<()> {
        if thread::current().id() != self.inner.context {
            return Err(CoreError::CrossContextAccess);
        }
        if self.is_closed() {
            return Err(CoreError::RealmClosed);
        }
        Ok(())
    }

    /// Checks access and auto-refreshes a stale realm.
    pub(crate) fn prepare(&self) -> CoreResult<()> {
        self.check()?;
        if self.inner.auto_refresh && !self.inner.coordinator.is_dispatching() {
            let stale = {
                let state = self.inner.state.lock();
                state.write.is_none() && self.inner.engine.current_version() > state.snapshot.version()
            };
            if stale {
                self.advance()?;
            }
        }
        Ok(())
    }

    /// Runs `f` on the snapshot the realm reads: the working snapshot while
    /// a write scope is open, the pinned one otherwise.
    ///
    /// `f` runs under the realm's state lock and must not call back into
    /// the realm.
    pub(crate) fn read<R>(&self, f: impl FnOnce(&Snapshot) -> R) -> CoreResult<R> {
        self.prepare()?;
        let state = self.inner.state.lock();
        Ok(match &state.write {
            Some(txn) => f(txn.snapshot()),
            None => f(&state.snapshot),
        })
    }

    /// Runs `f` on the open write transaction.
    ///
    /// # Errors
    ///
    /// `IllegalMutationOutsideWriteScope` if no write scope is open.
    pub(crate) fn write_op<R>(&self, f: impl FnOnce(&mut WriteTransaction) -> R) -> CoreResult<R> {
        self.check()?;
        let result = {
            let mut state = self.inner.state.lock();
            let txn = state
                .write
                .as_mut()
                .ok_or(CoreError::IllegalMutationOutsideWriteScope)?;
            f(txn)
        };
        self.bump();
        Ok(result)
    }

    pub(crate) fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }

    pub(crate) fn binding(&self, class: &str) -> CoreResult<Arc<ClassBinding>> {
        self.inner
            .bindings
            .get(class)
            .cloned()
            .ok_or_else(|| CoreError::ClassNotFound {
                class: class.to_string(),
            })
    }

    pub(crate) fn coordinator(&self) -> &NotificationCoordinator {
        &self.inner.coordinator
    }

    fn bump(&self) {
        self.inner.generation.fetch_add(1, Ordering::AcqRel);
    }

    fn drain_feed(&self) {
        if let Some(versions) = self.inner.versions.lock().as_ref() {
            while versions.try_recv().is_ok() {}
        }
    }

    /// Moves to the latest committed version and runs a notification pass.
    fn advance(&self) -> CoreResult<bool> {
        let latest = self.inner.engine.latest();
        let from = {
            let mut state = self.inner.state.lock();
            if state.write.is_some() || latest.version() <= state.snapshot.version() {
                return Ok(false);
            }
            std::mem::replace(&mut state.snapshot, Arc::clone(&latest)).version()
        };
        self.bump();
        self.drain_feed();
        debug!(%from, to = %latest.version(), "realm advanced");
        self.inner.coordinator.run_pass(self);
        Ok(true)
    }
}

impl PartialEq for Realm {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Realm {}

impl fmt::Debug for Realm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Realm")
            .field("store", &self.store_id())
            .field("schema_version", &self.inner.schema_version)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldDescriptor;
    use std::sync::mpsc;
    use stratadb_engine::{EngineConfig, Value};
    use tempfile::TempDir;

    fn person(extra: Option<FieldDescriptor>) -> ClassDescriptor {
        let class = ClassDescriptor::new("Person").field(FieldDescriptor::new("name", FieldType::String));
        match extra {
            Some(field) => class.field(field),
            None => class,
        }
    }

    #[test]
    fn fresh_store_gets_tables() {
        let engine = Engine::in_memory();
        let realm = Realm::open(&engine, Config::new().class(person(None))).unwrap();
        assert!(engine.latest().table_by_name("Person").is_some());
        assert_eq!(realm.objects_dynamic("Person").unwrap().len().unwrap(), 0);
        assert!(matches!(
            realm.objects_dynamic("Dog"),
            Err(CoreError::ClassNotFound { .. })
        ));
    }

    #[test]
    fn additive_change_needs_opt_in() {
        let engine = Engine::in_memory();
        Realm::open(&engine, Config::new().class(person(None))).unwrap();
        let email = || Some(FieldDescriptor::new("email", FieldType::String).nullable(true));

        let err = Realm::open(&engine, Config::new().class(person(email()))).unwrap_err();
        assert!(matches!(err, CoreError::MigrationRequired { path, .. } if path == "Person.email"));

        let realm = Realm::open(
            &engine,
            Config::new().class(person(email())).allow_additive_migration(true),
        )
        .unwrap();
        assert!(realm.schema().class("Person").unwrap().field("email").is_some());
    }

    #[test]
    fn blocking_change_needs_migration_and_version() {
        let engine = Engine::in_memory();
        Realm::open(&engine, Config::new().class(person(None))).unwrap();
        let age = || Some(FieldDescriptor::new("age", FieldType::Integer));

        let err = Realm::open(
            &engine,
            Config::new().class(person(age())).allow_additive_migration(true),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::MigrationRequired { reason, .. } if reason == "non-nullable field added"));

        let realm = Realm::open(
            &engine,
            Config::new()
                .class(person(age()))
                .schema_version(1)
                .migration(|_| Ok(())),
        )
        .unwrap();
        assert_eq!(engine.latest().schema_version(), 1);
        assert_eq!(realm.schema_version(), 1);

        let err = Realm::open(&engine, Config::new().class(person(age()))).unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation { .. }));
    }

    #[test]
    fn write_rolls_back_on_error() {
        let realm = Realm::open(&Engine::in_memory(), Config::new().class(person(None))).unwrap();
        let result: CoreResult<()> = realm.write(|r| {
            r.create_object_dynamic("Person", None)?;
            Err(CoreError::invalid_operation("boom"))
        });
        assert!(result.is_err());
        assert!(!realm.is_in_write());
        assert_eq!(realm.objects_dynamic("Person").unwrap().len().unwrap(), 0);
        assert!(!realm.engine().is_write_locked());
    }

    #[test]
    fn nested_write_is_rejected() {
        let realm = Realm::open(&Engine::in_memory(), Config::new().class(person(None))).unwrap();
        realm.begin_write().unwrap();
        assert!(matches!(realm.begin_write(), Err(CoreError::InvalidOperation { .. })));
        realm.cancel_write().unwrap();
        assert!(matches!(realm.commit_write(), Err(CoreError::InvalidOperation { .. })));
    }

    #[test]
    fn refresh_and_auto_refresh() {
        let engine = Engine::in_memory();
        let config = Config::new().class(person(None));
        let manual = Realm::open(&engine, config.clone().auto_refresh(false)).unwrap();
        let auto = Realm::open(&engine, config.clone()).unwrap();
        let manual_people = manual.objects_dynamic("Person").unwrap();
        assert_eq!(manual_people.len().unwrap(), 0);

        let writer_engine = Arc::clone(&engine);
        thread::spawn(move || {
            let realm = Realm::open(&writer_engine, config).unwrap();
            realm
                .write(|r| {
                    r.create_object_dynamic("Person", None)?
                        .set("name", "Ann".to_string())
                })
                .unwrap();
        })
        .join()
        .unwrap();

        assert_eq!(manual_people.len().unwrap(), 0);
        assert_eq!(auto.objects_dynamic("Person").unwrap().len().unwrap(), 1);
        assert!(manual.refresh().unwrap());
        assert_eq!(manual_people.len().unwrap(), 1);
        assert!(!manual.refresh().unwrap());
    }

    #[test]
    fn wait_for_change_sees_other_context() {
        let engine = Engine::in_memory();
        let config = Config::new().class(person(None)).auto_refresh(false);
        let realm = Realm::open(&engine, config.clone()).unwrap();
        assert!(!realm.wait_for_change(Some(Duration::from_millis(20))).unwrap());

        let (ready_tx, ready_rx) = mpsc::channel();
        let writer_engine = Arc::clone(&engine);
        let writer = thread::spawn(move || {
            let realm = Realm::open(&writer_engine, config).unwrap();
            ready_rx.recv().unwrap();
            realm
                .write(|r| r.create_object_dynamic("Person", None).map(|_| ()))
                .unwrap();
        });
        ready_tx.send(()).unwrap();
        assert!(realm.wait_for_change(Some(Duration::from_secs(5))).unwrap());
        writer.join().unwrap();
        assert_eq!(realm.objects_dynamic("Person").unwrap().len().unwrap(), 1);
    }

    #[test]
    fn closed_realm_rejects_access() {
        let realm = Realm::open(&Engine::in_memory(), Config::new().class(person(None))).unwrap();
        let people = realm.objects_dynamic("Person").unwrap();
        realm.begin_write().unwrap();
        realm.close().unwrap();
        assert!(realm.is_closed());
        assert!(!realm.engine().is_write_locked());
        assert!(matches!(people.len(), Err(CoreError::RealmClosed)));
        realm.close().unwrap();
    }

    #[test]
    fn closed_realm_stops_receiving_versions() {
        let engine = Engine::in_memory();
        let config = Config::new().class(person(None));
        let closed = Realm::open(&engine, config.clone()).unwrap();
        let _people = closed.objects_dynamic("Person").unwrap();
        closed.close().unwrap();

        let writer = Realm::open(&engine, config).unwrap();
        for _ in 0..50 {
            writer
                .write(|r| r.create_object_dynamic("Person", None).map(|_| ()))
                .unwrap();
        }
        assert_eq!(engine.subscriber_count(), 1);
        assert!(matches!(
            closed.wait_for_change(Some(Duration::from_millis(1))),
            Err(CoreError::RealmClosed)
        ));
    }

    #[test]
    fn persisted_store_reopens_with_schema() {
        let dir = TempDir::new().unwrap();
        let config = Config::new().class(
            ClassDescriptor::new("Person")
                .field(FieldDescriptor::new("id", FieldType::Integer).primary_key(true))
                .field(FieldDescriptor::new("name", FieldType::String)),
        );
        {
            let engine = Engine::open(EngineConfig::new().path(dir.path())).unwrap();
            let realm = Realm::open(&engine, config.clone()).unwrap();
            realm
                .write(|r| {
                    r.create_object_dynamic("Person", Some(Value::Int(7)))?
                        .set("name", "Ann".to_string())
                })
                .unwrap();
        }
        let engine = Engine::open(EngineConfig::new().path(dir.path())).unwrap();
        let realm = Realm::open(&engine, config).unwrap();
        let people = realm.query_dynamic("Person").unwrap().equal_to("id", 7_i64).find_all().unwrap();
        assert_eq!(people.get(0).unwrap().get::<String>("name").unwrap(), "Ann");
    }
}
