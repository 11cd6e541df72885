//! The engine handle: versioned snapshots plus the single writer slot.

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::feed::VersionFeed;
use crate::persist;
use crate::snapshot::Snapshot;
use crate::transaction::WriteTransaction;
use crate::types::{StoreId, TableId, Version};
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::HashMap;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// A versioned, copy-on-write object store.
///
/// The engine hands out immutable [`Snapshot`]s to any number of readers
/// and admits at most one [`WriteTransaction`] at a time. Each commit
/// produces a strictly greater [`Version`] and is announced on the
/// engine's [`VersionFeed`].
///
/// # Thread Safety
///
/// `Engine` is `Send + Sync` and is always used behind an `Arc`: write
/// transactions keep the engine alive until they finish.
///
/// # Example
///
/// ```rust,ignore
/// use stratadb_engine::{ColumnDef, ColumnType, Engine, TableDef, Value};
///
/// let engine = Engine::in_memory();
/// let mut txn = engine.begin_write(None)?;
/// let dogs = txn.create_table(TableDef::new("Dog").column(ColumnDef::new("name", ColumnType::String)))?;
/// let rex = txn.create_row(dogs, None)?;
/// txn.set(dogs, rex, 0, Value::String("Rex".into()))?;
/// txn.commit()?;
/// ```
pub struct Engine {
    id: StoreId,
    config: EngineConfig,
    latest: RwLock<Arc<Snapshot>>,
    writer: Mutex<Option<ThreadId>>,
    writer_released: Condvar,
    allocations: Mutex<Allocations>,
    feed: VersionFeed,
}

/// Table IDs and row keys handed out by any transaction, committed or not.
///
/// Rolled-back transactions discard their snapshot but not their
/// allocations, so a key is never handed out twice.
#[derive(Debug, Default)]
struct Allocations {
    next_table: u32,
    next_keys: HashMap<TableId, u64>,
}

impl Engine {
    /// Opens an engine, loading the persisted snapshot when `config.path` is set.
    pub fn open(config: EngineConfig) -> EngineResult<Arc<Self>> {
        let snapshot = match &config.path {
            Some(dir) => match persist::load(dir)? {
                Some(snapshot) => {
                    info!(path = %dir.display(), version = %snapshot.version(), "loaded store");
                    snapshot
                }
                None => {
                    info!(path = %dir.display(), "creating new store");
                    Snapshot::empty()
                }
            },
            None => Snapshot::empty(),
        };
        Ok(Arc::new(Self {
            id: StoreId::new(),
            config,
            latest: RwLock::new(Arc::new(snapshot)),
            writer: Mutex::new(None),
            writer_released: Condvar::new(),
            allocations: Mutex::new(Allocations::default()),
            feed: VersionFeed::new(),
        }))
    }

    /// Creates an empty in-memory engine.
    #[must_use]
    pub fn in_memory() -> Arc<Self> {
        Arc::new(Self {
            id: StoreId::new(),
            config: EngineConfig::default(),
            latest: RwLock::new(Arc::new(Snapshot::empty())),
            writer: Mutex::new(None),
            writer_released: Condvar::new(),
            allocations: Mutex::new(Allocations::default()),
            feed: VersionFeed::new(),
        })
    }

    /// Returns the identity of this store.
    #[must_use]
    pub fn id(&self) -> StoreId {
        self.id
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the most recently committed snapshot.
    #[must_use]
    pub fn latest(&self) -> Arc<Snapshot> {
        Arc::clone(&self.latest.read())
    }

    /// Returns the most recently committed version.
    #[must_use]
    pub fn current_version(&self) -> Version {
        self.latest.read().version()
    }

    /// Subscribes to committed versions.
    pub fn subscribe(&self) -> Receiver<Version> {
        self.feed.subscribe()
    }

    /// Returns the number of live feed subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.feed.subscriber_count()
    }

    /// Returns true while some thread holds the writer slot.
    #[must_use]
    pub fn is_write_locked(&self) -> bool {
        self.writer.lock().is_some()
    }

    /// Acquires the writer slot and starts a transaction on the latest snapshot.
    ///
    /// Blocks until the slot is free or `timeout` (falling back to
    /// [`EngineConfig::default_write_timeout`]) elapses.
    ///
    /// # Errors
    ///
    /// - `WriterHeldByCurrentThread` if this thread already has a write open
    /// - `WriteTimeout` if the slot stays taken past the deadline
    pub fn begin_write(self: &Arc<Self>, timeout: Option<Duration>) -> EngineResult<WriteTransaction> {
        let me = thread::current().id();
        let deadline = timeout
            .or(self.config.default_write_timeout)
            .map(|t| Instant::now() + t);
        let mut owner = self.writer.lock();
        loop {
            match *owner {
                None => break,
                Some(holder) if holder == me => return Err(EngineError::WriterHeldByCurrentThread),
                Some(_) => match deadline {
                    Some(deadline) => {
                        if self
                            .writer_released
                            .wait_until(&mut owner, deadline)
                            .timed_out()
                            && owner.is_some()
                        {
                            warn!("timed out waiting for the write lock");
                            return Err(EngineError::WriteTimeout);
                        }
                    }
                    None => self.writer_released.wait(&mut owner),
                },
            }
        }
        *owner = Some(me);
        drop(owner);

        let mut base = (*self.latest()).clone();
        self.apply_allocations(&mut base);
        debug!(base = %base.version(), "began write transaction");
        Ok(WriteTransaction::new(Arc::clone(self), base))
    }

    /// Installs a committed snapshot, then frees the writer slot and notifies.
    pub(crate) fn publish(&self, snapshot: Snapshot) -> EngineResult<Version> {
        let version = snapshot.version();
        if let Some(dir) = &self.config.path {
            if let Err(e) = persist::save(dir, &snapshot) {
                self.release_writer();
                return Err(e);
            }
        }
        *self.latest.write() = Arc::new(snapshot);
        self.release_writer();
        debug!(%version, "committed");
        self.feed.emit(version);
        Ok(version)
    }

    fn apply_allocations(&self, snapshot: &mut Snapshot) {
        let allocations = self.allocations.lock();
        for (table, floor) in &allocations.next_keys {
            if snapshot.table(*table).is_some_and(|t| t.next_key() < *floor) {
                if let Ok(t) = snapshot.table_mut(*table) {
                    t.raise_next_key(*floor);
                }
            }
        }
    }

    pub(crate) fn reserve_table(&self, candidate: TableId) -> TableId {
        let mut allocations = self.allocations.lock();
        let id = candidate.as_u32().max(allocations.next_table);
        allocations.next_table = id + 1;
        TableId::new(id)
    }

    pub(crate) fn reserve_key(&self, table: TableId, next_key: u64) {
        let mut allocations = self.allocations.lock();
        let floor = allocations.next_keys.entry(table).or_insert(0);
        *floor = (*floor).max(next_key);
    }

    pub(crate) fn release_writer(&self) {
        *self.writer.lock() = None;
        self.writer_released.notify_one();
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("id", &self.id)
            .field("version", &self.current_version())
            .finish_non_exhaustive()
    }
}
