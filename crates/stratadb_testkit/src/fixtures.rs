//! Test fixtures and realm helpers.
//!
//! Provides engines and realms with automatic cleanup, tracing setup, and
//! recorders that capture listener output for later assertions.

use crate::models::{AllTypes, Contact, Dog, Node, Person};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};
use stratadb_core::{ChangeSet, Config, Model, ObjectEvent, Realm, Version};
use stratadb_engine::{Engine, EngineConfig};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Installs a test tracing subscriber once per process.
///
/// Honors `RUST_LOG`; defaults to warnings only.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Config declaring every testkit model.
pub fn test_config() -> Config {
    Config::new()
        .model::<Dog>()
        .model::<Person>()
        .model::<Contact>()
        .model::<AllTypes>()
        .model::<Node>()
}

/// An engine with a realm on the current thread.
pub struct TestRealm {
    /// The realm.
    pub realm: Realm,
    /// The engine, for opening more realms.
    pub engine: Arc<Engine>,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestRealm {
    /// Opens an in-memory engine with every testkit model.
    pub fn memory() -> Self {
        Self::memory_with(test_config())
    }

    /// Opens an in-memory engine with `config`.
    pub fn memory_with(config: Config) -> Self {
        init_tracing();
        let engine = Engine::in_memory();
        let realm = Realm::open(&engine, config).expect("Failed to open realm");
        Self {
            realm,
            engine,
            _temp_dir: None,
        }
    }

    /// Opens a file-backed engine with every testkit model.
    pub fn file() -> Self {
        init_tracing();
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let engine = Engine::open(EngineConfig::new().path(temp_dir.path())).expect("Failed to open engine");
        let realm = Realm::open(&engine, test_config()).expect("Failed to open realm");
        Self {
            realm,
            engine,
            _temp_dir: Some(temp_dir),
        }
    }

    /// Returns the store directory if file-backed.
    pub fn path(&self) -> Option<PathBuf> {
        self._temp_dir.as_ref().map(|d| d.path().to_path_buf())
    }

    /// Opens another realm on the same engine for the current thread.
    pub fn reopen(&self, config: Config) -> Realm {
        Realm::open(&self.engine, config).expect("Failed to open realm")
    }
}

impl std::ops::Deref for TestRealm {
    type Target = Realm;

    fn deref(&self) -> &Self::Target {
        &self.realm
    }
}

/// Runs a test with a realm on a fresh in-memory engine.
///
/// # Example
///
/// ```rust,ignore
/// use stratadb_testkit::with_temp_realm;
///
/// #[test]
/// fn my_test() {
///     with_temp_realm(|realm| {
///         let dogs = realm.objects::<Dog>().unwrap();
///         // ... test operations
///     });
/// }
/// ```
pub fn with_temp_realm<F, R>(f: F) -> R
where
    F: FnOnce(&Realm) -> R,
{
    let test = TestRealm::memory();
    f(&test.realm)
}

/// Runs a test with a file-backed engine; the closure gets the store path.
pub fn with_file_engine<F, R>(f: F) -> R
where
    F: FnOnce(&Arc<Engine>, &Path) -> R,
{
    init_tracing();
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let engine = Engine::open(EngineConfig::new().path(temp_dir.path())).expect("Failed to open engine");
    f(&engine, temp_dir.path())
}

/// Collects what listeners receive.
///
/// Clones share the same log, so one clone can move into a listener while
/// the test keeps another.
#[derive(Debug)]
pub struct Recorder<T> {
    log: Arc<Mutex<Vec<T>>>,
}

impl<T> Clone for Recorder<T> {
    fn clone(&self) -> Self {
        Self {
            log: Arc::clone(&self.log),
        }
    }
}

impl<T> Default for Recorder<T> {
    fn default() -> Self {
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<T: Clone> Recorder<T> {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    pub fn push(&self, entry: T) {
        self.log.lock().push(entry);
    }

    /// Returns a copy of the entries so far.
    pub fn entries(&self) -> Vec<T> {
        self.log.lock().clone()
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.log.lock().len()
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.log.lock().is_empty()
    }

    /// Removes and returns the entries so far.
    pub fn take(&self) -> Vec<T> {
        std::mem::take(&mut *self.log.lock())
    }
}

impl Recorder<ChangeSet> {
    /// A collection listener that records every change set.
    pub fn collection_listener(&self) -> impl FnMut(&ChangeSet) + Send + 'static {
        let recorder = self.clone();
        move |changes| recorder.push(changes.clone())
    }
}

impl Recorder<ObjectEvent> {
    /// An object listener that records every event.
    pub fn object_listener(&self) -> impl FnMut(&ObjectEvent) + Send + 'static {
        let recorder = self.clone();
        move |event| recorder.push(event.clone())
    }
}

impl Recorder<Version> {
    /// A realm listener that records every version.
    pub fn realm_listener(&self) -> impl FnMut(Version) + Send + 'static {
        let recorder = self.clone();
        move |version| recorder.push(version)
    }
}

/// Replays `changes` on `old`, producing the sequence the collection
/// should now hold. `new_items` supplies inserted elements by new index.
///
/// Deletions are applied first (old indices), then kept elements are placed
/// at their new positions; moves and insertions are resolved against the
/// new index space.
pub fn apply_changes<T: Clone>(old: &[T], changes: &ChangeSet, new_items: &[T]) -> Vec<T> {
    let mut slots: Vec<Option<T>> = vec![None; new_items.len()];
    for &index in &changes.insertions {
        slots[index] = Some(new_items[index].clone());
    }
    let moved_from: Vec<usize> = changes.moves.iter().map(|m| m.from).collect();
    for m in &changes.moves {
        slots[m.to] = Some(old[m.from].clone());
    }
    let mut remaining = old
        .iter()
        .enumerate()
        .filter(|(i, _)| !changes.deletions.contains(i) && !moved_from.contains(i))
        .map(|(_, item)| item.clone());
    for slot in &mut slots {
        if slot.is_none() {
            *slot = remaining.next();
        }
    }
    slots.into_iter().flatten().collect()
}

/// Opens a realm for `T` alone on an in-memory engine.
pub fn realm_for<T: Model>() -> Realm {
    init_tracing();
    Realm::open(&Engine::in_memory(), Config::new().model::<T>()).expect("Failed to open realm")
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratadb_core::Move;

    #[test]
    fn test_config_declares_every_model() {
        let test = TestRealm::memory();
        for class in ["Dog", "Person", "Contact", "AllTypes", "Node"] {
            assert!(test.schema().class(class).is_some(), "missing {class}");
        }
    }

    #[test]
    fn recorder_clones_share_log() {
        let recorder = Recorder::new();
        let mut listener = recorder.realm_listener();
        listener(Version(3));
        assert_eq!(recorder.entries(), vec![Version(3)]);
        assert_eq!(recorder.take().len(), 1);
        assert!(recorder.is_empty());
    }

    #[test]
    fn apply_changes_replays_moves() {
        let changes = ChangeSet {
            deletions: vec![1],
            insertions: vec![0],
            modifications: vec![],
            moves: vec![Move { from: 2, to: 1 }],
        };
        // old: a b c d -> delete b, insert x at 0, c moves before a
        let replayed = apply_changes(&["a", "b", "c", "d"], &changes, &["x", "c", "a", "d"]);
        assert_eq!(replayed, ["x", "c", "a", "d"]);
    }

    #[test]
    fn file_realm_has_path() {
        let test = TestRealm::file();
        assert!(test.path().is_some_and(|p| p.exists()));
    }

    #[test]
    fn realm_for_declares_one_class() {
        let realm = realm_for::<Contact>();
        assert_eq!(realm.schema().classes().len(), 1);
        assert!(realm.schema().class("Contact").is_some());
    }
}
