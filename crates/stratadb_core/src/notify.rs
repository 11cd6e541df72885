//! Notification coordinator.
//!
//! Each realm owns one coordinator holding its listener registrations in
//! registration order. Every version advance of the realm runs exactly one
//! notification pass:
//!
//! 1. The registrations are captured. Listeners added during the pass
//!    are first considered by the next one.
//! 2. Each target (collection or object) computes its changes once per
//!    pass, however many listeners it has.
//! 3. Listeners run in registration order, with no lock of the realm
//!    held. A listener removed earlier in the pass is skipped.
//! 4. Realm-level listeners run last.
//!
//! Targets are held weakly, so a registration never keeps a collection
//! or object alive. A pass requested while one is running (a listener
//! committing a write, say) runs after it instead of nesting.

use crate::collection::{ChangeSet, CollectionInner, LiveCollection};
use crate::object::{Object, ObjectInner};
use crate::realm::Realm;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use stratadb_engine::Version;
use tracing::{debug, trace};

/// What an object listener is told.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectEvent {
    /// One or more persisted fields changed.
    Changed {
        /// Names of the changed fields, in declaration order.
        fields: Vec<String>,
    },
    /// The row was deleted. Sent once; the object stays invalid.
    Invalidated,
}

pub(crate) enum Target {
    Collection(Weak<CollectionInner>),
    Object(Weak<ObjectInner>),
    Realm,
}

impl Target {
    fn address(&self) -> Option<usize> {
        match self {
            Target::Collection(weak) => Some(weak.as_ptr() as *const () as usize),
            Target::Object(weak) => Some(weak.as_ptr() as *const () as usize),
            Target::Realm => None,
        }
    }

    fn is_alive(&self) -> bool {
        match self {
            Target::Collection(weak) => weak.strong_count() > 0,
            Target::Object(weak) => weak.strong_count() > 0,
            Target::Realm => true,
        }
    }
}

type CollectionListener = Box<dyn FnMut(&ChangeSet) + Send>;
type ObjectListener = Box<dyn FnMut(&ObjectEvent) + Send>;
type RealmListener = Box<dyn FnMut(Version) + Send>;

enum Callback {
    Collection(CollectionListener),
    Object(ObjectListener),
    Realm(RealmListener),
}

struct Registration {
    id: u64,
    active: AtomicBool,
    target: Target,
    callback: Mutex<Callback>,
}

type Registry = Mutex<Vec<Arc<Registration>>>;

/// Handle to a registered listener.
///
/// Dropping the token does not remove the listener; call
/// [`ListenerToken::remove`].
pub struct ListenerToken {
    registration: Arc<Registration>,
    registry: Weak<Registry>,
}

impl ListenerToken {
    /// Unregisters the listener. Idempotent.
    ///
    /// A listener removed while a pass is dispatching is not called again
    /// in that pass.
    pub fn remove(&self) {
        if !self.registration.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry
                .lock()
                .retain(|r| r.id != self.registration.id);
        }
        trace!(id = self.registration.id, "listener removed");
    }

    /// Returns true until the listener is removed or its realm closed.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.registration.active.load(Ordering::Acquire)
    }
}

impl fmt::Debug for ListenerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerToken")
            .field("id", &self.registration.id)
            .field("active", &self.is_active())
            .finish()
    }
}

enum Event {
    Collection(ChangeSet),
    Object(ObjectEvent),
}

/// Resets the dispatching flag even if a listener panics.
struct PassGuard<'a>(&'a AtomicBool);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub(crate) struct NotificationCoordinator {
    registry: Arc<Registry>,
    next_id: AtomicU64,
    next_pass: AtomicU64,
    dispatching: AtomicBool,
    pending: AtomicBool,
}

impl NotificationCoordinator {
    pub(crate) fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(1),
            next_pass: AtomicU64::new(1),
            dispatching: AtomicBool::new(false),
            pending: AtomicBool::new(false),
        }
    }

    fn register(&self, target: Target, callback: Callback) -> ListenerToken {
        let registration = Arc::new(Registration {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            active: AtomicBool::new(true),
            target,
            callback: Mutex::new(callback),
        });
        self.registry.lock().push(Arc::clone(&registration));
        trace!(id = registration.id, "listener registered");
        ListenerToken {
            registration,
            registry: Arc::downgrade(&self.registry),
        }
    }

    pub(crate) fn register_collection(&self, target: Target, listener: CollectionListener) -> ListenerToken {
        self.register(target, Callback::Collection(listener))
    }

    pub(crate) fn register_object(&self, target: Target, listener: ObjectListener) -> ListenerToken {
        self.register(target, Callback::Object(listener))
    }

    pub(crate) fn register_realm(&self, listener: RealmListener) -> ListenerToken {
        self.register(Target::Realm, Callback::Realm(listener))
    }

    /// Returns true if an active listener observes the same target.
    pub(crate) fn is_observed(&self, target: &Target) -> bool {
        let Some(address) = target.address() else {
            return false;
        };
        self.registry
            .lock()
            .iter()
            .any(|r| r.active.load(Ordering::Acquire) && r.target.address() == Some(address))
    }

    pub(crate) fn is_dispatching(&self) -> bool {
        self.dispatching.load(Ordering::Acquire)
    }

    pub(crate) fn listener_count(&self) -> usize {
        self.registry.lock().len()
    }

    /// Deactivates every listener.
    pub(crate) fn clear(&self) {
        let drained: Vec<_> = self.registry.lock().drain(..).collect();
        for registration in &drained {
            registration.active.store(false, Ordering::Release);
        }
        if !drained.is_empty() {
            debug!(listeners = drained.len(), "listeners cleared");
        }
    }

    /// Runs a notification pass for `realm`, plus any pass requested while
    /// it runs.
    pub(crate) fn run_pass(&self, realm: &Realm) {
        if self.dispatching.swap(true, Ordering::AcqRel) {
            self.pending.store(true, Ordering::Release);
            return;
        }
        let _guard = PassGuard(&self.dispatching);
        loop {
            self.pending.store(false, Ordering::Release);
            self.dispatch_once(realm);
            if !self.pending.load(Ordering::Acquire) {
                break;
            }
        }
    }

    fn dispatch_once(&self, realm: &Realm) {
        let pass = self.next_pass.fetch_add(1, Ordering::Relaxed);
        let registrations: Vec<Arc<Registration>> = {
            let mut registry = self.registry.lock();
            registry.retain(|r| r.active.load(Ordering::Acquire) && r.target.is_alive());
            registry.clone()
        };
        if registrations.is_empty() {
            return;
        }

        let mut events = Vec::new();
        let mut realm_listeners = Vec::new();
        for registration in registrations {
            let event = match &registration.target {
                Target::Collection(weak) => weak
                    .upgrade()
                    .and_then(|inner| LiveCollection::from_inner(inner).pass_changes(pass))
                    .map(Event::Collection),
                Target::Object(weak) => weak
                    .upgrade()
                    .and_then(|inner| Object::from_inner(inner).pass_event(pass))
                    .map(Event::Object),
                Target::Realm => {
                    realm_listeners.push(registration);
                    continue;
                }
            };
            if let Some(event) = event {
                events.push((registration, event));
            }
        }

        let mut dispatched = 0_usize;
        for (registration, event) in &events {
            if !registration.active.load(Ordering::Acquire) {
                continue;
            }
            let mut callback = registration.callback.lock();
            match (&mut *callback, event) {
                (Callback::Collection(listener), Event::Collection(changes)) => listener(changes),
                (Callback::Object(listener), Event::Object(event)) => listener(event),
                _ => continue,
            }
            dispatched += 1;
        }

        if !realm_listeners.is_empty() {
            if let Ok(version) = realm.version() {
                for registration in &realm_listeners {
                    if !registration.active.load(Ordering::Acquire) {
                        continue;
                    }
                    if let Callback::Realm(listener) = &mut *registration.callback.lock() {
                        listener(version);
                        dispatched += 1;
                    }
                }
            }
        }
        debug!(pass, changed = events.len(), dispatched, "notification pass");
    }
}
