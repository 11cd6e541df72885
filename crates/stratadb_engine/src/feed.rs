//! Version feed for observing commits.
//!
//! Every successful commit publishes its new [`Version`] to all live
//! subscribers. Handles in other contexts use the feed to learn that the
//! store has advanced without polling the engine.
//!
//! Each subscriber holds at most one pending version. Commits made while a
//! version is already waiting are coalesced into it, so a subscriber that
//! never reads costs one slot, not one entry per commit. A received version
//! is a wakeup: read [`crate::Engine::current_version`] for the newest one.
//!
//! # Usage
//!
//! ```rust,ignore
//! let engine = Engine::in_memory();
//! let receiver = engine.subscribe();
//!
//! std::thread::spawn(move || {
//!     while let Ok(version) = receiver.recv() {
//!         println!("store advanced to {version}");
//!     }
//! });
//! ```

use crate::types::Version;
use parking_lot::RwLock;
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};

/// Distributes committed versions to subscribers.
///
/// The feed:
/// - Emits only committed versions
/// - Keeps at most one pending version per subscriber
/// - Drops subscribers whose receiver is gone
pub struct VersionFeed {
    subscribers: RwLock<Vec<SyncSender<Version>>>,
}

impl VersionFeed {
    /// Creates an empty feed.
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Subscribes to future versions.
    pub fn subscribe(&self) -> Receiver<Version> {
        let (tx, rx) = mpsc::sync_channel(1);
        self.subscribers.write().push(tx);
        rx
    }

    /// Publishes a version to every subscriber, removing disconnected ones.
    ///
    /// Never blocks: a subscriber with a pending version keeps it.
    pub fn emit(&self, version: Version) {
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|tx| match tx.try_send(version) {
            Ok(()) | Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    /// Returns the number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl Default for VersionFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn emit_and_receive() {
        let feed = VersionFeed::new();
        let rx = feed.subscribe();
        feed.emit(Version::new(3));
        assert_eq!(rx.recv_timeout(Duration::from_millis(100)).unwrap(), Version::new(3));
    }

    #[test]
    fn subscriber_cleanup() {
        let feed = VersionFeed::new();
        let rx = feed.subscribe();
        assert_eq!(feed.subscriber_count(), 1);
        drop(rx);
        feed.emit(Version::new(1));
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[test]
    fn unread_versions_coalesce() {
        let feed = VersionFeed::new();
        let rx = feed.subscribe();
        for v in 1..=500 {
            feed.emit(Version::new(v));
        }
        assert_eq!(rx.try_recv().unwrap(), Version::new(1));
        assert!(rx.try_recv().is_err());
        feed.emit(Version::new(501));
        assert_eq!(rx.try_recv().unwrap(), Version::new(501));
        assert_eq!(feed.subscriber_count(), 1);
    }

    #[test]
    fn threaded_subscribe() {
        let feed = Arc::new(VersionFeed::new());
        let rx = feed.subscribe();
        let feed_clone = Arc::clone(&feed);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            feed_clone.emit(Version::new(7));
        });
        assert_eq!(rx.recv_timeout(Duration::from_millis(500)).unwrap(), Version::new(7));
        handle.join().unwrap();
    }
}
