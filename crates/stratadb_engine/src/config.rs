//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for opening an engine.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Directory holding `snapshot.json`; `None` keeps the store in memory.
    pub path: Option<PathBuf>,

    /// How long `begin_write` waits for the writer slot when the caller
    /// supplies no timeout. `None` waits indefinitely.
    pub default_write_timeout: Option<Duration>,
}

impl EngineConfig {
    /// Creates an in-memory configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Persists committed snapshots under `path`.
    #[must_use]
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Sets the default writer-slot timeout.
    #[must_use]
    pub fn default_write_timeout(mut self, timeout: Duration) -> Self {
        self.default_write_timeout = Some(timeout);
        self
    }
}
