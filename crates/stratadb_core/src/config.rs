//! Realm configuration.

use crate::object::Model;
use crate::schema::{ClassDescriptor, Migration, MigrationContext};
use crate::error::CoreResult;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for opening a realm.
#[derive(Clone)]
pub struct Config {
    /// Application schema version; must not be lower than the stored one.
    pub schema_version: u64,

    /// Declared model classes.
    pub models: Vec<ClassDescriptor>,

    /// Migration run when the schema version increases.
    pub migration: Option<Arc<dyn Migration>>,

    /// Whether new classes and new nullable fields are applied without a migration.
    pub allow_additive_migration: bool,

    /// Whether a realm advances to the latest version on access.
    pub auto_refresh: bool,

    /// How long opening a write scope waits for the writer slot.
    /// `None` waits indefinitely.
    pub write_timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema_version: 0,
            models: Vec::new(),
            migration: None,
            allow_additive_migration: false,
            auto_refresh: true,
            write_timeout: None,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a model class.
    #[must_use]
    pub fn model<T: Model>(mut self) -> Self {
        self.models.push(T::describe());
        self
    }

    /// Declares a class by descriptor, for dynamic use.
    #[must_use]
    pub fn class(mut self, descriptor: ClassDescriptor) -> Self {
        self.models.push(descriptor);
        self
    }

    /// Sets the schema version.
    #[must_use]
    pub const fn schema_version(mut self, version: u64) -> Self {
        self.schema_version = version;
        self
    }

    /// Sets the migration callback.
    #[must_use]
    pub fn migration<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut MigrationContext<'_>) -> CoreResult<()> + Send + Sync + 'static,
    {
        self.migration = Some(Arc::new(f));
        self
    }

    /// Sets a migration implemented as a type.
    #[must_use]
    pub fn migration_with(mut self, migration: impl Migration + 'static) -> Self {
        self.migration = Some(Arc::new(migration));
        self
    }

    /// Sets whether additive schema changes apply automatically.
    #[must_use]
    pub const fn allow_additive_migration(mut self, value: bool) -> Self {
        self.allow_additive_migration = value;
        self
    }

    /// Sets whether the realm refreshes itself on access.
    #[must_use]
    pub const fn auto_refresh(mut self, value: bool) -> Self {
        self.auto_refresh = value;
        self
    }

    /// Sets the write-scope acquisition timeout.
    #[must_use]
    pub const fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("schema_version", &self.schema_version)
            .field(
                "models",
                &self.models.iter().map(|m| m.name.as_str()).collect::<Vec<_>>(),
            )
            .field("migration", &self.migration.is_some())
            .field("allow_additive_migration", &self.allow_additive_migration)
            .field("auto_refresh", &self.auto_refresh)
            .field("write_timeout", &self.write_timeout)
            .finish()
    }
}
