//! Stress helpers: many contexts writing to one store.

use crate::fixtures::test_config;
use crate::models::Dog;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use stratadb_core::{CoreResult, Realm};
use stratadb_engine::Engine;
use tracing::info;

/// Result of a stress run.
#[derive(Debug, Clone)]
pub struct StressResult {
    /// Commits that succeeded.
    pub commits: usize,
    /// Commits that failed.
    pub failures: usize,
    /// Wall-clock duration.
    pub duration: Duration,
}

impl StressResult {
    /// Commits per second.
    pub fn commits_per_second(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.commits as f64 / secs
        } else {
            0.0
        }
    }
}

/// Configuration for a stress run.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of writer threads, each with its own realm.
    pub threads: usize,
    /// Write scopes committed per thread.
    pub commits_per_thread: usize,
    /// Objects inserted per write scope.
    pub objects_per_commit: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            commits_per_thread: 25,
            objects_per_commit: 4,
        }
    }
}

/// Runs concurrent writers inserting [`Dog`]s into `engine`.
///
/// Every thread opens its own realm, so the run exercises writer-slot
/// serialization and cross-context refresh.
pub fn concurrent_inserts(engine: &Arc<Engine>, config: &StressConfig) -> StressResult {
    let start = Instant::now();
    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let engine = Arc::clone(engine);
            let config = config.clone();
            thread::spawn(move || -> (usize, usize) {
                let Ok(realm) = Realm::open(&engine, test_config()) else {
                    return (0, config.commits_per_thread);
                };
                let mut ok = 0;
                let mut failed = 0;
                for c in 0..config.commits_per_thread {
                    match insert_batch(&realm, t, c, config.objects_per_commit) {
                        Ok(()) => ok += 1,
                        Err(_) => failed += 1,
                    }
                }
                (ok, failed)
            })
        })
        .collect();

    let (commits, failures) = handles
        .into_iter()
        .map(|h| h.join().unwrap_or((0, config.commits_per_thread)))
        .fold((0, 0), |(a, b), (ok, failed)| (a + ok, b + failed));
    let result = StressResult {
        commits,
        failures,
        duration: start.elapsed(),
    };
    info!(
        commits = result.commits,
        failures = result.failures,
        rate = result.commits_per_second(),
        "stress run finished"
    );
    result
}

fn insert_batch(realm: &Realm, thread: usize, commit: usize, count: usize) -> CoreResult<()> {
    realm.write(|r| {
        for i in 0..count {
            let dog = Dog::named(&format!("dog-{thread}-{commit}-{i}"))?;
            r.insert(&dog)?;
        }
        Ok(())
    })
}
