//! # Hot Reload Module
//!
//! Replaces the published [`Snapshot`] while traffic flows.
//!
//! Each tick reloads the catalog into a candidate store and:
//!
//! 1. refuses it when its catalog layout is older than the current one
//! 2. keeps the current store when [`SpecStore::should_update`] says nothing
//!    changed
//! 3. otherwise builds routers for the candidate, publishes both with one
//!    pointer swap and asks the catalog to mark the new records `applied`
//!
//! Requests that loaded the old snapshot finish on it. A tick that fails or
//! panics leaves the current snapshot in place; the next tick tries again.
//!
//! Ticks come from a timer ([`HotReloadController::spawn`]) and, optionally,
//! from filesystem events on the catalog file.

use crate::catalog::{CatalogSource, CatalogVersion};
use crate::store::{SharedSnapshot, Snapshot, SpecStore};
use notify::{Config, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// What one reload tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadOutcome {
    Applied { schemas: usize, marked: usize },
    Unchanged,
    /// The candidate came from an older catalog layout.
    Downgrade { current: CatalogVersion, candidate: CatalogVersion },
    Failed(String),
    Panicked,
}

enum Signal {
    Trigger,
    Stop,
}

/// Periodically reloads a catalog into a shared snapshot.
#[derive(Clone)]
pub struct HotReloadController {
    source: Arc<dyn CatalogSource>,
    snapshot: SharedSnapshot,
}

impl std::fmt::Debug for HotReloadController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HotReloadController")
            .field("source", &self.source.describe())
            .finish_non_exhaustive()
    }
}

impl HotReloadController {
    pub fn new(source: Arc<dyn CatalogSource>, snapshot: SharedSnapshot) -> Self {
        Self { source, snapshot }
    }

    /// Run one reload step. Never panics.
    pub fn tick(&self) -> ReloadOutcome {
        match catch_unwind(AssertUnwindSafe(|| self.try_tick())) {
            Ok(outcome) => outcome,
            Err(panic) => {
                error!(catalog = %self.source.describe(), panic_message = ?panic, "hot reload tick panicked");
                ReloadOutcome::Panicked
            }
        }
    }

    fn try_tick(&self) -> ReloadOutcome {
        let candidate = match self.source.load() {
            Ok(store) => store,
            Err(e) => {
                warn!(catalog = %self.source.describe(), error = %e, "catalog reload failed");
                return ReloadOutcome::Failed(e.to_string());
            }
        };
        if !candidate.is_ready() && !candidate.load_errors().is_empty() {
            let failed = candidate.load_errors().len();
            warn!(catalog = %self.source.describe(), failed, "no catalog record loaded, keeping current store");
            return ReloadOutcome::Failed(format!("all {failed} catalog record(s) failed to load"));
        }
        let current = self.snapshot.load_full();

        if candidate.version() < current.store.version() {
            warn!(
                current = %current.store.version(),
                candidate = %candidate.version(),
                "refusing catalog downgrade"
            );
            return ReloadOutcome::Downgrade {
                current: current.store.version(),
                candidate: candidate.version(),
            };
        }
        if !current.store.should_update(&candidate) {
            debug!(catalog = %self.source.describe(), "catalog unchanged");
            return ReloadOutcome::Unchanged;
        }
        self.apply(candidate)
    }

    fn apply(&self, candidate: SpecStore) -> ReloadOutcome {
        let next = Arc::new(Snapshot::build(candidate));
        let schemas = next.store.schema_ids().len();
        self.snapshot.store(Arc::clone(&next));
        info!(schemas, catalog = %self.source.describe(), "specification store swapped");

        let marked = match self.source.after_load(&next.store) {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "failed to mark catalog records applied");
                0
            }
        };
        ReloadOutcome::Applied { schemas, marked }
    }

    /// Start ticking on a background thread.
    ///
    /// `interval` of zero disables the timer; `watch` adds a tick whenever
    /// that file changes. Returns `None` when neither trigger is configured.
    pub fn spawn(self, interval: Duration, watch: Option<&Path>) -> anyhow::Result<Option<ReloadHandle>> {
        if interval.is_zero() && watch.is_none() {
            info!("hot reload disabled");
            return Ok(None);
        }
        let (tx, rx) = mpsc::channel::<Signal>();

        let watcher = match watch {
            Some(path) => Some(watch_file(path, tx.clone())?),
            None => None,
        };

        let join = std::thread::Builder::new()
            .name("apifw-reload".to_string())
            .spawn(move || loop {
                let signal = if interval.is_zero() {
                    rx.recv().map_err(|_| RecvTimeoutError::Disconnected)
                } else {
                    rx.recv_timeout(interval)
                };
                match signal {
                    Ok(Signal::Trigger) | Err(RecvTimeoutError::Timeout) => {
                        let outcome = self.tick();
                        debug!(?outcome, "hot reload tick");
                    }
                    Ok(Signal::Stop) | Err(RecvTimeoutError::Disconnected) => {
                        info!("hot reload stopped");
                        return;
                    }
                }
            })?;

        info!(interval_ms = interval.as_millis() as u64, watching = watcher.is_some(), "hot reload started");
        Ok(Some(ReloadHandle {
            stop: tx,
            join: Some(join),
            _watcher: watcher,
        }))
    }
}

fn watch_file(path: &Path, tx: mpsc::Sender<Signal>) -> notify::Result<RecommendedWatcher> {
    let mut watcher = RecommendedWatcher::new(
        move |res: Result<notify::Event, notify::Error>| match res {
            Ok(event) => {
                if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
                    && tx.send(Signal::Trigger).is_err()
                {
                    debug!("catalog change seen after hot reload stopped");
                }
            }
            Err(e) => warn!(error = %e, "catalog watch error"),
        },
        Config::default(),
    )?;
    watcher.watch(path, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

/// Running reload loop; stops on [`ReloadHandle::stop`] or drop.
pub struct ReloadHandle {
    stop: mpsc::Sender<Signal>,
    join: Option<JoinHandle<()>>,
    _watcher: Option<RecommendedWatcher>,
}

impl std::fmt::Debug for ReloadHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReloadHandle")
            .field("running", &self.join.is_some())
            .field("watching", &self._watcher.is_some())
            .finish()
    }
}

impl ReloadHandle {
    /// Signal the loop and wait for the running tick to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    /// Force a tick now.
    pub fn trigger(&self) {
        if self.stop.send(Signal::Trigger).is_err() {
            debug!("hot reload already stopped; trigger ignored");
        }
    }

    fn shutdown(&mut self) {
        let _ = self.stop.send(Signal::Stop);
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                error!("hot reload thread panicked");
            }
        }
    }
}

impl Drop for ReloadHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
