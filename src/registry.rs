//! Active-run registry
//!
//! Holds at most one "current run" per registry object. The first
//! [`ActiveRunRegistry::resolve`] builds a store from configuration, picks the
//! experiment and creates (or resumes) a run; later calls return that same run
//! until it ends. Ending or failing the active run clears the registry, and
//! the next resolve produces a fresh run.
//!
//! ```text
//! Uninitialized ──resolve──> Active ──run.end()/fail()──> Cleared
//!                              ^                            │
//!                              └──────────resolve───────────┘
//! ```
//!
//! The lock is held only while resolving or clearing, never across the
//! run's own Set/Log calls.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{info, warn};

use crate::config::{ResolveOptions, TrackingConfig};
use crate::entities::{Tag, HOST_TAG_KEY, SOURCE_TYPE_LOCAL, SOURCE_TYPE_TAG_KEY};
use crate::store::{Experiment, Run, Tracking, TrackingStore};
use crate::Result;

type Slot = Mutex<Option<Arc<dyn Run>>>;

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registry of the current run, passed explicitly to whoever logs into it.
///
/// Clones share the same slot.
#[derive(Clone, Default)]
pub struct ActiveRunRegistry {
    slot: Arc<Slot>,
}

impl fmt::Debug for ActiveRunRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let active = lock(&self.slot).as_ref().map(|run| run.id().to_string());
        f.debug_struct("ActiveRunRegistry")
            .field("active_run", &active)
            .finish()
    }
}

impl ActiveRunRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The active run, if one is registered.
    #[must_use]
    pub fn current(&self) -> Option<Arc<dyn Run>> {
        lock(&self.slot).clone()
    }

    /// True while a run is registered.
    #[must_use]
    pub fn is_active(&self) -> bool {
        lock(&self.slot).is_some()
    }

    /// Resolve using the `MLFLOW_*` environment variables.
    ///
    /// # Errors
    ///
    /// See [`ActiveRunRegistry::resolve`].
    pub fn resolve_from_env(&self, options: &ResolveOptions) -> Result<Arc<dyn Run>> {
        self.resolve(options, &TrackingConfig::from_env())
    }

    /// Return the active run, resolving a new one if none is registered.
    ///
    /// Resolution order:
    /// 1. Store: tracking URI and bearer token from `options`, then `config`,
    ///    then the default local directory.
    /// 2. Experiment: configured experiment id, then `options.experiment_name`
    ///    (created if missing), then the default experiment.
    /// 3. Run: the configured run id, which must exist, or else a new run
    ///    tagged with its source type and host.
    ///
    /// While a run is active its experiment is fixed; a name hint is ignored.
    ///
    /// # Errors
    ///
    /// Returns the store, experiment or run lookup error; nothing is
    /// registered on failure.
    pub fn resolve(
        &self,
        options: &ResolveOptions,
        config: &TrackingConfig,
    ) -> Result<Arc<dyn Run>> {
        let mut slot = lock(&self.slot);
        if let Some(run) = slot.as_ref() {
            if let Some(name) = options.experiment_name_hint() {
                warn!(
                    run_id = run.id(),
                    experiment_name = name,
                    "active run already exists, ignoring experiment name"
                );
            }
            return Ok(Arc::clone(run));
        }

        let uri = options.resolve_tracking_uri(config);
        let tracking = Tracking::open(uri, options.resolve_bearer_token(config))?;
        let experiment = resolve_experiment(&tracking, options, config)?;

        let run = match config.run_id() {
            // Resuming never creates: a missing run id is an error.
            Some(run_id) => experiment.get_run(run_id)?,
            None => {
                let run = experiment.create_run(None)?;
                run.set_tags(&[
                    Tag::new(SOURCE_TYPE_TAG_KEY, SOURCE_TYPE_LOCAL),
                    Tag::new(HOST_TAG_KEY, hostname()),
                ])?;
                run
            }
        };
        run.registry_link().bind(Arc::downgrade(&self.slot));

        if let Tracking::File(store) = &tracking {
            info!(
                run_id = run.id(),
                "logging to local files only; to view, run: mlflow ui --backend-store-uri {} --port 0",
                store.uri()
            );
        } else {
            info!(run_id = run.id(), url = %run.ui_url(), "view run in tracking UI");
        }

        *slot = Some(Arc::clone(&run));
        Ok(run)
    }
}

fn resolve_experiment(
    tracking: &Tracking,
    options: &ResolveOptions,
    config: &TrackingConfig,
) -> Result<Box<dyn Experiment>> {
    match (config.experiment_id(), options.experiment_name_hint()) {
        (Some(id), name) => {
            if let Some(name) = name {
                warn!(
                    experiment_id = id,
                    experiment_name = name,
                    "ignoring experiment name, using configured experiment id"
                );
            }
            tracking.get_experiment(id)
        }
        (None, Some(name)) => tracking.get_or_create_experiment_by_name(name),
        (None, None) => tracking.get_experiment(""),
    }
}

fn hostname() -> String {
    gethostname::gethostname().to_string_lossy().into_owned()
}

/// A run's handle back to the registry it was registered in.
///
/// Runs call [`RegistryLink::release`] from `end`/`fail`; the registry is only
/// cleared if that exact run object is the one registered.
#[derive(Default)]
pub struct RegistryLink {
    slot: Mutex<Option<Weak<Slot>>>,
}

impl fmt::Debug for RegistryLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bound = lock(&self.slot)
            .as_ref()
            .is_some_and(|weak| weak.strong_count() > 0);
        f.debug_struct("RegistryLink").field("bound", &bound).finish()
    }
}

impl RegistryLink {
    pub(crate) fn bind(&self, slot: Weak<Slot>) {
        *lock(&self.slot) = Some(slot);
    }

    /// Deregister `run` if it is the active run of the registry it was bound to.
    pub fn release<R: ?Sized>(&self, run: &R) {
        let Some(registry) = lock(&self.slot).take().and_then(|weak| weak.upgrade()) else {
            return;
        };
        let me = (run as *const R).cast::<()>();
        let mut active = lock(&registry);
        if active
            .as_ref()
            .is_some_and(|current| Arc::as_ptr(current).cast::<()>() == me)
        {
            *active = None;
        }
    }
}
