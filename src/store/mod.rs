//! Tracking stores
//!
//! A [`TrackingStore`] creates and looks up experiments and searches runs.
//! Every [`Run`] it hands out implements the same contract regardless of the
//! backend behind it:
//!
//! - [`FileStore`]: a local directory tree in the `mlruns` layout
//! - [`RestStore`]: a remote tracking server over HTTP(S)
//!
//! [`Tracking`] is the tagged union of both, picked from a URI scheme.
//!
//! # Example
//!
//! ```rust,no_run
//! use mlflow_tracking::store::{Tracking, TrackingStore};
//!
//! # fn main() -> mlflow_tracking::Result<()> {
//! let tracking = Tracking::open("file:///tmp/mlruns", None)?;
//! let experiment = tracking.get_or_create_experiment_by_name("mnist")?;
//! let run = experiment.create_run(None)?;
//!
//! run.log_param("lr", "0.01")?;
//! for step in 0..10 {
//!     run.log_metric("loss", 1.0 / (step as f64 + 1.0), step)?;
//! }
//! run.end()?;
//! # Ok(())
//! # }
//! ```

pub mod file;
mod filter;
pub mod rest;

pub use file::FileStore;
pub use filter::RunFilter;
pub use rest::{RestClient, RestStore};

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::Url;
use tracing::warn;

use crate::entities::{ExperimentRecord, Metric, MetricSample, Param, RunRecord, RunStatus, Tag};
use crate::registry::RegistryLink;
use crate::{Error, Result};

/// Maximum metrics per batch call.
pub const MAX_METRICS_PER_BATCH: usize = 1000;
/// Maximum params per batch call.
pub const MAX_PARAMS_PER_BATCH: usize = 100;
/// Maximum tags per batch call.
pub const MAX_TAGS_PER_BATCH: usize = 100;

/// One recorded execution: owner of tags, params, metrics and artifacts.
///
/// Methods take `&self`; implementations keep their mutable state behind a
/// lock so a run can be shared through an `Arc`. Consecutive calls are not
/// atomic with respect to each other.
pub trait Run: Send + Sync {
    /// Run ID.
    fn id(&self) -> &str;

    /// ID of the owning experiment.
    fn experiment_id(&self) -> &str;

    /// Current run name.
    fn name(&self) -> String;

    /// Rename the run.
    ///
    /// # Errors
    ///
    /// Returns error if the new name cannot be persisted.
    fn set_name(&self, name: &str) -> Result<()>;

    /// Snapshot of the run's metadata.
    fn info(&self) -> RunRecord;

    /// Current status.
    fn status(&self) -> RunStatus {
        self.info().status()
    }

    /// Set one tag; last write wins.
    ///
    /// # Errors
    ///
    /// Returns error if the tag cannot be written.
    fn set_tag(&self, key: &str, value: &str) -> Result<()>;

    /// Set many tags in input order.
    ///
    /// # Errors
    ///
    /// Returns the first failure; tags written before it stay written.
    fn set_tags(&self, tags: &[Tag]) -> Result<()>;

    /// Read a tag.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the tag was never set.
    fn get_tag(&self, key: &str) -> Result<String>;

    /// Record a param.
    ///
    /// # Errors
    ///
    /// Returns error if the param cannot be written, or if the backend
    /// requires a running run and this one has ended.
    fn log_param(&self, key: &str, value: &str) -> Result<()>;

    /// Record many params in input order.
    ///
    /// # Errors
    ///
    /// Returns the first failure; params written before it stay written.
    fn log_params(&self, params: &[Param]) -> Result<()>;

    /// Record every entry of a caller-built mapping as a param.
    ///
    /// # Errors
    ///
    /// Same as [`Run::log_params`].
    fn log_param_map(&self, params: &BTreeMap<String, String>) -> Result<()> {
        let params: Vec<Param> = params.iter().map(|(k, v)| Param::new(k, v)).collect();
        self.log_params(&params)
    }

    /// Read a param.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the param was never logged.
    fn get_param(&self, key: &str) -> Result<String>;

    /// Append one sample to a metric series, stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns error if the sample cannot be written, or if the backend
    /// requires a running run and this one has ended.
    fn log_metric(&self, key: &str, value: f64, step: i64) -> Result<()>;

    /// Append one sample to each named series, all at the same step.
    ///
    /// # Errors
    ///
    /// Returns the first failure; samples written before it stay written.
    fn log_metrics(&self, metrics: &[Metric], step: i64) -> Result<()>;

    /// All samples of a metric series in logging order. Empty if never logged.
    ///
    /// # Errors
    ///
    /// Returns error if the series cannot be read.
    fn metric_history(&self, key: &str) -> Result<Vec<MetricSample>>;

    /// Upload a file, or a directory tree, to the run's artifact location.
    ///
    /// # Errors
    ///
    /// Returns error if the local path is unreadable, the artifact location
    /// scheme is unsupported, or the upload fails.
    fn log_artifact(&self, local_path: &Path, dest_path: &str) -> Result<()>;

    /// Mark the run Finished and release it from the active-run registry.
    ///
    /// # Errors
    ///
    /// Returns error if the new status cannot be persisted.
    fn end(&self) -> Result<()>;

    /// Mark the run Failed and release it from the active-run registry.
    ///
    /// # Errors
    ///
    /// Returns error if the new status cannot be persisted.
    fn fail(&self) -> Result<()>;

    /// Link to the run in the tracking UI.
    fn ui_url(&self) -> String;

    /// Back-reference to the registry this run is active in, if any.
    fn registry_link(&self) -> &RegistryLink;
}

/// Named container for a group of runs.
pub trait Experiment: Send + Sync {
    /// Experiment metadata.
    fn info(&self) -> &ExperimentRecord;

    /// Experiment ID.
    fn id(&self) -> &str {
        self.info().experiment_id()
    }

    /// Experiment name.
    fn name(&self) -> &str {
        self.info().name()
    }

    /// Create a new Running run. Without a name, the first 8 characters of
    /// the generated run id are used.
    ///
    /// # Errors
    ///
    /// Returns error if the experiment is not active or the backend rejects the run.
    fn create_run(&self, name: Option<&str>) -> Result<Arc<dyn Run>>;

    /// Fetch an existing run.
    ///
    /// # Errors
    ///
    /// Returns error if the run does not exist.
    fn get_run(&self, run_id: &str) -> Result<Arc<dyn Run>>;
}

/// One page of run search results.
pub struct RunsPage {
    /// Matching runs.
    pub runs: Vec<Arc<dyn Run>>,
    /// Token for the next page; empty when there are no more.
    pub next_page_token: String,
}

/// Backend providing experiment/run persistence and search.
pub trait TrackingStore: Send + Sync {
    /// All experiments keyed by name.
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot be listed.
    fn experiments_by_name(&self) -> Result<HashMap<String, Box<dyn Experiment>>>;

    /// Create an experiment.
    ///
    /// # Errors
    ///
    /// Returns error if the experiment cannot be created.
    fn create_experiment(&self, name: &str) -> Result<Box<dyn Experiment>>;

    /// Look an experiment up by name, creating it when missing.
    /// An empty name means the default experiment.
    ///
    /// # Errors
    ///
    /// Returns error if listing or creation fails.
    fn get_or_create_experiment_by_name(&self, name: &str) -> Result<Box<dyn Experiment>>;

    /// Look an experiment up by id. An empty id means the default experiment `"0"`.
    ///
    /// # Errors
    ///
    /// Returns error if the experiment does not exist.
    fn get_experiment(&self, id: &str) -> Result<Box<dyn Experiment>>;

    /// Search runs of the given experiments.
    ///
    /// # Errors
    ///
    /// Returns error on an unsupported filter or backend failure.
    fn search_runs(
        &self,
        experiment_ids: &[String],
        filter: &str,
        order_by: &[String],
        page_token: &str,
    ) -> Result<RunsPage>;

    /// Store location, for diagnostics.
    fn uri(&self) -> &str;

    /// Tracking UI root, for diagnostics.
    fn ui_url(&self) -> String;
}

/// Tracking store selected from a URI scheme.
pub enum Tracking {
    /// Empty or `file` scheme.
    File(FileStore),
    /// `http` or `https` scheme.
    Rest(RestStore),
}

impl Tracking {
    /// Open the store a tracking URI points at.
    ///
    /// Plain paths and `file://` URIs open a [`FileStore`]; `http(s)://` URIs
    /// open a [`RestStore`]. The bearer token is only used by REST stores.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unsupported`] for any other scheme, or the store's
    /// own open error.
    pub fn open(uri: &str, bearer_token: Option<&str>) -> Result<Self> {
        let path: PathBuf = match Url::parse(uri) {
            // Relative paths have no scheme.
            Err(_) => uri.into(),
            Ok(parsed) => match parsed.scheme() {
                "http" | "https" => return Ok(Self::Rest(RestStore::open(uri, bearer_token)?)),
                "file" => parsed
                    .to_file_path()
                    .map_err(|()| Error::Validation(format!("invalid file URI {uri}")))?,
                // Windows drive letters parse as one-letter schemes.
                scheme if scheme.len() == 1 => uri.into(),
                scheme => {
                    return Err(Error::Unsupported(format!(
                        "tracking service with URI scheme {scheme} not implemented"
                    )))
                }
            },
        };
        if bearer_token.is_some() {
            warn!(uri, "bearer token ignored for local file tracking URI");
        }
        Ok(Self::File(FileStore::open(path)?))
    }

    fn inner(&self) -> &dyn TrackingStore {
        match self {
            Self::File(store) => store,
            Self::Rest(store) => store,
        }
    }
}

impl TrackingStore for Tracking {
    fn experiments_by_name(&self) -> Result<HashMap<String, Box<dyn Experiment>>> {
        self.inner().experiments_by_name()
    }

    fn create_experiment(&self, name: &str) -> Result<Box<dyn Experiment>> {
        self.inner().create_experiment(name)
    }

    fn get_or_create_experiment_by_name(&self, name: &str) -> Result<Box<dyn Experiment>> {
        self.inner().get_or_create_experiment_by_name(name)
    }

    fn get_experiment(&self, id: &str) -> Result<Box<dyn Experiment>> {
        self.inner().get_experiment(id)
    }

    fn search_runs(
        &self,
        experiment_ids: &[String],
        filter: &str,
        order_by: &[String],
        page_token: &str,
    ) -> Result<RunsPage> {
        self.inner()
            .search_runs(experiment_ids, filter, order_by, page_token)
    }

    fn uri(&self) -> &str {
        self.inner().uri()
    }

    fn ui_url(&self) -> String {
        self.inner().ui_url()
    }
}

/// End offsets of consecutive chunks of at most `chunk_size` items.
///
/// `chunk_end_indices(21, 10) == [10, 20, 21]`; an empty input yields no chunks.
#[must_use]
pub fn chunk_end_indices(len: usize, chunk_size: usize) -> Vec<usize> {
    if chunk_size == 0 {
        return Vec::new();
    }
    (1..=len.div_ceil(chunk_size))
        .map(|chunk| (chunk * chunk_size).min(len))
        .collect()
}

/// Run `send` over consecutive chunks in order, stopping at the first error.
/// Chunks sent before the failure are not rolled back.
pub(crate) fn for_each_chunk<T, F>(items: &[T], chunk_size: usize, mut send: F) -> Result<()>
where
    F: FnMut(&[T]) -> Result<()>,
{
    let mut start = 0;
    for end in chunk_end_indices(items.len(), chunk_size) {
        send(&items[start..end])?;
        start = end;
    }
    Ok(())
}

/// First 8 characters of a run id, used as the default run name.
pub(crate) fn default_run_name(run_id: &str) -> String {
    run_id.chars().take(8).collect()
}

/// A fresh run id: a v4 UUID without hyphens.
pub(crate) fn new_run_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
