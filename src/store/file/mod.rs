//! File-backed tracking store
//!
//! On-disk layout, shared with other tooling that reads `mlruns` directories:
//!
//! ```text
//! <root>/<experiment_id>/meta.yaml
//! <root>/<experiment_id>/<run_id>/meta.yaml
//! <root>/<experiment_id>/<run_id>/artifacts/...
//! <root>/<experiment_id>/<run_id>/metrics/<key>   "<timestamp_ms> <value> <step>\n" per sample
//! <root>/<experiment_id>/<run_id>/params/<key>    file content = value
//! <root>/<experiment_id>/<run_id>/tags/<key>      file content = value
//! ```
//!
//! Experiment ids are decimal integers. A new id is one more than the highest
//! existing one; the scan and the create are not atomic, so two processes
//! creating experiments at the same time can pick the same id.

mod experiment;
mod run;

pub use experiment::FileExperiment;
pub use run::FileRun;

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{Experiment, RunFilter, RunsPage, TrackingStore};
use crate::entities::{ExperimentRecord, DEFAULT_EXPERIMENT_ID, DEFAULT_EXPERIMENT_NAME};
use crate::{Error, Result};

pub(crate) const META_FILE_NAME: &str = "meta.yaml";
pub(crate) const ARTIFACTS_DIR: &str = "artifacts";
pub(crate) const METRICS_DIR: &str = "metrics";
pub(crate) const PARAMS_DIR: &str = "params";
pub(crate) const TAGS_DIR: &str = "tags";

/// Tracking UI address assumed for local stores.
pub(crate) const LOCAL_UI_URL: &str = "http://127.0.0.1:5000/#";

/// Tracking store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root_dir: PathBuf,
    uri: String,
}

impl FileStore {
    /// Open (or initialize) a store rooted at `root_dir`.
    ///
    /// Creates the default experiment `"0"` when it is missing.
    ///
    /// # Errors
    ///
    /// Returns error if the root cannot be resolved or the default experiment
    /// cannot be written.
    pub fn open(root_dir: impl AsRef<Path>) -> Result<Self> {
        let root_dir = root_dir.as_ref();
        let root_dir = if root_dir.is_absolute() {
            root_dir.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(|e| Error::io(root_dir, e))?
                .join(root_dir)
        };
        let store = Self {
            uri: root_dir.display().to_string(),
            root_dir,
        };
        match store.get_experiment(DEFAULT_EXPERIMENT_ID) {
            Ok(_) => {}
            Err(err) if err.is_not_found() => {
                store.create_with_id(DEFAULT_EXPERIMENT_NAME, DEFAULT_EXPERIMENT_ID)?;
            }
            Err(err) => return Err(err),
        }
        Ok(store)
    }

    /// Root directory of the store.
    #[must_use]
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Every experiment with a readable `meta.yaml`, in directory name order.
    fn experiments(&self) -> Result<Vec<FileExperiment>> {
        let mut experiments = Vec::new();
        for dir in list_dirs(&self.root_dir)? {
            let meta_path = dir.join(META_FILE_NAME);
            if !meta_path.is_file() {
                continue;
            }
            let record: ExperimentRecord = read_yaml(&meta_path)?;
            experiments.push(FileExperiment::new(record, dir));
        }
        Ok(experiments)
    }

    fn find_experiment(&self, id: &str) -> Result<FileExperiment> {
        let id = if id.is_empty() { DEFAULT_EXPERIMENT_ID } else { id };
        self.experiments()?
            .into_iter()
            .find(|exp| exp.id() == id)
            .ok_or_else(|| Error::NotFound(format!("no experiment with id {id}")))
    }

    fn next_experiment_id(&self) -> Result<String> {
        let highest = list_dirs(&self.root_dir)?
            .iter()
            .filter_map(|dir| dir.file_name()?.to_str()?.parse::<u64>().ok())
            .max();
        Ok(highest.map_or(0, |id| id + 1).to_string())
    }

    fn create_with_id(&self, name: &str, id: &str) -> Result<FileExperiment> {
        let experiment_dir = self.root_dir.join(id);
        fs::create_dir_all(&experiment_dir).map_err(|e| Error::io(&experiment_dir, e))?;
        let record = ExperimentRecord::builder(id, name)
            .artifact_location(to_file_uri(&experiment_dir))
            .build();
        let mut experiment = FileExperiment::new(record, experiment_dir);
        experiment.sync_meta()?;
        debug!(experiment_id = id, experiment_name = name, "created experiment");
        Ok(experiment)
    }
}

impl TrackingStore for FileStore {
    fn experiments_by_name(&self) -> Result<HashMap<String, Box<dyn Experiment>>> {
        Ok(self
            .experiments()?
            .into_iter()
            .map(|exp| (exp.name().to_string(), Box::new(exp) as Box<dyn Experiment>))
            .collect())
    }

    fn create_experiment(&self, name: &str) -> Result<Box<dyn Experiment>> {
        let name = experiment_name(name);
        if self
            .experiments()?
            .iter()
            .any(|exp| exp.name() == name && exp.info().is_active())
        {
            return Err(Error::Validation(format!(
                "experiment named {name:?} already exists"
            )));
        }
        let id = self.next_experiment_id()?;
        Ok(Box::new(self.create_with_id(name, &id)?))
    }

    fn get_or_create_experiment_by_name(&self, name: &str) -> Result<Box<dyn Experiment>> {
        let name = experiment_name(name);
        if let Some(exp) = self.experiments()?.into_iter().find(|exp| exp.name() == name) {
            return Ok(Box::new(exp));
        }
        let id = self.next_experiment_id()?;
        Ok(Box::new(self.create_with_id(name, &id)?))
    }

    fn get_experiment(&self, id: &str) -> Result<Box<dyn Experiment>> {
        Ok(Box::new(self.find_experiment(id)?))
    }

    fn search_runs(
        &self,
        experiment_ids: &[String],
        filter: &str,
        order_by: &[String],
        _page_token: &str,
    ) -> Result<RunsPage> {
        let filter = RunFilter::parse(filter)?;
        if !order_by.is_empty() {
            debug!(?order_by, "file store ignores order_by");
        }
        let mut experiments = Vec::with_capacity(experiment_ids.len());
        for id in experiment_ids {
            if id.is_empty() {
                return Err(Error::Validation(
                    "empty experiment id is not valid for search".to_string(),
                ));
            }
            experiments.push(self.find_experiment(id)?);
        }

        let mut runs = Vec::new();
        for experiment in &experiments {
            for run in experiment.runs()? {
                if filter.matches(run.as_ref()) {
                    runs.push(run);
                }
            }
        }
        Ok(RunsPage {
            runs,
            next_page_token: String::new(),
        })
    }

    fn uri(&self) -> &str {
        &self.uri
    }

    fn ui_url(&self) -> String {
        LOCAL_UI_URL.to_string()
    }
}

/// An empty experiment name means the default experiment.
fn experiment_name(name: &str) -> &str {
    if name.is_empty() {
        DEFAULT_EXPERIMENT_NAME
    } else {
        name
    }
}

/// `file://` URI for a local path.
#[must_use]
pub fn to_file_uri(path: &Path) -> String {
    let generic = path.to_string_lossy().replace('\\', "/");
    if generic.starts_with('/') {
        format!("file://{generic}")
    } else {
        format!("file:///{generic}")
    }
}

/// Subdirectories of `dir`, sorted by name, skipping hidden ones such as
/// `.trash`. A missing `dir` has none.
pub(crate) fn list_dirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::io(dir, e)),
    };
    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::io(dir, e))?;
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        let is_dir = entry.file_type().map_err(|e| Error::io(entry.path(), e))?.is_dir();
        if is_dir && !hidden {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

pub(crate) fn read_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    serde_yaml::from_str(&text)
        .map_err(|e| Error::Serialization(format!("{}: {e}", path.display())))
}

pub(crate) fn write_yaml<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let text = serde_yaml::to_string(value)?;
    fs::write(path, text).map_err(|e| Error::io(path, e))
}

/// Reject keys that would escape their directory when used as a file name.
pub(crate) fn validate_key(kind: &str, key: &str) -> Result<()> {
    let escapes = key.contains('\\')
        || key.contains('\0')
        || key
            .split('/')
            .any(|part| part.is_empty() || part == "." || part == "..");
    if key.is_empty() || escapes {
        return Err(Error::Validation(format!("invalid {kind} name {key:?}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_file_uri() {
        assert_eq!(to_file_uri(Path::new("/tmp/mlruns/0")), "file:///tmp/mlruns/0");
        assert_eq!(to_file_uri(Path::new("C:\\mlruns")), "file:///C:/mlruns");
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("metric", "loss").is_ok());
        assert!(validate_key("metric", "train/loss").is_ok());
        assert!(validate_key("tag", "mlflow.user").is_ok());
        for bad in ["", "../escape", "/abs", "a/./b", "a\\b"] {
            assert!(validate_key("param", bad).is_err(), "{bad}");
        }
    }
}
