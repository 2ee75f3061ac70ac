//! Run directory of a file-backed store
//!
//! Each write opens, writes and closes its file. Nothing is held open
//! between calls, and concurrent writers to the same run are not serialized.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use super::{
    validate_key, write_yaml, LOCAL_UI_URL, META_FILE_NAME, METRICS_DIR, PARAMS_DIR, TAGS_DIR,
};
use crate::artifact::ArtifactRepository;
use crate::entities::{now_millis, Metric, MetricSample, Param, RunRecord, RunStatus, Tag};
use crate::registry::RegistryLink;
use crate::store::Run;
use crate::{Error, Result};

/// One `<experiment>/<run_id>` directory.
#[derive(Debug)]
pub struct FileRun {
    run_id: String,
    experiment_id: String,
    root_dir: PathBuf,
    meta: Mutex<RunRecord>,
    link: RegistryLink,
}

impl FileRun {
    pub(crate) fn new(record: RunRecord, root_dir: PathBuf) -> Self {
        Self {
            run_id: record.run_id().to_string(),
            experiment_id: record.experiment_id().to_string(),
            root_dir,
            meta: Mutex::new(record),
            link: RegistryLink::default(),
        }
    }

    /// Run directory.
    #[must_use]
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn meta(&self) -> MutexGuard<'_, RunRecord> {
        self.meta.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Writes the run's `meta.yaml`.
    pub(crate) fn sync_meta(&self) -> Result<()> {
        let meta = self.meta();
        write_yaml(&self.root_dir.join(META_FILE_NAME), &*meta)
    }

    fn ensure_writable(&self) -> Result<()> {
        let meta = self.meta();
        if meta.accepts_writes() {
            return Ok(());
        }
        Err(Error::Validation(format!(
            "run {} is not running (status {}, lifecycle {})",
            meta.run_name(),
            meta.status(),
            meta.lifecycle_stage().as_str()
        )))
    }

    fn value_path(&self, dir: &str, kind: &str, key: &str) -> Result<PathBuf> {
        validate_key(kind, key)?;
        Ok(self.root_dir.join(dir).join(key))
    }

    fn complete(&self, status: RunStatus) -> Result<()> {
        self.meta().complete(status);
        self.sync_meta()?;
        debug!(run_id = %self.run_id, %status, "run ended");
        self.link.release(self);
        Ok(())
    }
}

fn write_value(path: &Path, value: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    fs::write(path, value).map_err(|e| Error::io(path, e))
}

fn read_value(path: &Path, kind: &str, key: &str) -> Result<String> {
    match fs::read_to_string(path) {
        Ok(value) => Ok(value),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(Error::NotFound(format!("{kind} with key {key}")))
        }
        Err(e) => Err(Error::io(path, e)),
    }
}

impl Run for FileRun {
    fn id(&self) -> &str {
        &self.run_id
    }

    fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    fn name(&self) -> String {
        self.meta().run_name().to_string()
    }

    fn set_name(&self, name: &str) -> Result<()> {
        self.meta().set_run_name(name);
        self.sync_meta()
    }

    fn info(&self) -> RunRecord {
        self.meta().clone()
    }

    fn set_tag(&self, key: &str, value: &str) -> Result<()> {
        write_value(&self.value_path(TAGS_DIR, "tag", key)?, value)
    }

    fn set_tags(&self, tags: &[Tag]) -> Result<()> {
        tags.iter()
            .try_for_each(|tag| self.set_tag(&tag.key, &tag.value))
    }

    fn get_tag(&self, key: &str) -> Result<String> {
        read_value(&self.value_path(TAGS_DIR, "tag", key)?, "tag", key)
    }

    fn log_param(&self, key: &str, value: &str) -> Result<()> {
        self.ensure_writable()?;
        write_value(&self.value_path(PARAMS_DIR, "param", key)?, value)
    }

    fn log_params(&self, params: &[Param]) -> Result<()> {
        params
            .iter()
            .try_for_each(|param| self.log_param(&param.key, &param.value))
    }

    fn get_param(&self, key: &str) -> Result<String> {
        read_value(&self.value_path(PARAMS_DIR, "param", key)?, "param", key)
    }

    fn log_metric(&self, key: &str, value: f64, step: i64) -> Result<()> {
        self.ensure_writable()?;
        let path = self.value_path(METRICS_DIR, "metric", key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let line = format!("{}\n", MetricSample::new(now_millis(), value, step));
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| Error::io(&path, e))?;
        // One write per sample so concurrent appenders interleave whole lines.
        file.write_all(line.as_bytes())
            .map_err(|e| Error::io(&path, e))
    }

    fn log_metrics(&self, metrics: &[Metric], step: i64) -> Result<()> {
        metrics
            .iter()
            .try_for_each(|metric| self.log_metric(&metric.key, metric.value, step))
    }

    fn metric_history(&self, key: &str) -> Result<Vec<MetricSample>> {
        let path = self.value_path(METRICS_DIR, "metric", key)?;
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::io(&path, e)),
        };
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                line.parse::<MetricSample>()
                    .map_err(|e| Error::Serialization(format!("{}: {e}", path.display())))
            })
            .collect()
    }

    fn log_artifact(&self, local_path: &Path, dest_path: &str) -> Result<()> {
        let artifact_uri = self.meta().artifact_uri().to_string();
        ArtifactRepository::for_uri(&artifact_uri, &self.run_id, None)?
            .log_path(local_path, dest_path)
    }

    fn end(&self) -> Result<()> {
        self.complete(RunStatus::Finished)
    }

    fn fail(&self) -> Result<()> {
        self.complete(RunStatus::Failed)
    }

    fn ui_url(&self) -> String {
        format!(
            "{LOCAL_UI_URL}/experiments/{}/runs/{}",
            self.experiment_id, self.run_id
        )
    }

    fn registry_link(&self) -> &RegistryLink {
        &self.link
    }
}
