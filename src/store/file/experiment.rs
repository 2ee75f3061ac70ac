//! Experiment directory of a file-backed store

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use super::{
    list_dirs, read_yaml, validate_key, write_yaml, FileRun, ARTIFACTS_DIR, META_FILE_NAME, METRICS_DIR,
    PARAMS_DIR, TAGS_DIR,
};
use crate::entities::{current_user, ExperimentRecord, RunRecord, USER_TAG_KEY};
use crate::store::{default_run_name, new_run_id, Experiment, Run};
use crate::{Error, Result};

/// One `<root>/<experiment_id>` directory.
#[derive(Debug, Clone)]
pub struct FileExperiment {
    record: ExperimentRecord,
    root_dir: PathBuf,
}

impl FileExperiment {
    pub(crate) const fn new(record: ExperimentRecord, root_dir: PathBuf) -> Self {
        Self { record, root_dir }
    }

    /// Experiment directory.
    #[must_use]
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Writes the experiment's `meta.yaml`.
    pub(crate) fn sync_meta(&mut self) -> Result<()> {
        self.record.touch();
        write_yaml(&self.root_dir.join(META_FILE_NAME), &self.record)
    }

    /// Every run directory with a `meta.yaml`, in run id order.
    pub(crate) fn runs(&self) -> Result<Vec<Arc<dyn Run>>> {
        let mut runs = Vec::new();
        for dir in list_dirs(&self.root_dir)? {
            if !dir.join(META_FILE_NAME).is_file() {
                continue;
            }
            let record: RunRecord = read_yaml(&dir.join(META_FILE_NAME))?;
            runs.push(Arc::new(FileRun::new(record, dir)) as Arc<dyn Run>);
        }
        Ok(runs)
    }
}

impl Experiment for FileExperiment {
    fn info(&self) -> &ExperimentRecord {
        &self.record
    }

    fn create_run(&self, name: Option<&str>) -> Result<Arc<dyn Run>> {
        if !self.record.is_active() {
            return Err(Error::Validation(format!(
                "experiment {} is not active",
                self.record.name()
            )));
        }
        let run_id = new_run_id();
        let name = name
            .filter(|n| !n.is_empty())
            .map_or_else(|| default_run_name(&run_id), str::to_string);
        let user = current_user();
        let record = RunRecord::builder(run_id.as_str(), self.record.experiment_id())
            .artifact_uri(format!(
                "{}/{run_id}/{ARTIFACTS_DIR}",
                self.record.artifact_location()
            ))
            .run_name(name)
            .user_id(user.as_str())
            .build();

        let run_dir = self.root_dir.join(&run_id);
        for sub_dir in [ARTIFACTS_DIR, METRICS_DIR, PARAMS_DIR, TAGS_DIR] {
            let path = run_dir.join(sub_dir);
            fs::create_dir_all(&path).map_err(|e| Error::io(&path, e))?;
        }
        let run = FileRun::new(record, run_dir);
        run.set_tag(USER_TAG_KEY, &user)?;
        run.sync_meta()?;
        debug!(run_id = %run_id, experiment_id = self.record.experiment_id(), "created run");
        Ok(Arc::new(run))
    }

    fn get_run(&self, run_id: &str) -> Result<Arc<dyn Run>> {
        validate_key("run id", run_id)?;
        let run_dir = self.root_dir.join(run_id);
        let meta_path = run_dir.join(META_FILE_NAME);
        if !meta_path.is_file() {
            return Err(Error::NotFound(format!(
                "run {run_id} in experiment {}",
                self.record.experiment_id()
            )));
        }
        let record: RunRecord = read_yaml(&meta_path)?;
        Ok(Arc::new(FileRun::new(record, run_dir)))
    }
}
