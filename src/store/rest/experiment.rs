//! Experiment on a tracking server

use std::sync::Arc;

use super::protocol::{CreateRun, RunResponse, WireTag};
use super::{RestClient, RestRun};
use crate::entities::{current_user, now_millis, ExperimentRecord, USER_TAG_KEY};
use crate::store::{default_run_name, new_run_id, Experiment, Run};
use crate::Result;

/// Experiment handle backed by the REST API.
#[derive(Debug, Clone)]
pub struct RestExperiment {
    client: Arc<RestClient>,
    record: ExperimentRecord,
}

impl RestExperiment {
    pub(crate) const fn new(client: Arc<RestClient>, record: ExperimentRecord) -> Self {
        Self { client, record }
    }
}

impl Experiment for RestExperiment {
    fn info(&self) -> &ExperimentRecord {
        &self.record
    }

    fn create_run(&self, name: Option<&str>) -> Result<Arc<dyn Run>> {
        let run_name = name
            .filter(|n| !n.is_empty())
            .map_or_else(|| default_run_name(&new_run_id()), str::to_string);
        let request = CreateRun {
            experiment_id: self.record.experiment_id(),
            run_name: &run_name,
            start_time: now_millis(),
            tags: vec![WireTag {
                key: USER_TAG_KEY.to_string(),
                value: current_user(),
            }],
        };
        let response: RunResponse = self.client.post("runs/create", &request)?;
        Ok(Arc::new(RestRun::new(Arc::clone(&self.client), response.run)))
    }

    fn get_run(&self, run_id: &str) -> Result<Arc<dyn Run>> {
        let response: RunResponse = self.client.get("runs/get", &[("run_id", run_id)])?;
        Ok(Arc::new(RestRun::new(Arc::clone(&self.client), response.run)))
    }
}
