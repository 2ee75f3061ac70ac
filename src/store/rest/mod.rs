//! REST-backed tracking store
//!
//! Every operation is one synchronous HTTP(S) call (or a sequence of them for
//! paged and chunked operations) against `<base>/api/2.0/mlflow/`. Nothing is
//! retried; a non-2xx answer or an undecodable body becomes
//! [`Error::Transport`](crate::Error::Transport) with the status and body text.

mod client;
mod experiment;
pub(crate) mod protocol;
mod run;

pub use client::{RestClient, API_PREFIX};
pub use experiment::RestExperiment;
pub use run::RestRun;

use std::collections::HashMap;
use std::sync::Arc;

use protocol::{
    CreateExperiment, CreateExperimentResponse, GetExperimentResponse, SearchExperiments,
    SearchExperimentsResponse, SearchRuns, SearchRunsResponse,
};

use super::{Experiment, Run, RunsPage, TrackingStore};
use crate::entities::{ExperimentRecord, DEFAULT_EXPERIMENT_ID, DEFAULT_EXPERIMENT_NAME};
use crate::Result;

/// Page size used when listing experiments.
const EXPERIMENTS_PAGE_SIZE: i64 = 1000;

/// UI route prefix for Databricks-hosted servers.
fn databricks_fragment(base_url: &str) -> &'static str {
    if base_url.contains("databricks.com") {
        "#mlflow/"
    } else {
        ""
    }
}

/// Tracking store talking to a remote tracking server.
#[derive(Debug, Clone)]
pub struct RestStore {
    client: Arc<RestClient>,
}

impl RestStore {
    /// Connect to the server at `base_url`.
    ///
    /// No request is made until the first operation.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built.
    pub fn open(base_url: &str, bearer_token: Option<&str>) -> Result<Self> {
        Ok(Self {
            client: Arc::new(RestClient::new(base_url, bearer_token)?),
        })
    }

    /// Shared HTTP client.
    #[must_use]
    pub fn client(&self) -> &Arc<RestClient> {
        &self.client
    }

    fn experiment(&self, record: ExperimentRecord) -> Box<dyn Experiment> {
        Box::new(RestExperiment::new(Arc::clone(&self.client), record))
    }
}

impl TrackingStore for RestStore {
    fn experiments_by_name(&self) -> Result<HashMap<String, Box<dyn Experiment>>> {
        let mut experiments = HashMap::new();
        let mut page_token: Option<String> = None;
        loop {
            let request = SearchExperiments {
                max_results: EXPERIMENTS_PAGE_SIZE,
                page_token: page_token.as_deref(),
            };
            let page: SearchExperimentsResponse =
                self.client.post("experiments/search", &request)?;
            for wire in page.experiments {
                let record = ExperimentRecord::from(wire);
                // Later pages win on duplicate names.
                experiments.insert(record.name().to_string(), self.experiment(record));
            }
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => return Ok(experiments),
            }
        }
    }

    fn create_experiment(&self, name: &str) -> Result<Box<dyn Experiment>> {
        let response: CreateExperimentResponse = self
            .client
            .post("experiments/create", &CreateExperiment { name })?;
        Ok(self.experiment(ExperimentRecord::new(response.experiment_id, name)))
    }

    fn get_or_create_experiment_by_name(&self, name: &str) -> Result<Box<dyn Experiment>> {
        let name = if name.is_empty() {
            DEFAULT_EXPERIMENT_NAME
        } else {
            name
        };
        if let Some(experiment) = self.experiments_by_name()?.remove(name) {
            return Ok(experiment);
        }
        self.create_experiment(name)
    }

    fn get_experiment(&self, id: &str) -> Result<Box<dyn Experiment>> {
        let id = if id.is_empty() { DEFAULT_EXPERIMENT_ID } else { id };
        let response: GetExperimentResponse =
            self.client.get("experiments/get", &[("experiment_id", id)])?;
        Ok(self.experiment(response.experiment.into()))
    }

    fn search_runs(
        &self,
        experiment_ids: &[String],
        filter: &str,
        order_by: &[String],
        page_token: &str,
    ) -> Result<RunsPage> {
        let request = SearchRuns {
            experiment_ids,
            filter,
            order_by,
            page_token: Some(page_token).filter(|token| !token.is_empty()),
        };
        let response: SearchRunsResponse = self.client.post("runs/search", &request)?;
        let runs = response
            .runs
            .into_iter()
            .map(|run| Arc::new(RestRun::new(Arc::clone(&self.client), run)) as Arc<dyn Run>)
            .collect();
        Ok(RunsPage {
            runs,
            next_page_token: response.next_page_token.unwrap_or_default(),
        })
    }

    fn uri(&self) -> &str {
        self.client.base_url()
    }

    fn ui_url(&self) -> String {
        format!(
            "{}/{}",
            self.client.base_url(),
            databricks_fragment(self.client.base_url())
        )
    }
}
