//! Run on a tracking server
//!
//! Tags and params logged through this handle are cached locally so reads
//! see them without another round trip. The server does not reject logging
//! into a finished run, and neither does this client.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use super::protocol::{
    Empty, KeyValue, LogBatch, LogMetric, MetricHistoryResponse, UpdateRun, WireMetric, WireParam,
    WireRun, WireTag,
};
use super::{databricks_fragment, RestClient};
use crate::artifact::ArtifactRepository;
use crate::entities::{now_millis, Metric, MetricSample, Param, RunRecord, RunStatus, Tag};
use crate::registry::RegistryLink;
use crate::store::{
    for_each_chunk, Run, MAX_METRICS_PER_BATCH, MAX_PARAMS_PER_BATCH, MAX_TAGS_PER_BATCH,
};
use crate::{Error, Result};

struct RunState {
    info: RunRecord,
    tags: BTreeMap<String, String>,
    params: BTreeMap<String, String>,
}

/// Run handle backed by the REST API.
pub struct RestRun {
    client: Arc<RestClient>,
    run_id: String,
    experiment_id: String,
    state: Mutex<RunState>,
    link: RegistryLink,
}

impl fmt::Debug for RestRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestRun")
            .field("run_id", &self.run_id)
            .field("experiment_id", &self.experiment_id)
            .field("base_url", &self.client.base_url())
            .finish_non_exhaustive()
    }
}

impl RestRun {
    pub(crate) fn new(client: Arc<RestClient>, run: WireRun) -> Self {
        let tags = run
            .data
            .tags
            .into_iter()
            .map(|tag| (tag.key, tag.value))
            .collect();
        let params = run
            .data
            .params
            .into_iter()
            .map(|param| (param.key, param.value))
            .collect();
        let info = RunRecord::from(run.info);
        Self {
            client,
            run_id: info.run_id().to_string(),
            experiment_id: info.experiment_id().to_string(),
            state: Mutex::new(RunState { info, tags, params }),
            link: RegistryLink::default(),
        }
    }

    fn state(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update(&self, update: &UpdateRun<'_>) -> Result<()> {
        let _: Empty = self.client.post("runs/update", update)?;
        Ok(())
    }

    fn complete(&self, status: RunStatus) -> Result<()> {
        self.update(&UpdateRun {
            run_id: &self.run_id,
            status: Some(status.as_str()),
            end_time: Some(now_millis()),
            ..UpdateRun::default()
        })?;
        self.state().info.complete(status);
        debug!(run_id = %self.run_id, %status, "run ended");
        self.link.release(self);
        Ok(())
    }
}

impl Run for RestRun {
    fn id(&self) -> &str {
        &self.run_id
    }

    fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    fn name(&self) -> String {
        self.state().info.run_name().to_string()
    }

    fn set_name(&self, name: &str) -> Result<()> {
        self.update(&UpdateRun {
            run_id: &self.run_id,
            run_name: Some(name),
            ..UpdateRun::default()
        })?;
        self.state().info.set_run_name(name);
        Ok(())
    }

    fn info(&self) -> RunRecord {
        self.state().info.clone()
    }

    fn set_tag(&self, key: &str, value: &str) -> Result<()> {
        let request = KeyValue {
            run_id: &self.run_id,
            key,
            value,
        };
        let _: Empty = self.client.post("runs/set-tag", &request)?;
        self.state().tags.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn set_tags(&self, tags: &[Tag]) -> Result<()> {
        for_each_chunk(tags, MAX_TAGS_PER_BATCH, |chunk| {
            let mut batch = LogBatch::new(&self.run_id);
            batch.tags = chunk
                .iter()
                .map(|tag| WireTag {
                    key: tag.key.clone(),
                    value: tag.value.clone(),
                })
                .collect();
            let _: Empty = self.client.post("runs/log-batch", &batch)?;
            let mut state = self.state();
            for tag in chunk {
                state.tags.insert(tag.key.clone(), tag.value.clone());
            }
            Ok(())
        })
    }

    fn get_tag(&self, key: &str) -> Result<String> {
        self.state()
            .tags
            .get(key)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("tag with key {key}")))
    }

    fn log_param(&self, key: &str, value: &str) -> Result<()> {
        let request = KeyValue {
            run_id: &self.run_id,
            key,
            value,
        };
        let _: Empty = self.client.post("runs/log-parameter", &request)?;
        self.state().params.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn log_params(&self, params: &[Param]) -> Result<()> {
        for_each_chunk(params, MAX_PARAMS_PER_BATCH, |chunk| {
            let mut batch = LogBatch::new(&self.run_id);
            batch.params = chunk
                .iter()
                .map(|param| WireParam {
                    key: param.key.clone(),
                    value: param.value.clone(),
                })
                .collect();
            let _: Empty = self.client.post("runs/log-batch", &batch)?;
            let mut state = self.state();
            for param in chunk {
                state.params.insert(param.key.clone(), param.value.clone());
            }
            Ok(())
        })
    }

    fn get_param(&self, key: &str) -> Result<String> {
        self.state()
            .params
            .get(key)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("param with key {key}")))
    }

    fn log_metric(&self, key: &str, value: f64, step: i64) -> Result<()> {
        let request = LogMetric {
            run_id: &self.run_id,
            key,
            value,
            timestamp: now_millis(),
            step,
        };
        let _: Empty = self.client.post("runs/log-metric", &request)?;
        Ok(())
    }

    fn log_metrics(&self, metrics: &[Metric], step: i64) -> Result<()> {
        let timestamp = now_millis();
        for_each_chunk(metrics, MAX_METRICS_PER_BATCH, |chunk| {
            let mut batch = LogBatch::new(&self.run_id);
            batch.metrics = chunk
                .iter()
                .map(|metric| WireMetric {
                    key: metric.key.clone(),
                    value: metric.value,
                    timestamp,
                    step,
                })
                .collect();
            let _: Empty = self.client.post("runs/log-batch", &batch)?;
            Ok(())
        })
    }

    fn metric_history(&self, key: &str) -> Result<Vec<MetricSample>> {
        let mut samples = Vec::new();
        let mut page_token = String::new();
        loop {
            let mut query = vec![("run_id", self.run_id.as_str()), ("metric_key", key)];
            if !page_token.is_empty() {
                query.push(("page_token", page_token.as_str()));
            }
            let page: MetricHistoryResponse = self.client.get("metrics/get-history", &query)?;
            samples.extend(
                page.metrics
                    .into_iter()
                    .map(|m| MetricSample::new(m.timestamp, m.value, m.step)),
            );
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = token,
                _ => return Ok(samples),
            }
        }
    }

    fn log_artifact(&self, local_path: &Path, dest_path: &str) -> Result<()> {
        let artifact_uri = self.state().info.artifact_uri().to_string();
        ArtifactRepository::for_uri(&artifact_uri, &self.run_id, Some(Arc::clone(&self.client)))?
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
            "{}/{}experiments/{}/runs/{}",
            self.client.base_url(),
            databricks_fragment(self.client.base_url()),
            self.experiment_id,
            self.run_id
        )
    }

    fn registry_link(&self) -> &RegistryLink {
        &self.link
    }
}
