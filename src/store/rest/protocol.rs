//! JSON bodies of the tracking REST API
//!
//! Only the fields this client reads or writes are modeled; unknown response
//! fields are ignored. Servers encode int64 values as either JSON numbers or
//! strings, so timestamps go through [`lenient_i64`].

use serde::{Deserialize, Deserializer, Serialize};

use crate::entities::{ExperimentRecord, LifecycleStage, RunRecord, RunStatus};

/// Response of endpoints that return nothing of interest.
#[derive(Debug, Default, Deserialize)]
pub struct Empty {}

#[derive(Debug, Serialize)]
pub struct SearchExperiments<'a> {
    pub max_results: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_token: Option<&'a str>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SearchExperimentsResponse {
    pub experiments: Vec<WireExperiment>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateExperiment<'a> {
    pub name: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct CreateExperimentResponse {
    pub experiment_id: String,
}

#[derive(Debug, Deserialize)]
pub struct GetExperimentResponse {
    pub experiment: WireExperiment,
}

#[derive(Debug, Deserialize)]
pub struct WireExperiment {
    pub experiment_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub artifact_location: String,
    #[serde(default)]
    pub lifecycle_stage: LifecycleStage,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub creation_time: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub last_update_time: Option<i64>,
}

impl From<WireExperiment> for ExperimentRecord {
    fn from(wire: WireExperiment) -> Self {
        let created = wire.creation_time.unwrap_or_default();
        Self::builder(wire.experiment_id, wire.name)
            .artifact_location(wire.artifact_location)
            .lifecycle_stage(wire.lifecycle_stage)
            .timestamps(created, wire.last_update_time.unwrap_or(created))
            .build()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WireTag {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WireParam {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WireMetric {
    pub key: String,
    pub value: f64,
    #[serde(deserialize_with = "strict_lenient_i64")]
    pub timestamp: i64,
    #[serde(default, deserialize_with = "strict_lenient_i64")]
    pub step: i64,
}

#[derive(Debug, Serialize)]
pub struct CreateRun<'a> {
    pub experiment_id: &'a str,
    pub run_name: &'a str,
    pub start_time: i64,
    pub tags: Vec<WireTag>,
}

#[derive(Debug, Deserialize)]
pub struct RunResponse {
    pub run: WireRun,
}

#[derive(Debug, Deserialize)]
pub struct WireRun {
    pub info: WireRunInfo,
    #[serde(default)]
    pub data: WireRunData,
}

#[derive(Debug, Deserialize)]
pub struct WireRunInfo {
    pub run_id: String,
    pub experiment_id: String,
    #[serde(default)]
    pub run_name: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub start_time: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub end_time: Option<i64>,
    #[serde(default)]
    pub artifact_uri: String,
    #[serde(default)]
    pub lifecycle_stage: LifecycleStage,
}

impl From<WireRunInfo> for RunRecord {
    fn from(wire: WireRunInfo) -> Self {
        let status = wire
            .status
            .as_deref()
            .and_then(|s| s.parse::<RunStatus>().ok())
            .unwrap_or(RunStatus::Running);
        Self::builder(wire.run_id, wire.experiment_id)
            .run_name(wire.run_name)
            .user_id(wire.user_id)
            .artifact_uri(wire.artifact_uri)
            .status(status)
            .lifecycle_stage(wire.lifecycle_stage)
            .times(wire.start_time.unwrap_or_default(), wire.end_time)
            .build()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WireRunData {
    pub tags: Vec<WireTag>,
    pub params: Vec<WireParam>,
}

#[derive(Debug, Serialize)]
pub struct SearchRuns<'a> {
    pub experiment_ids: &'a [String],
    pub filter: &'a str,
    pub order_by: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_token: Option<&'a str>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SearchRunsResponse {
    pub runs: Vec<WireRun>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct KeyValue<'a> {
    pub run_id: &'a str,
    pub key: &'a str,
    pub value: &'a str,
}

#[derive(Debug, Serialize)]
pub struct LogMetric<'a> {
    pub run_id: &'a str,
    pub key: &'a str,
    pub value: f64,
    pub timestamp: i64,
    pub step: i64,
}

#[derive(Debug, Serialize)]
pub struct LogBatch<'a> {
    pub run_id: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub metrics: Vec<WireMetric>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<WireParam>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<WireTag>,
}

impl<'a> LogBatch<'a> {
    pub const fn new(run_id: &'a str) -> Self {
        Self {
            run_id,
            metrics: Vec::new(),
            params: Vec::new(),
            tags: Vec::new(),
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct UpdateRun<'a> {
    pub run_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_name: Option<&'a str>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MetricHistoryResponse {
    pub metrics: Vec<WireMetric>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CredentialsForWrite<'a> {
    pub run_id: &'a str,
    pub path: Vec<&'a str>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CredentialsForWriteResponse {
    pub credential_infos: Vec<CredentialInfo>,
}

#[derive(Debug, Deserialize)]
pub struct CredentialInfo {
    pub signed_uri: String,
    #[serde(default)]
    pub headers: Vec<HttpHeader>,
}

#[derive(Debug, Deserialize)]
pub struct HttpHeader {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(i64),
    String(String),
}

impl NumberOrString {
    fn into_i64<E: serde::de::Error>(self) -> Result<i64, E> {
        match self {
            Self::Number(n) => Ok(n),
            Self::String(s) => s
                .parse()
                .map_err(|_| E::custom(format!("invalid int64 string {s:?}"))),
        }
    }
}

/// Optional int64 given as a JSON number, a string, or null.
fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<NumberOrString>::deserialize(deserializer)?
        .map(NumberOrString::into_i64)
        .transpose()
}

fn strict_lenient_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    NumberOrString::deserialize(deserializer)?.into_i64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int64_accepts_numbers_and_strings() {
        let info: WireRunInfo = serde_json::from_str(
            r#"{"run_id":"r","experiment_id":"1","status":"FINISHED",
                "start_time":"1700000000000","end_time":1700000000500}"#,
        )
        .unwrap();
        assert_eq!(info.start_time, Some(1_700_000_000_000));
        assert_eq!(info.end_time, Some(1_700_000_000_500));

        let record = RunRecord::from(info);
        assert_eq!(record.status(), RunStatus::Finished);
        assert_eq!(record.run_name(), "");
    }

    #[test]
    fn test_batch_omits_empty_lists() {
        let mut batch = LogBatch::new("r1");
        batch.params.push(WireParam {
            key: "lr".to_string(),
            value: "0.1".to_string(),
        });
        let json = serde_json::to_value(&batch).unwrap();
        assert_eq!(json["run_id"], "r1");
        assert_eq!(json["params"][0]["key"], "lr");
        assert!(json.get("metrics").is_none());
        assert!(json.get("tags").is_none());
    }

    #[test]
    fn test_update_run_skips_unset_fields() {
        let update = UpdateRun {
            run_id: "r1",
            run_name: Some("renamed"),
            ..UpdateRun::default()
        };
        let json = serde_json::to_string(&update).unwrap();
        assert_eq!(json, r#"{"run_id":"r1","run_name":"renamed"}"#);
    }
}
