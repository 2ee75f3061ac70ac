//! Run Record - execution instance of an experiment

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{now_millis, LifecycleStage};

/// Status of a run.
///
/// The integer codes are fixed wire values and must not be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
#[repr(i32)]
pub enum RunStatus {
    /// Run is currently executing.
    Running = 1,
    /// Run is queued but not yet executing.
    Scheduled = 2,
    /// Run completed successfully.
    Finished = 3,
    /// Run failed with an error.
    Failed = 4,
    /// Run was killed by user or system.
    Killed = 5,
}

impl RunStatus {
    /// Integer wire code.
    #[must_use]
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// Enum name used by the REST protocol (`"RUNNING"`, ...).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Scheduled => "SCHEDULED",
            Self::Finished => "FINISHED",
            Self::Failed => "FAILED",
            Self::Killed => "KILLED",
        }
    }

    /// Finished, Failed and Killed accept no further mutation.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Failed | Self::Killed)
    }
}

impl From<RunStatus> for i32 {
    fn from(status: RunStatus) -> Self {
        status.code()
    }
}

impl TryFrom<i32> for RunStatus {
    type Error = String;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Self::Running),
            2 => Ok(Self::Scheduled),
            3 => Ok(Self::Finished),
            4 => Ok(Self::Failed),
            5 => Ok(Self::Killed),
            other => Err(format!("unknown run status code {other}")),
        }
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RUNNING" => Ok(Self::Running),
            "SCHEDULED" => Ok(Self::Scheduled),
            "FINISHED" => Ok(Self::Finished),
            "FAILED" => Ok(Self::Failed),
            "KILLED" => Ok(Self::Killed),
            other => Err(format!("unknown run status {other:?}")),
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source type recorded in run meta (`LOCAL` = 4 in the tracking protocol).
pub const SOURCE_TYPE_CODE_LOCAL: i32 = 4;

/// Run Record represents a single execution of an experiment.
///
/// Field order and names match `<experiment>/<run>/meta.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunRecord {
    #[serde(default)]
    artifact_uri: String,
    experiment_id: String,
    #[serde(default)]
    lifecycle_stage: LifecycleStage,
    #[serde(default)]
    end_time: Option<i64>,
    #[serde(default)]
    entry_point_name: String,
    run_id: String,
    #[serde(default)]
    run_name: String,
    #[serde(default)]
    run_uuid: String,
    #[serde(default)]
    source_name: String,
    #[serde(default = "default_source_type")]
    source_type: i32,
    #[serde(default)]
    source_version: String,
    #[serde(default)]
    start_time: i64,
    status: RunStatus,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    user_id: String,
}

const fn default_source_type() -> i32 {
    SOURCE_TYPE_CODE_LOCAL
}

impl RunRecord {
    /// Create a new run record in Running status, started now.
    ///
    /// # Arguments
    ///
    /// * `run_id` - Unique identifier for the run
    /// * `experiment_id` - ID of the parent experiment
    #[must_use]
    pub fn new(run_id: impl Into<String>, experiment_id: impl Into<String>) -> Self {
        RunRecordBuilder::new(run_id, experiment_id).build()
    }

    /// Create a builder for constructing a run record with optional fields.
    #[must_use]
    pub fn builder(
        run_id: impl Into<String>,
        experiment_id: impl Into<String>,
    ) -> RunRecordBuilder {
        RunRecordBuilder::new(run_id, experiment_id)
    }

    /// Get the run ID.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Get the parent experiment ID.
    #[must_use]
    pub fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    /// Get the run name.
    #[must_use]
    pub fn run_name(&self) -> &str {
        &self.run_name
    }

    /// Get the artifact root URI.
    #[must_use]
    pub fn artifact_uri(&self) -> &str {
        &self.artifact_uri
    }

    /// Get the user that created the run.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Get the current run status.
    #[must_use]
    pub const fn status(&self) -> RunStatus {
        self.status
    }

    /// Get the lifecycle stage.
    #[must_use]
    pub const fn lifecycle_stage(&self) -> LifecycleStage {
        self.lifecycle_stage
    }

    /// Start time in epoch milliseconds.
    #[must_use]
    pub const fn start_time(&self) -> i64 {
        self.start_time
    }

    /// End time in epoch milliseconds, once the run has ended.
    #[must_use]
    pub const fn end_time(&self) -> Option<i64> {
        self.end_time
    }

    /// Start time as a UTC timestamp.
    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.start_time)
    }

    /// End time as a UTC timestamp.
    #[must_use]
    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.end_time.and_then(DateTime::from_timestamp_millis)
    }

    /// True when the run is active and still Running.
    #[must_use]
    pub fn accepts_writes(&self) -> bool {
        self.lifecycle_stage == LifecycleStage::Active && self.status == RunStatus::Running
    }

    /// Rename the run.
    pub fn set_run_name(&mut self, name: impl Into<String>) {
        self.run_name = name.into();
    }

    /// Complete the run with the given final status.
    ///
    /// Sets the end timestamp to now.
    pub fn complete(&mut self, status: RunStatus) {
        self.status = status;
        self.end_time = Some(now_millis());
    }
}

/// Builder for `RunRecord`.
#[derive(Debug)]
pub struct RunRecordBuilder {
    record: RunRecord,
}

impl RunRecordBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(run_id: impl Into<String>, experiment_id: impl Into<String>) -> Self {
        let run_id = run_id.into();
        Self {
            record: RunRecord {
                artifact_uri: String::new(),
                experiment_id: experiment_id.into(),
                lifecycle_stage: LifecycleStage::Active,
                end_time: None,
                entry_point_name: String::new(),
                run_name: String::new(),
                run_uuid: run_id.clone(),
                run_id,
                source_name: String::new(),
                source_type: SOURCE_TYPE_CODE_LOCAL,
                source_version: String::new(),
                start_time: now_millis(),
                status: RunStatus::Running,
                tags: Vec::new(),
                user_id: String::new(),
            },
        }
    }

    /// Set the run name.
    #[must_use]
    pub fn run_name(mut self, name: impl Into<String>) -> Self {
        self.record.run_name = name.into();
        self
    }

    /// Set the artifact root URI.
    #[must_use]
    pub fn artifact_uri(mut self, uri: impl Into<String>) -> Self {
        self.record.artifact_uri = uri.into();
        self
    }

    /// Set the creating user.
    #[must_use]
    pub fn user_id(mut self, user: impl Into<String>) -> Self {
        self.record.user_id = user.into();
        self
    }

    /// Set the status.
    #[must_use]
    pub const fn status(mut self, status: RunStatus) -> Self {
        self.record.status = status;
        self
    }

    /// Set the lifecycle stage.
    #[must_use]
    pub const fn lifecycle_stage(mut self, stage: LifecycleStage) -> Self {
        self.record.lifecycle_stage = stage;
        self
    }

    /// Set custom start/end timestamps (epoch millis).
    #[must_use]
    pub const fn times(mut self, start_time: i64, end_time: Option<i64>) -> Self {
        self.record.start_time = start_time;
        self.record.end_time = end_time;
        self
    }

    /// Build the `RunRecord`.
    #[must_use]
    pub fn build(self) -> RunRecord {
        self.record
    }
}
