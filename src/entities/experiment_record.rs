//! Experiment Record - root entity for experiment tracking

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::now_millis;

/// Lifecycle stage shared by experiments and runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleStage {
    /// Visible and writable.
    #[default]
    Active,
    /// Soft-deleted; never produced by this client.
    Deleted,
}

impl LifecycleStage {
    /// Wire/disk spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Deleted => "deleted",
        }
    }
}

/// Experiment Record represents a tracked experiment.
///
/// The field order matches the `meta.yaml` layout of a file-backed store,
/// so a record serializes straight to disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExperimentRecord {
    #[serde(default)]
    artifact_location: String,
    experiment_id: String,
    #[serde(default)]
    lifecycle_stage: LifecycleStage,
    #[serde(default)]
    creation_time: i64,
    #[serde(default)]
    last_update_time: i64,
    name: String,
}

impl ExperimentRecord {
    /// Create a new active experiment record stamped with the current time.
    ///
    /// # Arguments
    ///
    /// * `experiment_id` - Identifier unique within the store
    /// * `name` - Name unique among active experiments
    #[must_use]
    pub fn new(experiment_id: impl Into<String>, name: impl Into<String>) -> Self {
        ExperimentRecordBuilder::new(experiment_id, name).build()
    }

    /// Create a builder for constructing an experiment record with optional fields.
    #[must_use]
    pub fn builder(
        experiment_id: impl Into<String>,
        name: impl Into<String>,
    ) -> ExperimentRecordBuilder {
        ExperimentRecordBuilder::new(experiment_id, name)
    }

    /// Get the experiment ID.
    #[must_use]
    pub fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    /// Get the experiment name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the artifact location URI.
    #[must_use]
    pub fn artifact_location(&self) -> &str {
        &self.artifact_location
    }

    /// Get the lifecycle stage.
    #[must_use]
    pub const fn lifecycle_stage(&self) -> LifecycleStage {
        self.lifecycle_stage
    }

    /// Creation time in epoch milliseconds.
    #[must_use]
    pub const fn creation_time(&self) -> i64 {
        self.creation_time
    }

    /// Last update time in epoch milliseconds.
    #[must_use]
    pub const fn last_update_time(&self) -> i64 {
        self.last_update_time
    }

    /// Creation time as a UTC timestamp.
    #[must_use]
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.creation_time)
    }

    /// True when runs may still be created in this experiment.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.lifecycle_stage == LifecycleStage::Active
    }

    pub(crate) fn touch(&mut self) {
        self.last_update_time = now_millis();
    }
}

/// Builder for `ExperimentRecord`.
#[derive(Debug)]
pub struct ExperimentRecordBuilder {
    record: ExperimentRecord,
}

impl ExperimentRecordBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(experiment_id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = now_millis();
        Self {
            record: ExperimentRecord {
                artifact_location: String::new(),
                experiment_id: experiment_id.into(),
                lifecycle_stage: LifecycleStage::Active,
                creation_time: now,
                last_update_time: now,
                name: name.into(),
            },
        }
    }

    /// Set the artifact location URI.
    #[must_use]
    pub fn artifact_location(mut self, location: impl Into<String>) -> Self {
        self.record.artifact_location = location.into();
        self
    }

    /// Set the lifecycle stage.
    #[must_use]
    pub const fn lifecycle_stage(mut self, stage: LifecycleStage) -> Self {
        self.record.lifecycle_stage = stage;
        self
    }

    /// Set custom creation/update timestamps (epoch millis).
    #[must_use]
    pub const fn timestamps(mut self, creation_time: i64, last_update_time: i64) -> Self {
        self.record.creation_time = creation_time;
        self.record.last_update_time = last_update_time;
        self
    }

    /// Build the `ExperimentRecord`.
    #[must_use]
    pub fn build(self) -> ExperimentRecord {
        self.record
    }
}
