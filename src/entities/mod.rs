//! Tracking entities
//!
//! Plain data held by stores.
//!
//! ## Schema Overview
//!
//! ```text
//! ExperimentRecord (1) ──< RunRecord (N)
//!                              │
//!                              ├── tags    key → value   [last write wins]
//!                              ├── params  key → value   [write once, by convention]
//!                              └── metrics key → [MetricSample] [append-only]
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use mlflow_tracking::entities::{ExperimentRecord, RunRecord, RunStatus};
//!
//! let experiment = ExperimentRecord::new("0", "Default");
//!
//! let mut run = RunRecord::new("4f1c0e", experiment.experiment_id());
//! assert_eq!(run.status(), RunStatus::Running);
//!
//! run.complete(RunStatus::Finished);
//! assert!(run.status().is_terminal());
//! ```

mod experiment_record;
mod key_value;
mod metric_record;
mod run_record;

pub use experiment_record::{ExperimentRecord, ExperimentRecordBuilder, LifecycleStage};
pub use key_value::{Param, Tag};
pub use metric_record::{Metric, MetricSample};
pub use run_record::{RunRecord, RunRecordBuilder, RunStatus, SOURCE_TYPE_CODE_LOCAL};

use chrono::Utc;

/// ID of the experiment every store starts with.
pub const DEFAULT_EXPERIMENT_ID: &str = "0";
/// Name of the default experiment.
pub const DEFAULT_EXPERIMENT_NAME: &str = "Default";

/// System tag: user that created the run.
pub const USER_TAG_KEY: &str = "mlflow.user";
/// System tag: source type of the run.
pub const SOURCE_TYPE_TAG_KEY: &str = "mlflow.source.type";
/// Tag holding the hostname that created the run.
pub const HOST_TAG_KEY: &str = "host";

/// Source type value for runs started from a local process.
pub const SOURCE_TYPE_LOCAL: &str = "LOCAL";

/// Current wall-clock time in epoch milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Name of the current OS user, or empty when unknown.
#[must_use]
pub fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_default()
}
