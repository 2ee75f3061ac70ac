//! # mlflow-tracking: Experiment Tracking Client
//!
//! **Version**: 0.1.0
//!
//! Records experiment metadata (params, metrics, tags, artifacts) against
//! either a local `mlruns` directory or a remote tracking server, through one
//! API.
//!
//! ## Components
//!
//! - **Tracking store** ([`store`]): experiments and runs, file-backed or REST-backed
//! - **Run contract** ([`store::Run`]): the same operations on every backend
//! - **Artifact repositories** ([`artifact`]): local copy or signed-URL upload
//! - **Active-run registry** ([`registry`]): one current run per registry,
//!   resolved from configuration
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use mlflow_tracking::{ActiveRunRegistry, ResolveOptions};
//!
//! let registry = ActiveRunRegistry::new();
//! let run = registry.resolve_from_env(&ResolveOptions::new().experiment_name("mnist"))?;
//!
//! run.log_param("batch_size", "64")?;
//! run.log_metric("accuracy", 0.97, 1)?;
//! run.end()?;
//! assert!(!registry.is_active());
//! # Ok::<(), mlflow_tracking::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod artifact;
pub mod config;
pub mod entities;
pub mod error;
pub mod registry;
pub mod store;

pub use config::{ResolveOptions, TrackingConfig};
pub use entities::{Metric, Param, RunStatus, Tag};
pub use error::{Error, Result};
pub use registry::ActiveRunRegistry;
pub use store::{Experiment, Run, RunsPage, Tracking, TrackingStore};
