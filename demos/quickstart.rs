//! Quickstart: log a short training loop to the active run
//!
//! Resolves the active run from `MLFLOW_TRACKING_URI` / `MLFLOW_EXPERIMENT_ID`
//! / `MLFLOW_RUN_ID` (defaulting to `./mlruns`), logs metrics, a tag, a param
//! and an artifact, then ends the run.
//!
//! Run with: `RUST_LOG=info cargo run --example quickstart -- [experiment-name]`

use anyhow::Context;
use mlflow_tracking::entities::Metric;
use mlflow_tracking::{ActiveRunRegistry, ResolveOptions};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut options = ResolveOptions::new();
    if let Some(name) = std::env::args().nth(1) {
        options = options.experiment_name(name);
    }

    let registry = ActiveRunRegistry::new();
    let run = registry
        .resolve_from_env(&options)
        .context("resolving active run")?;
    println!("=== Run {} ({}) ===", run.id(), run.name());

    for step in 0..10_i32 {
        run.log_metric("metric0", f64::from(step + 1), i64::from(step))?;
    }
    run.log_metrics(
        &[Metric::new("accuracy", 0.93), Metric::new("loss", 0.21)],
        10,
    )?;
    run.set_tag("tag0", "value0")?;
    run.log_param("param0", "value0")?;

    let scratch = std::env::temp_dir().join(format!("quickstart-{}", run.id()));
    std::fs::create_dir_all(&scratch).context("creating scratch dir")?;
    let artifact = scratch.join("artifact0.txt");
    std::fs::write(&artifact, "hello\n").context("writing artifact")?;
    run.log_artifact(&artifact, "")?;

    let history = run.metric_history("metric0")?;
    println!("  metric0: {} samples", history.len());
    println!("  UI: {}", run.ui_url());

    run.end()?;
    println!("  status: {}", run.status());
    assert!(!registry.is_active());
    Ok(())
}
