//! Metric records - inputs to bulk logging and read-back samples

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A metric value to log; the step and timestamp are supplied by the call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    /// Metric name (e.g. "loss").
    pub key: String,
    /// Metric value.
    pub value: f64,
}

impl Metric {
    /// Create a new metric.
    #[must_use]
    pub fn new(key: impl Into<String>, value: f64) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// One recorded sample of a metric series.
///
/// Series are append-only; samples are returned in the order they were logged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    /// Wall-clock time of the log call, epoch milliseconds.
    pub timestamp: i64,
    /// Metric value.
    pub value: f64,
    /// Training step or epoch number.
    pub step: i64,
}

impl MetricSample {
    /// Create a new sample.
    #[must_use]
    pub const fn new(timestamp: i64, value: f64, step: i64) -> Self {
        Self {
            timestamp,
            value,
            step,
        }
    }
}

/// One line of a metric file: `"<timestampMs> <value> <step>"`.
impl fmt::Display for MetricSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.timestamp, self.value, self.step)
    }
}

impl FromStr for MetricSample {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        let (Some(ts), Some(value), step, None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(format!("malformed metric line {line:?}"));
        };
        let timestamp = ts
            .parse::<i64>()
            .map_err(|e| format!("bad timestamp in {line:?}: {e}"))?;
        let value = value
            .parse::<f64>()
            .map_err(|e| format!("bad value in {line:?}: {e}"))?;
        // Older files may omit the step column.
        let step = step
            .map(str::parse::<i64>)
            .transpose()
            .map_err(|e| format!("bad step in {line:?}: {e}"))?
            .unwrap_or(0);
        Ok(Self::new(timestamp, value, step))
    }
}
