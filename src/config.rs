//! Tracking configuration
//!
//! Values come from the process environment or from a caller-supplied
//! key/value source. Empty strings count as unset everywhere.

use std::collections::HashMap;

use serde::Deserialize;

/// Tracking server URI (`file://...`, `http(s)://...` or a plain path).
pub const TRACKING_URI_ENV: &str = "MLFLOW_TRACKING_URI";
/// Experiment id to log into; overrides any experiment name hint.
pub const EXPERIMENT_ID_ENV: &str = "MLFLOW_EXPERIMENT_ID";
/// Existing run to resume instead of creating a new one.
pub const RUN_ID_ENV: &str = "MLFLOW_RUN_ID";
/// Bearer token sent to REST tracking servers.
pub const BEARER_TOKEN_ENV: &str = "MLFLOW_TRACKING_TOKEN";

/// Tracking URI used when neither an override nor configuration names one.
pub const DEFAULT_TRACKING_URI: &str = "./mlruns";

/// Environment/config layer consulted by store construction and run resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Tracking URI.
    pub tracking_uri: Option<String>,
    /// Experiment id.
    pub experiment_id: Option<String>,
    /// Run id to resume.
    pub run_id: Option<String>,
    /// Bearer token.
    pub bearer_token: Option<String>,
}

impl TrackingConfig {
    /// Read the `MLFLOW_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup using the `MLFLOW_*` key names.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.is_empty());
        Self {
            tracking_uri: get(TRACKING_URI_ENV),
            experiment_id: get(EXPERIMENT_ID_ENV),
            run_id: get(RUN_ID_ENV),
            bearer_token: get(BEARER_TOKEN_ENV),
        }
    }

    /// Build from an explicit key/value mapping.
    #[must_use]
    pub fn from_map(values: &HashMap<String, String>) -> Self {
        Self::from_lookup(|key| values.get(key).cloned())
    }

    /// Tracking URI, if configured and non-empty.
    #[must_use]
    pub fn tracking_uri(&self) -> Option<&str> {
        non_empty(self.tracking_uri.as_deref())
    }

    /// Experiment id, if configured and non-empty.
    #[must_use]
    pub fn experiment_id(&self) -> Option<&str> {
        non_empty(self.experiment_id.as_deref())
    }

    /// Run id, if configured and non-empty.
    #[must_use]
    pub fn run_id(&self) -> Option<&str> {
        non_empty(self.run_id.as_deref())
    }

    /// Bearer token, if configured and non-empty.
    #[must_use]
    pub fn bearer_token(&self) -> Option<&str> {
        non_empty(self.bearer_token.as_deref())
    }
}

/// Explicit overrides and hints for resolving the active run.
///
/// Overrides win over [`TrackingConfig`]; the experiment name is a hint that
/// a configured experiment id takes precedence over.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Tracking URI override.
    pub tracking_uri: Option<String>,
    /// Bearer token override.
    pub bearer_token: Option<String>,
    /// Experiment to get or create when no experiment id is configured.
    pub experiment_name: Option<String>,
}

impl ResolveOptions {
    /// No overrides, default experiment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Log into the named experiment, creating it if needed.
    #[must_use]
    pub fn experiment_name(mut self, name: impl Into<String>) -> Self {
        self.experiment_name = Some(name.into());
        self
    }

    /// Override the tracking URI.
    #[must_use]
    pub fn tracking_uri(mut self, uri: impl Into<String>) -> Self {
        self.tracking_uri = Some(uri.into());
        self
    }

    /// Override the bearer token.
    #[must_use]
    pub fn bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Tracking URI: override, then configuration, then [`DEFAULT_TRACKING_URI`].
    #[must_use]
    pub fn resolve_tracking_uri<'a>(&'a self, config: &'a TrackingConfig) -> &'a str {
        non_empty(self.tracking_uri.as_deref())
            .or_else(|| config.tracking_uri())
            .unwrap_or(DEFAULT_TRACKING_URI)
    }

    /// Bearer token: override, then configuration.
    #[must_use]
    pub fn resolve_bearer_token<'a>(&'a self, config: &'a TrackingConfig) -> Option<&'a str> {
        non_empty(self.bearer_token.as_deref()).or_else(|| config.bearer_token())
    }

    /// Experiment name hint, if non-empty.
    #[must_use]
    pub fn experiment_name_hint(&self) -> Option<&str> {
        non_empty(self.experiment_name.as_deref())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_map_ignores_empty_values() {
        let values = HashMap::from([
            (TRACKING_URI_ENV.to_string(), "http://tracking:5000".to_string()),
            (EXPERIMENT_ID_ENV.to_string(), String::new()),
        ]);
        let config = TrackingConfig::from_map(&values);
        assert_eq!(config.tracking_uri(), Some("http://tracking:5000"));
        assert_eq!(config.experiment_id(), None);
        assert_eq!(config.run_id(), None);
    }

    #[test]
    fn test_override_precedence() {
        let config = TrackingConfig {
            tracking_uri: Some("file:///from/config".to_string()),
            bearer_token: Some("config-token".to_string()),
            ..TrackingConfig::default()
        };
        let options = ResolveOptions::new();
        assert_eq!(options.resolve_tracking_uri(&config), "file:///from/config");
        assert_eq!(options.resolve_bearer_token(&config), Some("config-token"));

        let options = ResolveOptions::new()
            .tracking_uri("http://override")
            .bearer_token("override-token");
        assert_eq!(options.resolve_tracking_uri(&config), "http://override");
        assert_eq!(options.resolve_bearer_token(&config), Some("override-token"));

        let empty = TrackingConfig::default();
        assert_eq!(ResolveOptions::new().resolve_tracking_uri(&empty), DEFAULT_TRACKING_URI);
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: TrackingConfig =
            serde_json::from_str(r#"{"tracking_uri": "/tmp/mlruns"}"#).unwrap();
        assert_eq!(config.tracking_uri(), Some("/tmp/mlruns"));
        assert_eq!(config.bearer_token(), None);
    }
}
