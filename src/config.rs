use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_EXPERIMENT_NAME: &str = "hypothesis000";
pub const DEFAULT_OUTPUT_DIR: &str = "experiment_outputs";
pub const DEFAULT_WORKERS: usize = 6;
pub const DEFAULT_RETRY: usize = 5;
pub const DEFAULT_CONNECTION_NAME: &str = "aoai_conn";

pub const ENV_API_KEY: &str = "AOAI_KEY";
pub const ENV_ENDPOINT: &str = "AOAI_ENDPOINT";
pub const ENV_CONNECTION_NAME: &str = "AOAI_CONNECTION_NAME";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read experiment config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse experiment config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid experiment config field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error("environment variable {0} is not set")]
    MissingEnv(&'static str),
    #[error("{var} <{value}> is not a valid Azure OpenAI endpoint")]
    InvalidEndpoint { var: &'static str, value: String },
}

fn default_experiment_name() -> String {
    DEFAULT_EXPERIMENT_NAME.to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_DIR)
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_retry() -> usize {
    DEFAULT_RETRY
}

fn default_true() -> bool {
    true
}

/// Experiment definition read from JSON. One experiment runs per rule id.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExperimentConfig {
    pub dataset_path: PathBuf,
    pub pf_model_path: PathBuf,
    /// Rule data file, relative to `pf_model_path`.
    pub input_data_path: PathBuf,
    pub num_runs: usize,
    pub query_id: String,
    pub rule_ids: Vec<String>,
    pub result_key: String,
    pub variant: String,
    #[serde(default = "default_experiment_name")]
    pub experiment_name: String,
    #[serde(default = "default_workers")]
    pub num_workers: usize,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_true")]
    pub output_predictions: bool,
    #[serde(default = "default_retry")]
    pub retry: usize,
}

impl ExperimentConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_slice(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        non_empty_path("dataset_path", &self.dataset_path)?;
        non_empty_path("pf_model_path", &self.pf_model_path)?;
        non_empty_path("input_data_path", &self.input_data_path)?;
        non_empty("query_id", &self.query_id)?;
        non_empty("result_key", &self.result_key)?;
        non_empty("variant", &self.variant)?;
        non_empty("experiment_name", &self.experiment_name)?;
        at_least_one("num_runs", self.num_runs)?;
        at_least_one("num_workers", self.num_workers)?;
        at_least_one("retry", self.retry)?;

        if self.rule_ids.is_empty() {
            return Err(invalid("rule_ids", "at least one rule id is required"));
        }
        if let Some(position) = self.rule_ids.iter().position(|id| id.trim().is_empty()) {
            return Err(invalid(
                "rule_ids",
                format!("entry {position} is an empty string"),
            ));
        }

        Ok(())
    }

    /// Rule data file as seen from the working directory.
    pub fn resolved_input_data_path(&self) -> PathBuf {
        self.pf_model_path.join(&self.input_data_path)
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidField {
        field,
        reason: reason.into(),
    }
}

fn non_empty(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(invalid(field, "must not be empty"));
    }
    Ok(())
}

fn non_empty_path(field: &'static str, value: &Path) -> Result<(), ConfigError> {
    if value.as_os_str().is_empty() {
        return Err(invalid(field, "must not be empty"));
    }
    Ok(())
}

fn at_least_one(field: &'static str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(invalid(field, "must be at least 1"));
    }
    Ok(())
}

/// Azure OpenAI connection details handed to the flow runner.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    pub endpoint: String,
    pub connection_name: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("connection_name", &self.connection_name)
            .finish()
    }
}

impl Credentials {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &'static str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let api_key = read(ENV_API_KEY).ok_or(ConfigError::MissingEnv(ENV_API_KEY))?;
        let endpoint = read(ENV_ENDPOINT).ok_or(ConfigError::MissingEnv(ENV_ENDPOINT))?;
        if !is_valid_endpoint(&endpoint) {
            return Err(ConfigError::InvalidEndpoint {
                var: ENV_ENDPOINT,
                value: endpoint,
            });
        }
        let connection_name =
            read(ENV_CONNECTION_NAME).unwrap_or_else(|| DEFAULT_CONNECTION_NAME.to_string());

        Ok(Self {
            api_key,
            endpoint,
            connection_name,
        })
    }
}

fn is_valid_endpoint(url: &str) -> bool {
    Regex::new(r"^https://[a-zA-Z0-9-]+\.openai\.azure\.com/?$")
        .map(|pattern| pattern.is_match(url))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn sample_config() -> ExperimentConfig {
        serde_json::from_str(
            r#"{
              "dataset_path": "data/reqs.json",
              "pf_model_path": "flows/experiment_flow",
              "input_data_path": "../../data/rules.json",
              "num_runs": 3,
              "query_id": "text",
              "rule_ids": ["r3", "r16"],
              "result_key": "violation",
              "variant": "variant_0"
            }"#,
        )
        .expect("config should deserialize")
    }

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let values = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect::<HashMap<String, String>>();
        move |name| values.get(name).cloned()
    }

    #[test]
    fn config_defaults_fill_optional_fields() {
        let config = sample_config();
        assert_eq!(config.experiment_name, DEFAULT_EXPERIMENT_NAME);
        assert_eq!(config.num_workers, DEFAULT_WORKERS);
        assert_eq!(config.retry, DEFAULT_RETRY);
        assert!(config.output_predictions);
        assert!(config.validate().is_ok());
        assert_eq!(
            config.resolved_input_data_path(),
            PathBuf::from("flows/experiment_flow/../../data/rules.json")
        );
    }

    #[test]
    fn config_validation_rejects_zero_runs_and_empty_rules() {
        let mut config = sample_config();
        config.num_runs = 0;
        let err = config.validate().expect_err("zero runs");
        assert!(err.to_string().contains("num_runs"));

        let mut config = sample_config();
        config.rule_ids.clear();
        let err = config.validate().expect_err("no rules");
        assert!(err.to_string().contains("rule_ids"));

        let mut config = sample_config();
        config.num_workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_rejects_unknown_keys() {
        let raw = r#"{"dataset_path": "d", "pf_model_path": "p", "input_data_path": "i",
            "num_runs": 1, "query_id": "text", "rule_ids": ["r1"], "result_key": "v",
            "variant": "variant_0", "workers": 3}"#;
        assert!(serde_json::from_str::<ExperimentConfig>(raw).is_err());
    }

    #[test]
    fn credentials_require_key_and_valid_endpoint() {
        let creds = Credentials::from_lookup(lookup(&[
            (ENV_API_KEY, "secret"),
            (ENV_ENDPOINT, "https://my-resource.openai.azure.com/"),
        ]))
        .expect("valid credentials");
        assert_eq!(creds.connection_name, DEFAULT_CONNECTION_NAME);
        assert!(!format!("{creds:?}").contains("secret"));

        let err = Credentials::from_lookup(lookup(&[(ENV_ENDPOINT, "https://x.openai.azure.com")]))
            .expect_err("missing key");
        assert!(matches!(err, ConfigError::MissingEnv(ENV_API_KEY)));

        let err = Credentials::from_lookup(lookup(&[
            (ENV_API_KEY, "secret"),
            (ENV_ENDPOINT, "http://example.com"),
        ]))
        .expect_err("bad endpoint");
        assert!(matches!(err, ConfigError::InvalidEndpoint { .. }));
    }
}
