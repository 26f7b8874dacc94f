//! Configuration loading from the environment.
//!
//! | Env var                   | Default                    |
//! |---------------------------|----------------------------|
//! | `REDIS_URL`               | `redis://127.0.0.1:6379/0` |
//! | `REDIS_QUEUE`             | `service_queue`            |
//! | `RESULT_NAMESPACE`        | *(empty: bare job ids)*    |
//! | `RESULT_TTL_SECS`         | `3600` (`0` disables)      |
//! | `API_SLEEP_MS`            | `100`                      |
//! | `API_SLEEP_TIMEOUT_SECS`  | `45`                       |
//! | `SERVER_SLEEP_MS`         | `50`                       |
//! | `WORKER_POP_TIMEOUT_SECS` | `1`                        |
//! | `WORKER_CONCURRENCY`      | `1`                        |
//! | `UPLOAD_FOLDER`           | `uploads`                  |
//! | `CLASSIFIER_CMD`          | *(unset)*                  |
//! | `CLASSIFIER_TIMEOUT_SECS` | `60`                       |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::dispatcher::DispatcherConfig;
use crate::retry::RetryPolicy;
use crate::worker::WorkerConfig;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} must be set")]
    Missing(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub redis_url: String,
    pub queue_name: String,
    /// Prefix for result keys; `None` stores results under the bare job id.
    pub result_namespace: Option<String>,
    /// Expiry of result entries; `None` keeps them until read.
    pub result_ttl: Option<Duration>,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
    pub idle_sleep: Duration,
    pub pop_timeout: Duration,
    pub worker_concurrency: usize,
    pub upload_folder: PathBuf,
    pub classifier_cmd: Option<String>,
    pub classifier_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379/0".to_string(),
            queue_name: "service_queue".to_string(),
            result_namespace: None,
            result_ttl: Some(Duration::from_secs(3600)),
            poll_interval: Duration::from_millis(100),
            poll_timeout: Duration::from_secs(45),
            idle_sleep: Duration::from_millis(50),
            pop_timeout: Duration::from_secs(1),
            worker_concurrency: 1,
            upload_folder: PathBuf::from("uploads"),
            classifier_cmd: None,
            classifier_timeout: Duration::from_secs(60),
        }
    }
}

impl Settings {
    /// Load settings from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary key lookup (tests, layered sources).
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let result_ttl = match parse::<u64>(&get, "RESULT_TTL_SECS")? {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.result_ttl,
        };

        let worker_concurrency = parse::<usize>(&get, "WORKER_CONCURRENCY")?
            .unwrap_or(defaults.worker_concurrency);
        if worker_concurrency == 0 {
            return Err(ConfigError::Invalid {
                key: "WORKER_CONCURRENCY",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            redis_url: get("REDIS_URL").unwrap_or(defaults.redis_url),
            queue_name: get("REDIS_QUEUE").unwrap_or(defaults.queue_name),
            result_namespace: get("RESULT_NAMESPACE"),
            result_ttl,
            poll_interval: parse(&get, "API_SLEEP_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            poll_timeout: parse(&get, "API_SLEEP_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_timeout),
            idle_sleep: parse(&get, "SERVER_SLEEP_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.idle_sleep),
            pop_timeout: parse(&get, "WORKER_POP_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.pop_timeout),
            worker_concurrency,
            upload_folder: get("UPLOAD_FOLDER")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_folder),
            classifier_cmd: get("CLASSIFIER_CMD"),
            classifier_timeout: parse(&get, "CLASSIFIER_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.classifier_timeout),
        })
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            poll_interval: self.poll_interval,
            poll_timeout: self.poll_timeout,
        }
    }

    pub fn worker_config(&self, name: impl Into<String>) -> WorkerConfig {
        WorkerConfig {
            name: name.into(),
            idle_sleep: self.idle_sleep,
            pop_timeout: self.pop_timeout,
            retry: RetryPolicy::default(),
        }
    }

    pub fn require_classifier_cmd(&self) -> Result<&str, ConfigError> {
        self.classifier_cmd
            .as_deref()
            .ok_or(ConfigError::Missing("CLASSIFIER_CMD"))
    }
}

fn parse<T>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        None => Ok(None),
        Some(value) => value.parse().map(Some).map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
            value,
        }),
    }
}
