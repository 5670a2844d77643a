//! Application configuration.
//!
//! Every section has a default, so an empty environment gives a working
//! in-memory setup. `from_env` overrides individual fields from `DISPATCH_*`
//! variables.

use std::str::FromStr;
use std::time::Duration;

use db::DbConfig;
use dispatch_core::{QueueConfig, RetryPolicy};
use serde::{Deserialize, Serialize};
use storage::StorageConfig;

use crate::AppError;

/// Default per-subscriber delivery timeout for the topic hub.
pub const DEFAULT_DELIVERY_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub queue: QueueConfig,
    pub db: DbConfig,
    pub storage: StorageConfig,
    /// How long a hub subscriber may take to accept one message (milliseconds).
    pub delivery_timeout_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            queue: QueueConfig::default(),
            db: DbConfig::default(),
            storage: StorageConfig::default(),
            delivery_timeout_ms: DEFAULT_DELIVERY_TIMEOUT_MS,
        }
    }
}

impl AppConfig {
    pub fn with_queue(mut self, queue: QueueConfig) -> Self {
        self.queue = queue;
        self
    }

    pub fn with_db(mut self, db: DbConfig) -> Self {
        self.db = db;
        self
    }

    pub fn with_storage(mut self, storage: StorageConfig) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms.max(1))
    }

    /// Read configuration from the process environment.
    ///
    /// Queue:
    /// - `DISPATCH_CONCURRENCY`, `DISPATCH_MAX_RETRIES`, `DISPATCH_JOB_TIMEOUT_SECS`
    /// - `DISPATCH_RETRY_BASE_MS`, `DISPATCH_RETRY_MAX_MS` (exponential backoff bounds)
    /// - `DISPATCH_POLL_INTERVAL_MS`, `DISPATCH_SWEEP_INTERVAL_MS`
    /// - `DISPATCH_SHUTDOWN_TIMEOUT_SECS`
    ///
    /// Database:
    /// - `DISPATCH_DB_ENDPOINT` (`mem://`, `rocksdb://path`, ...)
    /// - `DISPATCH_DB_NAMESPACE`, `DISPATCH_DB_DATABASE`
    /// - `DISPATCH_DB_USER` and `DISPATCH_DB_PASS` (both or neither)
    ///
    /// Hub:
    /// - `DISPATCH_DELIVERY_TIMEOUT_MS`
    ///
    /// Storage is read by [`StorageConfig::from_env`].
    pub fn from_env() -> Result<Self, AppError> {
        let mut config = Self::from_lookup(|key| std::env::var(key).ok())?;
        config.storage = StorageConfig::from_env()?;
        Ok(config)
    }

    /// Build a config from an arbitrary variable source. Storage keeps its default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        let queue = &mut config.queue;
        if let Some(n) = parse(&get, "DISPATCH_CONCURRENCY")? {
            queue.concurrency = n;
        }
        if let Some(n) = parse(&get, "DISPATCH_MAX_RETRIES")? {
            queue.default_max_retries = n;
        }
        if let Some(n) = parse(&get, "DISPATCH_JOB_TIMEOUT_SECS")? {
            queue.default_timeout_secs = n;
        }
        let base: Option<u64> = parse(&get, "DISPATCH_RETRY_BASE_MS")?;
        let max: Option<u64> = parse(&get, "DISPATCH_RETRY_MAX_MS")?;
        if base.is_some() || max.is_some() {
            let defaults = RetryPolicy::default();
            queue.retry = RetryPolicy::exponential(
                Duration::from_millis(base.unwrap_or(defaults.base_delay_ms)),
                Duration::from_millis(max.unwrap_or(defaults.max_delay_ms)),
            );
        }
        if let Some(n) = parse(&get, "DISPATCH_POLL_INTERVAL_MS")? {
            queue.poll_interval_ms = n;
        }
        if let Some(n) = parse(&get, "DISPATCH_SWEEP_INTERVAL_MS")? {
            queue.sweep_interval_ms = n;
        }
        if let Some(n) = parse(&get, "DISPATCH_SHUTDOWN_TIMEOUT_SECS")? {
            queue.shutdown_timeout_secs = n;
        }

        let db = &mut config.db;
        if let Some(endpoint) = get("DISPATCH_DB_ENDPOINT") {
            db.endpoint = endpoint;
        }
        if let Some(namespace) = get("DISPATCH_DB_NAMESPACE") {
            db.namespace = namespace;
        }
        if let Some(database) = get("DISPATCH_DB_DATABASE") {
            db.database = database;
        }
        match (get("DISPATCH_DB_USER"), get("DISPATCH_DB_PASS")) {
            (Some(user), Some(pass)) => db.credentials = Some((user, pass)),
            (None, None) => {}
            _ => {
                return Err(AppError::Config(
                    "DISPATCH_DB_USER and DISPATCH_DB_PASS must be set together".into(),
                ));
            }
        }

        if let Some(ms) = parse(&get, "DISPATCH_DELIVERY_TIMEOUT_MS")? {
            config.delivery_timeout_ms = ms;
        }

        Ok(config)
    }
}

fn parse<T, G>(get: &G, key: &str) -> Result<Option<T>, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| AppError::Config(format!("{key}={raw}: {e}")))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = AppConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.delivery_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn overrides_are_applied() {
        let config = AppConfig::from_lookup(lookup(&[
            ("DISPATCH_CONCURRENCY", "8"),
            ("DISPATCH_MAX_RETRIES", " 2 "),
            ("DISPATCH_RETRY_BASE_MS", "250"),
            ("DISPATCH_DB_ENDPOINT", "rocksdb://./data/db"),
            ("DISPATCH_DB_USER", "root"),
            ("DISPATCH_DB_PASS", "secret"),
            ("DISPATCH_DELIVERY_TIMEOUT_MS", "750"),
            ("DISPATCH_POLL_INTERVAL_MS", ""),
        ]))
        .unwrap();

        assert_eq!(config.queue.concurrency, 8);
        assert_eq!(config.queue.default_max_retries, 2);
        assert_eq!(config.queue.retry.base_delay_ms, 250);
        assert_eq!(config.queue.retry.max_delay_ms, 60_000);
        assert_eq!(config.queue.poll_interval_ms, 100);
        assert_eq!(config.db.endpoint, "rocksdb://./data/db");
        assert_eq!(config.db.credentials, Some(("root".into(), "secret".into())));
        assert_eq!(config.delivery_timeout(), Duration::from_millis(750));
    }

    #[test]
    fn bad_values_are_rejected() {
        let err = AppConfig::from_lookup(lookup(&[("DISPATCH_CONCURRENCY", "many")])).unwrap_err();
        assert!(err.to_string().contains("DISPATCH_CONCURRENCY=many"));

        let err = AppConfig::from_lookup(lookup(&[("DISPATCH_DB_USER", "root")])).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"queue": {"concurrency": 1}, "delivery_timeout_ms": 10}"#)
                .unwrap();
        assert_eq!(config.queue.concurrency, 1);
        assert_eq!(config.queue.default_max_retries, 3);
        assert_eq!(config.db, DbConfig::default());
        assert_eq!(config.delivery_timeout_ms, 10);
    }
}
