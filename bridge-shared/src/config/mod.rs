//! Layered configuration: compiled-in defaults for the operational
//! tuning knobs, then an optional TOML file, then `TASKBRIDGE_`-prefixed
//! environment variables, mirroring how the rest of this stack composes
//! `config::Config`. Connection settings that have no sane universal
//! default (`engine.base_url`, `engine.worker_id`, `broker.amqp_uri`)
//! carry none and must come from the file or the environment.

pub mod circuit_breaker;

use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Push vs pull response-loop delivery; an operational choice, not a
/// semantic one (see Open Questions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseHandlerMode {
    Push,
    Pull,
}

impl Default for ResponseHandlerMode {
    fn default() -> Self {
        Self::Push
    }
}

#[derive(Debug, Clone, Validate, Serialize, Deserialize)]
pub struct EngineConfig {
    #[validate(url)]
    pub base_url: String,
    #[validate(length(min = 1))]
    pub worker_id: String,
    pub basic_auth_user: Option<String>,
    pub basic_auth_password: Option<String>,
    #[validate(range(min = 1))]
    pub request_timeout_ms: u64,
}

impl EngineConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Validate, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[validate(length(min = 1))]
    pub amqp_uri: String,
    #[validate(range(min = 1))]
    pub heartbeat_secs: u16,
    #[validate(range(min = 1))]
    pub connection_timeout_ms: u64,
}

#[derive(Debug, Clone, Validate, Serialize, Deserialize)]
pub struct CacheConfig {
    #[validate(range(min = 1))]
    pub max_entries: usize,
    #[validate(range(min = 1))]
    pub ttl_hours: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_hours * 3600)
    }
}

#[derive(Debug, Clone, Validate, Serialize, Deserialize)]
pub struct WorkerRuntimeConfig {
    #[validate(range(min = 1))]
    pub max_tasks: u32,
    #[validate(range(min = 1))]
    pub lock_duration_ms: u64,
    #[validate(range(min = 1))]
    pub async_response_timeout_ms: u64,
    #[validate(range(min = 1))]
    pub fetch_interval_ms: u64,
    #[validate(range(min = 1))]
    pub sleep_seconds: u64,
    #[validate(range(min = 1))]
    pub heartbeat_interval_seconds: u64,
    #[serde(default)]
    pub response_handler_mode: ResponseHandlerMode,
    pub topics: Vec<String>,
}

#[derive(Debug, Clone, Validate, Serialize, Deserialize)]
pub struct AppConfig {
    #[validate(nested)]
    pub engine: EngineConfig,
    #[validate(nested)]
    pub broker: BrokerConfig,
    #[validate(nested)]
    pub cache: CacheConfig,
    #[validate(nested)]
    pub worker: WorkerRuntimeConfig,
    /// Path to a routing table definition (TOML); falls back to built-in
    /// defaults in `routing::RoutingTable::default()` when absent.
    pub routing_table_path: Option<String>,
}

impl AppConfig {
    /// Loads `.env`, then compiled-in defaults for the tuning knobs,
    /// then an optional `config/taskbridge.toml`, then `TASKBRIDGE_*`
    /// environment variables (double underscore as the nesting
    /// separator). `engine.base_url`, `engine.worker_id`, and
    /// `broker.amqp_uri` have no default and must be supplied by the
    /// file or the environment.
    pub fn load() -> crate::error::Result<Self> {
        let _ = dotenvy::dotenv();

        let settings = config::Config::builder()
            .set_default("broker.heartbeat_secs", 30)?
            .set_default("broker.connection_timeout_ms", 5_000)?
            .set_default("cache.max_entries", 500)?
            .set_default("cache.ttl_hours", 4)?
            .set_default("worker.max_tasks", 10)?
            .set_default("worker.lock_duration_ms", 60_000)?
            .set_default("worker.async_response_timeout_ms", 30_000)?
            .set_default("worker.fetch_interval_ms", 1_000)?
            .set_default("worker.sleep_seconds", 5)?
            .set_default("worker.heartbeat_interval_seconds", 30)?
            .set_default("worker.response_handler_mode", "push")?
            .set_default("worker.topics", Vec::<String>::new())?
            .set_default("engine.request_timeout_ms", 30_000)?
            .add_source(config::File::with_name("config/taskbridge").required(false))
            .add_source(
                config::Environment::with_prefix("TASKBRIDGE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let cfg: AppConfig = settings.try_deserialize()?;
        cfg.validate()
            .map_err(|e| crate::error::BridgeError::validation(e.to_string()))?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AppConfig {
        AppConfig {
            engine: EngineConfig {
                base_url: "http://localhost:8080/engine-rest".into(),
                worker_id: "worker-1".into(),
                basic_auth_user: None,
                basic_auth_password: None,
                request_timeout_ms: 30_000,
            },
            broker: BrokerConfig {
                amqp_uri: "amqp://localhost:5672/%2f".into(),
                heartbeat_secs: 30,
                connection_timeout_ms: 5_000,
            },
            cache: CacheConfig {
                max_entries: 500,
                ttl_hours: 4,
            },
            worker: WorkerRuntimeConfig {
                max_tasks: 10,
                lock_duration_ms: 60_000,
                async_response_timeout_ms: 30_000,
                fetch_interval_ms: 1_000,
                sleep_seconds: 5,
                heartbeat_interval_seconds: 30,
                response_handler_mode: ResponseHandlerMode::Push,
                topics: vec!["bitrix24".into()],
            },
            routing_table_path: None,
        }
    }

    #[test]
    fn sample_config_validates() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn empty_worker_id_fails_validation() {
        let mut cfg = sample();
        cfg.engine.worker_id = String::new();
        assert!(cfg.validate().is_err());
    }
}
