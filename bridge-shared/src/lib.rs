//! Shared primitives for taskbridge: configuration, the error taxonomy,
//! resilience (circuit breakers), the typed variable codec, the routing
//! table, the broker adapter, and the BPMN metadata cache.

pub mod codec;
pub mod config;
pub mod error;
pub mod metadata_cache;
pub mod models;
pub mod resilience;
pub mod routing;

pub mod broker;

pub use config::AppConfig;
pub use error::BridgeError;
