//! HTTP client for the external-task workflow engine API consumed by
//! the Poller, the Response Loop, the Reconciliation Tracker, and the
//! Recovery Utility (§6 External Interfaces).

pub mod client;
pub mod error;

pub use client::{EngineClient, ExternalTask, FetchAndLockRequest, TopicSubscription};
pub use error::EngineClientError;
