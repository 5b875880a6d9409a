//! Error taxonomy shared by every taskbridge component (see §7 of the design
//! notes: transport-transient, auth, not-found, validation, domain-handler
//! failure, orphaned-task, capacity).

use thiserror::Error;

/// The error type returned by `bridge-shared` primitives and propagated
/// through `bridge-worker` and `bridge-ctl`.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("broker transport error: {0}")]
    Broker(#[from] lapin::Error),

    #[error("engine http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json encode/decode error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("bpmn xml error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("routing: no binding for topic '{0}'")]
    RoutingNotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("task not found or already closed: {task_id}")]
    TaskNotFound { task_id: String },

    #[error("domain handler failed for task {task_id}: {reason}")]
    HandlerFailed { task_id: String, reason: String },

    #[error("task {task_id} appears orphaned (locked {age_minutes}m ago)")]
    OrphanedTask { task_id: String, age_minutes: i64 },

    #[error("capacity exceeded: {0}")]
    Capacity(String),

    #[error("authentication rejected: {0}")]
    Auth(String),
}

impl BridgeError {
    pub fn routing_not_found(topic: impl Into<String>) -> Self {
        Self::RoutingNotFound(topic.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn task_not_found(task_id: impl Into<String>) -> Self {
        Self::TaskNotFound {
            task_id: task_id.into(),
        }
    }

    pub fn handler_failed(task_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::HandlerFailed {
            task_id: task_id.into(),
            reason: reason.into(),
        }
    }

    pub fn orphaned_task(task_id: impl Into<String>, age_minutes: i64) -> Self {
        Self::OrphanedTask {
            task_id: task_id.into(),
            age_minutes,
        }
    }

    /// Classifies whether the caller should retry/requeue (transport,
    /// capacity) or treat the failure as final (validation, auth, handler).
    /// Not-found is intentionally `true`: it is the idempotent success path.
    pub fn is_recoverable(&self) -> bool {
        match self {
            BridgeError::Broker(_) | BridgeError::Http(_) | BridgeError::Capacity(_) => true,
            BridgeError::TaskNotFound { .. } => true,
            BridgeError::Json(_)
            | BridgeError::Xml(_)
            | BridgeError::Config(_)
            | BridgeError::RoutingNotFound(_)
            | BridgeError::Validation(_)
            | BridgeError::HandlerFailed { .. }
            | BridgeError::OrphanedTask { .. }
            | BridgeError::Auth(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_recoverable() {
        let err = BridgeError::task_not_found("T1");
        assert!(err.is_recoverable());
    }

    #[test]
    fn validation_is_not_recoverable() {
        let err = BridgeError::validation("missing taskId");
        assert!(!err.is_recoverable());
    }
}
