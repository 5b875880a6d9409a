//! Error taxonomy for calls against the engine's external-task API,
//! mirroring the constructor-helpers + classifier shape used across
//! this stack's other API clients.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineClientError {
    #[error("request to {path} failed: {source}")]
    Request {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("engine rejected credentials for {path}")]
    Unauthorized { path: String },

    #[error("task not found: {task_id}")]
    TaskNotFound { task_id: String },

    #[error("unexpected status {status} from {path}: {body}")]
    UnexpectedStatus {
        path: String,
        status: u16,
        body: String,
    },

    #[error("failed to decode engine response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid engine base url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("engine circuit open, refusing call to {path}")]
    CircuitOpen { path: String },
}

impl EngineClientError {
    pub fn request(path: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Request {
            path: path.into(),
            source,
        }
    }

    pub fn unauthorized(path: impl Into<String>) -> Self {
        Self::Unauthorized { path: path.into() }
    }

    pub fn task_not_found(task_id: impl Into<String>) -> Self {
        Self::TaskNotFound {
            task_id: task_id.into(),
        }
    }

    pub fn unexpected_status(path: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self::UnexpectedStatus {
            path: path.into(),
            status,
            body: body.into(),
        }
    }

    pub fn decode(path: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Decode {
            path: path.into(),
            source,
        }
    }

    pub fn circuit_open(path: impl Into<String>) -> Self {
        Self::CircuitOpen { path: path.into() }
    }

    /// `TaskNotFound` is the idempotent-success path (§7): callers
    /// should treat it as a benign duplicate, not an error condition.
    pub fn is_already_closed(&self) -> bool {
        matches!(self, EngineClientError::TaskNotFound { .. })
    }

    /// Transport-transient errors are worth a requeue; auth/validation
    /// errors are not.
    pub fn is_recoverable(&self) -> bool {
        match self {
            EngineClientError::Request { .. } => true,
            EngineClientError::TaskNotFound { .. } => true,
            EngineClientError::UnexpectedStatus { status, .. } => *status >= 500,
            EngineClientError::CircuitOpen { .. } => true,
            EngineClientError::Unauthorized { .. }
            | EngineClientError::Decode { .. }
            | EngineClientError::InvalidUrl(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_already_closed() {
        assert!(EngineClientError::task_not_found("T1").is_already_closed());
    }

    #[test]
    fn server_errors_are_recoverable() {
        let err = EngineClientError::unexpected_status("/complete", 503, "");
        assert!(err.is_recoverable());
    }

    #[test]
    fn client_errors_are_not_recoverable() {
        let err = EngineClientError::unexpected_status("/complete", 400, "bad request");
        assert!(!err.is_recoverable());
    }
}
