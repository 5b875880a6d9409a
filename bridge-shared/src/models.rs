//! Wire-level domain types shared across the bridge (§3 Data Model).

use crate::codec::VariableMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A unit of engine work, published by the Poller onto a system queue.
/// `task_id` is the idempotency key everywhere downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub task_id: String,
    pub topic: String,
    pub system: String,
    pub process_instance_id: String,
    pub process_definition_id: String,
    pub process_definition_key: Option<String>,
    pub activity_id: String,
    pub activity_instance_id: Option<String>,
    pub business_key: Option<String>,
    pub tenant_id: Option<String>,
    pub worker_id: String,
    pub retries: Option<i32>,
    #[serde(default)]
    pub priority: i64,
    pub created_time: Option<String>,
    pub timestamp: i64,
    #[serde(default)]
    pub variables: VariableMap,
    pub metadata: ActivityMetadata,
}

/// The service-task slice of a process definition's BPMN, as extracted
/// by the metadata cache (§3.2).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivityMetadata {
    #[serde(default)]
    pub extension_properties: HashMap<String, String>,
    #[serde(default)]
    pub field_injections: HashMap<String, String>,
    #[serde(default)]
    pub input_parameters: HashMap<String, String>,
    #[serde(default)]
    pub output_parameters: HashMap<String, String>,
    pub activity_info: Option<ActivityInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityInfo {
    pub id: String,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub activity_type: String,
    pub topic: Option<String>,
}

impl ActivityMetadata {
    pub fn is_empty(&self) -> bool {
        self.extension_properties.is_empty()
            && self.field_injections.is_empty()
            && self.input_parameters.is_empty()
            && self.output_parameters.is_empty()
            && self.activity_info.is_none()
    }
}

/// Published by a handler to the response exchange; consumed by the
/// Response Loop and also synthesized by the Reconciliation Tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "responseType", rename_all = "snake_case")]
pub enum ResponseMessage {
    Complete {
        task_id: String,
        worker_id: String,
        #[serde(default)]
        variables: VariableMap,
        #[serde(default)]
        local_variables: VariableMap,
    },
    Failure {
        task_id: String,
        worker_id: String,
        error_message: String,
        error_details: Option<String>,
        retries: i32,
        retry_timeout: i64,
    },
    BpmnError {
        task_id: String,
        worker_id: String,
        error_code: String,
        error_message: String,
        #[serde(default)]
        variables: VariableMap,
    },
}

impl ResponseMessage {
    pub fn task_id(&self) -> &str {
        match self {
            ResponseMessage::Complete { task_id, .. }
            | ResponseMessage::Failure { task_id, .. }
            | ResponseMessage::BpmnError { task_id, .. } => task_id,
        }
    }

    pub fn worker_id(&self) -> &str {
        match self {
            ResponseMessage::Complete { worker_id, .. }
            | ResponseMessage::Failure { worker_id, .. }
            | ResponseMessage::BpmnError { worker_id, .. } => worker_id,
        }
    }
}

/// Processing status recorded in a [`SentMirror`]. Only `Success` makes
/// the Reconciliation Tracker attempt an engine completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Success,
    Failed,
    Skipped,
}

/// A durable, out-of-band record of "the handler said done", mirrored
/// by every handler into a per-source sent queue (§3.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentMirror {
    pub timestamp: i64,
    pub processed_at: i64,
    pub original_queue: String,
    pub original_message: WorkItem,
    pub response_data: serde_json::Value,
    pub processing_status: ProcessingStatus,
}

/// Engine-side lock state as observed by the Recovery Utility (§3.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockRecord {
    pub task_id: String,
    pub worker_id: String,
    pub topic: String,
    pub lock_expiration_time: Option<String>,
    pub process_instance_id: String,
    pub activity_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_message_round_trips_through_json() {
        let msg = ResponseMessage::Failure {
            task_id: "T1".into(),
            worker_id: "worker-1".into(),
            error_message: "downstream timeout".into(),
            error_details: None,
            retries: 2,
            retry_timeout: 5000,
        };
        let encoded = serde_json::to_string(&msg).unwrap();
        let decoded: ResponseMessage = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.task_id(), "T1");
    }

    #[test]
    fn empty_activity_metadata_detected() {
        assert!(ActivityMetadata::default().is_empty());
    }
}
