//! Reconciliation Tracker: one loop per sent-mirror queue, closing
//! engine tasks whose primary response-queue completion was lost
//! (§4.8).

use crate::app::Application;
use bridge_shared::codec::encode_variables;
use bridge_shared::models::{ProcessingStatus, ResponseMessage, SentMirror};
use bridge_shared::routing::RESPONSE_EXCHANGE;
use lapin::options::{BasicAckOptions, BasicNackOptions};
use std::collections::HashMap;
use std::time::Duration;

const DISCONNECT_BACKOFF: Duration = Duration::from_secs(30);

pub async fn run_tracker(app: &Application, sent_queue: &str) {
    loop {
        if app.shutdown.is_cancelled() {
            return;
        }

        match run_cycle(app, sent_queue).await {
            Ok(()) => {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(app.config.worker.heartbeat_interval_seconds)) => {}
                    _ = app.shutdown.cancelled() => return,
                }
            }
            Err(e) => {
                tracing::warn!(sent_queue, error = %e, "reconciliation cycle failed, backing off");
                tokio::select! {
                    _ = tokio::time::sleep(DISCONNECT_BACKOFF) => {}
                    _ = app.shutdown.cancelled() => return,
                }
            }
        }
    }
}

async fn run_cycle(app: &Application, sent_queue: &str) -> bridge_shared::error::Result<()> {
    loop {
        let Some(message) = app.broker.basic_get(sent_queue).await? else {
            return Ok(());
        };

        let mirror: Result<SentMirror, _> = serde_json::from_slice(&message.data);
        let mirror = match mirror {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(sent_queue, error = %e, "malformed sent-mirror message, dropping");
                let _ = message.ack(BasicAckOptions::default()).await;
                continue;
            }
        };

        if mirror.processing_status != ProcessingStatus::Success {
            let _ = message.ack(BasicAckOptions::default()).await;
            continue;
        }

        let task_id = mirror.original_message.task_id.clone();
        let still_locked = match app.engine.task_status(&task_id).await {
            Ok(Some(task)) => task.lock_expiration_time.is_some(),
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(task_id, error = %e, "reconciliation task-status check failed, requeueing");
                let _ = message
                    .nack(BasicNackOptions {
                        requeue: true,
                        ..Default::default()
                    })
                    .await;
                continue;
            }
        };

        if still_locked {
            let mut recovered = HashMap::new();
            recovered.insert(
                "processingStatus".to_string(),
                serde_json::to_value(mirror.processing_status).unwrap_or(serde_json::Value::Null),
            );
            recovered.insert("processedAt".to_string(), serde_json::Value::from(mirror.processed_at));
            recovered.insert("task_result".to_string(), mirror.response_data.clone());

            let response = ResponseMessage::Complete {
                task_id: task_id.clone(),
                worker_id: app.config.engine.worker_id.clone(),
                variables: encode_variables(&recovered),
                local_variables: Default::default(),
            };
            let body = serde_json::to_vec(&response)?;
            app.broker
                .publish(
                    RESPONSE_EXCHANGE,
                    bridge_shared::routing::RESPONSE_QUEUE,
                    &body,
                    Default::default(),
                )
                .await?;
            tracing::info!(task_id, "reconciliation tracker completed orphaned task");
        }

        let _ = message.ack(BasicAckOptions::default()).await;
    }
}
