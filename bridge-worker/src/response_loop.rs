//! Response Loop: finalizes engine tasks from the response queue,
//! either as a long-lived consumer ("push") or a periodic drain
//! ("pull", up to 10 messages per pass) (§4.7).

use crate::app::Application;
use bridge_engine_client::EngineClientError;
use bridge_shared::config::ResponseHandlerMode;
use bridge_shared::models::ResponseMessage;
use bridge_shared::routing::RESPONSE_QUEUE;
use futures::StreamExt;
use lapin::options::{BasicAckOptions, BasicNackOptions};
use std::time::Duration;

const PULL_BATCH_SIZE: usize = 10;

pub async fn run(app: &Application) {
    match app.config.worker.response_handler_mode {
        ResponseHandlerMode::Push => run_push(app).await,
        ResponseHandlerMode::Pull => run_pull(app).await,
    }
}

async fn run_push(app: &Application) {
    loop {
        if app.shutdown.is_cancelled() {
            return;
        }
        let consumer = match app.broker.consume(RESPONSE_QUEUE, "bridge-worker.responses").await {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "response loop failed to start consumer");
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(5)) => {}
                    _ = app.shutdown.cancelled() => return,
                }
                continue;
            }
        };

        let mut consumer = consumer;
        loop {
            tokio::select! {
                _ = app.shutdown.cancelled() => return,
                next = consumer.next() => {
                    let Some(Ok(delivery)) = next else { break };
                    let ack = process_response_bytes(app, &delivery.data).await;
                    if ack {
                        let _ = delivery.ack(BasicAckOptions::default()).await;
                    } else {
                        let _ = delivery.nack(BasicNackOptions { requeue: true, ..Default::default() }).await;
                    }
                }
            }
        }
    }
}

async fn run_pull(app: &Application) {
    loop {
        if app.shutdown.is_cancelled() {
            return;
        }
        if let Err(e) = drain_once(app).await {
            tracing::error!(error = %e, "pull-mode response drain failed");
        }
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(app.config.worker.heartbeat_interval_seconds)) => {}
            _ = app.shutdown.cancelled() => return,
        }
    }
}

async fn drain_once(app: &Application) -> bridge_shared::error::Result<()> {
    for _ in 0..PULL_BATCH_SIZE {
        let Some(message) = app.broker.basic_get(RESPONSE_QUEUE).await? else {
            break;
        };
        let ack = process_response_bytes(app, &message.data).await;
        if ack {
            let _ = message.ack(BasicAckOptions::default()).await;
        } else {
            let _ = message
                .nack(BasicNackOptions {
                    requeue: true,
                    ..Default::default()
                })
                .await;
        }
    }
    Ok(())
}

/// Validates and dispatches one response message; returns `true` when
/// the delivery should be acked.
async fn process_response_bytes(app: &Application, data: &[u8]) -> bool {
    let message: ResponseMessage = match serde_json::from_slice(data) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(error = %e, "malformed response message, dropping");
            return true; // nack-without-requeue would be correct; ack avoids poison-message loops
        }
    };

    if message.worker_id() != app.config.engine.worker_id {
        tracing::warn!(
            task_id = message.task_id(),
            expected = %app.config.engine.worker_id,
            got = message.worker_id(),
            "response message worker id mismatch, skipping"
        );
        return true;
    }

    let result = match &message {
        ResponseMessage::Complete {
            task_id,
            variables,
            local_variables,
            ..
        } => app.engine.complete(task_id, variables.clone(), local_variables.clone()).await,
        ResponseMessage::Failure {
            task_id,
            error_message,
            error_details,
            retries,
            retry_timeout,
            ..
        } => {
            app.engine
                .failure(task_id, error_message, error_details.as_deref(), *retries, *retry_timeout)
                .await
        }
        ResponseMessage::BpmnError {
            task_id,
            error_code,
            error_message,
            variables,
            ..
        } => app.engine.bpmn_error(task_id, error_code, error_message, variables.clone()).await,
    };

    match result {
        Ok(()) => true,
        Err(e) if matches!(e, EngineClientError::TaskNotFound { .. }) => {
            tracing::debug!(task_id = message.task_id(), "task already closed, treating as success");
            true
        }
        Err(e) => {
            tracing::warn!(task_id = message.task_id(), error = %e, "engine call failed, requeueing");
            false
        }
    }
}
