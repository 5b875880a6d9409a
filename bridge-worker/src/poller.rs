//! Poller: one long-lived loop per topic, fetching and locking engine
//! tasks, enriching with BPMN metadata, and publishing to the routed
//! system queue (§4.4).

use crate::app::Application;
use bridge_engine_client::{FetchAndLockRequest, TopicSubscription};
use bridge_shared::models::{ActivityInfo, WorkItem};
use bridge_shared::routing::MAIN_EXCHANGE;
use std::collections::HashMap;
use std::time::Duration;

const MAX_CONSECUTIVE_ERRORS: u32 = 5;

/// Runs the fetch/enrich/publish loop for a single `topic` until the
/// shared shutdown signal fires or the loop gives up after five
/// consecutive errors.
pub async fn run_topic_loop(app: &Application, topic: &str) {
    let mut consecutive_errors: u32 = 0;

    loop {
        if app.shutdown.is_cancelled() {
            tracing::info!(topic, "poller loop shutting down");
            return;
        }

        match poll_once(app, topic).await {
            Ok(fetched) => {
                consecutive_errors = 0;
                let sleep_for = if fetched == 0 {
                    Duration::from_secs(app.config.worker.sleep_seconds)
                } else {
                    Duration::from_secs(1)
                };
                tokio::select! {
                    _ = tokio::time::sleep(sleep_for) => {}
                    _ = app.shutdown.cancelled() => return,
                }
            }
            Err(e) => {
                consecutive_errors += 1;
                tracing::error!(topic, error = %e, consecutive_errors, "poll iteration failed");
                if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                    tracing::error!(topic, "poller thread terminating after repeated errors");
                    return;
                }
                let backoff = Duration::from_secs(std::cmp::min(30, 5 * consecutive_errors as u64));
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    _ = app.shutdown.cancelled() => return,
                }
            }
        }
    }
}

async fn poll_once(app: &Application, topic: &str) -> bridge_shared::error::Result<usize> {
    let request = FetchAndLockRequest {
        worker_id: app.config.engine.worker_id.clone(),
        max_tasks: app.config.worker.max_tasks,
        async_response_timeout: Some(app.config.worker.async_response_timeout_ms),
        topics: vec![TopicSubscription {
            topic_name: topic.to_string(),
            lock_duration: app.config.worker.lock_duration_ms,
            variables: None,
        }],
    };

    let tasks = app
        .engine
        .fetch_and_lock(&request)
        .await
        .map_err(|e| bridge_shared::error::BridgeError::validation(e.to_string()))?;

    for task in &tasks {
        if let Err(e) = publish_task(app, topic, task).await {
            tracing::warn!(task_id = %task.id, error = %e, "publish failed, failing task back to engine");
            let configured_retries = task.retries.unwrap_or(1);
            let retries = std::cmp::max(0, configured_retries - 1);
            let _ = app
                .engine
                .failure(
                    &task.id,
                    &format!("publish failed: {e}"),
                    None,
                    retries,
                    app.config.worker.fetch_interval_ms as i64,
                )
                .await;
        }
    }

    Ok(tasks.len())
}

async fn publish_task(
    app: &Application,
    topic: &str,
    task: &bridge_engine_client::ExternalTask,
) -> bridge_shared::error::Result<()> {
    let system = app
        .routing
        .system_for_topic(topic)
        .unwrap_or("default")
        .to_string();

    let metadata = app
        .metadata_cache
        .get_activity_metadata(&task.process_definition_id, &task.activity_id)
        .await
        .unwrap_or_default();

    let item = WorkItem {
        task_id: task.id.clone(),
        topic: topic.to_string(),
        system: system.clone(),
        process_instance_id: task.process_instance_id.clone(),
        process_definition_id: task.process_definition_id.clone(),
        process_definition_key: task.process_definition_key.clone(),
        activity_id: task.activity_id.clone(),
        activity_instance_id: task.activity_instance_id.clone(),
        business_key: task.business_key.clone(),
        tenant_id: task.tenant_id.clone(),
        worker_id: app.config.engine.worker_id.clone(),
        retries: task.retries,
        priority: task.priority.unwrap_or(0),
        created_time: None,
        timestamp: now_millis(),
        variables: task.variables.clone(),
        metadata,
    };

    let routing_key = app.routing.routing_key_for_topic(topic);
    let body = serde_json::to_vec(&item)?;

    let mut headers = HashMap::new();
    headers.insert("camunda_topic".to_string(), topic.to_string());
    headers.insert("target_system".to_string(), system);
    headers.insert("task_id".to_string(), item.task_id.clone());
    headers.insert(
        "process_instance_id".to_string(),
        item.process_instance_id.clone(),
    );

    app.broker.publish(MAIN_EXCHANGE, &routing_key, &body, headers).await
}

fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activity_info_survives_through_metadata() {
        let info = ActivityInfo {
            id: "A1".into(),
            name: Some("Create ticket".into()),
            activity_type: "serviceTask".into(),
            topic: Some("bitrix24".into()),
        };
        assert_eq!(info.id, "A1");
    }
}
