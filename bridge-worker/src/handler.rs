//! Handler Contract (§4.6): every concrete handler implements
//! [`MessageHandler`]; the base [`Publisher`] mirrors outcomes to the
//! sent queue with bounded retries, and [`StubHandler`] synthesizes a
//! mock outcome for systems not yet implemented.

use async_trait::async_trait;
use bridge_shared::broker::BrokerAdapter;
use bridge_shared::models::{ProcessingStatus, SentMirror, WorkItem};
use bridge_shared::routing::SENT_EXCHANGE;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Exponential backoff schedule for mirror-publish retries: 1, 2, 4, 8,
/// 16 seconds, five attempts total.
const RETRY_DELAYS_SECS: [u64; 5] = [1, 2, 4, 8, 16];

#[derive(Debug, Default, Clone)]
pub struct HandlerStats {
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub mirror_failures: u64,
}

/// The per-queue contract the Consumer Framework dispatches against.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Runs the downstream action for `item` and returns a JSON payload
    /// describing the outcome. Returning `Err` means the delivery
    /// should be nacked with requeue.
    async fn handle(&self, item: &WorkItem) -> Result<Value, String>;

    fn original_queue_name(&self) -> &str;

    fn sent_queue_name(&self) -> &str;
}

/// Wraps a [`MessageHandler`] with the mirror-publish behavior every
/// concrete handler gets for free (§4.6 base behavior).
pub struct Publisher {
    handler: Arc<dyn MessageHandler>,
    broker: Arc<BrokerAdapter>,
    processed: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    mirror_failures: AtomicU64,
}

impl Publisher {
    pub fn new(handler: Arc<dyn MessageHandler>, broker: Arc<BrokerAdapter>) -> Self {
        Self {
            handler,
            broker,
            processed: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            mirror_failures: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> HandlerStats {
        HandlerStats {
            processed: self.processed.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            mirror_failures: self.mirror_failures.load(Ordering::Relaxed),
        }
    }

    pub fn original_queue_name(&self) -> &str {
        self.handler.original_queue_name()
    }

    /// Runs the handler, then mirrors the outcome. Returns `true` when
    /// the Consumer Framework should ack the delivery.
    pub async fn process_message(&self, item: &WorkItem) -> bool {
        self.processed.fetch_add(1, Ordering::Relaxed);
        let now = now_millis();

        match self.handler.handle(item).await {
            Ok(response_data) => {
                self.succeeded.fetch_add(1, Ordering::Relaxed);
                let mirror = SentMirror {
                    timestamp: item.timestamp,
                    processed_at: now,
                    original_queue: self.handler.original_queue_name().to_string(),
                    original_message: item.clone(),
                    response_data,
                    processing_status: ProcessingStatus::Success,
                };
                if !self.publish_mirror_with_retry(&mirror).await {
                    self.mirror_failures.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(task_id = %item.task_id, "mirror publish exhausted retries");
                }
                true
            }
            Err(reason) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(task_id = %item.task_id, %reason, "handler failed");
                false
            }
        }
    }

    async fn publish_mirror_with_retry(&self, mirror: &SentMirror) -> bool {
        let body = match serde_json::to_vec(mirror) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize sent mirror");
                return false;
            }
        };

        let attempts = RETRY_DELAYS_SECS.len();
        for (attempt, delay_secs) in RETRY_DELAYS_SECS.iter().enumerate() {
            let result = self
                .broker
                .publish(SENT_EXCHANGE, self.handler.sent_queue_name(), &body, HashMap::new())
                .await;
            if result.is_ok() {
                return true;
            }
            if attempt + 1 == attempts {
                break;
            }
            tracing::warn!(attempt = attempt + 1, "sent-mirror publish failed, retrying");
            tokio::time::sleep(Duration::from_secs(*delay_secs)).await;
        }
        false
    }
}

/// Synthesizes a mock response for systems without a real
/// implementation yet, so reconciliation traffic keeps flowing (§4.6).
pub struct StubHandler {
    queue: String,
    sent_queue: String,
}

impl StubHandler {
    pub fn new(queue: impl Into<String>, sent_queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            sent_queue: sent_queue.into(),
        }
    }
}

#[async_trait]
impl MessageHandler for StubHandler {
    async fn handle(&self, item: &WorkItem) -> Result<Value, String> {
        Ok(serde_json::json!({
            "stub": true,
            "taskId": item.task_id,
            "system": item.system,
        }))
    }

    fn original_queue_name(&self) -> &str {
        &self.queue
    }

    fn sent_queue_name(&self) -> &str {
        &self.sent_queue
    }
}

/// Compile-time registry mapping a queue name to its [`Publisher`],
/// replacing the dynamic import-by-string dispatch the reference
/// implementation used (§9 Design Notes, "Dynamic dispatch").
#[derive(Default)]
pub struct HandlerRegistry {
    by_queue: HashMap<String, Arc<Publisher>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, queue: impl Into<String>, publisher: Arc<Publisher>) {
        self.by_queue.insert(queue.into(), publisher);
    }

    pub fn get(&self, queue: &str) -> Option<Arc<Publisher>> {
        self.by_queue.get(queue).cloned()
    }

    pub fn queues(&self) -> Vec<String> {
        self.by_queue.keys().cloned().collect()
    }
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

    fn sample_item() -> WorkItem {
        WorkItem {
            task_id: "T1".into(),
            topic: "bitrix24".into(),
            system: "bitrix24".into(),
            process_instance_id: "P1".into(),
            process_definition_id: "D1".into(),
            process_definition_key: None,
            activity_id: "A1".into(),
            activity_instance_id: None,
            business_key: None,
            tenant_id: None,
            worker_id: "worker-1".into(),
            retries: Some(3),
            priority: 0,
            created_time: None,
            timestamp: 0,
            variables: Default::default(),
            metadata: Default::default(),
        }
    }

    #[tokio::test]
    async fn stub_handler_reports_success_shape() {
        let handler = StubHandler::new("bitrix24.queue", "bitrix24.sent.queue");
        let result = handler.handle(&sample_item()).await.unwrap();
        assert_eq!(result["taskId"], "T1");
    }

    #[test]
    fn registry_round_trips_by_queue() {
        let mut registry = HandlerRegistry::new();
        let handler: Arc<dyn MessageHandler> = Arc::new(StubHandler::new("q", "q.sent"));
        let publisher = Arc::new(Publisher::new(handler, Arc::new(BrokerAdapter::new("amqp://localhost"))));
        registry.register("q", Arc::clone(&publisher));
        assert!(registry.get("q").is_some());
        assert!(registry.get("missing").is_none());
    }
}
