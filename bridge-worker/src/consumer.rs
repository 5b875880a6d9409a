//! Consumer Framework: one consumer per system queue, prefetch=1,
//! manual ack, per-handler rolling-average stats, reconnect-with-backoff
//! on disconnect (§4.5).

use crate::app::Application;
use bridge_shared::models::WorkItem;
use futures::StreamExt;
use lapin::options::{BasicAckOptions, BasicNackOptions};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub struct QueueStats {
    pub delivered: AtomicU64,
    pub malformed: AtomicU64,
    pub acked: AtomicU64,
    pub nacked: AtomicU64,
    pub total_processing_micros: AtomicU64,
}

impl QueueStats {
    pub fn rolling_average_processing_time(&self) -> Duration {
        let acked = self.acked.load(Ordering::Relaxed).max(1);
        Duration::from_micros(self.total_processing_micros.load(Ordering::Relaxed) / acked)
    }
}

/// Consumes `queue` until the shared shutdown signal fires, dispatching
/// each delivery to the [`Publisher`](crate::handler::Publisher)
/// registered for it.
pub async fn run_queue_consumer(app: &Application, queue: &str) {
    let stats = QueueStats::default();
    let mut backoff = Duration::from_secs(1);

    loop {
        if app.shutdown.is_cancelled() {
            return;
        }

        let consumer = match app.broker.consume(queue, &format!("bridge-worker.{queue}")).await {
            Ok(consumer) => consumer,
            Err(e) => {
                tracing::error!(queue, error = %e, "failed to start consumer, backing off");
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    _ = app.shutdown.cancelled() => return,
                }
                backoff = std::cmp::min(backoff * 2, Duration::from_secs(30));
                continue;
            }
        };
        backoff = Duration::from_secs(1);

        let mut consumer = consumer;
        loop {
            tokio::select! {
                _ = app.shutdown.cancelled() => return,
                next = consumer.next() => {
                    let Some(delivery) = next else {
                        tracing::warn!(queue, "consumer stream ended, reconnecting");
                        break;
                    };
                    let Ok(delivery) = delivery else {
                        tracing::warn!(queue, "delivery error, reconnecting");
                        break;
                    };

                    stats.delivered.fetch_add(1, Ordering::Relaxed);
                    let started = Instant::now();

                    let item: Result<WorkItem, _> = serde_json::from_slice(&delivery.data);
                    let item = match item {
                        Ok(item) => item,
                        Err(e) => {
                            stats.malformed.fetch_add(1, Ordering::Relaxed);
                            tracing::warn!(queue, error = %e, "malformed delivery, dropping");
                            let _ = delivery
                                .nack(BasicNackOptions {
                                    requeue: false,
                                    ..Default::default()
                                })
                                .await;
                            continue;
                        }
                    };

                    let publisher = app.handlers.get(queue);
                    let ack = match publisher {
                        Some(publisher) => publisher.process_message(&item).await,
                        None => {
                            tracing::warn!(queue, task_id = %item.task_id, "no handler registered for queue, routing to error queue");
                            let _ = app
                                .broker
                                .publish(
                                    bridge_shared::routing::MAIN_EXCHANGE,
                                    bridge_shared::routing::ERROR_ROUTING_KEY,
                                    &delivery.data,
                                    Default::default(),
                                )
                                .await;
                            true
                        }
                    };

                    stats
                        .total_processing_micros
                        .fetch_add(started.elapsed().as_micros() as u64, Ordering::Relaxed);

                    if ack {
                        stats.acked.fetch_add(1, Ordering::Relaxed);
                        let _ = delivery.ack(BasicAckOptions::default()).await;
                    } else {
                        stats.nacked.fetch_add(1, Ordering::Relaxed);
                        let _ = delivery
                            .nack(BasicNackOptions {
                                requeue: true,
                                ..Default::default()
                            })
                            .await;
                    }
                }
            }
        }
    }
}
