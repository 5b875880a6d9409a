//! Broker adapter: a thin, circuit-breaker-guarded facade over `lapin`
//! that declares the topology (§4.1) and exposes publish/consume/queue
//! inspection (§4.2). Mirrors the facade-plus-breaker shape this stack
//! uses for its other external-service clients.

use crate::error::{BridgeError, Result};
use crate::resilience::{CircuitBreaker, CircuitBreakerBehavior, CircuitBreakerConfig};
use crate::routing::{
    RoutingTable, ALTERNATE_EXCHANGE, DEFAULT_QUEUE, ERROR_QUEUE, ERROR_ROUTING_KEY,
    MAIN_EXCHANGE, RESPONSE_EXCHANGE, RESPONSE_QUEUE, SENT_EXCHANGE,
};
use lapin::message::BasicGetMessage;
use lapin::options::{
    BasicConsumeOptions, BasicGetOptions, BasicPublishOptions, ExchangeDeclareOptions,
    QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, Consumer, ExchangeKind};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, Default)]
pub struct QueueInfo {
    pub message_count: u32,
    pub consumer_count: u32,
}

/// Owns the AMQP connection/channel and the circuit breaker guarding
/// publish operations. One instance is shared (behind an `Arc`) across
/// the Poller's per-topic loops, the Consumer Framework, and the
/// Reconciliation Tracker.
#[derive(Debug)]
pub struct BrokerAdapter {
    uri: String,
    connection: tokio::sync::RwLock<Option<Connection>>,
    channel: tokio::sync::RwLock<Option<Channel>>,
    breaker: Arc<CircuitBreaker>,
}

impl BrokerAdapter {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            connection: tokio::sync::RwLock::new(None),
            channel: tokio::sync::RwLock::new(None),
            breaker: Arc::new(CircuitBreaker::new("broker", CircuitBreakerConfig::default())),
        }
    }

    pub fn breaker(&self) -> Arc<CircuitBreaker> {
        Arc::clone(&self.breaker)
    }

    pub async fn is_connected(&self) -> bool {
        match self.channel.read().await.as_ref() {
            Some(channel) => channel.status().connected(),
            None => false,
        }
    }

    pub async fn connect(&self) -> Result<()> {
        let conn = Connection::connect(&self.uri, ConnectionProperties::default()).await?;
        let channel = conn.create_channel().await?;
        *self.connection.write().await = Some(conn);
        *self.channel.write().await = Some(channel);
        Ok(())
    }

    async fn channel(&self) -> Result<Channel> {
        if let Some(channel) = self.channel.read().await.as_ref() {
            if channel.status().connected() {
                return Ok(channel.clone());
            }
        }
        self.connect().await?;
        self.channel
            .read()
            .await
            .as_ref()
            .cloned()
            .ok_or_else(|| BridgeError::validation("broker channel unavailable after reconnect"))
    }

    /// Declares the full topology in the restart-safe order from §4.1:
    /// alternate exchange, main exchange (bound to it), response
    /// exchange + queue, every system queue + binding, the default
    /// queue, the error queue, and the sent exchange + mirror queues.
    pub async fn declare_topology(&self, routes: &RoutingTable) -> Result<()> {
        let channel = self.channel().await?;

        channel
            .exchange_declare(
                ALTERNATE_EXCHANGE,
                ExchangeKind::Fanout,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        let mut main_args = FieldTable::default();
        main_args.insert(
            "alternate-exchange".into(),
            AMQPValue::LongString(ALTERNATE_EXCHANGE.into()),
        );
        channel
            .exchange_declare(
                MAIN_EXCHANGE,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                main_args,
            )
            .await?;

        channel
            .exchange_declare(
                RESPONSE_EXCHANGE,
                ExchangeKind::Direct,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        self.declare_queue(&channel, RESPONSE_QUEUE).await?;
        channel
            .queue_bind(
                RESPONSE_QUEUE,
                RESPONSE_EXCHANGE,
                RESPONSE_QUEUE,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;

        for queue in routes.all_system_queues() {
            self.declare_queue(&channel, queue).await?;
        }
        for (queue, routing_key) in routes.bindings() {
            channel
                .queue_bind(
                    queue,
                    MAIN_EXCHANGE,
                    &routing_key,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await?;
        }

        self.declare_queue(&channel, DEFAULT_QUEUE).await?;
        channel
            .queue_bind(
                DEFAULT_QUEUE,
                ALTERNATE_EXCHANGE,
                "",
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;

        self.declare_queue(&channel, ERROR_QUEUE).await?;
        channel
            .queue_bind(
                ERROR_QUEUE,
                MAIN_EXCHANGE,
                ERROR_ROUTING_KEY,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;

        channel
            .exchange_declare(
                SENT_EXCHANGE,
                ExchangeKind::Direct,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        for sent_queue in routes.all_sent_queues() {
            self.declare_queue(&channel, sent_queue).await?;
            channel
                .queue_bind(
                    sent_queue,
                    SENT_EXCHANGE,
                    sent_queue,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await?;
        }

        Ok(())
    }

    async fn declare_queue(&self, channel: &Channel, name: &str) -> Result<()> {
        channel
            .queue_declare(
                name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        Ok(())
    }

    /// Publishes a durable message. On a transient transport error the
    /// adapter reconnects once and retries exactly once (§4.2); beyond
    /// that the failure is propagated and recorded on the breaker.
    pub async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        headers: HashMap<String, String>,
    ) -> Result<()> {
        if !self.breaker.should_allow() {
            return Err(BridgeError::validation(format!(
                "broker circuit open, refusing publish to {exchange}/{routing_key}"
            )));
        }

        let started = Instant::now();
        let result = self.publish_once(exchange, routing_key, body, &headers).await;

        let result = match result {
            Ok(()) => Ok(()),
            Err(_) => {
                if self.connect().await.is_ok() {
                    self.publish_once(exchange, routing_key, body, &headers).await
                } else {
                    result
                }
            }
        };

        match &result {
            Ok(()) => self.breaker.record_success(started.elapsed()),
            Err(_) => self.breaker.record_failure(started.elapsed()),
        }
        result
    }

    async fn publish_once(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        headers: &HashMap<String, String>,
    ) -> Result<()> {
        let channel = self.channel().await?;
        let mut amqp_headers = FieldTable::default();
        for (k, v) in headers {
            amqp_headers.insert(k.as_str().into(), AMQPValue::LongString(v.as_str().into()));
        }
        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(2)
            .with_headers(amqp_headers);

        channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                body,
                properties,
            )
            .await?
            .await?;
        Ok(())
    }

    /// Registers a manual-ack consumer at prefetch=1 (§4.2 invariant).
    pub async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<Consumer> {
        let channel = self.channel().await?;
        channel
            .basic_qos(1, lapin::options::BasicQosOptions::default())
            .await?;
        let consumer = channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;
        Ok(consumer)
    }

    /// Pulls a single message without a standing consumer, used by the
    /// pull-mode Response Loop and by the Recovery Utility's queue
    /// peeks. Returns `None` when the queue is empty.
    pub async fn basic_get(&self, queue: &str) -> Result<Option<BasicGetMessage>> {
        let channel = self.channel().await?;
        Ok(channel.basic_get(queue, BasicGetOptions::default()).await?)
    }

    pub async fn queue_info(&self, queue: &str) -> Result<QueueInfo> {
        let channel = self.channel().await?;
        let declared = channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    passive: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        Ok(QueueInfo {
            message_count: declared.message_count(),
            consumer_count: declared.consumer_count(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_info_defaults_to_zero() {
        let info = QueueInfo::default();
        assert_eq!(info.message_count, 0);
        assert_eq!(info.consumer_count, 0);
    }
}
