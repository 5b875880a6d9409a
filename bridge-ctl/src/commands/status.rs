//! `bridge-ctl status`: engine and broker reachability, per-queue
//! depths, and a routing-table summary.

use crate::output;
use bridge_engine_client::EngineClient;
use bridge_shared::broker::BrokerAdapter;
use bridge_shared::config::AppConfig;
use bridge_shared::error::{BridgeError, Result};
use bridge_shared::routing::{DEFAULT_QUEUE, ERROR_QUEUE, RESPONSE_QUEUE};

pub(crate) async fn run(routing_table_override: Option<&str>) -> Result<()> {
    let config = AppConfig::load()?;
    let routing = super::load_routing(&config, routing_table_override)?;

    output::header("taskbridge status");
    output::blank();

    output::dim("Checking engine...");
    let engine = EngineClient::new(
        config.engine.base_url.clone(),
        config.engine.worker_id.clone(),
        config.engine.basic_auth_user.clone().zip(config.engine.basic_auth_password.clone()),
        config.engine.request_timeout(),
    )
    .map_err(|e| BridgeError::validation(e.to_string()))?;
    match engine.list_locked_tasks(None).await {
        Ok(tasks) => output::status_icon(true, format!("engine reachable at {} ({} locked tasks)", config.engine.base_url, tasks.len())),
        Err(e) => output::status_icon(false, format!("engine unreachable at {}: {e}", config.engine.base_url)),
    }

    output::blank();
    output::dim("Checking broker...");
    let broker = BrokerAdapter::new(config.broker.amqp_uri.clone());
    match broker.connect().await {
        Ok(()) => {
            output::status_icon(true, format!("broker reachable at {}", config.broker.amqp_uri));
            output::blank();
            output::header("Queue depths:");
            print_queue_depth(&broker, RESPONSE_QUEUE).await;
            print_queue_depth(&broker, DEFAULT_QUEUE).await;
            print_queue_depth(&broker, ERROR_QUEUE).await;
            for queue in routing.all_system_queues() {
                print_queue_depth(&broker, queue).await;
            }
            for queue in routing.all_sent_queues() {
                print_queue_depth(&broker, queue).await;
            }
        }
        Err(e) => output::status_icon(false, format!("broker unreachable at {}: {e}", config.broker.amqp_uri)),
    }

    output::blank();
    output::header("Routing table:");
    for (topic, system) in &routing.topic_to_system {
        if let Some(route) = routing.route_for_system(system) {
            output::item(format!("{topic} -> {system} ({}, mirrored to {})", route.queue, route.sent_queue));
        }
    }

    Ok(())
}

async fn print_queue_depth(broker: &BrokerAdapter, queue: &str) {
    match broker.queue_info(queue).await {
        Ok(info) => output::label(format!("  {queue}"), format!("{} messages, {} consumers", info.message_count, info.consumer_count)),
        Err(e) => output::status_icon(false, format!("{queue}: {e}")),
    }
}
