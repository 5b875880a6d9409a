//! Steady-state entry point: boots the `Application`, spawns one Poller
//! loop per configured topic, one Consumer per system queue, one
//! Reconciliation Tracker per sent-mirror queue, and the Response Loop,
//! then waits for SIGINT/SIGTERM to trigger a graceful shutdown (§5).

use bridge_engine_client::EngineClient;
use bridge_shared::broker::BrokerAdapter;
use bridge_shared::config::AppConfig;
use bridge_shared::routing::RoutingTable;
use bridge_worker::handler::{HandlerRegistry, Publisher, StubHandler};
use bridge_worker::{app::Application, consumer, poller, response_loop, tracker};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let config = AppConfig::load()?;
    let routing = match &config.routing_table_path {
        Some(path) => RoutingTable::from_toml(&std::fs::read_to_string(path)?)?,
        None => RoutingTable::default(),
    };

    let broker = Arc::new(BrokerAdapter::new(config.broker.amqp_uri.clone()));
    let engine = EngineClient::new(
        config.engine.base_url.clone(),
        config.engine.worker_id.clone(),
        config
            .engine
            .basic_auth_user
            .clone()
            .zip(config.engine.basic_auth_password.clone()),
        config.engine.request_timeout(),
    )?;

    let mut handlers = HandlerRegistry::new();
    for route in routing.systems.values() {
        let stub = Arc::new(StubHandler::new(route.queue.clone(), route.sent_queue.clone()));
        let publisher = Arc::new(Publisher::new(stub, Arc::clone(&broker)));
        handlers.register(route.queue.clone(), publisher);
    }

    let app = Application::new(config, routing, broker, engine, handlers);
    app.bootstrap().await?;

    let mut tasks = tokio::task::JoinSet::new();

    for topic in app.config.worker.topics.clone() {
        let app = clone_refs(&app);
        tasks.spawn(async move { poller::run_topic_loop(&app, &topic).await });
    }

    for queue in app.routing.all_system_queues().into_iter().map(str::to_string) {
        let app = clone_refs(&app);
        tasks.spawn(async move { consumer::run_queue_consumer(&app, &queue).await });
    }

    for sent_queue in app.routing.all_sent_queues().into_iter().map(str::to_string) {
        let app = clone_refs(&app);
        tasks.spawn(async move { tracker::run_tracker(&app, &sent_queue).await });
    }

    {
        let app = clone_refs(&app);
        tasks.spawn(async move { response_loop::run(&app).await });
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }
    app.request_shutdown();

    while tasks.join_next().await.is_some() {}

    Ok(())
}

/// `Application`'s fields are all `Arc`s already; this clones the
/// handful of reference-counted handles each loop needs rather than
/// sharing `&Application` across spawned tasks with distinct lifetimes.
fn clone_refs(app: &Application) -> Application {
    Application {
        config: Arc::clone(&app.config),
        routing: Arc::clone(&app.routing),
        broker: Arc::clone(&app.broker),
        engine: Arc::clone(&app.engine),
        metadata_cache: Arc::clone(&app.metadata_cache),
        handlers: Arc::clone(&app.handlers),
        shutdown: app.shutdown.clone(),
    }
}
