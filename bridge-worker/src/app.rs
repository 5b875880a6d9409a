//! `Application` owns every long-lived resource (config, broker
//! adapter, metadata cache, engine client, handler registry) so the
//! rest of the crate takes references instead of reaching into global
//! state (§9 Design Notes, "Global mutable state").

use crate::handler::HandlerRegistry;
use bridge_engine_client::EngineClient;
use bridge_shared::broker::BrokerAdapter;
use bridge_shared::config::AppConfig;
use bridge_shared::error::{BridgeError, Result};
use bridge_shared::metadata_cache::MetadataCache;
use bridge_shared::routing::RoutingTable;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::watch;

type XmlFetch = Box<dyn Fn(String) -> Pin<Box<dyn Future<Output = Result<String>> + Send>> + Send + Sync>;

/// A cloneable, cancel-once signal shared by every long-lived loop
/// (Poller, Consumer Framework, trackers, Response Loop).
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx: Arc::new(tx), rx }
    }

    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once `cancel()` has been called; used in `tokio::select!`
    /// alongside sleeps and broker reads so loops exit promptly.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Application {
    pub config: Arc<AppConfig>,
    pub routing: Arc<RoutingTable>,
    pub broker: Arc<BrokerAdapter>,
    pub engine: Arc<EngineClient>,
    pub metadata_cache: Arc<MetadataCache<XmlFetch>>,
    pub handlers: Arc<HandlerRegistry>,
    pub shutdown: ShutdownSignal,
}

impl Application {
    pub fn new(
        config: AppConfig,
        routing: RoutingTable,
        broker: Arc<BrokerAdapter>,
        engine: EngineClient,
        handlers: HandlerRegistry,
    ) -> Self {
        let cache_ttl = config.cache.ttl();
        let cache_capacity = config.cache.max_entries;
        let engine_for_cache = Arc::new(engine);
        let fetch_engine = Arc::clone(&engine_for_cache);
        let fetch_xml: XmlFetch = Box::new(move |process_definition_id: String| {
            let engine = Arc::clone(&fetch_engine);
            Box::pin(async move {
                let xml = engine
                    .process_definition_xml(&process_definition_id)
                    .await
                    .map_err(|e| BridgeError::validation(e.to_string()))?;
                Ok(xml.bpmn20_xml)
            })
        });

        Self {
            config: Arc::new(config),
            routing: Arc::new(routing),
            broker,
            engine: engine_for_cache,
            metadata_cache: Arc::new(MetadataCache::new(cache_capacity, cache_ttl, fetch_xml)),
            handlers: Arc::new(handlers),
            shutdown: ShutdownSignal::new(),
        }
    }

    pub async fn bootstrap(&self) -> Result<()> {
        self.broker.connect().await?;
        self.broker.declare_topology(&self.routing).await?;
        Ok(())
    }

    pub fn request_shutdown(&self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shutdown_signal_resolves_after_cancel() {
        let signal = ShutdownSignal::new();
        assert!(!signal.is_cancelled());
        let waiter = signal.clone();
        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
        });
        signal.cancel();
        handle.await.unwrap();
        assert!(signal.is_cancelled());
    }
}
