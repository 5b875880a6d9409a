//! Static routing table: topic → system → queue → binding keys, plus the
//! exchange names the broker adapter declares (§3.5, §4.1).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const MAIN_EXCHANGE: &str = "main";
pub const ALTERNATE_EXCHANGE: &str = "main.alternate";
pub const RESPONSE_EXCHANGE: &str = "responses";
pub const RESPONSE_QUEUE: &str = "responses.queue";
pub const SENT_EXCHANGE: &str = "sent";
pub const DEFAULT_QUEUE: &str = "default.queue";
pub const ERROR_QUEUE: &str = "errors.camunda_tasks.queue";
pub const ERROR_ROUTING_KEY: &str = "errors.camunda_tasks";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemRoute {
    pub system: String,
    pub queue: String,
    pub sent_queue: String,
}

/// Static configuration mapping engine topics to downstream systems and
/// their queues. Loaded from TOML when `routing_table_path` is set,
/// otherwise [`RoutingTable::default`] provides a minimal fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingTable {
    /// topic -> system
    pub topic_to_system: HashMap<String, String>,
    /// system -> route (queue + sent queue)
    pub systems: HashMap<String, SystemRoute>,
}

impl Default for RoutingTable {
    fn default() -> Self {
        let mut topic_to_system = HashMap::new();
        topic_to_system.insert("bitrix24".to_string(), "bitrix24".to_string());

        let mut systems = HashMap::new();
        systems.insert(
            "bitrix24".to_string(),
            SystemRoute {
                system: "bitrix24".to_string(),
                queue: "bitrix24.queue".to_string(),
                sent_queue: "bitrix24.sent.queue".to_string(),
            },
        );

        Self {
            topic_to_system,
            systems,
        }
    }
}

impl RoutingTable {
    pub fn from_toml(contents: &str) -> crate::error::Result<Self> {
        toml::from_str(contents)
            .map_err(|e| crate::error::BridgeError::validation(format!("invalid routing table: {e}")))
    }

    pub fn system_for_topic(&self, topic: &str) -> Option<&str> {
        self.topic_to_system.get(topic).map(String::as_str)
    }

    pub fn route_for_system(&self, system: &str) -> Option<&SystemRoute> {
        self.systems.get(system)
    }

    /// Routing key used when publishing a [`WorkItem`](crate::models::WorkItem)
    /// for `topic`. Falls through to `"default." + topic` when the topic
    /// has no binding, which lands in the default queue via the
    /// alternate exchange (§4.1).
    pub fn routing_key_for_topic(&self, topic: &str) -> String {
        match self.system_for_topic(topic) {
            Some(system) => format!("{system}.{topic}"),
            None => format!("default.{topic}"),
        }
    }

    /// Binding patterns for every declared system queue, used at
    /// topology-setup time (§4.1 step 4).
    pub fn bindings(&self) -> Vec<(&str, String)> {
        self.topic_to_system
            .iter()
            .filter_map(|(topic, system)| {
                self.systems
                    .get(system)
                    .map(|route| (route.queue.as_str(), format!("{system}.{topic}")))
            })
            .collect()
    }

    pub fn all_sent_queues(&self) -> Vec<&str> {
        self.systems.values().map(|r| r.sent_queue.as_str()).collect()
    }

    pub fn all_system_queues(&self) -> Vec<&str> {
        self.systems.values().map(|r| r.queue.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_topic_routes_to_its_system_queue() {
        let table = RoutingTable::default();
        assert_eq!(table.routing_key_for_topic("bitrix24"), "bitrix24.bitrix24");
    }

    #[test]
    fn unknown_topic_falls_through_to_default() {
        let table = RoutingTable::default();
        assert_eq!(table.routing_key_for_topic("experiment_42"), "default.experiment_42");
    }

    #[test]
    fn every_system_queue_has_a_binding() {
        let table = RoutingTable::default();
        let bound_queues: Vec<&str> = table.bindings().into_iter().map(|(q, _)| q).collect();
        for queue in table.all_system_queues() {
            assert!(bound_queues.contains(&queue));
        }
    }
}
