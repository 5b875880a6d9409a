//! Command handlers for `bridge-ctl`, one module per subcommand group.

pub(crate) mod process;
pub(crate) mod queue;
pub(crate) mod recovery;
pub(crate) mod status;
pub(crate) mod task;

use bridge_shared::config::AppConfig;
use bridge_shared::error::{BridgeError, Result};
use bridge_shared::routing::RoutingTable;

/// Loads the app config and resolves the routing table the same way
/// `bridge-worker`'s server binary does, letting `--routing-table`
/// override `TASKBRIDGE_ROUTING_TABLE_PATH`.
pub(crate) fn load_routing(config: &AppConfig, override_path: Option<&str>) -> Result<RoutingTable> {
    let path = override_path.or(config.routing_table_path.as_deref());
    match path {
        Some(path) => {
            let contents = std::fs::read_to_string(path).map_err(|e| BridgeError::validation(e.to_string()))?;
            RoutingTable::from_toml(&contents)
        }
        None => Ok(RoutingTable::default()),
    }
}
