//! `bridge-ctl recovery run`: on-demand invocation of the Recovery
//! Utility (§4.9) against whichever engine the configured worker talks to.

use crate::output;
use bridge_engine_client::EngineClient;
use bridge_shared::broker::BrokerAdapter;
use bridge_shared::config::AppConfig;
use bridge_shared::error::{BridgeError, Result};
use bridge_worker::app::Application;
use bridge_worker::handler::HandlerRegistry;
use bridge_worker::recovery::recover_stuck_tasks;
use clap::Subcommand;
use std::sync::Arc;

#[derive(Debug, Subcommand)]
pub(crate) enum RecoveryCommand {
    /// Scan currently locked tasks and unlock+fail ones with no trace on
    /// either the in-flight or sent-mirror queues.
    Run {
        /// Restrict the scan to tasks locked by this worker id.
        #[arg(long)]
        worker_id: Option<String>,
        /// Tasks locked for less than this are left alone.
        #[arg(long, default_value_t = 30)]
        max_age_minutes: i64,
    },
}

pub(crate) async fn run(command: RecoveryCommand, routing_table_override: Option<&str>) -> Result<()> {
    let RecoveryCommand::Run { worker_id, max_age_minutes } = command;

    let config = AppConfig::load()?;
    let routing = super::load_routing(&config, routing_table_override)?;
    let broker = Arc::new(BrokerAdapter::new(config.broker.amqp_uri.clone()));
    let engine = EngineClient::new(
        config.engine.base_url.clone(),
        config.engine.worker_id.clone(),
        config.engine.basic_auth_user.clone().zip(config.engine.basic_auth_password.clone()),
        config.engine.request_timeout(),
    )
    .map_err(|e| BridgeError::validation(e.to_string()))?;

    let app = Application::new(config, routing, Arc::clone(&broker), engine, HandlerRegistry::new());
    broker.connect().await?;

    output::dim("scanning locked tasks...");
    let report = recover_stuck_tasks(&app, worker_id.as_deref(), max_age_minutes).await;

    output::header("Recovery report:");
    output::label("Checked", report.checked);
    output::label("Stuck", report.stuck);
    output::label("Unlocked", report.unlocked);
    output::label("Failed", report.failed);
    if report.errors.is_empty() {
        output::success("no errors");
    } else {
        output::warning(format!("{} errors:", report.errors.len()));
        for err in &report.errors {
            output::item(err);
        }
    }

    Ok(())
}
