//! `bridge-ctl task`: direct operations against individual engine tasks,
//! bypassing the broker entirely.

use crate::output;
use bridge_engine_client::EngineClient;
use bridge_shared::config::AppConfig;
use bridge_shared::error::{BridgeError, Result};
use clap::Subcommand;

#[derive(Debug, Subcommand)]
pub(crate) enum TaskCommand {
    /// Print an engine task's current status, or report that it's closed.
    Status { task_id: String },
    /// Release a task's lock without completing or failing it.
    Unlock { task_id: String },
    /// Fail a task with an operator-supplied reason.
    Fail {
        task_id: String,
        #[arg(long)]
        reason: String,
        #[arg(long, default_value_t = 0)]
        retries: i32,
    },
}

pub(crate) async fn run(command: TaskCommand) -> Result<()> {
    let config = AppConfig::load()?;
    let engine = EngineClient::new(
        config.engine.base_url.clone(),
        config.engine.worker_id.clone(),
        config.engine.basic_auth_user.clone().zip(config.engine.basic_auth_password.clone()),
        config.engine.request_timeout(),
    )
    .map_err(|e| BridgeError::validation(e.to_string()))?;

    match command {
        TaskCommand::Status { task_id } => match engine
            .task_status(&task_id)
            .await
            .map_err(|e| BridgeError::validation(e.to_string()))?
        {
            Some(task) => {
                output::header(format!("Task {task_id}"));
                output::label("Topic", &task.topic_name);
                output::label("Process instance", &task.process_instance_id);
                output::label("Activity", &task.activity_id);
                output::label("Retries", task.retries.map(|r| r.to_string()).unwrap_or_else(|| "-".into()));
                output::label(
                    "Lock expiration",
                    task.lock_expiration_time.as_deref().unwrap_or("(not locked)"),
                );
            }
            None => output::warning(format!("task {task_id} not found (closed or never existed)")),
        },
        TaskCommand::Unlock { task_id } => {
            engine.unlock(&task_id).await.map_err(|e| BridgeError::validation(e.to_string()))?;
            output::success(format!("unlocked {task_id}"));
        }
        TaskCommand::Fail { task_id, reason, retries } => {
            engine
                .failure(&task_id, &reason, None, retries, 0)
                .await
                .map_err(|e| BridgeError::validation(e.to_string()))?;
            output::success(format!("failed {task_id}"));
        }
    }

    Ok(())
}
