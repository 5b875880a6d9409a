//! `bridge-ctl process`: list/info/start/stop/delete engine process
//! definitions and instances, bypassing the broker entirely.

use crate::output;
use bridge_engine_client::EngineClient;
use bridge_shared::codec::encode_variables;
use bridge_shared::config::AppConfig;
use bridge_shared::error::{BridgeError, Result};
use clap::Subcommand;
use std::collections::HashMap;

#[derive(Debug, Subcommand)]
pub(crate) enum ProcessCommand {
    /// Operate on process definitions.
    Definition {
        #[command(subcommand)]
        command: DefinitionCommand,
    },
    /// Operate on process instances.
    Instance {
        #[command(subcommand)]
        command: InstanceCommand,
    },
}

#[derive(Debug, Subcommand)]
pub(crate) enum DefinitionCommand {
    /// List deployed process definitions.
    List,
    /// Show a single process definition.
    Info { definition_id: String },
    /// Start a new process instance from a definition.
    Start {
        definition_id: String,
        /// Variables to start the instance with, as a JSON object.
        #[arg(long)]
        variables: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
pub(crate) enum InstanceCommand {
    /// List running process instances.
    List,
    /// Suspend a running process instance.
    Stop { instance_id: String },
    /// Delete a process instance.
    Delete {
        instance_id: String,
        #[arg(long)]
        reason: Option<String>,
    },
}

fn engine_client(config: &AppConfig) -> Result<EngineClient> {
    EngineClient::new(
        config.engine.base_url.clone(),
        config.engine.worker_id.clone(),
        config.engine.basic_auth_user.clone().zip(config.engine.basic_auth_password.clone()),
        config.engine.request_timeout(),
    )
    .map_err(|e| BridgeError::validation(e.to_string()))
}

pub(crate) async fn run(command: ProcessCommand) -> Result<()> {
    let config = AppConfig::load()?;
    let engine = engine_client(&config)?;

    match command {
        ProcessCommand::Definition { command } => run_definition(&engine, command).await,
        ProcessCommand::Instance { command } => run_instance(&engine, command).await,
    }
}

async fn run_definition(engine: &EngineClient, command: DefinitionCommand) -> Result<()> {
    match command {
        DefinitionCommand::List => {
            let definitions = engine.list_process_definitions().await.map_err(|e| BridgeError::validation(e.to_string()))?;
            if definitions.is_empty() {
                output::dim("no process definitions deployed");
            }
            for definition in definitions {
                output::item(format!(
                    "{} v{} ({}){}",
                    definition.key,
                    definition.version,
                    definition.id,
                    if definition.suspended { ", suspended" } else { "" }
                ));
            }
        }
        DefinitionCommand::Info { definition_id } => {
            match engine.process_definition_info(&definition_id).await.map_err(|e| BridgeError::validation(e.to_string()))? {
                Some(definition) => {
                    output::header(format!("Process definition {}", definition.id));
                    output::item(format!("key: {}", definition.key));
                    output::item(format!("name: {}", definition.name.as_deref().unwrap_or("-")));
                    output::item(format!("version: {}", definition.version));
                    output::item(format!("suspended: {}", definition.suspended));
                }
                None => output::warning(format!("no process definition '{definition_id}'")),
            }
        }
        DefinitionCommand::Start { definition_id, variables } => {
            let variables = match variables {
                Some(raw) => {
                    let parsed: HashMap<String, serde_json::Value> =
                        serde_json::from_str(&raw).map_err(|e| BridgeError::validation(e.to_string()))?;
                    encode_variables(&parsed)
                }
                None => Default::default(),
            };
            let instance = engine
                .start_process_instance(&definition_id, variables)
                .await
                .map_err(|e| BridgeError::validation(e.to_string()))?;
            output::success(format!("started process instance {}", instance.id));
        }
    }
    Ok(())
}

async fn run_instance(engine: &EngineClient, command: InstanceCommand) -> Result<()> {
    match command {
        InstanceCommand::List => {
            let instances = engine.list_process_instances().await.map_err(|e| BridgeError::validation(e.to_string()))?;
            if instances.is_empty() {
                output::dim("no running process instances");
            }
            for instance in instances {
                output::item(format!(
                    "{} (definition {}){}",
                    instance.id,
                    instance.definition_id,
                    if instance.suspended { ", suspended" } else { "" }
                ));
            }
        }
        InstanceCommand::Stop { instance_id } => {
            engine.stop_process_instance(&instance_id).await.map_err(|e| BridgeError::validation(e.to_string()))?;
            output::success(format!("suspended process instance {instance_id}"));
        }
        InstanceCommand::Delete { instance_id, reason } => {
            engine
                .delete_process_instance(&instance_id, reason.as_deref())
                .await
                .map_err(|e| BridgeError::validation(e.to_string()))?;
            output::success(format!("deleted process instance {instance_id}"));
        }
    }
    Ok(())
}
