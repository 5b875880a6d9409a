//! `bridge-ctl queue`: list configured queues, peek at messages without
//! consuming them, or purge a queue entirely.

use crate::output;
use bridge_shared::broker::BrokerAdapter;
use bridge_shared::config::AppConfig;
use bridge_shared::error::{BridgeError, Result};
use bridge_shared::routing::{DEFAULT_QUEUE, ERROR_QUEUE, RESPONSE_QUEUE};
use clap::Subcommand;
use lapin::options::BasicNackOptions;

#[derive(Debug, Subcommand)]
pub(crate) enum QueueCommand {
    /// List every queue known to the routing table plus the shared queues.
    List,
    /// Peek at up to `--count` messages on a queue without removing them.
    Peek {
        queue: String,
        #[arg(long, default_value_t = 5)]
        count: usize,
    },
    /// Drain up to `--count` messages to a newline-delimited JSON file without removing them.
    Export {
        queue: String,
        #[arg(long)]
        out: String,
        #[arg(long, default_value_t = 100)]
        count: usize,
    },
    /// Drain and discard every message currently on a queue.
    Purge {
        queue: String,
        /// Required acknowledgement; without it, nothing is purged.
        #[arg(long)]
        yes: bool,
    },
}

pub(crate) async fn run(command: QueueCommand) -> Result<()> {
    let config = AppConfig::load()?;
    let broker = BrokerAdapter::new(config.broker.amqp_uri.clone());
    broker.connect().await?;

    match command {
        QueueCommand::List => {
            let routing = super::load_routing(&config, None)?;
            output::header("Known queues:");
            output::item(RESPONSE_QUEUE);
            output::item(DEFAULT_QUEUE);
            output::item(ERROR_QUEUE);
            for queue in routing.all_system_queues() {
                output::item(queue);
            }
            for queue in routing.all_sent_queues() {
                output::item(queue);
            }
        }
        QueueCommand::Peek { queue, count } => {
            let mut peeked = Vec::new();
            for _ in 0..count {
                match broker.basic_get(&queue).await? {
                    Some(message) => peeked.push(message),
                    None => break,
                }
            }
            if peeked.is_empty() {
                output::dim(format!("{queue} is empty"));
            }
            for message in &peeked {
                let body = String::from_utf8_lossy(&message.data);
                output::plain(body);
            }
            for message in peeked {
                let _ = message
                    .nack(BasicNackOptions {
                        requeue: true,
                        ..Default::default()
                    })
                    .await;
            }
        }
        QueueCommand::Export { queue, out, count } => {
            let mut drained = Vec::new();
            for _ in 0..count {
                match broker.basic_get(&queue).await? {
                    Some(message) => drained.push(message),
                    None => break,
                }
            }

            let mut lines = String::new();
            for message in &drained {
                lines.push_str(&String::from_utf8_lossy(&message.data));
                lines.push('\n');
            }
            std::fs::write(&out, lines).map_err(|e| BridgeError::validation(e.to_string()))?;

            let exported = drained.len();
            for message in drained {
                let _ = message
                    .nack(BasicNackOptions {
                        requeue: true,
                        ..Default::default()
                    })
                    .await;
            }
            output::success(format!("exported {exported} messages from {queue} to {out}"));
        }
        QueueCommand::Purge { queue, yes } => {
            if !yes {
                output::warning(format!("refusing to purge '{queue}' without --yes"));
                return Ok(());
            }
            let mut purged = 0u64;
            while let Some(message) = broker.basic_get(&queue).await? {
                message.ack(Default::default()).await?;
                purged += 1;
            }
            output::success(format!("purged {purged} messages from {queue}"));
        }
    }

    Ok(())
}
