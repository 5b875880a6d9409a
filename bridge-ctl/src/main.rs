//! Operational CLI for a running taskbridge deployment: status
//! reporting, queue inspection, on-demand recovery, and direct
//! engine-task operations (§8).

mod commands;
mod output;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "bridge-ctl", version, about = "Operate a taskbridge deployment", styles = output::clap_styles())]
struct Cli {
    /// Path to a routing-table TOML file, overriding `TASKBRIDGE_ROUTING_TABLE_PATH`.
    #[arg(long, global = true)]
    routing_table: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Report engine and broker reachability, queue depths, and routing summary.
    Status,
    /// Inspect broker queues.
    Queue {
        #[command(subcommand)]
        command: commands::queue::QueueCommand,
    },
    /// Run the recovery utility against currently locked engine tasks.
    Recovery {
        #[command(subcommand)]
        command: commands::recovery::RecoveryCommand,
    },
    /// Operate on individual engine tasks.
    Task {
        #[command(subcommand)]
        command: commands::task::TaskCommand,
    },
    /// List/inspect process definitions and manage process instances.
    Process {
        #[command(subcommand)]
        command: commands::process::ProcessCommand,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .compact()
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Status => commands::status::run(cli.routing_table.as_deref()).await,
        Command::Queue { command } => commands::queue::run(command).await,
        Command::Recovery { command } => commands::recovery::run(command, cli.routing_table.as_deref()).await,
        Command::Task { command } => commands::task::run(command).await,
        Command::Process { command } => commands::process::run(command).await,
    };

    if let Err(e) = result {
        output::error(format!("{e}"));
        std::process::exit(1);
    }
}
