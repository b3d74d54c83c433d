//! Bank CLI - operator console for the ledger and card vault

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use bank_core::domain::UserId;
use bank_core::{Error, LogEvent};
use commands::{account, card, logs};

/// Bank - accounts, transfers and cards from the terminal
#[derive(Parser)]
#[command(name = "bank", version, about, long_about = None)]
struct Cli {
    /// Acting user ID; the caller is trusted to be this user
    #[arg(long, global = true, env = "BANK_USER_ID")]
    user: Option<UserId>,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage accounts and move money
    Account {
        #[command(subcommand)]
        command: account::AccountCommands,
    },

    /// Issue cards and authorize payments
    Card {
        #[command(subcommand)]
        command: card::CardCommands,
    },

    /// View and manage the event log
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommands,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Account { command } => command.name(),
            Commands::Card { command } => command.name(),
            Commands::Logs { .. } => "logs",
        }
    }

    fn entity(&self) -> Option<&'static str> {
        match self {
            Commands::Account { .. } => Some("account"),
            Commands::Card { .. } => Some("card"),
            Commands::Logs { .. } => None,
        }
    }
}

/// Diagnostics go to stderr; `BANK_LOG` (or `RUST_LOG`) sets the filter
fn init_tracing() {
    let filter = EnvFilter::try_from_env("BANK_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Message shown to the operator; card failures stay indistinguishable
fn failure_message(err: &anyhow::Error) -> String {
    match err.downcast_ref::<Error>() {
        Some(e) => e.public_message(),
        None => format!("{:#}", err),
    }
}

/// Internal reason for the event log, when it says more than the message
fn failure_details(err: &anyhow::Error, message: &str) -> Option<String> {
    let details = format!("{:#}", err);
    (details != message).then_some(details)
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    let json = cli.json;
    let name = cli.command.name();
    let entity = cli.command.entity();

    let result = run(cli).await;
    // `bank logs` opens the same file, so connect only once it has finished
    let logger = commands::get_logger();

    let mut event = LogEvent::new("command_run").with_command(name);
    if let Some(entity) = entity {
        event = event.with_entity(entity);
    }

    match result {
        Ok(()) => {
            commands::log_event(&logger, event);
            ExitCode::SUCCESS
        }
        Err(e) => {
            let message = failure_message(&e);
            let mut event = event.with_error(&message);
            if let Some(details) = failure_details(&e, &message) {
                event = event.with_error_details(details);
            }
            commands::log_event(&logger, event);
            if json {
                output::json_failure(&message);
            } else {
                output::error(&message);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Account { command } => {
            let user = commands::require_user(cli.user)?;
            account::run(command, user, cli.json).await
        }
        Commands::Card { command } => {
            let user = commands::require_user(cli.user)?;
            card::run(command, user, cli.json).await
        }
        Commands::Logs { command } => logs::run(command, cli.json),
    }
}
