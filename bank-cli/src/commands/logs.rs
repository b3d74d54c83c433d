//! Logs command - view and manage the event log

use std::path::PathBuf;

use anyhow::{bail, Result};
use chrono::{Duration, TimeZone, Utc};
use clap::Subcommand;
use colored::Colorize;

use super::get_data_dir;
use crate::output;
use bank_core::{EntryPoint, LoggingService};

#[derive(Subcommand)]
pub enum LogsCommands {
    /// Show recent log entries
    List {
        /// Number of entries to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
        /// Show only errors
        #[arg(long)]
        errors: bool,
    },
    /// Clear old log entries
    Clear {
        /// Delete logs older than N days
        #[arg(long, default_value = "30")]
        older_than_days: i64,
        /// Skip confirmation prompt
        #[arg(long, short = 'f')]
        force: bool,
    },
    /// Show log statistics and database path
    Stats,
    /// Copy the log database to a file
    Export {
        /// Destination file
        destination: PathBuf,
        /// Overwrite the destination if it exists
        #[arg(long, short = 'f')]
        force: bool,
    },
}

fn get_logging_service() -> Result<LoggingService> {
    let data_dir = get_data_dir()?;
    std::fs::create_dir_all(&data_dir)?;
    LoggingService::new(&data_dir, EntryPoint::Cli, env!("CARGO_PKG_VERSION"))
}

fn format_timestamp(timestamp_ms: i64) -> String {
    Utc.timestamp_millis_opt(timestamp_ms)
        .single()
        .map(|dt| output::format_time(&dt))
        .unwrap_or_else(|| timestamp_ms.to_string())
}

pub fn run(command: LogsCommands, json: bool) -> Result<()> {
    let service = get_logging_service()?;

    match command {
        LogsCommands::List { limit, errors } => {
            let entries = if errors {
                service.get_errors(limit)?
            } else {
                service.get_recent(limit)?
            };

            if json {
                return output::json(&entries);
            }

            if entries.is_empty() {
                println!("No log entries found.");
                return Ok(());
            }

            let mut table = output::create_table();
            table.set_header(vec!["Time", "Entry", "Event", "Context", "Error"]);

            for entry in &entries {
                let context = [entry.command.as_deref(), entry.entity.as_deref()]
                    .iter()
                    .filter_map(|&s| s)
                    .collect::<Vec<_>>()
                    .join(", ");

                let error_indicator = if entry.error_message.is_some() {
                    "!".red().to_string()
                } else {
                    String::new()
                };

                table.add_row(vec![
                    format_timestamp(entry.timestamp),
                    entry.entry_point.clone(),
                    entry.event.clone(),
                    context,
                    error_indicator,
                ]);
            }

            println!("{}", table);

            if !errors {
                let recent_errors = service.get_errors(3)?;
                if !recent_errors.is_empty() {
                    println!();
                    println!("{}", "Recent Errors:".red().bold());
                    for err in &recent_errors {
                        println!(
                            "  {} [{}]: {}",
                            format_timestamp(err.timestamp).dimmed(),
                            err.event,
                            err.error_message.as_deref().unwrap_or("Unknown error")
                        );
                    }
                }
            }
        }
        LogsCommands::Clear {
            older_than_days,
            force,
        } => {
            let cutoff_ms = (Utc::now() - Duration::days(older_than_days)).timestamp_millis();

            if !force && !json {
                use dialoguer::Confirm;
                if !Confirm::new()
                    .with_prompt(format!("Delete logs older than {} days?", older_than_days))
                    .default(false)
                    .interact()?
                {
                    println!("Cancelled.");
                    return Ok(());
                }
            }

            let deleted = service.delete_before(cutoff_ms)?;

            if json {
                return output::json(serde_json::json!({ "deleted": deleted }));
            }
            output::info(&format!("Deleted {} log entries", deleted));
        }
        LogsCommands::Stats => {
            let total = service.count()?;
            let errors = service.get_errors(1000)?.len();
            let db_path = service.db_path().to_path_buf();
            let size_bytes = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

            if json {
                return output::json(serde_json::json!({
                    "total_entries": total,
                    "error_count": errors,
                    "database_path": db_path.to_string_lossy(),
                    "database_size_bytes": size_bytes
                }));
            }

            println!("{}", "Log Statistics".bold());
            println!("  Total entries: {}", total);
            println!("  Errors: {}", errors);
            println!("  Database: {}", db_path.display());
            println!("  Size: {}", output::format_size(size_bytes));
        }
        LogsCommands::Export { destination, force } => {
            if destination.exists() && !force {
                bail!("{} already exists; pass --force to overwrite", destination.display());
            }
            let path = service.export(&destination)?;
            let size_bytes = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);

            if json {
                return output::json(serde_json::json!({
                    "path": path.to_string_lossy(),
                    "size_bytes": size_bytes
                }));
            }
            output::success(&format!(
                "Exported logs to {} ({})",
                path.display(),
                output::format_size(size_bytes)
            ));
        }
    }

    Ok(())
}
