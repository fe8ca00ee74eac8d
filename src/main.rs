mod chat;
mod commands;
mod config;
mod conversation;
mod events;
mod llm;
mod prompts;
mod storage;
mod streaming;
mod ui;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::Config;
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "begleiter")]
#[command(version)]
#[command(about = "Dein KI-Begleiter im Terminal", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the chat (default)
    Chat,
    /// Ask a single question and print the streamed reply
    Ask { text: String },
    /// Show the assistant name, or set a new one
    Name { name: Option<String> },
}

/// Log to a file so the full-screen UI stays clean.
fn init_logging(config: &Config) -> Result<()> {
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(config.log_path())
        .context("Failed to open log file")?;

    let filter = EnvFilter::try_from_env("BEGLEITER_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(log_file))
        .with_ansi(false)
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;
    init_logging(&config)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), model = %config.model, "begleiter starting");

    match cli.command {
        None | Some(Commands::Chat) => ui::run_chat(config).await,
        Some(Commands::Ask { text }) => commands::ask(config, &text).await,
        Some(Commands::Name { name: None }) => commands::show_name(&config),
        Some(Commands::Name { name: Some(name) }) => commands::set_name(&config, &name),
    }
}
