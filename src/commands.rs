use anyhow::{bail, Context, Result};
use crate::chat::{ChatOrchestrator, StreamProgress, SubmitOutcome};
use crate::config::Config;
use crate::llm::LlmClient;
use crate::prompts;
use crate::storage::StorageManager;
use std::io::{self, Write};

/// One exchange without the TUI, streaming the reply to stdout.
pub async fn ask(config: Config, text: &str) -> Result<()> {
    let storage = StorageManager::new(&config.home);
    let client = LlmClient::new(config)?;
    let mut chat = ChatOrchestrator::new(client, storage);

    match chat.submit(text) {
        SubmitOutcome::Started => {}
        SubmitOutcome::Rejected(_) => bail!("Nothing to send: the message is empty"),
        SubmitOutcome::Failed => {
            eprintln!("{}", prompts::APOLOGY);
            bail!("The request could not be started");
        }
    }

    let mut stdout = io::stdout();
    let outcome = chat
        .run_to_completion(|fragment| {
            print!("{}", fragment);
            if let Err(e) = stdout.flush() {
                tracing::warn!("Failed to flush stdout: {}", e);
            }
        })
        .await;
    println!();

    match outcome {
        Some(StreamProgress::Completed) => Ok(()),
        _ => {
            eprintln!("{}", prompts::APOLOGY);
            bail!("{} could not answer", chat.assistant_name())
        }
    }
}

pub fn show_name(config: &Config) -> Result<()> {
    let storage = StorageManager::new(&config.home);
    println!("{}", storage.load_assistant_name());
    Ok(())
}

pub fn set_name(config: &Config, raw: &str) -> Result<()> {
    let Some(name) = prompts::normalize_name(raw) else {
        bail!("Der Name darf nicht leer sein.");
    };

    let storage = StorageManager::new(&config.home);
    storage
        .save_assistant_name(&name)
        .context("Failed to save the new name")?;

    if name.chars().count() == prompts::MAX_NAME_CHARS && name != raw.trim() {
        println!("Name auf {} Zeichen gekürzt.", prompts::MAX_NAME_CHARS);
    }
    println!("{}", prompts::rename_announcement(&name));
    Ok(())
}
