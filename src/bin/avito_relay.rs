// src/bin/avito_relay.rs
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use avito_relay::avito::{AvitoClient, MessageApi};
use avito_relay::channel::telegram::TelegramClient;
use avito_relay::channel::NotificationChannel;
use avito_relay::config::{self, RelayConfig, SourceMethod};
use avito_relay::relay::{Relay, StopSignal};

const CHECK_MESSAGE: &str = "✅ <b>Avito relay</b> test message";

#[derive(Parser)]
#[command(name = "avito-relay", about = "Relay new Avito messages to Telegram")]
struct Cli {
    /// Config file (.toml, or .json for the legacy layout) [default: ./config.toml]
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a sample config file
    Init,
    /// Poll and relay until interrupted (default)
    Run,
    /// Run a single relay cycle and exit
    Once,
    /// Verify the Avito credentials and send a test message to every chat
    Check,
    /// List chats that recently messaged the bot, to find chat ids
    ChatIds,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let path = match cli.config {
        Some(path) => path,
        None => config::config_path(&std::env::current_dir()?),
    };

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Init => cmd_init(&path),
        Commands::Run => cmd_run(&path),
        Commands::Once => cmd_once(&path),
        Commands::Check => cmd_check(&path),
        Commands::ChatIds => cmd_chat_ids(&path),
    }
}

fn require_config(path: &Path) -> Result<RelayConfig> {
    config::load_config(path)?.with_context(|| {
        format!(
            "Config file {} not found. Run `avito-relay init` to create one.",
            path.display()
        )
    })
}

fn cmd_init(path: &Path) -> Result<()> {
    if path.exists() {
        println!("{} already exists, leaving it untouched", path.display());
        return Ok(());
    }
    let written = if config::is_json(path) {
        config::save_config(path, &RelayConfig::default())
    } else {
        std::fs::write(path, config::SAMPLE_CONFIG).map_err(anyhow::Error::from)
    };
    written.with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote {}", path.display());
    println!("Fill in telegram.bot_token, telegram.chat_ids and the avito credentials.");
    Ok(())
}

fn cmd_run(path: &Path) -> Result<()> {
    let config = require_config(path)?;
    avito_relay::log::init(&config.log)?;

    let stop = StopSignal::new();
    stop.register_os_signals()?;

    log::info!("Avito relay starting (PID {})", std::process::id());
    let mut relay = Relay::from_config(&config);
    relay.run(&stop);
    Ok(())
}

fn cmd_once(path: &Path) -> Result<()> {
    let config = require_config(path)?;
    avito_relay::log::init(&config.log)?;

    let mut relay = Relay::from_config(&config);
    let report = relay.run_cycle();
    println!(
        "New messages: {}, relayed: {}, failed: {}",
        report.polled, report.delivered, report.undelivered
    );
    Ok(())
}

fn cmd_check(path: &Path) -> Result<()> {
    let config = require_config(path)?;
    let mut failures = 0;

    println!("Checking Telegram...");
    let recipients = config.recipients();
    if config.telegram.bot_token.is_empty() || recipients.is_empty() {
        println!("  telegram.bot_token or telegram.chat_ids is not set");
        failures += 1;
    } else {
        let telegram = TelegramClient::from_config(&config);
        match telegram.get_me() {
            Ok(name) => {
                println!("  Bot: {name} ({} recipient(s))", recipients.len());
                let mut delivered = 0;
                for recipient in &recipients {
                    match telegram.send(recipient, CHECK_MESSAGE) {
                        Ok(()) => delivered += 1,
                        Err(e) => println!("  Chat {recipient}: {e}"),
                    }
                }
                println!(
                    "  Test message delivered to {delivered} of {} chat(s)",
                    recipients.len()
                );
                if delivered < recipients.len() {
                    failures += 1;
                }
            }
            Err(e) => {
                println!("  Bot token rejected: {e}");
                failures += 1;
            }
        }
    }

    println!("Checking Avito...");
    match config.avito.method {
        SourceMethod::Api => {
            let mut avito = AvitoClient::from_config(&config);
            if !avito.is_configured() {
                println!("  avito.user_id or avito.api_key is not set");
                failures += 1;
            } else {
                match avito.acquire_token() {
                    Ok(_) => println!("  Token exchange succeeded"),
                    Err(e) => {
                        println!("  Token exchange failed: {e}");
                        failures += 1;
                    }
                }
            }
        }
        SourceMethod::Scraping => println!("  method = scraping: polling yields no messages"),
        SourceMethod::Disabled => println!("  method = disabled: skipped"),
    }

    if failures > 0 {
        anyhow::bail!("{failures} check(s) failed");
    }
    println!("All checks passed.");
    Ok(())
}

fn cmd_chat_ids(path: &Path) -> Result<()> {
    let config = require_config(path)?;
    if config.telegram.bot_token.is_empty() {
        anyhow::bail!("telegram.bot_token is not set in {}", path.display());
    }

    let telegram = TelegramClient::from_config(&config);
    let chats = telegram.get_updates_chats()?;
    if chats.is_empty() {
        println!("No chats found. Send the bot a message and try again.");
        return Ok(());
    }

    println!("Chats:");
    for chat in &chats {
        let username = chat
            .username
            .as_deref()
            .map(|u| format!(" @{u}"))
            .unwrap_or_default();
        println!("  {} ({}) {}{username}", chat.id, chat.kind, chat.name);
    }
    let ids: Vec<String> = chats.iter().map(|c| format!("\"{}\"", c.id)).collect();
    println!("\nchat_ids = [{}]", ids.join(", "));
    Ok(())
}
