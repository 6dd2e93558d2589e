// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;
mod wiring;

use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use otto_core::{ChatService, EngineError};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = otto_config::load(cli.config.as_deref())?;

    match cli.command {
        Some(Commands::ListProviders { json }) => {
            list_providers(json);
            Ok(())
        }
        Some(Commands::ListAgents) => {
            if config.agents.is_empty() {
                println!("no agents configured — add an `agents:` section to your config");
                return Ok(());
            }
            for def in &config.agents {
                let agent = wiring::agent_from_def(def);
                println!(
                    "{:<20} {:>10}/{:<24} tools: {}",
                    agent.name,
                    agent.provider_type,
                    agent.model,
                    if agent.tools.is_empty() { "-".to_string() } else { agent.tools.join(",") },
                );
            }
            Ok(())
        }
        Some(Commands::ShowConfig) => {
            println!("{}", serde_yaml::to_string(&config).unwrap_or_default());
            Ok(())
        }
        Some(Commands::Chats) => {
            let service = wiring::build_service(&config)?;
            for chat in service.list_chats().await? {
                println!(
                    "{}  {:<24} {:>3} msgs  {:>8} tokens  ${:.4}",
                    chat.id,
                    chat.name,
                    chat.messages.len(),
                    chat.usage.total_tokens,
                    chat.usage.cost,
                );
            }
            Ok(())
        }
        other => {
            let (agent, chat) = match other {
                Some(Commands::Chat { agent, chat }) => (agent, chat),
                _ => (None, None),
            };
            let service = Arc::new(wiring::build_service(&config)?);
            run_chat(service, &config, agent.as_deref(), chat.as_deref()).await
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn list_providers(json: bool) {
    let drivers = otto_model::list_drivers();
    if json {
        let rows: Vec<serde_json::Value> = drivers
            .iter()
            .map(|d| {
                serde_json::json!({
                    "id": d.id,
                    "name": d.name,
                    "description": d.description,
                    "default_base_url": d.default_base_url,
                    "api_key_env": d.default_api_key_env,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows).unwrap_or_default());
        return;
    }
    for d in drivers {
        println!("{:<12} {:<28} {}", d.id, d.name, d.description);
    }
}

/// The interactive read-eval loop.  Each submitted line runs one full turn;
/// Ctrl-C cancels the in-flight turn (partial work stays persisted) without
/// leaving the session.
async fn run_chat(
    service: Arc<ChatService>,
    config: &otto_config::Config,
    agent: Option<&str>,
    resume: Option<&str>,
) -> anyhow::Result<()> {
    let agent_id = resolve_agent_id(config, agent)?;
    let chat_id = match resume {
        Some(id) => service.get_chat(id).await.context("resuming chat")?.id,
        None => service.create_chat(&agent_id, &format!("chat with {agent_id}")).await?.id,
    };
    service.set_active_chat(&chat_id).await?;
    println!("chatting with {agent_id} (chat {chat_id}); Ctrl-C cancels a turn, Ctrl-D quits");

    // Live tool-call feedback while a turn runs.
    let (_sub, mut tool_rx) = {
        let bus = service.bus();
        bus.subscribe_tool_calls()
    };
    tokio::spawn(async move {
        while let Some(ev) = tool_rx.recv().await {
            if ev.is_error() {
                eprintln!("  [tool {}] error: {}", ev.tool_name, ev.error);
            } else {
                eprintln!("  [tool {}] ok", ev.tool_name);
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break; // EOF
        };
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" || line == "/exit" {
            break;
        }

        let cancel = CancellationToken::new();
        let turn = {
            let service = Arc::clone(&service);
            let chat_id = chat_id.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { service.send_message(&chat_id, &line, cancel).await })
        };

        let result = tokio::select! {
            r = turn => r.context("turn task failed")?,
            _ = tokio::signal::ctrl_c() => {
                cancel.cancel();
                eprintln!("\n[canceling...]");
                // The turn winds down through its cancellation path and
                // persists whatever completed.
                Err(EngineError::Canceled)
            }
        };

        match result {
            Ok(reply) => println!("{}", reply.content),
            Err(EngineError::Canceled) => {
                // Re-read with a fresh scope to show what survived.
                let chat = service.get_chat(&chat_id).await?;
                println!("[turn canceled; {} messages persisted]", chat.messages.len());
            }
            Err(e) => eprintln!("error: {e}"),
        }
    }
    Ok(())
}

fn resolve_agent_id(config: &otto_config::Config, wanted: Option<&str>) -> anyhow::Result<String> {
    if config.agents.is_empty() {
        bail!("no agents configured — add an `agents:` section to your config");
    }
    match wanted {
        None => Ok(wiring::agent_from_def(&config.agents[0]).id),
        Some(name) => config
            .agents
            .iter()
            .map(wiring::agent_from_def)
            .find(|a| a.name == name || a.id == name)
            .map(|a| a.id)
            .with_context(|| format!("unknown agent {name:?}; run `otto list-agents`")),
    }
}
