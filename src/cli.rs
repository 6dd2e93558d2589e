// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "otto", version, about = "An interactive multi-provider LLM agent host")]
pub struct Cli {
    /// Path to an explicit config file (merged over the discovered layers).
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Log to stderr (RUST_LOG controls the filter; defaults to warn).
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start an interactive chat session (the default command).
    Chat {
        /// Agent to talk to (name or id).  Defaults to the first configured agent.
        #[arg(long, short = 'a')]
        agent: Option<String>,
        /// Resume an existing chat by id instead of creating a new one.
        #[arg(long)]
        chat: Option<String>,
    },

    /// List all chats with their usage totals.
    Chats,

    /// List the configured agents.
    ListAgents,

    /// List all supported provider types.
    ListProviders {
        /// Machine-readable output.
        #[arg(long)]
        json: bool,
    },

    /// Print the merged configuration and exit.
    ShowConfig,
}
