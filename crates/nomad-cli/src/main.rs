use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nomad_cli::cli::{execute, parse_peer, resolve_config, CliCommand};
use nomad_core::{Collaborators, ConversationStore};

#[derive(Parser)]
#[command(name = "nomad-cli")]
#[command(about = "Inspect and maintain stored conversations")]
struct Cli {
    /// Pretty-print JSON output
    #[arg(long, short)]
    pretty: bool,

    /// Path to JSON config file (conversationPath, tmpPath, ...)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Data directory holding storage/conversations
    #[arg(long, short = 'r')]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all conversations
    List,

    /// Show the messages in a conversation
    Show {
        /// Peer id (32 hex characters)
        peer: String,
    },

    /// Delete failed messages from a conversation
    ///
    /// Runs without a router, so messages still marked as sending count as
    /// failed. Do not run while another instance is sending to this peer.
    PurgeFailed {
        /// Peer id (32 hex characters)
        peer: String,
    },

    /// Delete every message in a conversation
    Clear {
        /// Peer id (32 hex characters)
        peer: String,
    },

    /// Remove a conversation and its directory
    Delete {
        /// Peer id (32 hex characters)
        peer: String,
    },

    /// Clear the unread marker of a conversation
    MarkRead {
        /// Peer id (32 hex characters)
        peer: String,
    },
}

impl Commands {
    fn into_command(self) -> Result<CliCommand> {
        let command = match self {
            Commands::List => CliCommand::List,
            Commands::Show { peer } => CliCommand::Show {
                peer: parse_peer(&peer)?,
            },
            Commands::PurgeFailed { peer } => CliCommand::PurgeFailed {
                peer: parse_peer(&peer)?,
            },
            Commands::Clear { peer } => CliCommand::Clear {
                peer: parse_peer(&peer)?,
            },
            Commands::Delete { peer } => CliCommand::Delete {
                peer: parse_peer(&peer)?,
            },
            Commands::MarkRead { peer } => CliCommand::MarkRead {
                peer: parse_peer(&peer)?,
            },
        };
        Ok(command)
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = resolve_config(cli.config.as_deref(), cli.root.as_deref())?;
    let command = cli.command.into_command()?;

    let store = ConversationStore::new(config, Collaborators::offline())
        .context("Failed to open conversation store")?;
    let result = execute(&store, &command)?;

    let output = if cli.pretty {
        serde_json::to_string_pretty(&result)?
    } else {
        serde_json::to_string(&result)?
    };
    println!("{}", output);

    Ok(())
}

fn main() {
    nomad_core::tracing_setup::init_tracing_with_filter("warn");

    if let Err(e) = run(Cli::parse()) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
