use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use nomad_core::models::PeerId;
use nomad_core::store::LoadedMessage;
use nomad_core::{Conversation, ConversationStore};
use serde::Serialize;

/// Command to run against the conversation directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    /// List every conversation
    List,
    /// Print the messages of one conversation
    Show { peer: PeerId },
    /// Delete the failed messages of one conversation. Offline, interrupted
    /// sends reconcile to failed and are deleted too.
    PurgeFailed { peer: PeerId },
    /// Delete every message of one conversation
    Clear { peer: PeerId },
    /// Remove a conversation entirely
    Delete { peer: PeerId },
    /// Clear the unread marker of a conversation
    MarkRead { peer: PeerId },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConversationRow {
    peer: String,
    display_name: Option<String>,
    trust: &'static str,
    unread: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MessageRow {
    hash: String,
    time: String,
    title: String,
    content: String,
    state: &'static str,
    method: &'static str,
    signature: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    encryption: Option<String>,
}

impl From<&LoadedMessage> for MessageRow {
    fn from(message: &LoadedMessage) -> Self {
        Self {
            hash: message.hash.to_hex(),
            time: format_timestamp(message.timestamp),
            title: message.title.clone(),
            content: message.content.clone(),
            state: message.state.label(),
            method: message.method.label(),
            signature: message.signature.description(),
            encryption: message.transport_encryption.clone(),
        }
    }
}

pub fn parse_peer(text: &str) -> Result<PeerId> {
    PeerId::from_hex(text.trim()).with_context(|| format!("Invalid peer id: {}", text))
}

/// Seconds since the epoch as an RFC 3339 UTC timestamp.
fn format_timestamp(timestamp: f64) -> String {
    let secs = timestamp.floor();
    let nanos = ((timestamp - secs) * 1e9) as u32;
    DateTime::<Utc>::from_timestamp(secs as i64, nanos)
        .map(|time| time.to_rfc3339())
        .unwrap_or_else(|| timestamp.to_string())
}

fn ensure_exists(store: &ConversationStore, peer: &PeerId) -> Result<()> {
    if !store.config().conversation_path.join(peer.to_hex()).is_dir() {
        bail!("No conversation with {}", peer.to_hex());
    }
    Ok(())
}

fn existing(store: &ConversationStore, peer: &PeerId) -> Result<Arc<Conversation>> {
    ensure_exists(store, peer)?;
    store
        .open(*peer, false)
        .with_context(|| format!("Failed to open conversation {}", peer.to_hex()))
}

/// Run `command` and return its JSON result.
pub fn execute(store: &ConversationStore, command: &CliCommand) -> Result<serde_json::Value> {
    let result = match command {
        CliCommand::List => {
            let rows: Vec<ConversationRow> = store
                .list_conversations()
                .into_iter()
                .map(|entry| ConversationRow {
                    peer: entry.peer.to_hex(),
                    display_name: entry.display_name,
                    trust: entry.trust_level.label(),
                    unread: entry.unread,
                })
                .collect();
            serde_json::to_value(rows)?
        }
        CliCommand::Show { peer } => {
            let conversation = existing(store, peer)?;
            let mut messages = conversation.summaries();
            messages.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
            let rows: Vec<MessageRow> = messages.iter().map(MessageRow::from).collect();
            serde_json::json!({
                "peer": peer.to_hex(),
                "unread": store.is_unread(peer) || conversation.is_unread(),
                "messages": rows,
            })
        }
        CliCommand::PurgeFailed { peer } => {
            let purged = existing(store, peer)?.purge_failed();
            tracing::info!("Purged {} failed messages from {}", purged, peer);
            serde_json::json!({ "peer": peer.to_hex(), "purged": purged })
        }
        CliCommand::Clear { peer } => {
            let cleared = existing(store, peer)?.clear_history();
            serde_json::json!({ "peer": peer.to_hex(), "cleared": cleared })
        }
        CliCommand::Delete { peer } => {
            ensure_exists(store, peer)?;
            store.delete_conversation(peer);
            serde_json::json!({ "peer": peer.to_hex(), "deleted": true })
        }
        CliCommand::MarkRead { peer } => {
            ensure_exists(store, peer)?;
            store.mark_read(peer);
            serde_json::json!({ "peer": peer.to_hex(), "unread": false })
        }
    };

    Ok(result)
}
