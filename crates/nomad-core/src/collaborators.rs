//! Interfaces to the systems the store depends on but does not own.
//!
//! The transport, outbound router, contacts directory and printing facility
//! are injected into [`ConversationStore`](crate::store::ConversationStore)
//! as trait objects. `Offline` stands in for the network side when tooling
//! only inspects what is already on disk; printing defaults to the configured
//! print command.

use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use crate::codec::{MessageCodec, PackedCodec};
use crate::models::{Identity, LxMessage, MessageHash, PeerId, PreferredDelivery, TrustLevel};

/// Invoked by the router once a dispatched message is delivered or has failed.
pub type DeliveryCallback = Arc<dyn Fn(LxMessage) + Send + Sync>;

/// Identity and path resolution provided by the mesh transport.
pub trait Transport: Send + Sync {
    fn recall_identity(&self, peer: &PeerId) -> Option<Identity>;

    /// Application data from the most recent announce seen for `peer`.
    fn recall_app_data(&self, peer: &PeerId) -> Option<Vec<u8>>;

    /// Ask the network for a path to `peer`. Resolution is asynchronous.
    fn request_path(&self, peer: &PeerId) -> Result<(), String>;

    fn current_ratchet_id(&self, peer: &PeerId) -> Option<Vec<u8>>;
}

/// Live view of messages the router still tracks.
pub trait InFlightSet: Send + Sync {
    /// Message is in the outbound queue
    fn is_queued(&self, hash: &MessageHash) -> bool;

    /// Message is waiting for a proof-of-work stamp
    fn is_awaiting_stamp(&self, hash: &MessageHash) -> bool;

    fn contains(&self, hash: &MessageHash) -> bool {
        self.is_queued(hash) || self.is_awaiting_stamp(hash)
    }
}

/// Outbound message router.
pub trait Router: InFlightSet {
    fn handle_outbound(&self, message: LxMessage, on_complete: DeliveryCallback);

    /// An established delivery link to `peer` is open
    fn delivery_link_available(&self, peer: &PeerId) -> bool;

    fn outbound_propagation_node(&self) -> Option<PeerId>;

    /// Render a paper message as a PNG QR code.
    fn paper_qr_png(&self, message: &LxMessage) -> Result<Vec<u8>, String>;
}

/// Contacts and trust directory.
pub trait Directory: Send + Sync {
    fn display_name(&self, peer: &PeerId) -> Option<String>;

    fn trust_level(&self, peer: &PeerId, display_name: Option<&str>) -> TrustLevel;

    fn preferred_delivery(&self, peer: &PeerId) -> PreferredDelivery;

    /// Record an announce in the directory's announce stream.
    fn announce_received(&self, peer: &PeerId, app_data: &[u8]);
}

pub trait Printer: Send + Sync {
    /// Print the file at `path`, returning whether the job was accepted.
    fn print_file(&self, path: &Path) -> bool;
}

/// Prints by running an external command with the file path as last argument.
#[derive(Debug, Clone)]
pub struct CommandPrinter {
    command: String,
}

impl CommandPrinter {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl Printer for CommandPrinter {
    fn print_file(&self, path: &Path) -> bool {
        let mut parts = self.command.split_whitespace();
        let Some(program) = parts.next() else {
            tracing::warn!("No print command configured");
            return false;
        };

        match Command::new(program).args(parts).arg(path).status() {
            Ok(status) if status.success() => true,
            Ok(status) => {
                tracing::error!("Print command {} exited with {}", self.command, status);
                false
            }
            Err(e) => {
                tracing::error!("Could not run print command {}: {}", self.command, e);
                false
            }
        }
    }
}

/// The full set of collaborators a store is wired to.
#[derive(Clone)]
pub struct Collaborators {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) router: Arc<dyn Router>,
    pub(crate) in_flight: Arc<dyn InFlightSet>,
    pub(crate) directory: Arc<dyn Directory>,
    /// Falls back to a [`CommandPrinter`] running the configured print command
    pub(crate) printer: Option<Arc<dyn Printer>>,
    pub(crate) codec: Arc<dyn MessageCodec>,
}

impl Collaborators {
    pub fn new<T, R, D>(transport: Arc<T>, router: Arc<R>, directory: Arc<D>) -> Self
    where
        T: Transport + 'static,
        R: Router + 'static,
        D: Directory + 'static,
    {
        Self {
            transport,
            in_flight: router.clone(),
            router,
            directory,
            printer: None,
            codec: Arc::new(PackedCodec),
        }
    }

    /// Collaborators for working on the stored data with no network stack.
    pub fn offline() -> Self {
        let offline = Arc::new(Offline);
        Self::new(offline.clone(), offline.clone(), offline)
    }

    pub fn with_printer(mut self, printer: Arc<dyn Printer>) -> Self {
        self.printer = Some(printer);
        self
    }

    pub fn with_codec(mut self, codec: Arc<dyn MessageCodec>) -> Self {
        self.codec = codec;
        self
    }
}

/// Stand-in for every collaborator when no network stack is running.
///
/// Nothing is in flight, so interrupted sends reconcile to failed, and no
/// identity is known, so sending is refused.
#[derive(Debug, Clone, Copy, Default)]
pub struct Offline;

impl Transport for Offline {
    fn recall_identity(&self, _peer: &PeerId) -> Option<Identity> {
        None
    }

    fn recall_app_data(&self, _peer: &PeerId) -> Option<Vec<u8>> {
        None
    }

    fn request_path(&self, peer: &PeerId) -> Result<(), String> {
        Err(format!("no transport available to request a path to {}", peer))
    }

    fn current_ratchet_id(&self, _peer: &PeerId) -> Option<Vec<u8>> {
        None
    }
}

impl InFlightSet for Offline {
    fn is_queued(&self, _hash: &MessageHash) -> bool {
        false
    }

    fn is_awaiting_stamp(&self, _hash: &MessageHash) -> bool {
        false
    }
}

impl Router for Offline {
    fn handle_outbound(&self, message: LxMessage, _on_complete: DeliveryCallback) {
        tracing::warn!("Dropping outbound message {} while offline", message.hash);
    }

    fn delivery_link_available(&self, _peer: &PeerId) -> bool {
        false
    }

    fn outbound_propagation_node(&self) -> Option<PeerId> {
        None
    }

    fn paper_qr_png(&self, _message: &LxMessage) -> Result<Vec<u8>, String> {
        Err("QR rendering is unavailable offline".to_string())
    }
}

impl Directory for Offline {
    fn display_name(&self, _peer: &PeerId) -> Option<String> {
        None
    }

    fn trust_level(&self, _peer: &PeerId, _display_name: Option<&str>) -> TrustLevel {
        TrustLevel::Unknown
    }

    fn preferred_delivery(&self, _peer: &PeerId) -> PreferredDelivery {
        PreferredDelivery::Direct
    }

    fn announce_received(&self, _peer: &PeerId, _app_data: &[u8]) {}
}
