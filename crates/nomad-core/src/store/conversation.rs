use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use crate::codec::{paper_uri, MessageCodec};
use crate::collaborators::{DeliveryCallback, InFlightSet};
use crate::constants::PAPER_FILE_PREFIX;
use crate::error::{Result, StoreError};
use crate::models::{
    DeliveryMethod, DeliveryState, Identity, LxMessage, MessageHash, PeerId, TrustLevel,
};
use crate::store::conversation_store::StoreShared;
use crate::store::delivery::{select_delivery, DeliveryInputs};
use crate::store::record::{LoadedMessage, MessageRecord};

pub type ChangedCallback = Arc<dyn Fn(&Conversation) + Send + Sync>;

/// How a paper message leaves the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaperMode {
    /// Render a QR code to a temp file and send it to the printer
    PrintQr,
    /// Save the QR code image to the downloads directory
    SaveQr,
    /// Save the transfer URI as text to the downloads directory
    SaveUri,
    /// Return the transfer URI without persisting anything
    ReturnUri,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaperOutput {
    /// Whether the printer accepted the job
    Printed(bool),
    Saved(PathBuf),
    Uri(String),
}

/// What happened when the router reported back on a dispatched message.
#[derive(Debug)]
pub enum NotificationOutcome {
    /// Final state was persisted
    Recorded(DeliveryState),
    /// Direct delivery failed and the message went back out as propagated
    RetriedPropagated,
    /// Terminal failure, persisted as failed
    Failed(StoreError),
}

/// Message thread with one peer, backed by `<conversations>/<peer-hex>/`.
///
/// The record list is guarded by its own lock, so inbound delivery and UI
/// actions on different conversations never contend.
pub struct Conversation {
    peer: PeerId,
    messages_path: PathBuf,
    send_destination: RwLock<Option<PeerId>>,
    trust_level: RwLock<TrustLevel>,
    unread: AtomicBool,
    messages: Mutex<Vec<MessageRecord>>,
    changed_callback: Mutex<Option<ChangedCallback>>,
    codec: Arc<dyn MessageCodec>,
    in_flight: Arc<dyn InFlightSet>,
    store: Weak<StoreShared>,
}

impl Conversation {
    /// Build the conversation for `peer` and scan what is already on disk.
    ///
    /// With `initiator` set the conversation directory is created up front,
    /// for threads the user starts before any message exists.
    pub(crate) fn open(shared: &Arc<StoreShared>, peer: PeerId, initiator: bool) -> Result<Self> {
        let collab = &shared.collaborators;
        let messages_path = shared.conversation_dir(&peer);

        let identity = collab.transport.recall_identity(&peer);
        if identity.is_none() {
            if let Err(e) = collab.transport.request_path(&peer) {
                tracing::debug!("Could not request path to {}: {}", peer, e);
            }
        }

        if initiator && !messages_path.is_dir() {
            std::fs::create_dir_all(&messages_path)
                .map_err(|e| StoreError::fs(&messages_path, e))?;
            shared.notify_changed();
        }

        let conversation = Self {
            peer,
            messages_path,
            send_destination: RwLock::new(identity.map(|i| i.destination)),
            trust_level: RwLock::new(collab.directory.trust_level(&peer, None)),
            unread: AtomicBool::new(false),
            messages: Mutex::new(Vec::new()),
            changed_callback: Mutex::new(None),
            codec: collab.codec.clone(),
            in_flight: collab.in_flight.clone(),
            store: Arc::downgrade(shared),
        };
        conversation.scan_storage();

        Ok(conversation)
    }

    fn store(&self) -> Result<Arc<StoreShared>> {
        self.store.upgrade().ok_or(StoreError::StoreClosed)
    }

    // ===== Accessors =====

    pub fn peer(&self) -> PeerId {
        self.peer
    }

    pub fn messages_path(&self) -> &Path {
        &self.messages_path
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }

    pub fn is_unread(&self) -> bool {
        self.unread.load(Ordering::SeqCst)
    }

    /// Clear the in-memory unread flag once the UI has shown the thread.
    pub fn mark_seen(&self) {
        self.unread.store(false, Ordering::SeqCst);
    }

    pub fn trust_level(&self) -> TrustLevel {
        *self.trust_level.read()
    }

    /// Re-read the trust level from the directory.
    pub fn refresh_trust(&self) -> Result<TrustLevel> {
        let shared = self.store()?;
        let level = shared.collaborators.directory.trust_level(&self.peer, None);
        *self.trust_level.write() = level;
        Ok(level)
    }

    pub fn send_destination(&self) -> Option<PeerId> {
        *self.send_destination.read()
    }

    /// An identity for the peer has been resolved
    pub fn is_source_known(&self) -> bool {
        self.send_destination.read().is_some()
    }

    pub fn is_blocked(&self) -> bool {
        self.store
            .upgrade()
            .map(|shared| shared.is_ignored(&self.peer))
            .unwrap_or(false)
    }

    pub(crate) fn set_identity(&self, identity: &Identity) {
        let mut destination = self.send_destination.write();
        if destination.is_none() {
            tracing::debug!("Resolved send destination for {}", self.peer);
            *destination = Some(identity.destination);
        }
    }

    /// Run `f` with exclusive access to the record list.
    pub fn with_messages<R>(&self, f: impl FnOnce(&mut Vec<MessageRecord>) -> R) -> R {
        f(&mut self.messages.lock())
    }

    /// Loaded view of every readable record, in directory order.
    pub fn summaries(&self) -> Vec<LoadedMessage> {
        let mut messages = self.messages.lock();
        messages
            .iter_mut()
            .filter_map(|record| record.loaded().ok().cloned())
            .collect()
    }

    pub fn register_changed_callback(&self, callback: ChangedCallback) {
        *self.changed_callback.lock() = Some(callback);
    }

    fn notify_changed(&self) {
        let callback = self.changed_callback.lock().clone();
        if let Some(callback) = callback {
            callback(self);
        }
    }

    // ===== Storage =====

    /// Rebuild the record list from the directory listing.
    ///
    /// Growth of the list marks the conversation unread. The changed callback
    /// runs once per call, after the rebuild.
    pub fn scan_storage(&self) {
        // Listing under the lock keeps a slower scan from replacing a newer one
        let grew = {
            let mut messages = self.messages.lock();
            let old_len = messages.len();
            *messages = self.read_records();
            messages.len() > old_len
        };

        if grew {
            self.unread.store(true, Ordering::SeqCst);
        }

        self.notify_changed();
    }

    fn read_records(&self) -> Vec<MessageRecord> {
        let entries = match std::fs::read_dir(&self.messages_path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                tracing::error!(
                    "Could not list conversation {}: {}",
                    self.messages_path.display(),
                    e
                );
                return Vec::new();
            }
        };

        let mut records = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::error!("Skipping unreadable entry in {}: {}", self.peer, e);
                    continue;
                }
            };

            let is_message_file = entry
                .file_name()
                .to_str()
                .map(|name| name.len() == MessageHash::HEX_LEN)
                .unwrap_or(false);

            if is_message_file && entry.path().is_file() {
                records.push(self.record(entry.path()));
            }
        }
        records
    }

    fn record(&self, path: PathBuf) -> MessageRecord {
        MessageRecord::new(path, self.codec.clone(), self.in_flight.clone())
    }

    /// Make sure a freshly written file is in the list exactly once.
    fn track(&self, path: PathBuf) {
        let mut messages = self.messages.lock();
        if !messages.iter().any(|record| record.path() == path) {
            messages.push(self.record(path));
        }
    }

    /// Delete every record that reconciles to `Failed`.
    pub fn purge_failed(&self) -> usize {
        let mut messages = self.messages.lock();
        let before = messages.len();

        messages.retain_mut(|record| {
            if !matches!(record.state(), Ok(DeliveryState::Failed)) {
                return true;
            }
            if let Err(e) = record.purge() {
                tracing::warn!("Could not purge failed message: {}", e);
            }
            false
        });

        before - messages.len()
    }

    /// Drop the in-memory records without touching disk.
    pub(crate) fn detach(&self) {
        self.messages.lock().clear();
        self.unread.store(false, Ordering::SeqCst);
    }

    /// Delete every record.
    pub fn clear_history(&self) -> usize {
        let mut messages = self.messages.lock();
        let purged = messages.len();

        for mut record in messages.drain(..) {
            if let Err(e) = record.purge() {
                tracing::warn!("Could not purge message: {}", e);
            }
        }

        purged
    }

    // ===== Sending =====

    fn resolve_destination(&self, shared: &StoreShared) -> Result<PeerId> {
        if let Some(destination) = self.send_destination() {
            return Ok(destination);
        }

        // The identity may have been learned since the conversation was opened
        match shared.collaborators.transport.recall_identity(&self.peer) {
            Some(identity) => {
                self.set_identity(&identity);
                Ok(identity.destination)
            }
            None => {
                tracing::info!("Destination is not known, cannot create message.");
                Err(StoreError::DestinationUnknown(self.peer))
            }
        }
    }

    fn local_source(shared: &StoreShared) -> Result<PeerId> {
        shared
            .config
            .local_destination
            .ok_or_else(|| StoreError::Config("no local delivery destination configured".to_string()))
    }

    /// Send a message to the peer and record it locally.
    pub fn send(self: &Arc<Self>, content: &str, title: &str) -> Result<MessageHash> {
        let shared = self.store()?;
        let destination = self.resolve_destination(&shared)?;
        let source = Self::local_source(&shared)?;
        let collab = &shared.collaborators;

        let propagation_node = collab.router.outbound_propagation_node();
        let plan = select_delivery(&DeliveryInputs {
            preferred: collab.directory.preferred_delivery(&destination),
            propagation_node_configured: propagation_node.is_some(),
            delivery_link_available: collab.router.delivery_link_available(&destination),
            has_ratchet: collab.transport.current_ratchet_id(&destination).is_some(),
            trust: collab.directory.trust_level(&destination, None),
        });

        if plan.method == DeliveryMethod::Opportunistic {
            tracing::debug!(
                "Have ratchet for {}, requesting opportunistic delivery of message",
                destination
            );
        }

        let mut message = LxMessage::new(
            destination,
            source,
            content,
            title,
            plan.method,
            plan.include_ticket,
        );
        message.state = DeliveryState::Sending(plan.method);
        if propagation_node.is_some() {
            message.try_propagation_on_fail = shared.config.try_propagation_on_fail;
        }

        // Dispatch first so the hash is in flight before anyone can load the
        // record; the write is skipped if the router already reported back.
        let hash = message.hash;
        collab
            .router
            .handle_outbound(message.clone(), self.delivery_callback());
        if let Some(path) = shared.ingest_dispatched(&message, None)? {
            self.track(path);
        }

        Ok(hash)
    }

    fn delivery_callback(self: &Arc<Self>) -> DeliveryCallback {
        let conversation = Arc::downgrade(self);
        Arc::new(move |message: LxMessage| match conversation.upgrade() {
            Some(conversation) => {
                conversation.message_notification(message);
            }
            None => tracing::debug!("Dropping delivery notification for {}", message.hash),
        })
    }

    /// Handle the router's final report on a message sent from here.
    ///
    /// A failed message flagged for propagation fallback goes back out once
    /// through the relay, unless it failed while generating its stamp.
    pub fn message_notification(self: &Arc<Self>, message: LxMessage) -> NotificationOutcome {
        let failed = message.state == DeliveryState::Failed;

        if failed && message.try_propagation_on_fail && !message.stamp_generation_failed {
            tracing::info!(
                "Direct delivery of {} failed. Retrying as propagated message.",
                message.hash
            );
            return self.retry_propagated(message);
        }

        self.record_outcome(&message);

        if !failed {
            return NotificationOutcome::Recorded(message.state);
        }

        if message.stamp_generation_failed {
            tracing::error!(
                "Could not send {} due to a stamp generation failure",
                message.hash
            );
            NotificationOutcome::Failed(StoreError::StampGenerationFailure(message.hash))
        } else {
            NotificationOutcome::Failed(StoreError::DeliveryFailure(message.hash))
        }
    }

    fn retry_propagated(self: &Arc<Self>, mut message: LxMessage) -> NotificationOutcome {
        let shared = match self.store() {
            Ok(shared) => shared,
            Err(e) => return NotificationOutcome::Failed(e),
        };

        let replaces = DeliveryState::Sending(message.desired_method);
        message.reset_for_propagation();
        shared
            .collaborators
            .router
            .handle_outbound(message.clone(), self.delivery_callback());

        if let Err(e) = shared.ingest_dispatched(&message, Some(replaces)) {
            tracing::error!("Could not record state of message {}: {}", message.hash, e);
        }

        NotificationOutcome::RetriedPropagated
    }

    fn record_outcome(&self, message: &LxMessage) {
        let result = self.store().and_then(|shared| shared.ingest(message, true));
        if let Err(e) = result {
            tracing::error!("Could not record state of message {}: {}", message.hash, e);
        }
    }

    // ===== Paper messages =====

    /// Produce a message for out-of-band transfer instead of network delivery.
    pub fn paper_output(
        self: &Arc<Self>,
        content: &str,
        title: &str,
        mode: PaperMode,
    ) -> Result<PaperOutput> {
        let shared = self.store()?;
        let destination = self.resolve_destination(&shared)?;
        let source = Self::local_source(&shared)?;

        let mut message = LxMessage::new(
            destination,
            source,
            content,
            title,
            DeliveryMethod::Paper,
            false,
        );
        message.state = DeliveryState::Sent;
        let file_stem = format!("{}{}", PAPER_FILE_PREFIX, message.hash.to_hex());

        let output = match mode {
            PaperMode::PrintQr => {
                let png = self.render_qr(&shared, &message)?;
                let tmp_path = shared.config.tmp_path.join(message.hash.to_hex());
                write_artifact(&tmp_path, &png)?;

                let printed = shared.printer.print_file(&tmp_path);
                if let Err(e) = std::fs::remove_file(&tmp_path) {
                    tracing::warn!("Could not remove {}: {}", tmp_path.display(), e);
                }

                if printed {
                    self.track(shared.ingest(&message, true)?);
                }
                PaperOutput::Printed(printed)
            }
            PaperMode::SaveQr => {
                let png = self.render_qr(&shared, &message)?;
                let save_path = shared.config.downloads_path.join(format!("{}.png", file_stem));
                write_artifact(&save_path, &png)?;
                self.track(shared.ingest(&message, true)?);
                PaperOutput::Saved(save_path)
            }
            PaperMode::SaveUri => {
                let uri = self.render_uri(&message)?;
                let save_path = shared.config.downloads_path.join(format!("{}.txt", file_stem));
                write_artifact(&save_path, format!("{}\n", uri).as_bytes())?;
                self.track(shared.ingest(&message, true)?);
                PaperOutput::Saved(save_path)
            }
            PaperMode::ReturnUri => PaperOutput::Uri(self.render_uri(&message)?),
        };

        Ok(output)
    }

    fn render_qr(&self, shared: &StoreShared, message: &LxMessage) -> Result<Vec<u8>> {
        shared
            .collaborators
            .router
            .paper_qr_png(message)
            .map_err(StoreError::Export)
    }

    fn render_uri(&self, message: &LxMessage) -> Result<String> {
        paper_uri(self.codec.as_ref(), message).map_err(|e| StoreError::Export(e.to_string()))
    }
}

fn write_artifact(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| StoreError::Export(format!("{}: {}", parent.display(), e)))?;
    }
    std::fs::write(path, bytes).map_err(|e| StoreError::Export(format!("{}: {}", path.display(), e)))
}

impl std::fmt::Debug for Conversation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conversation")
            .field("peer", &self.peer)
            .field("messages", &self.len())
            .field("unread", &self.is_unread())
            .finish()
    }
}

impl std::fmt::Display for Conversation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.peer.to_hex())
    }
}
