use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::announce::display_name_from_app_data;
use crate::collaborators::{Collaborators, CommandPrinter, Printer};
use crate::config::StoreConfig;
use crate::constants::{PARTIAL_WRITE_SUFFIX, UNREAD_MARKER};
use crate::error::{Result, StoreError};
use crate::models::{DeliveryState, Identity, LxMessage, PeerId, TrustLevel};
use crate::store::conversation::Conversation;

/// Fired whenever the conversation listing may have changed. Carries no payload.
pub type StoreChangedCallback = Arc<dyn Fn() + Send + Sync>;

/// One row of the conversation listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationEntry {
    pub peer: PeerId,
    pub display_name: Option<String>,
    pub trust_level: TrustLevel,
    pub unread: bool,
}

impl ConversationEntry {
    /// Name used for ordering: the display name, or the peer hex when unnamed.
    pub fn sort_name(&self) -> String {
        self.display_name
            .clone()
            .unwrap_or_else(|| self.peer.to_hex())
    }
}

/// State shared between the store handle and the conversations it owns.
pub(crate) struct StoreShared {
    pub(crate) config: StoreConfig,
    pub(crate) collaborators: Collaborators,
    pub(crate) printer: Arc<dyn Printer>,
    registry: Mutex<HashMap<PeerId, Arc<Conversation>>>,
    /// Peers known to have unseen content in this process
    unread: Mutex<HashSet<PeerId>>,
    ignored: RwLock<HashSet<PeerId>>,
    changed_callback: RwLock<Option<StoreChangedCallback>>,
    /// Serializes the check-then-write of message files
    writes: Mutex<()>,
}

impl StoreShared {
    pub(crate) fn conversation_dir(&self, peer: &PeerId) -> PathBuf {
        self.config.conversation_path.join(peer.to_hex())
    }

    pub(crate) fn notify_changed(&self) {
        let callback = self.changed_callback.read().clone();
        if let Some(callback) = callback {
            callback();
        }
    }

    pub(crate) fn is_ignored(&self, peer: &PeerId) -> bool {
        self.ignored.read().contains(peer)
    }

    fn cached(&self, peer: &PeerId) -> Option<Arc<Conversation>> {
        self.registry.lock().get(peer).cloned()
    }

    /// Write `message` into its conversation directory under its content hash.
    pub(crate) fn ingest(&self, message: &LxMessage, originator: bool) -> Result<PathBuf> {
        let peer = message.conversation_peer(originator);
        let path = self.persist(message, peer, |_| true)?;
        self.after_write(peer);
        Ok(path)
    }

    /// Persist an outbound message that has already been handed to the router.
    ///
    /// The router may have reported back before this runs. The write only
    /// goes ahead while the file is absent or still holds `replaces`, so a
    /// recorded outcome is never rolled back to an in-progress state.
    /// Returns `None` when the write was skipped.
    pub(crate) fn ingest_dispatched(
        &self,
        message: &LxMessage,
        replaces: Option<DeliveryState>,
    ) -> Result<Option<PathBuf>> {
        let peer = message.conversation_peer(true);
        let mut written = false;
        let path = self.persist(message, peer, |path| {
            let persisted = self.persisted_state(path);
            written = persisted.is_none() || persisted == replaces;
            written
        })?;

        if !written {
            tracing::debug!("Message {} already has a recorded outcome", message.hash);
            return Ok(None);
        }
        self.after_write(peer);
        Ok(Some(path))
    }

    fn persisted_state(&self, path: &Path) -> Option<DeliveryState> {
        let bytes = std::fs::read(path).ok()?;
        self.collaborators
            .codec
            .decode(&bytes)
            .ok()
            .map(|message| message.state)
    }

    /// Encode and write a message file if `may_write` agrees, under the write lock.
    fn persist(
        &self,
        message: &LxMessage,
        peer: PeerId,
        may_write: impl FnOnce(&Path) -> bool,
    ) -> Result<PathBuf> {
        let conversation_path = self.conversation_dir(&peer);

        if !conversation_path.is_dir() {
            std::fs::create_dir_all(&conversation_path)
                .map_err(|e| StoreError::fs(&conversation_path, e))?;
            self.notify_changed();
        }

        let bytes = self
            .collaborators
            .codec
            .encode(message)
            .map_err(|e| StoreError::Encode {
                hash: message.hash,
                reason: e.to_string(),
            })?;
        let ingested_path = conversation_path.join(message.hash.to_hex());

        let _guard = self.writes.lock();
        if may_write(&ingested_path) {
            write_replacing(&ingested_path, &bytes)?;
        }
        Ok(ingested_path)
    }

    fn after_write(&self, peer: PeerId) {
        let conversation_path = self.conversation_dir(&peer);

        if let Some(conversation) = self.cached(&peer) {
            conversation.scan_storage();
        }

        let newly_unread = self.unread.lock().insert(peer);
        if newly_unread {
            let marker = conversation_path.join(UNREAD_MARKER);
            if let Err(e) = OpenOptions::new().create(true).append(true).open(&marker) {
                tracing::warn!("Could not create unread marker {}: {}", marker.display(), e);
            }
            self.notify_changed();
        }
    }
}

/// Write to a uniquely named sibling temp file and rename it over `path`, so
/// readers see either the old bytes or the complete new ones.
fn write_replacing(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let prefix = format!(
        "{}.",
        path.file_name().and_then(|n| n.to_str()).unwrap_or_default()
    );

    let mut temp = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(&format!(".{}", PARTIAL_WRITE_SUFFIX))
        .tempfile_in(dir)
        .map_err(|e| StoreError::fs(dir, e))?;
    temp.write_all(bytes)
        .and_then(|_| temp.as_file().sync_all())
        .map_err(|e| StoreError::fs(temp.path(), e))?;
    temp.persist(path).map_err(|e| StoreError::fs(path, e.error))?;

    Ok(())
}

/// Registry of live conversations over a conversation directory.
///
/// Cheap to clone; every clone refers to the same registry, so there is at
/// most one live [`Conversation`] per peer no matter which handle opened it.
#[derive(Clone)]
pub struct ConversationStore {
    shared: Arc<StoreShared>,
}

impl ConversationStore {
    pub fn new(config: StoreConfig, collaborators: Collaborators) -> Result<Self> {
        std::fs::create_dir_all(&config.conversation_path)
            .map_err(|e| StoreError::fs(&config.conversation_path, e))?;

        let ignored = config.ignored_peers.iter().copied().collect();
        let printer = collaborators
            .printer
            .clone()
            .unwrap_or_else(|| Arc::new(CommandPrinter::new(config.print_command.clone())));

        Ok(Self {
            shared: Arc::new(StoreShared {
                config,
                collaborators,
                printer,
                registry: Mutex::new(HashMap::new()),
                unread: Mutex::new(HashSet::new()),
                ignored: RwLock::new(ignored),
                changed_callback: RwLock::new(None),
                writes: Mutex::new(()),
            }),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.shared.config
    }

    pub fn register_changed_callback(&self, callback: StoreChangedCallback) {
        *self.shared.changed_callback.write() = Some(callback);
    }

    // ===== Conversations =====

    /// Return the live conversation for `peer`, creating and caching it if needed.
    pub fn open(&self, peer: PeerId, initiator: bool) -> Result<Arc<Conversation>> {
        if let Some(existing) = self.shared.cached(&peer) {
            return Ok(existing);
        }

        // Built outside the registry lock: opening calls back into the
        // collaborators and may fire the changed callback. Two racing opens
        // both request a path and may both notify; the first insert wins and
        // the other instance is dropped.
        let conversation = Arc::new(Conversation::open(&self.shared, peer, initiator)?);

        let mut registry = self.shared.registry.lock();
        Ok(registry.entry(peer).or_insert(conversation).clone())
    }

    pub fn cached(&self, peer: &PeerId) -> Option<Arc<Conversation>> {
        self.shared.cached(peer)
    }

    /// Every conversation directory on disk, trusted peers first, then by name.
    ///
    /// Entries that cannot be read are logged and skipped.
    pub fn list_conversations(&self) -> Vec<ConversationEntry> {
        let root = &self.shared.config.conversation_path;
        let entries = match std::fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!("Could not list conversations in {}: {}", root.display(), e);
                return Vec::new();
            }
        };

        let mut conversations = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::error!("Skipping unreadable conversation entry: {}", e);
                    continue;
                }
            };

            let file_name = entry.file_name();
            let Some(dirname) = file_name.to_str() else {
                continue;
            };
            if dirname.len() != PeerId::HEX_LEN || !entry.path().is_dir() {
                continue;
            }

            match self.load_entry(dirname, &entry.path()) {
                Ok(conversation) => conversations.push(conversation),
                Err(e) => tracing::error!(
                    "Error while loading conversation {}, skipping it: {}",
                    dirname,
                    e
                ),
            }
        }

        conversations.sort_by_cached_key(|c| (Reverse(c.trust_level), c.sort_name(), c.peer.to_hex()));
        conversations
    }

    fn load_entry(&self, dirname: &str, path: &Path) -> Result<ConversationEntry> {
        let peer = PeerId::from_hex(dirname)?;
        let collab = &self.shared.collaborators;

        let unread = {
            let mut known_unread = self.shared.unread.lock();
            if known_unread.contains(&peer) {
                true
            } else if path.join(UNREAD_MARKER).is_file() {
                known_unread.insert(peer);
                true
            } else {
                false
            }
        };

        let display_name = collab.directory.display_name(&peer).or_else(|| {
            collab
                .transport
                .recall_app_data(&peer)
                .and_then(|data| display_name_from_app_data(&data))
        });
        let trust_level = collab.directory.trust_level(&peer, display_name.as_deref());

        Ok(ConversationEntry {
            peer,
            display_name,
            trust_level,
            unread,
        })
    }

    // ===== Ingest =====

    /// Persist a message into its peer's conversation and refresh any cached view.
    ///
    /// `originator` means the message was sent from here, so it is filed
    /// under its destination rather than its source.
    pub fn ingest(&self, message: &LxMessage, originator: bool) -> Result<PathBuf> {
        self.shared.ingest(message, originator)
    }

    /// Forget the unread state of a conversation, on disk and in memory.
    pub fn mark_read(&self, peer: &PeerId) {
        self.shared.unread.lock().remove(peer);

        let marker = self.shared.conversation_dir(peer).join(UNREAD_MARKER);
        match std::fs::remove_file(&marker) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Could not remove unread marker {}: {}", marker.display(), e),
        }

        if let Some(conversation) = self.shared.cached(peer) {
            conversation.mark_seen();
        }
        self.shared.notify_changed();
    }

    pub fn is_unread(&self, peer: &PeerId) -> bool {
        self.shared.unread.lock().contains(peer)
    }

    /// Remove a conversation and all of its messages. Failures are only logged.
    ///
    /// A handle to the deleted conversation that is still held elsewhere is
    /// left empty and detached: later messages for the peer go to a fresh
    /// instance from [`open`](Self::open).
    pub fn delete_conversation(&self, peer: &PeerId) {
        let removed = self.shared.registry.lock().remove(peer);
        if let Some(conversation) = removed {
            conversation.detach();
        }
        self.shared.unread.lock().remove(peer);

        let conversation_path = self.shared.conversation_dir(peer);
        if conversation_path.is_dir() {
            if let Err(e) = std::fs::remove_dir_all(&conversation_path) {
                tracing::error!(
                    "Could not remove conversation at {}: {}",
                    conversation_path.display(),
                    e
                );
            }
        }
    }

    // ===== Network events =====

    /// React to a delivery announce observed by the transport.
    pub fn on_announce(&self, peer: &PeerId, identity: &Identity, app_data: &[u8]) {
        if self.shared.is_ignored(peer) {
            tracing::debug!("Ignored announce from {}", peer);
            return;
        }

        if self.shared.conversation_dir(peer).is_dir() {
            if let Some(conversation) = self.shared.cached(peer) {
                conversation.set_identity(identity);
            }
            self.shared.notify_changed();
        }

        // The directory's announce stream stores the bare display name
        let display_name = display_name_from_app_data(app_data)
            .map(String::into_bytes)
            .unwrap_or_default();
        self.shared
            .collaborators
            .directory
            .announce_received(peer, &display_name);
    }

    /// Ask the network for a path to `peer`, so its identity can be resolved.
    pub fn query_for_peer(&self, peer: &PeerId) {
        if let Err(e) = self.shared.collaborators.transport.request_path(peer) {
            tracing::error!("Error while querying network for peer identity: {}", e);
        }
    }

    // ===== Ignore list =====

    pub fn ignore(&self, peer: PeerId) {
        self.shared.ignored.write().insert(peer);
    }

    pub fn unignore(&self, peer: &PeerId) {
        self.shared.ignored.write().remove(peer);
    }

    pub fn is_ignored(&self, peer: &PeerId) -> bool {
        self.shared.is_ignored(peer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{PaperMode, PaperOutput};
    use crate::test_support::{inbound, peer, test_config, test_store, FakeNetwork};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use tempfile::tempdir;

    fn count_callbacks(store: &ConversationStore) -> Arc<AtomicUsize> {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        store.register_changed_callback(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        calls
    }

    #[test]
    fn test_ingest_is_listed_and_survives_reload() {
        let dir = tempdir().unwrap();
        let message = inbound(peer(1), "hello there");
        {
            let (store, _network) = test_store(dir.path());
            let path = store.ingest(&message, false).unwrap();
            assert_eq!(path.file_name().unwrap().to_str().unwrap(), message.hash.to_hex());

            let listed = store.list_conversations();
            assert_eq!(listed.len(), 1);
            assert_eq!(listed[0].peer, peer(1));
            assert!(listed[0].unread);
        }

        let (store, _network) = test_store(dir.path());
        let conversation = store.open(peer(1), false).unwrap();
        let summaries = conversation.summaries();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].hash, message.hash);
        assert_eq!(summaries[0].content, "hello there");
        assert_eq!(summaries[0].state, crate::models::DeliveryState::Delivered);
    }

    #[test]
    fn test_reingest_replaces_file() {
        let dir = tempdir().unwrap();
        let (store, _network) = test_store(dir.path());
        let mut message = inbound(peer(1), "same");

        store.ingest(&message, false).unwrap();
        message.state = crate::models::DeliveryState::Failed;
        store.ingest(&message, false).unwrap();

        let conversation_dir = store.config().conversation_path.join(peer(1).to_hex());
        let names: Vec<String> = std::fs::read_dir(&conversation_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names.iter().filter(|n| n.len() == 64).count(), 1);
        assert!(!names.iter().any(|n| n.ends_with(".part")));

        let conversation = store.open(peer(1), false).unwrap();
        assert_eq!(conversation.len(), 1);
        assert_eq!(
            conversation.summaries()[0].state,
            crate::models::DeliveryState::Failed
        );
    }

    #[test]
    fn test_outbound_ingest_files_under_destination() {
        let dir = tempdir().unwrap();
        let (store, _network) = test_store(dir.path());
        let mut message = inbound(peer(2), "reply");
        std::mem::swap(&mut message.source, &mut message.destination);

        store.ingest(&message, true).unwrap();
        let listed = store.list_conversations();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].peer, peer(2));
    }

    #[test]
    fn test_listing_order_trusted_first_then_name() {
        let dir = tempdir().unwrap();
        let (store, network) = test_store(dir.path());

        network.set_name(peer(1), "Zara");
        network.set_name(peer(2), "Alice");
        network.set_name(peer(3), "Bob");
        network.set_trust(peer(1), TrustLevel::Untrusted);
        network.set_trust(peer(2), TrustLevel::Untrusted);
        network.set_trust(peer(3), TrustLevel::Trusted);
        network.set_trust(peer(4), TrustLevel::Warning);
        for byte in 1..=4 {
            store.ingest(&inbound(peer(byte), "hi"), false).unwrap();
        }

        let names: Vec<String> = store
            .list_conversations()
            .iter()
            .map(ConversationEntry::sort_name)
            .collect();
        assert_eq!(
            names,
            vec![
                "Bob".to_string(),
                "Alice".to_string(),
                "Zara".to_string(),
                peer(4).to_hex(),
            ]
        );
    }

    #[test]
    fn test_display_name_falls_back_to_announce_data() {
        let dir = tempdir().unwrap();
        let (store, network) = test_store(dir.path());
        network.set_app_data(peer(5), b"Relay Operator");
        store.ingest(&inbound(peer(5), "hi"), false).unwrap();

        let listed = store.list_conversations();
        assert_eq!(listed[0].display_name.as_deref(), Some("Relay Operator"));
    }

    #[test]
    fn test_listing_skips_foreign_entries() {
        let dir = tempdir().unwrap();
        let (store, _network) = test_store(dir.path());
        let root = &store.config().conversation_path;

        store.ingest(&inbound(peer(1), "hi"), false).unwrap();
        std::fs::create_dir_all(root.join("not-a-peer")).unwrap();
        std::fs::create_dir_all(root.join("zz".repeat(16))).unwrap();
        std::fs::write(root.join("ab".repeat(16)), b"a file, not a directory").unwrap();

        let listed = store.list_conversations();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].peer, peer(1));
    }

    #[test]
    fn test_unread_marker_and_mark_read() {
        let dir = tempdir().unwrap();
        let (store, _network) = test_store(dir.path());
        store.ingest(&inbound(peer(6), "new"), false).unwrap();

        let marker = store.config().conversation_path.join(peer(6).to_hex()).join("unread");
        assert!(marker.is_file());
        assert!(store.is_unread(&peer(6)));

        // A fresh process learns unread state from the marker
        let (reopened, _network) = test_store(dir.path());
        assert!(!reopened.is_unread(&peer(6)));
        assert!(reopened.list_conversations()[0].unread);
        assert!(reopened.is_unread(&peer(6)));

        reopened.mark_read(&peer(6));
        assert!(!marker.exists());
        assert!(!reopened.list_conversations()[0].unread);
        // Marking twice is harmless
        reopened.mark_read(&peer(6));
    }

    #[test]
    fn test_open_returns_single_live_instance() {
        let dir = tempdir().unwrap();
        let (store, _network) = test_store(dir.path());

        let first = store.open(peer(7), true).unwrap();
        let second = store.clone().open(peer(7), false).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&first, &store.cached(&peer(7)).unwrap()));

        store.ingest(&inbound(peer(7), "seen by both"), false).unwrap();
        assert_eq!(second.len(), 1);
    }

    #[test]
    fn test_changed_callback_fires_on_new_conversation() {
        let dir = tempdir().unwrap();
        let (store, _network) = test_store(dir.path());
        let calls = count_callbacks(&store);

        store.open(peer(8), true).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Directory creation and the new unread state both notify
        store.ingest(&inbound(peer(9), "hi"), false).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        // Already unread, existing directory
        store.ingest(&inbound(peer(9), "again"), false).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_delete_conversation() {
        let dir = tempdir().unwrap();
        let (store, _network) = test_store(dir.path());
        let conversation = store.open(peer(10), true).unwrap();
        store.ingest(&inbound(peer(10), "bye"), false).unwrap();

        store.delete_conversation(&peer(10));
        assert!(!conversation.messages_path().exists());
        assert!(store.cached(&peer(10)).is_none());
        assert!(!store.is_unread(&peer(10)));
        assert!(store.list_conversations().is_empty());

        // The old handle is emptied and no longer follows the peer
        assert!(conversation.is_empty());
        assert!(!conversation.is_unread());
        store.ingest(&inbound(peer(10), "hello again"), false).unwrap();
        assert!(conversation.is_empty());
        let reopened = store.open(peer(10), false).unwrap();
        assert!(!Arc::ptr_eq(&conversation, &reopened));
        assert_eq!(reopened.len(), 1);

        // Missing conversations are not an error
        store.delete_conversation(&peer(10));
        store.delete_conversation(&peer(10));
    }

    #[test]
    fn test_announce_from_ignored_peer_is_dropped() {
        let dir = tempdir().unwrap();
        let config = StoreConfig {
            ignored_peers: vec![peer(11)],
            ..test_config(dir.path())
        };
        let network = Arc::new(FakeNetwork::default());
        let store = ConversationStore::new(
            config,
            Collaborators::new(network.clone(), network.clone(), network.clone()),
        )
        .unwrap();
        let identity = Identity {
            destination: peer(11),
            public_key: vec![11],
        };

        store.on_announce(&peer(11), &identity, b"spammer");
        assert!(network.announces.lock().is_empty());

        store.unignore(&peer(11));
        store.on_announce(&peer(11), &identity, b"spammer");
        assert_eq!(network.announces.lock().len(), 1);

        store.ignore(peer(11));
        assert!(store.is_ignored(&peer(11)));
    }

    #[test]
    fn test_announce_resolves_open_conversation() {
        let dir = tempdir().unwrap();
        let (store, network) = test_store(dir.path());
        let conversation = store.open(peer(12), true).unwrap();
        assert!(!conversation.is_source_known());
        let calls = count_callbacks(&store);

        let mut app_data = Vec::new();
        rmpv::encode::write_value(
            &mut app_data,
            &rmpv::Value::Array(vec![rmpv::Value::Binary(b"Carol".to_vec())]),
        )
        .unwrap();
        let identity = Identity {
            destination: peer(12),
            public_key: vec![12],
        };
        store.on_announce(&peer(12), &identity, &app_data);

        assert!(conversation.is_source_known());
        assert_eq!(conversation.send_destination(), Some(peer(12)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*network.announces.lock(), vec![(peer(12), b"Carol".to_vec())]);
    }

    #[test]
    fn test_announce_for_unknown_peer_is_still_forwarded() {
        let dir = tempdir().unwrap();
        let (store, network) = test_store(dir.path());
        let calls = count_callbacks(&store);
        let identity = Identity {
            destination: peer(13),
            public_key: vec![13],
        };

        store.on_announce(&peer(13), &identity, b"");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(network.announces.lock().len(), 1);
        assert!(store.list_conversations().is_empty());
    }

    #[test]
    fn test_query_for_peer_requests_path() {
        let dir = tempdir().unwrap();
        let (store, network) = test_store(dir.path());
        store.query_for_peer(&peer(14));
        assert_eq!(*network.path_requests.lock(), vec![peer(14)]);
    }

    #[test]
    fn test_racing_opens_share_one_instance() {
        let dir = tempdir().unwrap();
        let (store, _network) = test_store(dir.path());
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    store.open(peer(15), true).unwrap()
                })
            })
            .collect();
        let opened: Vec<Arc<Conversation>> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        let cached = store.cached(&peer(15)).unwrap();
        for conversation in &opened {
            assert!(Arc::ptr_eq(conversation, &cached));
        }
    }

    #[test]
    fn test_concurrent_ingest_of_same_message() {
        let dir = tempdir().unwrap();
        let (store, _network) = test_store(dir.path());
        let message = inbound(peer(16), "echo");
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let barrier = barrier.clone();
                let message = message.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    store.ingest(&message, false)
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap().is_ok());
        }

        let conversation_dir = store.config().conversation_path.join(peer(16).to_hex());
        let mut names: Vec<String> = std::fs::read_dir(&conversation_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        let mut expected = vec![message.hash.to_hex(), UNREAD_MARKER.to_string()];
        expected.sort();
        assert_eq!(names, expected);
    }

    #[cfg(unix)]
    #[test]
    fn test_print_uses_configured_command() {
        let dir = tempdir().unwrap();
        let network = Arc::new(FakeNetwork::default());
        network.know_identity(peer(17));

        let open_store = |command: &str| {
            let config = StoreConfig {
                print_command: command.to_string(),
                ..test_config(dir.path())
            };
            ConversationStore::new(
                config,
                Collaborators::new(network.clone(), network.clone(), network.clone()),
            )
            .unwrap()
        };

        let printing = open_store("test -f");
        let conversation = printing.open(peer(17), true).unwrap();
        let output = conversation.paper_output("print me", "", PaperMode::PrintQr).unwrap();
        assert_eq!(output, PaperOutput::Printed(true));
        assert_eq!(conversation.len(), 1);
        assert!(network.printed.lock().is_empty());

        let refusing = open_store("test -d");
        let conversation = refusing.open(peer(17), true).unwrap();
        let output = conversation.paper_output("not me", "", PaperMode::PrintQr).unwrap();
        assert_eq!(output, PaperOutput::Printed(false));
        assert_eq!(conversation.len(), 1);
    }
}
