//! Hand-written fakes of the collaborator traits for unit tests.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::collaborators::{Collaborators, DeliveryCallback, Directory, InFlightSet, Printer, Router, Transport};
use crate::config::StoreConfig;
use crate::models::{
    DeliveryState, Identity, LxMessage, MessageHash, PeerId, PreferredDelivery, TrustLevel,
};
use crate::store::ConversationStore;

pub const LOCAL: PeerId = PeerId::from_bytes([0xEE; 16]);

pub fn peer(byte: u8) -> PeerId {
    PeerId::from_bytes([byte; 16])
}

#[derive(Default)]
pub struct FakeInFlight {
    queued: Mutex<HashSet<MessageHash>>,
    awaiting_stamp: Mutex<HashSet<MessageHash>>,
}

impl FakeInFlight {
    pub fn queue(&self, hash: MessageHash) {
        self.queued.lock().insert(hash);
    }

    pub fn await_stamp(&self, hash: MessageHash) {
        self.awaiting_stamp.lock().insert(hash);
    }

    pub fn clear(&self) {
        self.queued.lock().clear();
        self.awaiting_stamp.lock().clear();
    }
}

impl InFlightSet for FakeInFlight {
    fn is_queued(&self, hash: &MessageHash) -> bool {
        self.queued.lock().contains(hash)
    }

    fn is_awaiting_stamp(&self, hash: &MessageHash) -> bool {
        self.awaiting_stamp.lock().contains(hash)
    }
}

/// Scriptable transport, router, directory and printer in one.
#[derive(Default)]
pub struct FakeNetwork {
    pub in_flight: FakeInFlight,
    identities: Mutex<HashSet<PeerId>>,
    app_data: Mutex<HashMap<PeerId, Vec<u8>>>,
    ratchets: Mutex<HashSet<PeerId>>,
    links: Mutex<HashSet<PeerId>>,
    propagation_node: Mutex<Option<PeerId>>,
    names: Mutex<HashMap<PeerId, String>>,
    trust: Mutex<HashMap<PeerId, TrustLevel>>,
    preferred: Mutex<HashMap<PeerId, PreferredDelivery>>,
    print_accepts: AtomicBool,
    /// Outcome reported from inside `handle_outbound`, before it returns
    immediate_outcome: Mutex<Option<DeliveryState>>,
    dispatched: Mutex<Vec<(LxMessage, DeliveryCallback)>>,
    pub announces: Mutex<Vec<(PeerId, Vec<u8>)>>,
    pub path_requests: Mutex<Vec<PeerId>>,
    pub printed: Mutex<Vec<PathBuf>>,
}

impl FakeNetwork {
    pub fn know_identity(&self, peer: PeerId) {
        self.identities.lock().insert(peer);
    }

    pub fn set_app_data(&self, peer: PeerId, data: &[u8]) {
        self.app_data.lock().insert(peer, data.to_vec());
    }

    pub fn set_ratchet(&self, peer: PeerId) {
        self.ratchets.lock().insert(peer);
    }

    pub fn open_link(&self, peer: PeerId) {
        self.links.lock().insert(peer);
    }

    pub fn set_propagation_node(&self, node: Option<PeerId>) {
        *self.propagation_node.lock() = node;
    }

    pub fn set_name(&self, peer: PeerId, name: &str) {
        self.names.lock().insert(peer, name.to_string());
    }

    pub fn set_trust(&self, peer: PeerId, level: TrustLevel) {
        self.trust.lock().insert(peer, level);
    }

    pub fn set_preferred(&self, peer: PeerId, preferred: PreferredDelivery) {
        self.preferred.lock().insert(peer, preferred);
    }

    pub fn accept_prints(&self, accept: bool) {
        self.print_accepts.store(accept, Ordering::SeqCst);
    }

    pub fn complete_immediately(&self, outcome: Option<DeliveryState>) {
        *self.immediate_outcome.lock() = outcome;
    }

    pub fn dispatched(&self) -> Vec<LxMessage> {
        self.dispatched.lock().iter().map(|(m, _)| m.clone()).collect()
    }

    /// Complete the `index`th dispatch by handing `message` to its callback.
    pub fn complete(&self, index: usize, message: LxMessage) {
        let callback = self.dispatched.lock()[index].1.clone();
        self.in_flight.clear();
        callback(message);
    }
}

impl Transport for FakeNetwork {
    fn recall_identity(&self, peer: &PeerId) -> Option<Identity> {
        self.identities.lock().contains(peer).then(|| Identity {
            destination: *peer,
            public_key: peer.as_bytes().to_vec(),
        })
    }

    fn recall_app_data(&self, peer: &PeerId) -> Option<Vec<u8>> {
        self.app_data.lock().get(peer).cloned()
    }

    fn request_path(&self, peer: &PeerId) -> Result<(), String> {
        self.path_requests.lock().push(*peer);
        Ok(())
    }

    fn current_ratchet_id(&self, peer: &PeerId) -> Option<Vec<u8>> {
        self.ratchets.lock().contains(peer).then(|| vec![1, 2, 3])
    }
}

impl InFlightSet for FakeNetwork {
    fn is_queued(&self, hash: &MessageHash) -> bool {
        self.in_flight.is_queued(hash)
    }

    fn is_awaiting_stamp(&self, hash: &MessageHash) -> bool {
        self.in_flight.is_awaiting_stamp(hash)
    }
}

impl Router for FakeNetwork {
    fn handle_outbound(&self, message: LxMessage, on_complete: DeliveryCallback) {
        self.dispatched
            .lock()
            .push((message.clone(), on_complete.clone()));

        let outcome = *self.immediate_outcome.lock();
        match outcome {
            Some(state) => {
                let mut reported = message;
                reported.state = state;
                on_complete(reported);
            }
            None => self.in_flight.queue(message.hash),
        }
    }

    fn delivery_link_available(&self, peer: &PeerId) -> bool {
        self.links.lock().contains(peer)
    }

    fn outbound_propagation_node(&self) -> Option<PeerId> {
        *self.propagation_node.lock()
    }

    fn paper_qr_png(&self, message: &LxMessage) -> Result<Vec<u8>, String> {
        let mut png = b"\x89PNG".to_vec();
        png.extend_from_slice(message.hash.as_bytes());
        Ok(png)
    }
}

impl Directory for FakeNetwork {
    fn display_name(&self, peer: &PeerId) -> Option<String> {
        self.names.lock().get(peer).cloned()
    }

    fn trust_level(&self, peer: &PeerId, _display_name: Option<&str>) -> TrustLevel {
        self.trust.lock().get(peer).copied().unwrap_or(TrustLevel::Unknown)
    }

    fn preferred_delivery(&self, peer: &PeerId) -> PreferredDelivery {
        self.preferred.lock().get(peer).copied().unwrap_or_default()
    }

    fn announce_received(&self, peer: &PeerId, app_data: &[u8]) {
        self.announces.lock().push((*peer, app_data.to_vec()));
    }
}

impl Printer for FakeNetwork {
    fn print_file(&self, path: &Path) -> bool {
        // The temp file must still exist while printing
        assert!(path.is_file());
        self.printed.lock().push(path.to_path_buf());
        self.print_accepts.load(Ordering::SeqCst)
    }
}

pub fn test_config(root: &Path) -> StoreConfig {
    let mut config = StoreConfig::new(root);
    config.downloads_path = root.join("downloads");
    config.local_destination = Some(LOCAL);
    config
}

pub fn test_store(root: &Path) -> (ConversationStore, Arc<FakeNetwork>) {
    let network = Arc::new(FakeNetwork::default());
    let collaborators = Collaborators::new(network.clone(), network.clone(), network.clone())
        .with_printer(network.clone());
    let store = ConversationStore::new(test_config(root), collaborators).unwrap();
    (store, network)
}

/// A received message from `from`, already delivered.
pub fn inbound(from: PeerId, content: &str) -> LxMessage {
    let mut message = LxMessage::new(
        LOCAL,
        from,
        content,
        "",
        crate::models::DeliveryMethod::Direct,
        false,
    );
    message.state = DeliveryState::Delivered;
    message
}
