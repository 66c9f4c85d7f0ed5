use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{MessageHash, PeerId};

/// How a message travels to its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeliveryMethod {
    /// Over an established link to the peer
    Direct,
    /// Store-and-forward through a propagation relay
    Propagated,
    /// Single packet without waiting for a fresh path
    Opportunistic,
    /// Out-of-band transfer (printed or saved code)
    Paper,
}

impl DeliveryMethod {
    pub fn label(&self) -> &'static str {
        match self {
            DeliveryMethod::Direct => "direct",
            DeliveryMethod::Propagated => "propagated",
            DeliveryMethod::Opportunistic => "opportunistic",
            DeliveryMethod::Paper => "paper",
        }
    }
}

/// Lifecycle stage of one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeliveryState {
    Generating,
    Sending(DeliveryMethod),
    Sent,
    Delivered,
    Propagated,
    Failed,
}

impl DeliveryState {
    /// True for states strictly between `Generating` and `Sent`, the only
    /// states that can be left stale by an interrupted process.
    pub fn is_in_progress(&self) -> bool {
        matches!(self, DeliveryState::Sending(_))
    }

    /// Whether no further transition is expected. `Sent` only ends the
    /// lifecycle of paper messages, which never get a delivery proof.
    pub fn is_terminal(&self, method: DeliveryMethod) -> bool {
        match self {
            DeliveryState::Delivered | DeliveryState::Propagated | DeliveryState::Failed => true,
            DeliveryState::Sent => method == DeliveryMethod::Paper,
            DeliveryState::Generating | DeliveryState::Sending(_) => false,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DeliveryState::Generating => "generating",
            DeliveryState::Sending(_) => "sending",
            DeliveryState::Sent => "sent",
            DeliveryState::Delivered => "delivered",
            DeliveryState::Propagated => "propagated",
            DeliveryState::Failed => "failed",
        }
    }
}

/// Why a signature could not be verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnverifiedReason {
    SourceUnknown,
    SignatureInvalid,
}

/// Outcome of signature validation as exposed to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureStatus {
    Verified,
    UnknownOrigin,
    InvalidSignature,
    Unverifiable,
}

impl SignatureStatus {
    pub fn from_validation(validated: bool, reason: Option<UnverifiedReason>) -> Self {
        if validated {
            return SignatureStatus::Verified;
        }
        match reason {
            Some(UnverifiedReason::SourceUnknown) => SignatureStatus::UnknownOrigin,
            Some(UnverifiedReason::SignatureInvalid) => SignatureStatus::InvalidSignature,
            None => SignatureStatus::Unverifiable,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            SignatureStatus::Verified => "Signature Verified",
            SignatureStatus::UnknownOrigin => "Unknown Origin",
            SignatureStatus::InvalidSignature => "Invalid Signature",
            SignatureStatus::Unverifiable => "Unknown signature validation failure",
        }
    }
}

/// Structured message as produced and consumed by the protocol layer.
#[derive(Debug, Clone, PartialEq)]
pub struct LxMessage {
    pub destination: PeerId,
    pub source: PeerId,
    /// Unix seconds with sub-second precision
    pub timestamp: f64,
    pub title: String,
    pub content: String,
    pub hash: MessageHash,
    pub state: DeliveryState,
    pub desired_method: DeliveryMethod,
    /// Attach an authentication ticket so the peer can reply without a stamp
    pub include_ticket: bool,
    /// Human readable transport encryption descriptor, if any
    pub transport_encryption: Option<String>,
    pub transport_encrypted: bool,
    pub signature_validated: bool,
    pub unverified_reason: Option<UnverifiedReason>,

    // Router bookkeeping, never persisted
    pub try_propagation_on_fail: bool,
    pub delivery_attempts: u32,
    pub next_delivery_attempt: Option<f64>,
    pub packed: Option<Vec<u8>>,
    pub stamp_generation_failed: bool,
}

impl LxMessage {
    /// Build a locally originated message in the `Generating` state.
    pub fn new(
        destination: PeerId,
        source: PeerId,
        content: &str,
        title: &str,
        desired_method: DeliveryMethod,
        include_ticket: bool,
    ) -> Self {
        let timestamp = now_secs_f64();
        let hash = content_hash(&destination, &source, timestamp, title, content);
        Self {
            destination,
            source,
            timestamp,
            title: title.to_string(),
            content: content.to_string(),
            hash,
            state: DeliveryState::Generating,
            desired_method,
            include_ticket,
            transport_encryption: None,
            transport_encrypted: false,
            // Locally originated messages are signed by us
            signature_validated: true,
            unverified_reason: None,
            try_propagation_on_fail: false,
            delivery_attempts: 0,
            next_delivery_attempt: None,
            packed: None,
            stamp_generation_failed: false,
        }
    }

    /// Peer whose conversation this message belongs to.
    pub fn conversation_peer(&self, originator: bool) -> PeerId {
        if originator {
            self.destination
        } else {
            self.source
        }
    }

    /// Clear delivery bookkeeping and retarget the message at a propagation relay.
    pub fn reset_for_propagation(&mut self) {
        self.try_propagation_on_fail = false;
        self.delivery_attempts = 0;
        self.next_delivery_attempt = None;
        self.packed = None;
        self.desired_method = DeliveryMethod::Propagated;
        self.state = DeliveryState::Sending(DeliveryMethod::Propagated);
    }

    /// Recompute the content hash from the current fields.
    pub fn computed_hash(&self) -> MessageHash {
        content_hash(
            &self.destination,
            &self.source,
            self.timestamp,
            &self.title,
            &self.content,
        )
    }
}

pub fn content_hash(
    destination: &PeerId,
    source: &PeerId,
    timestamp: f64,
    title: &str,
    content: &str,
) -> MessageHash {
    let mut hasher = Sha256::new();
    hasher.update(destination.as_bytes());
    hasher.update(source.as_bytes());
    hasher.update(timestamp.to_be_bytes());
    hasher.update((title.len() as u64).to_be_bytes());
    hasher.update(title.as_bytes());
    hasher.update(content.as_bytes());
    MessageHash::from_bytes(hasher.finalize().into())
}

fn now_secs_f64() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
