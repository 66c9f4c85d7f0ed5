//! Packed on-disk message format.
//!
//! Each message file is a versioned bincode envelope. The content hash is
//! recomputed on decode, so a truncated or tampered file is rejected instead
//! of being shown with the wrong identity.

use serde::{Deserialize, Serialize};

use crate::constants::PAPER_URI_SCHEME;
use crate::models::{
    DeliveryMethod, DeliveryState, LxMessage, MessageHash, PeerId, UnverifiedReason,
};

/// Bump whenever `PackedMessage` changes shape.
pub const PACKED_FORMAT_VERSION: u8 = 1;

/// Encoder/decoder pair between message files and structured messages.
pub trait MessageCodec: Send + Sync {
    fn encode(&self, message: &LxMessage) -> Result<Vec<u8>, CodecError>;
    fn decode(&self, bytes: &[u8]) -> Result<LxMessage, CodecError>;
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("unsupported format version {0}")]
    Version(u8),

    #[error("malformed message container: {0}")]
    Malformed(#[from] bincode::Error),

    #[error("content hash mismatch, stored {stored} but content hashes to {computed}")]
    HashMismatch {
        stored: MessageHash,
        computed: MessageHash,
    },
}

#[derive(Serialize, Deserialize)]
struct PackedMessage {
    version: u8,
    destination: PeerId,
    source: PeerId,
    timestamp: f64,
    title: String,
    content: String,
    hash: MessageHash,
    state: DeliveryState,
    method: DeliveryMethod,
    include_ticket: bool,
    transport_encryption: Option<String>,
    transport_encrypted: bool,
    signature_validated: bool,
    unverified_reason: Option<UnverifiedReason>,
}

/// Default codec used by the store and the CLI.
#[derive(Debug, Clone, Copy, Default)]
pub struct PackedCodec;

impl MessageCodec for PackedCodec {
    fn encode(&self, message: &LxMessage) -> Result<Vec<u8>, CodecError> {
        let packed = PackedMessage {
            version: PACKED_FORMAT_VERSION,
            destination: message.destination,
            source: message.source,
            timestamp: message.timestamp,
            title: message.title.clone(),
            content: message.content.clone(),
            hash: message.hash,
            state: message.state,
            method: message.desired_method,
            include_ticket: message.include_ticket,
            transport_encryption: message.transport_encryption.clone(),
            transport_encrypted: message.transport_encrypted,
            signature_validated: message.signature_validated,
            unverified_reason: message.unverified_reason,
        };
        Ok(bincode::serialize(&packed)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<LxMessage, CodecError> {
        // Version byte is the first field of the envelope
        match bytes.first() {
            Some(&PACKED_FORMAT_VERSION) => {}
            Some(&other) => return Err(CodecError::Version(other)),
            None => {
                return Err(CodecError::Malformed(Box::new(bincode::ErrorKind::Custom(
                    "empty file".to_string(),
                ))))
            }
        }

        let packed: PackedMessage = bincode::deserialize(bytes)?;
        let message = LxMessage {
            destination: packed.destination,
            source: packed.source,
            timestamp: packed.timestamp,
            title: packed.title,
            content: packed.content,
            hash: packed.hash,
            state: packed.state,
            desired_method: packed.method,
            include_ticket: packed.include_ticket,
            transport_encryption: packed.transport_encryption,
            transport_encrypted: packed.transport_encrypted,
            signature_validated: packed.signature_validated,
            unverified_reason: packed.unverified_reason,
            try_propagation_on_fail: false,
            delivery_attempts: 0,
            next_delivery_attempt: None,
            packed: None,
            stamp_generation_failed: false,
        };

        let computed = message.computed_hash();
        if computed != message.hash {
            return Err(CodecError::HashMismatch {
                stored: message.hash,
                computed,
            });
        }

        Ok(message)
    }
}

/// Render a message as a paper transfer URI.
pub fn paper_uri(codec: &dyn MessageCodec, message: &LxMessage) -> Result<String, CodecError> {
    let bytes = codec.encode(message)?;
    Ok(format!("{}{}", PAPER_URI_SCHEME, hex::encode(bytes)))
}
