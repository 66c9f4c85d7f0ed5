use std::path::{Path, PathBuf};

use crate::models::{MessageHash, PeerId};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Message file is corrupt, truncated or fails its hash check.
    #[error("Could not decode message at {}: {reason}", path.display())]
    Decode { path: PathBuf, reason: String },

    /// No identity is known for the peer, so nothing can be addressed to it.
    #[error("Destination {0} is not known, cannot create message")]
    DestinationUnknown(PeerId),

    #[error("Could not encode message {hash}: {reason}")]
    Encode { hash: MessageHash, reason: String },

    #[error("Stamp generation failed for message {0}")]
    StampGenerationFailure(MessageHash),

    #[error("Delivery of message {0} failed")]
    DeliveryFailure(MessageHash),

    #[error("Filesystem error at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not export paper message: {0}")]
    Export(String),

    #[error("Invalid peer identifier: {0}")]
    InvalidPeerId(String),

    #[error("Conversation store has been shut down")]
    StoreClosed,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl StoreError {
    pub(crate) fn fs(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        StoreError::Filesystem {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub(crate) fn decode(path: impl AsRef<Path>, reason: impl ToString) -> Self {
        StoreError::Decode {
            path: path.as_ref().to_path_buf(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
