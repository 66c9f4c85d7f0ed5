use serde::{Deserialize, Serialize};

use super::PeerId;

/// Trust classification from the contacts directory.
///
/// Ordering follows the directory's numeric levels, so sorting descending
/// puts trusted peers first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TrustLevel {
    Warning = 0x00,
    Untrusted = 0x01,
    Unknown = 0x02,
    Trusted = 0xFF,
}

impl TrustLevel {
    pub fn label(&self) -> &'static str {
        match self {
            TrustLevel::Warning => "warning",
            TrustLevel::Untrusted => "untrusted",
            TrustLevel::Unknown => "unknown",
            TrustLevel::Trusted => "trusted",
        }
    }
}

/// Delivery preference a user recorded for a peer in the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PreferredDelivery {
    #[default]
    Direct,
    Propagated,
}

/// Identity recalled by the transport layer for a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Delivery destination derived from the identity
    pub destination: PeerId,
    pub public_key: Vec<u8>,
}
