pub mod directory;
pub mod message;
pub mod peer;

pub use directory::{Identity, PreferredDelivery, TrustLevel};
pub use message::{
    content_hash, DeliveryMethod, DeliveryState, LxMessage, SignatureStatus, UnverifiedReason,
};
pub use peer::{MessageHash, PeerId};
