pub mod conversation;
pub mod conversation_store;
pub mod delivery;
pub mod reconcile;
pub mod record;

pub use conversation::{ChangedCallback, Conversation, NotificationOutcome, PaperMode, PaperOutput};
pub use conversation_store::{ConversationEntry, ConversationStore, StoreChangedCallback};
pub use delivery::{select_delivery, DeliveryInputs, DeliveryPlan};
pub use reconcile::reconcile;
pub use record::{LoadState, LoadedMessage, MessageRecord};
