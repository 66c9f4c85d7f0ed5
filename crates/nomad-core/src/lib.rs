pub mod announce;
pub mod codec;
pub mod collaborators;
pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod store;
pub mod tracing_setup;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export the store surface at crate root for convenience
pub use collaborators::Collaborators;
pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use store::{Conversation, ConversationEntry, ConversationStore};
