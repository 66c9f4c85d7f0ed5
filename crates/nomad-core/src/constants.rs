//! Store-wide constants
//!
//! Lengths and file names that define the on-disk conversation layout.

/// Length in bytes of a truncated peer identity hash
pub const PEER_ID_LEN: usize = 16;

/// Length in bytes of a full message content hash
pub const MESSAGE_HASH_LEN: usize = 32;

/// Zero-byte sentinel inside a conversation directory meaning "unseen content"
pub const UNREAD_MARKER: &str = "unread";

/// Suffix for in-progress message writes, renamed into place once complete
pub const PARTIAL_WRITE_SUFFIX: &str = "part";

/// Scheme prefix for paper message URIs
pub const PAPER_URI_SCHEME: &str = "lxm://";

/// Prefix for saved paper message artifacts in the downloads directory
pub const PAPER_FILE_PREFIX: &str = "LXM_";

/// Application name used for the default data directory
pub const APP_DIR_NAME: &str = "nomad";

/// Default command used to print paper messages
pub const DEFAULT_PRINT_COMMAND: &str = "lp";
