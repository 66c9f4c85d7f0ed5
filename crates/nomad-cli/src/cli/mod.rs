pub mod commands;
pub mod config;

pub use commands::{execute, parse_peer, CliCommand};
pub use config::resolve_config;
