//! Configuration for the Mezon realtime client.
//!
//! Settings persist to disk as RON and can be overridden from the command
//! line. Every field has a default, so partial or older files still load.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    Config, ConnectionConfig, DebugConfig, HeartbeatConfig, MAX_BACKOFF_MULTIPLIER, RateLimitConfig,
    ReconnectConfig,
};
pub use error::ConfigError;
