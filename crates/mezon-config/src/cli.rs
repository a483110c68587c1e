//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::{Config, ConfigError};

/// Mezon client command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "mezon", about = "Mezon realtime client")]
pub struct CliArgs {
    /// Gateway host.
    #[arg(long)]
    pub host: Option<String>,

    /// Gateway port.
    #[arg(long)]
    pub port: Option<u16>,

    /// Connect over TLS (`wss://`).
    #[arg(long)]
    pub use_ssl: Option<bool>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl CliArgs {
    /// The `--config` directory, or the per-user default.
    pub fn config_dir(&self) -> Result<PathBuf, ConfigError> {
        match self.config {
            Some(ref dir) => Ok(dir.clone()),
            None => Config::default_dir(),
        }
    }
}

impl Config {
    /// Load (or create) the config from the CLI's config directory, then apply overrides.
    pub fn load_with_cli(args: &CliArgs) -> Result<Self, ConfigError> {
        let mut config = Self::load_or_create(&args.config_dir()?)?;
        config.apply_cli_overrides(args);
        config.validate()?;
        Ok(config)
    }

    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref host) = args.host {
            self.connection.host = host.clone();
        }
        if let Some(port) = args.port {
            self.connection.port = port;
        }
        if let Some(use_ssl) = args.use_ssl {
            self.connection.use_ssl = use_ssl;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
