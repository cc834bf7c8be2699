//! CLI argument definitions for the nfsieve daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use nfsieve_core::config::NfsieveConfig;

/// Inline regex packet filter on Linux NFQUEUE.
///
/// Binds a block of queues per direction, prints the bound ranges on stdout
/// and reads rule updates from stdin, one line per update.
#[derive(Parser, Debug)]
#[command(name = "nfsieve")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Number of queues per direction.
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(value_parser = clap::value_parser!(u16).range(1..))]
    pub queues: Option<u16>,

    /// Path to nfsieve.toml configuration file.
    ///
    /// Built-in defaults are used when omitted.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration and exit without binding any queue.
    #[arg(long)]
    pub validate: bool,
}

impl DaemonCli {
    /// Resolve the effective configuration.
    ///
    /// Priority: CLI > environment (`NFSIEVE_*`) > file > defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed, or if
    /// the merged configuration fails validation.
    pub async fn resolve_config(&self) -> Result<NfsieveConfig> {
        // validated once below, after every layer is merged
        let mut config = match &self.config {
            Some(path) => NfsieveConfig::from_file(path)
                .await
                .map_err(|e| anyhow::anyhow!("failed to load config {}: {}", path.display(), e))?,
            None => NfsieveConfig::default(),
        };
        config.apply_env_overrides();

        if let Some(count) = self.queues {
            config.queue.count = count;
        }
        if let Some(level) = &self.log_level {
            config.general.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.general.log_format = format.clone();
        }

        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;
        Ok(config)
    }
}
