use anyhow::Result;
use clap::Parser;

use nfsieve_daemon::cli::DaemonCli;
use nfsieve_daemon::orchestrator::Orchestrator;
use nfsieve_daemon::{logging, privilege};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    // CLI > env > file > defaults
    let config = cli.resolve_config().await?;

    if cli.validate {
        eprintln!("configuration is valid");
        return Ok(());
    }

    logging::init_tracing(&config.general)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        queues = config.queue.count,
        "nfsieve starting"
    );

    privilege::ensure_root()?;

    Orchestrator::new(config)?.run().await
}
