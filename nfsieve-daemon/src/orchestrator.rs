//! Daemon orchestration -- engine assembly, stdio wiring and lifecycle.
//!
//! The [`Orchestrator`] owns the validated configuration and runs the
//! daemon to completion.
//!
//! # Startup Order
//!
//! 1. Metrics recorder (if enabled)
//! 2. Notice writer on stdout
//! 3. Queue engine: allocate input then output block, start pumps and workers
//! 4. `QUEUE INPUT .. OUTPUT ..` line
//! 5. Config distributor on stdin, read by a detached thread
//!
//! # Termination
//!
//! - `SIGINT` / `SIGTERM`: clean shutdown, `Ok(())`
//! - Control channel EOF or read error: shutdown, then `Err`

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use nfsieve_core::config::NfsieveConfig;
use nfsieve_core::queue::QueueBinder;
use nfsieve_queue_engine::QueueEngine;
use nfsieve_queue_engine::notice::{self, Notice};

use crate::metrics_server;

/// Upper bound for flushing pending notices at shutdown.
const NOTICE_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// The daemon orchestrator.
pub struct Orchestrator {
    /// Loaded and validated configuration.
    config: NfsieveConfig,
}

impl Orchestrator {
    /// Build from an already-resolved configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration fails validation.
    pub fn new(config: NfsieveConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;
        Ok(Self { config })
    }

    /// Get a reference to the loaded configuration.
    pub fn config(&self) -> &NfsieveConfig {
        &self.config
    }

    /// Run against the kernel: NFQUEUE binding, stdin, stdout and signals.
    #[cfg(target_os = "linux")]
    pub async fn run(self) -> Result<()> {
        use tokio::io::BufReader;
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())
            .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
        let mut sigint = signal(SignalKind::interrupt())
            .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;
        let shutdown = async move {
            let signal = tokio::select! {
                _ = sigterm.recv() => "SIGTERM",
                _ = sigint.recv() => "SIGINT",
            };
            tracing::info!(signal, "shutdown signal received");
        };

        let control =
            crate::control::spawn_reader_pipe(std::io::stdin(), tokio::runtime::Handle::current())
                .map_err(|e| anyhow::anyhow!("failed to start control reader: {}", e))?;

        self.run_with(
            nfsieve_queue_engine::NetlinkBinder::new(),
            BufReader::new(control),
            tokio::io::stdout(),
            shutdown,
        )
        .await
    }

    #[cfg(not(target_os = "linux"))]
    pub async fn run(self) -> Result<()> {
        Err(anyhow::anyhow!("nfsieve requires Linux NFQUEUE support"))
    }

    /// Run with explicit collaborators until shutdown or control failure.
    ///
    /// # Errors
    ///
    /// - Metrics recorder installation fails
    /// - Queue allocation fails (contention exhaustion, kernel open error)
    /// - The control channel reaches EOF or fails to read
    pub async fn run_with<B, R, W, F>(
        self,
        binder: B,
        control: R,
        output: W,
        shutdown: F,
    ) -> Result<()>
    where
        B: QueueBinder,
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
        F: Future<Output = ()>,
    {
        if self.config.metrics.enabled {
            metrics_server::install_metrics_recorder(&self.config.metrics)?;
        }

        let (notice_tx, notice_rx) = mpsc::channel::<Notice>(self.config.control.notice_capacity);
        let mut writer = tokio::spawn(notice::write_notices(notice_rx, output));

        let cancel = CancellationToken::new();
        let engine = QueueEngine::builder()
            .binder(binder)
            .queue_count(self.config.queue.count)
            .base_id(self.config.queue.base_id)
            .spec(self.config.queue.spec())
            .notices(notice_tx.clone())
            .cancel_token(cancel.child_token())
            .start()
            .map_err(|e| anyhow::anyhow!("failed to start queue engine: {}", e))?;

        if notice_tx.send(engine.queues_notice()).await.is_err() {
            return Err(anyhow::anyhow!("stdout writer stopped before startup"));
        }
        drop(notice_tx);

        tracing::info!(
            queues = self.config.queue.count,
            "nfsieve running, waiting for rule updates on stdin"
        );

        let distributor = engine.distributor();
        let outcome = tokio::select! {
            result = distributor.run(control, cancel.clone()) => result
                .map_err(|e| anyhow::anyhow!("control channel failed: {}", e)),
            () = shutdown => Ok(()),
        };

        cancel.cancel();
        engine.shutdown().await;

        // the writer exits once every notice sender is gone
        match tokio::time::timeout(NOTICE_DRAIN_TIMEOUT, &mut writer).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => tracing::warn!(error = %e, "failed to write notices to stdout"),
            Ok(Err(e)) => tracing::warn!(error = %e, "notice writer task failed"),
            Err(_) => {
                tracing::warn!("notice writer did not drain in time");
                writer.abort();
            }
        }

        match &outcome {
            Ok(()) => tracing::info!("nfsieve shut down"),
            Err(e) => tracing::error!(error = %e, "nfsieve stopped"),
        }
        outcome
    }
}
