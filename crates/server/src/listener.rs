use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context as _;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use jobforge_engine::{SchedulerClient, SchedulerConfig, SchedulerHandle, start_scheduler};

use crate::dispatcher;
use crate::shutdown::ShutdownFlag;

/// Configuration for a server instance.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP port to bind (0 picks an ephemeral port).
    pub port: u16,
    /// Maximum request frame size in bytes.
    pub buffer_size: usize,
    /// Maximum number of connections served concurrently.
    pub thread_pool_size: usize,
    /// Initial concurrency level for the scheduler.
    pub concurrency: usize,
}

impl ServerConfig {
    /// Default request frame bound.
    pub const DEFAULT_BUFFER_SIZE: usize = 4096;
    /// Default bound on concurrently served connections.
    pub const DEFAULT_THREAD_POOL_SIZE: usize = 32;
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 0,
            buffer_size: Self::DEFAULT_BUFFER_SIZE,
            thread_pool_size: Self::DEFAULT_THREAD_POOL_SIZE,
            concurrency: SchedulerConfig::DEFAULT_CONCURRENCY,
        }
    }
}

/// A bound server, ready to accept connections.
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    scheduler: SchedulerHandle,
    shutdown: Arc<ShutdownFlag>,
    buffer_size: usize,
    thread_pool_size: usize,
}

impl Server {
    /// Bind the listening socket and start the scheduler task.
    ///
    /// A bind failure is fatal: the caller is expected to exit non-zero.
    pub async fn bind(config: ServerConfig) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", config.port))
            .await
            .with_context(|| format!("bind port {}", config.port))?;
        let local_addr = listener.local_addr().context("query bound address")?;
        let scheduler = start_scheduler(SchedulerConfig {
            concurrency: config.concurrency,
        });
        Ok(Self {
            listener,
            local_addr,
            scheduler,
            shutdown: Arc::new(ShutdownFlag::default()),
            buffer_size: config.buffer_size.max(1),
            thread_pool_size: config.thread_pool_size.max(1),
        })
    }

    /// The bound address (useful when the configured port was 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The shutdown flag shared with signal handlers.
    pub fn shutdown_flag(&self) -> Arc<ShutdownFlag> {
        self.shutdown.clone()
    }

    /// A client for the embedded scheduler.
    pub fn scheduler_client(&self) -> SchedulerClient {
        self.scheduler.client()
    }

    /// Accept connections until shutdown is requested, then drain: running
    /// jobs first, then every in-flight dispatcher.
    pub async fn run(self) -> anyhow::Result<()> {
        let permits = Arc::new(Semaphore::new(self.thread_pool_size));
        let scheduler = self.scheduler.client();

        loop {
            if self.shutdown.is_requested() {
                break;
            }

            // Hard cap on concurrent dispatchers: a permit is held for the
            // whole lifetime of each connection.
            let permit = tokio::select! {
                _ = self.shutdown.notified() => break,
                permit = permits.clone().acquire_owned() => {
                    permit.context("dispatcher semaphore closed")?
                }
            };

            let stream = tokio::select! {
                _ = self.shutdown.notified() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(%peer, "connection accepted");
                        stream
                    }
                    Err(err) => {
                        warn!(%err, "accept failed");
                        continue;
                    }
                },
            };

            let scheduler = scheduler.clone();
            let shutdown = self.shutdown.clone();
            let buffer_size = self.buffer_size;
            tokio::spawn(async move {
                let _permit = permit;
                if let Err(err) =
                    dispatcher::handle_connection(stream, scheduler, shutdown, buffer_size).await
                {
                    warn!(%err, "connection handler failed");
                }
            });
        }

        drop(self.listener);
        info!("listener stopped; draining");

        // Running jobs finish (or are already cancelled), then the in-flight
        // dispatchers flush their acknowledgments.
        self.scheduler.wait().await;
        let all = u32::try_from(self.thread_pool_size).unwrap_or(u32::MAX);
        let _ = permits.acquire_many_owned(all).await;

        info!("server stopped");
        Ok(())
    }
}
