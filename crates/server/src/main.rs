use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use jobforge_engine::SchedulerConfig;
use jobforge_server::cli::Cli;
use jobforge_server::shutdown::spawn_ctrl_c_handler;
use jobforge_server::{Server, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if cli.port < 1024 {
        anyhow::bail!("port must be in 1024..=65535");
    }
    if cli.buffer_size < 1 {
        anyhow::bail!("buffer size must be >= 1");
    }
    if cli.thread_pool_size < 1 {
        anyhow::bail!("thread pool size must be >= 1");
    }

    let server = Server::bind(ServerConfig {
        port: cli.port,
        buffer_size: cli.buffer_size,
        thread_pool_size: cli.thread_pool_size,
        concurrency: SchedulerConfig::DEFAULT_CONCURRENCY,
    })
    .await?;

    info!(addr = %server.local_addr(), "jobforge server listening");

    spawn_ctrl_c_handler(server.shutdown_flag(), server.scheduler_client());

    server.run().await
}
