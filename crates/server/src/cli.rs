use clap::Parser;

/// Command-line arguments for the jobforge server.
#[derive(Debug, Clone, Parser)]
#[command(name = "jobforge-server", version, about = "jobforge job-execution server")]
pub struct Cli {
    /// TCP port to listen on (1024-65535).
    #[arg(env = "JOBFORGE_PORT")]
    pub port: u16,

    /// Maximum request frame size in bytes.
    #[arg(env = "JOBFORGE_BUFFER_SIZE")]
    pub buffer_size: usize,

    /// Maximum number of connections served concurrently.
    #[arg(env = "JOBFORGE_THREAD_POOL_SIZE")]
    pub thread_pool_size: usize,
}
