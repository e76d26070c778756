mod cli;

use anyhow::Context as _;
use clap::Parser;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use jobforge_core::protocol::DONE_TOKEN;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let request = cli.command.to_request().encode();
    let mut stream = TcpStream::connect((cli.host.as_str(), cli.port))
        .await
        .with_context(|| format!("connect to {}:{}", cli.host, cli.port))?;

    stream
        .write_all(request.as_bytes())
        .await
        .context("send request")?;

    // Print the response stream verbatim until the acknowledgment token
    // shows up in the received bytes, then close.
    let mut stdout = tokio::io::stdout();
    let mut response = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = stream.read(&mut buf).await.context("read response")?;
        if n == 0 {
            break;
        }
        stdout
            .write_all(&buf[..n])
            .await
            .context("write output")?;
        response.extend_from_slice(&buf[..n]);
        if String::from_utf8_lossy(&response).contains(DONE_TOKEN) {
            break;
        }
    }
    let _ = stdout.flush().await;

    Ok(())
}
