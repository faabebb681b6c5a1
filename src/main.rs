mod cli;
mod client;
mod network;
mod progress;
mod protocol;
mod server;
mod session;
mod storage;
mod transfer;

use anyhow::Result;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    let keepalive = cli.keepalive();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ferry=info")),
        )
        .init();

    match cli.command {
        Commands::Serve { ip, port, root } => {
            server::run(server::ServerConfig {
                ip,
                port,
                root,
                keepalive,
            })
            .await?;
        }
        Commands::Connect {
            host,
            port,
            root,
            timeout,
        } => {
            client::run(client::ClientConfig {
                host,
                port,
                root,
                read_timeout: timeout,
                keepalive,
            })
            .await?;
        }
    }

    Ok(())
}
