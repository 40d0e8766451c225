use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use turtle_server::{ServerConfig, TurtleServer};

#[derive(Parser)]
#[command(name = "turtled", version, about = "Turtle credential manager server")]
struct Cli {
    /// Path to TOML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listen address.
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Override the WAL file.
    #[arg(long, conflicts_with = "in_memory")]
    wal: Option<PathBuf>,

    /// Keep the event log in memory only.
    #[arg(long)]
    in_memory: bool,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => ServerConfig::default(),
        };
        if let Some(bind) = self.bind {
            config.bind_addr = bind;
        }
        if let Some(wal) = self.wal {
            config.wal_path = Some(wal);
        }
        if self.in_memory {
            config.wal_path = None;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Cli::parse().into_config()?;
    let server = TurtleServer::new(config).context("starting server")?;
    server.serve().await?;
    Ok(())
}
