use anyhow::{Context, Result};
use attest_server::{FaultDelay, KvServer, MemoryStore};
use clap::Parser;
use tracing::{Level, info};

#[derive(Parser)]
#[command(name = "attest-server")]
#[command(about = "In-memory key-value server for attest", long_about = None)]
#[command(version)]
struct Cli {
    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:9090")]
    listen: String,

    /// Acknowledge writes before applying them after a random delay
    #[arg(long)]
    faulty: bool,

    /// Minimum apply delay in milliseconds (faulty mode)
    #[arg(long, default_value_t = 10)]
    min_delay_ms: u64,

    /// Maximum apply delay in milliseconds (faulty mode)
    #[arg(long, default_value_t = 100)]
    max_delay_ms: u64,

    /// Verbose logging
    #[arg(long)]
    debug: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.debug { Level::DEBUG } else { Level::INFO })
        .init();

    let store = if cli.faulty {
        MemoryStore::faulty(FaultDelay::from_millis(cli.min_delay_ms, cli.max_delay_ms))
    } else {
        MemoryStore::new()
    };

    let server = KvServer::bind(cli.listen.as_str(), store)
        .with_context(|| format!("failed to bind {}", cli.listen))?;
    info!(
        addr = %server.local_addr().context("no local address")?,
        faulty = cli.faulty,
        "serving"
    );
    server.run().context("server terminated")?;
    Ok(())
}
