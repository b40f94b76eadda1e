//! LANLINK relay
//!
//! Binds a node, registers the configured peers and logs every payload the
//! tunnel delivers until interrupted.

mod config;

use clap::Parser;
use lanlink_core::{ChannelHandler, Delivery, Node};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use config::Config;

/// Interval between RTT reports
const REPORT_INTERVAL: Duration = Duration::from_secs(30);

/// LANLINK - internet relay for LAN game sessions
#[derive(Parser)]
#[command(name = "lanlink")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, default_value = "lanlink.toml")]
    config: PathBuf,

    /// Override the configured listen address
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = if cli.config.exists() {
        Config::load(&cli.config)?
    } else {
        Config::default()
    };
    if let Some(listen) = cli.listen {
        config.node.listen_addr = listen.to_string();
    }

    // Initialize logging
    let level = if cli.verbose {
        "debug".to_string()
    } else {
        config.logging.level.clone()
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    if !cli.config.exists() {
        tracing::warn!("{} not found, using defaults", cli.config.display());
    }

    config.validate()?;

    if cli.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    run_relay(&config).await
}

/// Run the relay until Ctrl+C
async fn run_relay(config: &Config) -> anyhow::Result<()> {
    let node = Node::new(config.node_config()?)?;
    let (handler, mut deliveries) = ChannelHandler::new();
    node.set_handler(handler).await?;
    node.start().await?;

    println!("LANLINK relay listening on {}", node.local_addr().await?);

    for peer in &config.peers {
        let ip = peer.ip()?;
        if peer.coordinator {
            node.join_game(ip, peer.port, peer.id).await?;
        } else {
            node.connect_to_peer(ip, peer.port, peer.id).await?;
        }
        println!("  peer {} -> {}:{}", peer.id, ip, peer.port);
    }

    println!("Press Ctrl+C to stop");

    let mut report = tokio::time::interval(REPORT_INTERVAL);
    report.tick().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            delivery = deliveries.recv() => match delivery {
                Some(delivery) => log_delivery(&delivery),
                None => break,
            },
            _ = report.tick() => {
                let mut pings: Vec<_> = node.get_ping_to_peers().await?.into_iter().collect();
                pings.sort_unstable();
                for (peer_id, millis) in pings {
                    tracing::info!("Peer {}: {} ms", peer_id, millis);
                }
            }
        }
    }

    println!("\nShutting down...");
    node.stop().await?;
    Ok(())
}

fn log_delivery(delivery: &Delivery) {
    tracing::info!(
        "{:?} from peer {}: {} bytes",
        delivery.action,
        delivery.peer_id,
        delivery.data.len()
    );
    tracing::trace!("payload {:02x?}", delivery.data);
}
