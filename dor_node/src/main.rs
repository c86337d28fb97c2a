//! dord — the DOR relay daemon.
//!
//! Listens for DOR packets, answers identity exchanges and relays onion
//! frames until it receives SIGINT or SIGTERM.

use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use dor_core::identity::load_private_identity;
use dor_core::server::Server;
use dor_packet::endpoint::Endpoint;

#[derive(Parser)]
#[command(name = "dord", version, about = "Dynamic Onion Routing daemon")]
struct Cli {
    /// IP address where the server will listen on
    #[arg(short, long, default_value = "::1")]
    addr: IpAddr,

    /// Port where the server will listen on
    #[arg(short, long, default_value_t = 62503)]
    port: u16,

    /// Directory where identity material is stored
    #[arg(long, default_value = "~/.dor")]
    id_dir: String,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix('~') {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest.trim_start_matches('/'));
        }
    }
    PathBuf::from(path)
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let env = env_logger::Env::default().default_filter_or(cli.log_level.clone());
    env_logger::Builder::from_env(env).init();

    info!("initializing dord (log level: {})", cli.log_level);

    let ep = Endpoint::new(cli.addr, cli.port).context("invalid listen endpoint")?;

    let id_dir = expand_home(&cli.id_dir);
    let identity =
        load_private_identity(&id_dir).context("failed to load the relay identity")?;
    info!(
        "relay identity: {} (PK: {}...)",
        identity.uuid,
        hex::encode(&identity.pub_key[..6])
    );

    let listener = TcpListener::bind(ep.to_socket_addr())
        .await
        .with_context(|| format!("failed to bind listener on {}", ep))?;
    info!("listening on {}", ep);

    let server = Server::new(identity);
    let shutdown = CancellationToken::new();

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            info!("shutdown signal received");
            shutdown.cancel();
        });
    }

    server.run(listener, shutdown).await;

    let counters = &server.stats().counters;
    info!(
        "processed {} packets in, {} packets out ({} delivered, {} relayed, {} dropped)",
        counters.incoming(),
        counters.outgoing(),
        counters.onions_delivered(),
        counters.onions_relayed(),
        counters.onions_dropped(),
    );
    info!("shutdown complete");
    Ok(())
}
