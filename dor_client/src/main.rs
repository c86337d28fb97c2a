//! dorc — the DOR client.
//!
//! Sends one hex-encoded payload through an onion path to a destination
//! endpoint. Exits non-zero with a one-line diagnostic on any failure.

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use dor_core::client::input::parse_relay_path;
use dor_core::client::Client;
use dor_packet::endpoint::Endpoint;

#[derive(Parser)]
#[command(name = "dorc", version, about = "Dynamic Onion Routing client")]
struct Cli {
    /// Onion path: groups separated by '|', group members by ','
    /// (e.g. "10.0.0.1:62503,10.0.0.2:62503|[::1]:62503")
    #[arg(long)]
    onion_path: String,

    /// Final destination endpoint (ipv4:port or [ipv6]:port)
    #[arg(long)]
    dest: String,

    /// Hex-encoded payload to deliver
    #[arg(long)]
    payload: String,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let env = env_logger::Env::default().default_filter_or(cli.log_level.clone());
    env_logger::Builder::from_env(env).init();

    let groups = parse_relay_path(&cli.onion_path).context("invalid onion path")?;
    let dest: Endpoint = cli.dest.parse().context("invalid destination endpoint")?;
    let payload = hex::decode(cli.payload.trim()).context("payload must be hex-encoded")?;

    let client = Client::new();
    let resolved = client
        .resolve_path(&groups)
        .await
        .context("failed to resolve the onion path")?;
    client
        .send_message(dest, resolved, &payload)
        .await
        .context("failed to send the message")?;

    info!("message sent ({} bytes)", payload.len());
    Ok(())
}
