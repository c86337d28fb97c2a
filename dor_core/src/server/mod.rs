/*! The relay server: listener, per-connection tasks and packet dispatch.

Each accepted connection gets its own task; packets within one connection
are processed serially in read order. Onion failures never close the
connection or produce a reply (a peer may be multiplexing legitimate
frames), while read errors and unhandled packet types do close it. On
shutdown the listener is dropped first, then all in-flight connection
tasks are joined.
*/

mod handler_identity;
mod handler_onion;

pub use self::handler_onion::{peel_onion, unwrap_session_key, PeelError};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use dor_packet::packet::Packet;

use crate::codec::PacketCodec;
use crate::identity::PrivateIdentity;
use crate::stats::Stats;
use crate::transport::{Transport, WRITE_TIMEOUT};

/// How long a connection may sit idle between packets before it is closed.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Delay before retrying a failed `accept`.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Error terminating one connection.
#[derive(Debug, Error)]
enum ConnectionError {
    #[error("no handler for packet type {packet_type:#04x}")]
    NoHandler { packet_type: u8 },
}

/// A DOR relay. Cheap to clone; all clones share the same identity.
#[derive(Clone)]
pub struct Server {
    identity: Arc<PrivateIdentity>,
    transport: Transport,
    stats: Stats,
    delivery_sink: Option<mpsc::Sender<Vec<u8>>>,
}

impl Server {
    /// Create a relay around a loaded identity.
    pub fn new(identity: PrivateIdentity) -> Server {
        let stats = Stats::new();
        Server {
            identity: Arc::new(identity),
            transport: Transport::with_stats(stats.clone()),
            stats,
            delivery_sink: None,
        }
    }

    /// Wire and onion counters of this relay.
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Route final-hop payloads into `sink` instead of only logging them.
    pub fn set_delivery_sink(&mut self, sink: mpsc::Sender<Vec<u8>>) {
        self.delivery_sink = Some(sink);
    }

    /// The relay's long-term identity.
    pub fn identity(&self) -> &PrivateIdentity {
        &self.identity
    }

    pub(crate) fn transport(&self) -> &Transport {
        &self.transport
    }

    pub(crate) fn delivery_sink(&self) -> Option<&mpsc::Sender<Vec<u8>>> {
        self.delivery_sink.as_ref()
    }

    /// Accept connections on `listener` until `shutdown` fires, then wait
    /// for the in-flight connection tasks to finish. Cancelling the token a
    /// second time is a no-op.
    pub async fn run(&self, listener: TcpListener, shutdown: CancellationToken) {
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        debug!("new connection from {}", addr);
                        let server = self.clone();
                        connections.spawn(server.handle_connection(stream, addr));
                    }
                    Err(e) => {
                        warn!("failed to accept a connection: {}", e);
                        tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                    }
                },
                Some(finished) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = finished {
                        if e.is_panic() {
                            error!("connection task panicked: {}", e);
                        }
                    }
                }
            }
        }

        // No new connections past this point.
        drop(listener);

        if !connections.is_empty() {
            info!("waiting for {} in-flight connections", connections.len());
        }
        while let Some(finished) = connections.join_next().await {
            if let Err(e) = finished {
                if e.is_panic() {
                    error!("connection task panicked: {}", e);
                }
            }
        }
        info!("server stopped");
    }

    /// Read packets serially until EOF, an error or the idle deadline.
    async fn handle_connection(self, stream: TcpStream, addr: SocketAddr) {
        let mut framed = Framed::new(stream, PacketCodec::new(self.stats.clone()));

        loop {
            let packet = match timeout(IDLE_TIMEOUT, framed.next()).await {
                Err(_) => {
                    debug!("[{}] connection idle, closing", addr);
                    return;
                }
                // Remote closed the connection.
                Ok(None) => return,
                Ok(Some(Err(e))) => {
                    warn!("[{}] read packet failed: {}", addr, e);
                    return;
                }
                Ok(Some(Ok(packet))) => packet,
            };

            match self.handle_packet(packet, addr).await {
                Ok(None) => {}
                Ok(Some(reply)) => {
                    match timeout(WRITE_TIMEOUT, framed.send(reply)).await {
                        Err(_) => {
                            warn!("[{}] reply write timed out", addr);
                            return;
                        }
                        Ok(Err(e)) => {
                            warn!("[{}] failed to send reply: {}", addr, e);
                            return;
                        }
                        Ok(Ok(())) => {}
                    }
                }
                Err(e) => {
                    warn!("[{}] {}", addr, e);
                    return;
                }
            }
        }
    }

    /// Dispatch one decoded packet. `Ok(Some(_))` is a reply to send on the
    /// same connection.
    async fn handle_packet(
        &self,
        packet: Packet,
        addr: SocketAddr,
    ) -> Result<Option<Packet>, ConnectionError> {
        match packet {
            Packet::GetIdentityRequest(_) => {
                Ok(Some(handler_identity::handle_get_identity(self)))
            }
            Packet::OnionPacket(packet) => {
                handler_onion::handle_onion_packet(self, &packet.data, addr).await;
                Ok(None)
            }
            other => Err(ConnectionError::NoHandler {
                packet_type: other.packet_type(),
            }),
        }
    }
}
