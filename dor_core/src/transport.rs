/*! Connection-oriented transport with per-operation timeouts.

Every operation dials a fresh TCP connection, bounded by a dial timeout,
and closes it when done. The address family of the endpoint picks the IPv4
or IPv6 stream transport.
*/

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::Framed;

use dor_packet::endpoint::Endpoint;
use dor_packet::packet::Packet;

use crate::codec::{DecodeError, EncodeError, PacketCodec};
use crate::stats::Stats;

/// Default timeout for establishing a connection.
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(3);
/// Default timeout for writing one packet.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(2);
/// Default timeout for reading one reply.
pub const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Error of a transport operation.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("dial to {ep} timed out")]
    DialTimeout {
        /// The endpoint that was dialed.
        ep: Endpoint,
    },
    #[error("dial to {ep} failed: {error}")]
    Dial {
        /// The endpoint that was dialed.
        ep: Endpoint,
        /// Underlying connect error.
        error: std::io::Error,
    },
    #[error("write timed out")]
    WriteTimeout,
    #[error("read timed out")]
    ReadTimeout,
    #[error("connection closed before a reply was received")]
    ConnectionClosed,
    #[error("{0}")]
    Encode(#[from] EncodeError),
    #[error("{0}")]
    Decode(#[from] DecodeError),
}

/// One-shot packet transport over TCP.
#[derive(Clone, Debug)]
pub struct Transport {
    dial_timeout: Duration,
    write_timeout: Duration,
    read_timeout: Duration,
    stats: Stats,
}

impl Default for Transport {
    fn default() -> Transport {
        Transport::new()
    }
}

impl Transport {
    /// Transport with the default timeouts.
    pub fn new() -> Transport {
        Transport::with_stats(Stats::new())
    }

    /// Transport counting its traffic into shared stats.
    pub fn with_stats(stats: Stats) -> Transport {
        Transport {
            dial_timeout: DIAL_TIMEOUT,
            write_timeout: WRITE_TIMEOUT,
            read_timeout: READ_TIMEOUT,
            stats,
        }
    }

    async fn dial(&self, ep: &Endpoint) -> Result<Framed<TcpStream, PacketCodec>, TransportError> {
        let stream = timeout(self.dial_timeout, TcpStream::connect(ep.to_socket_addr()))
            .await
            .map_err(|_| TransportError::DialTimeout { ep: *ep })?
            .map_err(|error| TransportError::Dial { ep: *ep, error })?;
        Ok(Framed::new(stream, PacketCodec::new(self.stats.clone())))
    }

    /// Dial `ep`, write one packet, close.
    pub async fn send(&self, ep: &Endpoint, packet: Packet) -> Result<(), TransportError> {
        let mut framed = self.dial(ep).await?;
        timeout(self.write_timeout, framed.send(packet))
            .await
            .map_err(|_| TransportError::WriteTimeout)?
            .map_err(TransportError::Encode)?;
        Ok(())
    }

    /// Dial `ep`, write a request, read one reply, close.
    pub async fn request(&self, ep: &Endpoint, request: Packet) -> Result<Packet, TransportError> {
        let mut framed = self.dial(ep).await?;
        timeout(self.write_timeout, framed.send(request))
            .await
            .map_err(|_| TransportError::WriteTimeout)?
            .map_err(TransportError::Encode)?;

        let reply = timeout(self.read_timeout, framed.next())
            .await
            .map_err(|_| TransportError::ReadTimeout)?
            .ok_or(TransportError::ConnectionClosed)?
            .map_err(TransportError::Decode)?;
        Ok(reply)
    }
}
