/*! Client send path: identity exchange, onion construction and emission.

A message goes out in three steps: resolve each path endpoint into a relay
(UUID + public key) over the identity exchange, attach fresh per-message
crypto material to every group, then build the onion and hand the padded
frame to one relay of the first group. A failed candidate send falls
through to the next endpoint of the first group; the send only fails once
all of them are unreachable.
*/

pub mod input;

use thiserror::Error;

use dor_packet::crypto_group::CryptoGroup;
use dor_packet::endpoint::Endpoint;
use dor_packet::onion::{build_onion, BuildOnionError, LayerError};
use dor_packet::packet::{GetIdentityRequest, OnionPacket, Packet};
use dor_packet::relay::{Relay, RelayGroup, RelayGroupError};

use crate::transport::{Transport, TransportError};

/// Error of the client send path.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("onion build failed: {0}")]
    Build(#[from] BuildOnionError),
    #[error("frame padding failed: {0}")]
    Pad(#[from] LayerError),
    #[error("invalid relay group: {0}")]
    Group(#[from] RelayGroupError),
    #[error("identity exchange with {ep} failed: {error}")]
    IdentityExchange {
        /// The relay that was queried.
        ep: Endpoint,
        /// Underlying transport error.
        error: TransportError,
    },
    #[error("unexpected reply to identity request: packet type {packet_type:#04x}")]
    UnexpectedReply { packet_type: u8 },
    #[error("all relays of the first group are unreachable")]
    FirstGroupUnreachable,
}

/// A DOR client.
#[derive(Clone, Debug, Default)]
pub struct Client {
    transport: Transport,
}

impl Client {
    /// Client with default transport timeouts.
    pub fn new() -> Client {
        Client {
            transport: Transport::new(),
        }
    }

    /// Ask the relay at `ep` for its UUID and public key.
    pub async fn fetch_relay_identity(&self, ep: Endpoint) -> Result<Relay, ClientError> {
        let reply = self
            .transport
            .request(&ep, Packet::GetIdentityRequest(GetIdentityRequest))
            .await
            .map_err(|error| ClientError::IdentityExchange { ep, error })?;

        match reply {
            Packet::GetIdentityResponse(resp) => {
                let relay = Relay {
                    ep,
                    uuid: resp.uuid,
                    pub_key: resp.public_key,
                };
                debug!("relay identified: {}", relay);
                Ok(relay)
            }
            other => Err(ClientError::UnexpectedReply {
                packet_type: other.packet_type(),
            }),
        }
    }

    /// Resolve a parsed path into relay groups by performing the identity
    /// exchange with every endpoint.
    pub async fn resolve_path(
        &self,
        groups: &[Vec<Endpoint>],
    ) -> Result<Vec<RelayGroup>, ClientError> {
        let mut resolved = Vec::with_capacity(groups.len());
        for endpoints in groups {
            let mut relays = Vec::with_capacity(endpoints.len());
            for &ep in endpoints {
                relays.push(self.fetch_relay_identity(ep).await?);
            }
            resolved.push(RelayGroup::new(relays)?);
        }
        Ok(resolved)
    }

    /// Build the onion for `payload` and send the padded frame to the first
    /// reachable relay of the first group.
    pub async fn send_message(
        &self,
        dest: Endpoint,
        groups: Vec<RelayGroup>,
        payload: &[u8],
    ) -> Result<(), ClientError> {
        let path: Vec<CryptoGroup> = groups.into_iter().map(CryptoGroup::new).collect();

        let layer = build_onion(&dest, &path, payload)?;
        let frame = layer.bytes_padded()?;
        let packet = Packet::OnionPacket(OnionPacket { data: frame });

        for relay in &path[0].group.relays {
            match self.transport.send(&relay.ep, packet.clone()).await {
                Ok(()) => {
                    info!("onion packet sent to {}", relay.ep);
                    return Ok(());
                }
                Err(e) => {
                    warn!("failed to send onion packet to {}: {}", relay.ep, e);
                }
            }
        }
        Err(ClientError::FirstGroupUnreachable)
    }
}
