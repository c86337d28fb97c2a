/*! Handler for inbound onion packets: peel one layer, then deliver the
payload locally or forward the inner frame to one next-hop candidate.

Every failure branch drops the packet silently apart from a warn log. The
relay never replies on this connection and never closes it over a bad
onion, so a peer cannot distinguish which step failed.
*/

use std::net::SocketAddr;

use thiserror::Error;

use dor_binary_io::FromBytes;
use dor_crypto::{decrypt, x25519, KEY_SIZE};
use dor_packet::onion::{
    derive_wrapping_key, LayerError, OnionLayer, OnionLayerCiphered,
};
use dor_packet::packet::{OnionPacket, Packet};

use super::Server;
use crate::identity::PrivateIdentity;

/// Why peeling one onion layer failed. The handler only ever logs this;
/// nothing of it reaches the wire.
#[derive(Debug, Error)]
pub enum PeelError {
    #[error("onion layer parse failed: {0}")]
    Parse(LayerError),
    #[error("no matching wrapped key")]
    NoMatchingKey,
    #[error("cipher text trim failed: {0}")]
    Trim(LayerError),
    #[error("layer decryption failed")]
    Decrypt,
    #[error("decrypted content parse failed")]
    InnerParse,
}

/// Probe the wrapped-key slots with the wrapping key derived from this
/// relay's private key and the layer's ephemeral key. Returns the session
/// key when a slot opens and carries our UUID.
pub fn unwrap_session_key(
    layer: &OnionLayer,
    identity: &PrivateIdentity,
) -> Option<[u8; KEY_SIZE]> {
    let shared_secret = x25519(identity.priv_key, layer.epk);
    let wrapping_key = derive_wrapping_key(&shared_secret);

    layer.wrapped_keys.iter().find_map(|wk| {
        let (uuid, session_key) = wk.open(&wrapping_key)?;
        (uuid == identity.uuid).then_some(session_key)
    })
}

/// Peel one layer of an inbound frame: parse, unwrap the session key, trim
/// the ciphertext to its true length and open it against the header bytes.
pub fn peel_onion(
    data: &[u8],
    identity: &PrivateIdentity,
) -> Result<OnionLayerCiphered, PeelError> {
    let mut layer = OnionLayer::parse(data).map_err(PeelError::Parse)?;

    let session_key = unwrap_session_key(&layer, identity).ok_or(PeelError::NoMatchingKey)?;

    layer.trim_cipher_text(&session_key).map_err(PeelError::Trim)?;

    let header = layer.header_bytes();
    let plaintext = decrypt(
        &session_key,
        &layer.payload_nonce,
        &layer.cipher_text,
        &header,
    )
    .map_err(|_| PeelError::Decrypt)?;

    let (_, ciphered) =
        OnionLayerCiphered::from_bytes(&plaintext).map_err(|_| PeelError::InnerParse)?;
    Ok(ciphered)
}

pub(super) async fn handle_onion_packet(server: &Server, data: &[u8], addr: SocketAddr) {
    debug!("[{}] onion packet received", addr);

    let ciphered = match peel_onion(data, server.identity()) {
        Ok(ciphered) => ciphered,
        Err(e) => {
            // Decoy, not on this route, or tampering. Drop without a reply.
            warn!("[{}] dropping onion packet: {}", addr, e);
            server.stats().counters.increase_dropped();
            return;
        }
    };

    debug!(
        "[{}] layer peeled: last_server={} next_hops={} util_payload_length={}",
        addr,
        ciphered.last_server,
        ciphered.next_hops.len(),
        ciphered.util_payload_length,
    );

    if ciphered.last_server {
        deliver(server, ciphered, addr).await;
    } else {
        relay_to_next_hops(server, ciphered, addr).await;
    }
}

/// Final hop: consume the payload locally.
async fn deliver(server: &Server, ciphered: OnionLayerCiphered, addr: SocketAddr) {
    let len = ciphered.util_payload_length as usize;
    if len > ciphered.payload.len() {
        warn!(
            "[{}] dropping onion packet: payload length {} exceeds body ({} bytes)",
            addr,
            len,
            ciphered.payload.len()
        );
        server.stats().counters.increase_dropped();
        return;
    }

    info!(
        "[{}] final destination reached, delivering payload ({} bytes)",
        addr, len
    );
    server.stats().counters.increase_delivered();

    if let Some(sink) = server.delivery_sink() {
        if sink.send(ciphered.payload[..len].to_vec()).await.is_err() {
            warn!("[{}] delivery sink closed, payload discarded", addr);
        }
    }
}

/// Forwarding hop: re-pad the inner frame and try each candidate until one
/// send succeeds. A fresh outbound connection is used; nothing goes back on
/// the inbound one.
async fn relay_to_next_hops(server: &Server, ciphered: OnionLayerCiphered, addr: SocketAddr) {
    if ciphered.next_hops.is_empty() {
        warn!("[{}] forwarding hop without next hop candidates", addr);
        server.stats().counters.increase_dropped();
        return;
    }

    let inner = match OnionLayer::parse(&ciphered.payload) {
        Ok(inner) => inner,
        Err(e) => {
            warn!("[{}] decrypted body is not a valid onion layer: {}", addr, e);
            server.stats().counters.increase_dropped();
            return;
        }
    };

    let frame = match inner.bytes_padded() {
        Ok(frame) => frame,
        Err(e) => {
            warn!("[{}] failed to pad the inner layer: {}", addr, e);
            server.stats().counters.increase_dropped();
            return;
        }
    };
    let packet = Packet::OnionPacket(OnionPacket { data: frame });

    for next_hop in &ciphered.next_hops {
        match server.transport().send(next_hop, packet.clone()).await {
            Ok(()) => {
                debug!("[{}] packet relayed to {}", addr, next_hop);
                server.stats().counters.increase_relayed();
                return;
            }
            Err(e) => {
                warn!("[{}] failed to relay packet to {}: {}", addr, next_hop, e);
            }
        }
    }
    warn!("[{}] all next hop candidates failed, packet dropped", addr);
    server.stats().counters.increase_dropped();
}

#[cfg(test)]
mod tests {
    use super::*;
    use dor_packet::crypto_group::CryptoGroup;
    use dor_packet::onion::{build_onion, ONION_PACKET_SIZE};
    use dor_packet::relay::{Relay, RelayGroup};
    use uuid::Uuid;

    fn test_identity() -> PrivateIdentity {
        let priv_key = dor_crypto::clamp_scalar(dor_crypto::random_array());
        PrivateIdentity {
            uuid: Uuid::new_v4(),
            priv_key,
            pub_key: dor_crypto::derive_public_key(priv_key),
        }
    }

    fn path_for(identity: &PrivateIdentity) -> Vec<CryptoGroup> {
        let relay = Relay {
            ep: "[::1]:62503".parse().unwrap(),
            uuid: identity.uuid,
            pub_key: identity.pub_key,
        };
        vec![CryptoGroup::new(RelayGroup::new(vec![relay]).unwrap())]
    }

    #[test]
    fn peel_recovers_the_final_payload() {
        let identity = test_identity();
        let path = path_for(&identity);
        let dest = "[::1]:8080".parse().unwrap();

        let layer = build_onion(&dest, &path, b"ping").unwrap();
        let frame = layer.bytes_padded().unwrap();
        assert_eq!(frame.len(), ONION_PACKET_SIZE);

        let ciphered = peel_onion(&frame, &identity).unwrap();
        assert!(ciphered.last_server);
        assert_eq!(
            &ciphered.payload[..ciphered.util_payload_length as usize],
            b"ping"
        );
    }

    #[test]
    fn peel_rejects_a_frame_for_another_relay() {
        let identity = test_identity();
        let stranger = test_identity();
        let path = path_for(&identity);
        let dest = "[::1]:8080".parse().unwrap();

        let frame = build_onion(&dest, &path, b"ping")
            .unwrap()
            .bytes_padded()
            .unwrap();

        assert!(matches!(
            peel_onion(&frame, &stranger),
            Err(PeelError::NoMatchingKey)
        ));
    }

    #[test]
    fn peel_rejects_a_tampered_header() {
        let identity = test_identity();
        let path = path_for(&identity);
        let dest = "[::1]:8080".parse().unwrap();

        let mut frame = build_onion(&dest, &path, b"ping")
            .unwrap()
            .bytes_padded()
            .unwrap();
        // Flip a bit in the XOR-encoded length field. The trim then points
        // somewhere else, or the AEAD open fails over the modified header.
        frame[273] ^= 0x01;

        assert!(peel_onion(&frame, &identity).is_err());
    }

    #[test]
    fn peel_rejects_short_data() {
        let identity = test_identity();
        assert!(matches!(
            peel_onion(&[0; 42], &identity),
            Err(PeelError::Parse(LayerError::DataTooShort(42)))
        ));
    }

    #[test]
    fn exactly_one_slot_opens_for_a_single_relay_group() {
        let identity = test_identity();
        let path = path_for(&identity);
        let dest = "[::1]:8080".parse().unwrap();

        let frame = build_onion(&dest, &path, b"ping")
            .unwrap()
            .bytes_padded()
            .unwrap();
        let layer = OnionLayer::parse(&frame).unwrap();

        let shared_secret = x25519(identity.priv_key, layer.epk);
        let wrapping_key = derive_wrapping_key(&shared_secret);
        let open_slots = layer
            .wrapped_keys
            .iter()
            .filter(|wk| wk.open(&wrapping_key).is_some())
            .count();
        assert_eq!(open_slots, 1);
    }
}
