/*! Inside-out construction of the onion frame.

The sender walks the path backwards. For each group it seals the current
body (the user payload for the innermost layer, the previous layer's bytes
otherwise) together with the next-hop candidates, then makes the resulting
layer the body of the next iteration. Every relay of a group receives the
same set of next-hop candidates because the sender cannot know which decoy
the network will drop.
*/

use dor_binary_io::ToBytes;
use dor_crypto::{encrypt, gen_nonce, TAG_SIZE};

use thiserror::Error;

use super::layer::{cipher_text_len_mask16, OnionLayer, FIXED_HEADER_SIZE};
use super::layer_ciphered::{OnionLayerCiphered, INNER_METADATA_FIXED_SIZE};
use super::wrapped_key::{build_wrapped_keys, WrapKeysError, MAX_WRAPPED_KEYS};
use super::ONION_PACKET_SIZE;
use crate::crypto_group::CryptoGroup;
use crate::endpoint::Endpoint;

/// Maximum number of groups in a path.
pub const MAX_JUMP: usize = 5;

/// Errors of [`build_onion`].
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum BuildOnionError {
    #[error("path cannot be empty")]
    EmptyPath,
    #[error("max jump value is {max}", max = MAX_JUMP)]
    MaxJump,
    #[error("payload too large: {len} bytes (max allowed with this path: {max})")]
    PayloadTooLarge { len: usize, max: usize },
    #[error("too many relays in group: {0} (max {max})", max = MAX_WRAPPED_KEYS)]
    TooManyRelays(usize),
    #[error("onion layer sealing failed")]
    Seal,
    #[error("inner content serialization failed")]
    Serialize,
}

impl From<WrapKeysError> for BuildOnionError {
    fn from(error: WrapKeysError) -> BuildOnionError {
        match error {
            WrapKeysError::TooManyRelays(n) => BuildOnionError::TooManyRelays(n),
            WrapKeysError::Seal => BuildOnionError::Seal,
        }
    }
}

/// Worst-case bytes the nesting itself consumes for this path, computed
/// before construction: inner metadata and destination endpoint, plus for
/// every group the fixed header, the AEAD tag, the inner metadata and the
/// group's candidate endpoints.
pub fn compute_path_overhead(path: &[CryptoGroup], dest: &Endpoint) -> usize {
    let mut overhead = INNER_METADATA_FIXED_SIZE + dest.bytes_len();

    for group in path {
        overhead += FIXED_HEADER_SIZE + TAG_SIZE + INNER_METADATA_FIXED_SIZE;
        overhead += group
            .group
            .relays
            .iter()
            .map(|relay| relay.ep.bytes_len())
            .sum::<usize>();
    }

    overhead
}

/// Build the outermost onion layer for `payload` travelling through `path`
/// to `dest`. The caller pads the result to the frame size with
/// [`OnionLayer::bytes_padded`].
pub fn build_onion(
    dest: &Endpoint,
    path: &[CryptoGroup],
    payload: &[u8],
) -> Result<OnionLayer, BuildOnionError> {
    if path.is_empty() {
        return Err(BuildOnionError::EmptyPath);
    }
    if path.len() > MAX_JUMP {
        return Err(BuildOnionError::MaxJump);
    }

    let overhead = compute_path_overhead(path, dest);
    if overhead + payload.len() > ONION_PACKET_SIZE {
        return Err(BuildOnionError::PayloadTooLarge {
            len: payload.len(),
            max: ONION_PACKET_SIZE.saturating_sub(overhead),
        });
    }

    let mut current_body = payload.to_vec();
    let mut next_hops = vec![*dest];
    let mut is_last = true;
    let mut outer_layer = None;

    for group in path.iter().rev() {
        let ciphered = OnionLayerCiphered {
            last_server: is_last,
            next_hops,
            util_payload_length: current_body.len() as u16,
            payload: current_body,
        };

        let mut ciphered_buf = [0; ONION_PACKET_SIZE];
        let (_, ciphered_len) = ciphered
            .to_bytes((&mut ciphered_buf, 0))
            .map_err(|_| BuildOnionError::Serialize)?;
        let ciphered_bytes = &ciphered_buf[..ciphered_len];

        let payload_nonce = gen_nonce();
        let wrapped_keys = build_wrapped_keys(group)?;

        let expected_cipher_len = ciphered_len + TAG_SIZE;
        let mask16 = cipher_text_len_mask16(&group.cipher_key, &payload_nonce);
        let cipher_text_len_xor = (expected_cipher_len as u16) ^ mask16;

        // The header, XOR-encoded length included, is the AEAD associated
        // data, so it has to be final before sealing.
        let mut layer = OnionLayer {
            epk: group.epk,
            wrapped_keys,
            flags: 0x00,
            payload_nonce,
            cipher_text_len_xor,
            cipher_text: Vec::new(),
        };
        let aad = layer.header_bytes();
        layer.cipher_text = encrypt(&group.cipher_key, &payload_nonce, ciphered_bytes, &aad)
            .map_err(|_| BuildOnionError::Seal)?;

        next_hops = group.group.relays.iter().map(|relay| relay.ep).collect();
        is_last = false;
        current_body = layer.bytes();
        outer_layer = Some(layer);
    }

    Ok(outer_layer.expect("the path was checked to be non-empty"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onion::wrapped_key::derive_wrapping_key;
    use crate::relay::{Relay, RelayGroup};
    use dor_binary_io::FromBytes;
    use dor_crypto::{clamp_scalar, decrypt, random_array, x25519, KEY_SIZE};
    use uuid::Uuid;

    struct TestRelay {
        relay: Relay,
        sk: [u8; KEY_SIZE],
    }

    fn make_relay(addr: &str) -> TestRelay {
        let sk = clamp_scalar(random_array());
        TestRelay {
            relay: Relay {
                ep: addr.parse().unwrap(),
                uuid: Uuid::new_v4(),
                pub_key: dor_crypto::derive_public_key(sk),
            },
            sk,
        }
    }

    fn make_path(groups: &[&[&TestRelay]]) -> Vec<CryptoGroup> {
        groups
            .iter()
            .map(|relays| {
                CryptoGroup::new(
                    RelayGroup::new(relays.iter().map(|r| r.relay.clone()).collect()).unwrap(),
                )
            })
            .collect()
    }

    /// Peel one layer the way a relay would, without the network.
    fn peel(frame: &[u8], relay: &TestRelay) -> OnionLayerCiphered {
        let mut layer = OnionLayer::parse(frame).unwrap();
        let wrapping_key = derive_wrapping_key(&x25519(relay.sk, layer.epk));
        let (_, session_key) = layer
            .wrapped_keys
            .iter()
            .filter_map(|wk| wk.open(&wrapping_key))
            .find(|(uuid, _)| *uuid == relay.relay.uuid)
            .expect("a wrapped key slot should open for the relay");

        layer.trim_cipher_text(&session_key).unwrap();
        let header = layer.header_bytes();
        let plaintext =
            decrypt(&session_key, &layer.payload_nonce, &layer.cipher_text, &header).unwrap();
        let (_, olc) = OnionLayerCiphered::from_bytes(&plaintext).unwrap();
        olc
    }

    #[test]
    fn empty_path_rejected() {
        let dest = "127.0.0.1:8080".parse().unwrap();
        let err = build_onion(&dest, &[], b"data").unwrap_err();
        assert_eq!(err, BuildOnionError::EmptyPath);
        assert_eq!(err.to_string(), "path cannot be empty");
    }

    #[test]
    fn path_longer_than_max_jump_rejected() {
        let dest = "127.0.0.1:8080".parse().unwrap();
        let relays: Vec<_> = (0..6)
            .map(|i| make_relay(&format!("10.0.0.{}:1000", i + 1)))
            .collect();
        let refs: Vec<&TestRelay> = relays.iter().collect();
        let slices: Vec<&[&TestRelay]> = refs.chunks(1).collect();
        let path = make_path(&slices);

        let err = build_onion(&dest, &path, b"data").unwrap_err();
        assert_eq!(err, BuildOnionError::MaxJump);
        assert_eq!(err.to_string(), "max jump value is 5");
    }

    #[test]
    fn single_hop_delivers_payload() {
        let relay = make_relay("[::1]:62503");
        let dest: Endpoint = "[::1]:8080".parse().unwrap();
        let path = make_path(&[&[&relay]]);

        let layer = build_onion(&dest, &path, b"ping").unwrap();
        let frame = layer.bytes_padded().unwrap();
        assert_eq!(frame.len(), ONION_PACKET_SIZE);

        let olc = peel(&frame, &relay);
        assert!(olc.last_server);
        assert!(olc.next_hops.is_empty());
        assert_eq!(olc.util_payload_length, 4);
        assert_eq!(&olc.payload[..olc.util_payload_length as usize], b"ping");
    }

    #[test]
    fn two_hops_reveal_only_the_next_group() {
        let first = make_relay("[::1]:62503");
        let second = make_relay("192.168.58.221:10");
        let dest: Endpoint = "8.8.8.8:63".parse().unwrap();
        let path = make_path(&[&[&first], &[&second]]);

        let payload = b"Who are you? Google?";
        let layer = build_onion(&dest, &path, payload).unwrap();
        let frame = layer.bytes_padded().unwrap();

        let olc1 = peel(&frame, &first);
        assert!(!olc1.last_server);
        assert_eq!(olc1.next_hops, vec![second.relay.ep]);

        // The inner body is itself a valid layer; a relay re-pads it before
        // forwarding.
        let inner = OnionLayer::parse(&olc1.payload).unwrap();
        let inner_frame = inner.bytes_padded().unwrap();
        assert_eq!(inner_frame.len(), ONION_PACKET_SIZE);

        let olc2 = peel(&inner_frame, &second);
        assert!(olc2.last_server);
        assert_eq!(&olc2.payload[..olc2.util_payload_length as usize], payload);
    }

    #[test]
    fn group_decoys_share_the_candidate_list() {
        let first_a = make_relay("10.0.0.1:1001");
        let group_b: Vec<_> = (0..3)
            .map(|i| make_relay(&format!("10.0.1.{}:2000", i + 1)))
            .collect();
        let dest: Endpoint = "[::1]:8080".parse().unwrap();
        let path = make_path(&[&[&first_a], &[&group_b[0], &group_b[1], &group_b[2]]]);

        let layer = build_onion(&dest, &path, b"x").unwrap();
        let frame = layer.bytes_padded().unwrap();

        let olc = peel(&frame, &first_a);
        let expected: Vec<_> = group_b.iter().map(|r| r.relay.ep).collect();
        assert_eq!(olc.next_hops, expected);

        // Every relay of the second group can open the inner frame.
        let inner = OnionLayer::parse(&olc.payload).unwrap();
        let inner_frame = inner.bytes_padded().unwrap();
        for relay in &group_b {
            let olc = peel(&inner_frame, relay);
            assert!(olc.last_server);
            assert_eq!(&olc.payload[..olc.util_payload_length as usize], b"x");
        }
    }

    #[test]
    fn max_path_length_peels_through() {
        let relays: Vec<_> = (0..5)
            .map(|i| make_relay(&format!("10.0.0.{}:1000", i + 1)))
            .collect();
        let dest: Endpoint = "[::1]:8080".parse().unwrap();
        let refs: Vec<&TestRelay> = relays.iter().collect();
        let slices: Vec<&[&TestRelay]> = refs.chunks(1).collect();
        let path = make_path(&slices);

        let layer = build_onion(&dest, &path, b"hello").unwrap();
        let mut frame = layer.bytes_padded().unwrap();

        for (i, relay) in relays.iter().enumerate() {
            assert_eq!(frame.len(), ONION_PACKET_SIZE);
            let olc = peel(&frame, relay);
            if i + 1 < relays.len() {
                assert!(!olc.last_server);
                assert_eq!(olc.next_hops, vec![relays[i + 1].relay.ep]);
                let inner = OnionLayer::parse(&olc.payload).unwrap();
                frame = inner.bytes_padded().unwrap();
            } else {
                assert!(olc.last_server);
                assert_eq!(&olc.payload[..olc.util_payload_length as usize], b"hello");
            }
        }
    }

    #[test]
    fn oversized_payload_rejected() {
        let relay = make_relay("10.0.0.1:1000");
        let dest: Endpoint = "[::1]:8080".parse().unwrap();
        let path = make_path(&[&[&relay]]);

        let payload = vec![0; ONION_PACKET_SIZE];
        let err = build_onion(&dest, &path, &payload).unwrap_err();
        assert!(matches!(err, BuildOnionError::PayloadTooLarge { .. }));
        assert!(err.to_string().contains("payload too large"));
    }

    #[test]
    fn payload_at_the_exact_limit_builds() {
        let relay = make_relay("10.0.0.1:1000");
        let dest: Endpoint = "[::1]:8080".parse().unwrap();
        let path = make_path(&[&[&relay]]);

        let overhead = compute_path_overhead(&path, &dest);
        let payload = vec![0x5a; ONION_PACKET_SIZE - overhead];
        let layer = build_onion(&dest, &path, &payload).unwrap();
        let frame = layer.bytes_padded().unwrap();
        assert_eq!(frame.len(), ONION_PACKET_SIZE);

        let err = build_onion(&dest, &path, &vec![0x5a; ONION_PACKET_SIZE - overhead + 1])
            .unwrap_err();
        assert_eq!(
            err,
            BuildOnionError::PayloadTooLarge {
                len: ONION_PACKET_SIZE - overhead + 1,
                max: ONION_PACKET_SIZE - overhead,
            }
        );
    }
}
