/*! OnionLayer — one encrypted nesting of the fixed-size onion frame.

```text
0        7        15       23       31
+--------+--------+--------+--------+
|                                   |
~           EPK (32 bytes)          ~
|                                   |
+--------+--------+--------+--------+
|                                   |
~      WrappedKeys (Fixed List)     ~
~        3 * 76 = 228 bytes         ~
|                                   |
+--------+--------+--------+--------+
|  Flags |   PayloadNonce [0..2]    |
+--------+--------+--------+--------+
|          PayloadNonce [3..6]      |
+--------+--------+--------+--------+
|          PayloadNonce [7..10]     |
+--------+--------+--------+--------+
|PN [11] | CipherTextLenXor|        |
+--------+--------+--------+        |
~            Cipher Text            ~
~     then random padding up to     ~
~            4096 bytes             ~
+--------+--------+--------+--------+
```

`CipherTextLenXor` is the true ciphertext length XOR-ed with a 16-bit mask
derived from the cipher key and the payload nonce, hiding the length from
observers without the key. The AEAD associated data of the body is the
exact 275 serialized header bytes, XOR-encoded length included, so the
mask must be finalized before sealing.
*/

use dor_binary_io::*;
use dor_crypto::{hkdf_sha256, KEY_SIZE, NONCE_SIZE};

use nom::bytes::streaming::take;
use nom::combinator::{map_opt, rest};
use nom::number::streaming::{be_u16, be_u8};
use rand::RngCore;
use thiserror::Error;

use super::wrapped_key::{WrappedKey, MAX_WRAPPED_KEYS, WRAPPED_KEY_SIZE};
use super::ONION_PACKET_SIZE;

/// Size of the fixed layer header:
/// EPK (32) + WrappedKeys (228) + Flags (1) + PayloadNonce (12) + CipherTextLenXor (2).
pub const FIXED_HEADER_SIZE: usize =
    KEY_SIZE + MAX_WRAPPED_KEYS * WRAPPED_KEY_SIZE + 1 + NONCE_SIZE + 2;

/// HKDF info for the 16-bit ciphertext-length mask.
pub const HKDF_INFO_CIPHER_TEXT_LEN_MASK: &[u8] = b"DORv1:CipherTextLenMask16";

/// Errors of the layer frame operations.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum LayerError {
    #[error("data too short: {0} bytes (header is {header})", header = FIXED_HEADER_SIZE)]
    DataTooShort(usize),
    #[error("packet overflow: {0} bytes (max {max})", max = ONION_PACKET_SIZE)]
    PacketOverflow(usize),
    #[error("invalid cipher text length: {len} ({available} bytes available)")]
    InvalidCipherTextLength { len: usize, available: usize },
}

/// Derive the 16-bit mask hiding the ciphertext length, big-endian.
pub fn cipher_text_len_mask16(
    cipher_key: &[u8; KEY_SIZE],
    payload_nonce: &[u8; NONCE_SIZE],
) -> u16 {
    let okm = hkdf_sha256(cipher_key, payload_nonce, HKDF_INFO_CIPHER_TEXT_LEN_MASK);
    u16::from_be_bytes([okm[0], okm[1]])
}

/// One layer of the onion frame as it travels on the wire.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OnionLayer {
    /// Ephemeral public key of this layer.
    pub epk: [u8; KEY_SIZE],
    /// The three wrapped-key slots, order-randomized.
    pub wrapped_keys: [WrappedKey; MAX_WRAPPED_KEYS],
    /// Reserved, currently `0x00`.
    pub flags: u8,
    /// AEAD nonce of the body ciphertext.
    pub payload_nonce: [u8; NONCE_SIZE],
    /// True ciphertext length XOR-ed with [`cipher_text_len_mask16`].
    pub cipher_text_len_xor: u16,
    /// Body ciphertext. After [`OnionLayer::parse`] this holds everything up
    /// to the end of the frame, padding included, until
    /// [`OnionLayer::trim_cipher_text`] cuts it down to the true length.
    pub cipher_text: Vec<u8>,
}

impl FromBytes for OnionLayer {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, epk) = map_opt(take(KEY_SIZE), |bytes: &[u8]| {
            <[u8; KEY_SIZE]>::try_from(bytes).ok()
        })(input)?;
        let (input, wk0) = WrappedKey::from_bytes(input)?;
        let (input, wk1) = WrappedKey::from_bytes(input)?;
        let (input, wk2) = WrappedKey::from_bytes(input)?;
        let (input, flags) = be_u8(input)?;
        let (input, payload_nonce) = map_opt(take(NONCE_SIZE), |bytes: &[u8]| {
            <[u8; NONCE_SIZE]>::try_from(bytes).ok()
        })(input)?;
        let (input, cipher_text_len_xor) = be_u16(input)?;
        let (input, cipher_text) = rest(input)?;
        Ok((
            input,
            OnionLayer {
                epk,
                wrapped_keys: [wk0, wk1, wk2],
                flags,
                payload_nonce,
                cipher_text_len_xor,
                cipher_text: cipher_text.to_vec(),
            },
        ))
    }
}

impl OnionLayer {
    /// The exact 275 header bytes. This is also the AEAD associated data of
    /// the body ciphertext.
    pub fn header_bytes(&self) -> [u8; FIXED_HEADER_SIZE] {
        let mut out = [0; FIXED_HEADER_SIZE];
        out[..KEY_SIZE].copy_from_slice(&self.epk);

        let mut offset = KEY_SIZE;
        for wk in &self.wrapped_keys {
            out[offset..offset + 12].copy_from_slice(&wk.nonce);
            out[offset + 12..offset + WRAPPED_KEY_SIZE].copy_from_slice(&wk.cipher_text);
            offset += WRAPPED_KEY_SIZE;
        }

        out[offset] = self.flags;
        offset += 1;
        out[offset..offset + NONCE_SIZE].copy_from_slice(&self.payload_nonce);
        offset += NONCE_SIZE;
        out[offset..offset + 2].copy_from_slice(&self.cipher_text_len_xor.to_be_bytes());

        out
    }

    /// Header followed by the ciphertext, without padding.
    pub fn bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(FIXED_HEADER_SIZE + self.cipher_text.len());
        out.extend_from_slice(&self.header_bytes());
        out.extend_from_slice(&self.cipher_text);
        out
    }

    /// The full wire frame: header, ciphertext, fresh random padding up to
    /// [`ONION_PACKET_SIZE`]. Padding is re-drawn on every call.
    pub fn bytes_padded(&self) -> Result<Vec<u8>, LayerError> {
        let mut out = self.bytes();
        if out.len() > ONION_PACKET_SIZE {
            return Err(LayerError::PacketOverflow(out.len()));
        }

        let start = out.len();
        out.resize(ONION_PACKET_SIZE, 0);
        rand::thread_rng().fill_bytes(&mut out[start..]);
        Ok(out)
    }

    /// Parse a frame. The entire remainder past the header is kept as
    /// `cipher_text`; the XOR-encoded length field is recorded, not
    /// validated.
    pub fn parse(data: &[u8]) -> Result<OnionLayer, LayerError> {
        if data.len() < FIXED_HEADER_SIZE {
            return Err(LayerError::DataTooShort(data.len()));
        }
        match Self::from_bytes(data) {
            Ok((_, layer)) => Ok(layer),
            Err(_) => Err(LayerError::DataTooShort(data.len())),
        }
    }

    /// XOR-decode the true ciphertext length with the key holder's mask.
    pub fn cipher_text_len(&self, cipher_key: &[u8; KEY_SIZE]) -> usize {
        (self.cipher_text_len_xor ^ cipher_text_len_mask16(cipher_key, &self.payload_nonce))
            as usize
    }

    /// Truncate `cipher_text` to its true length. Fails when the decoded
    /// length points past the available bytes.
    pub fn trim_cipher_text(&mut self, cipher_key: &[u8; KEY_SIZE]) -> Result<(), LayerError> {
        let len = self.cipher_text_len(cipher_key);
        if len > self.cipher_text.len() {
            return Err(LayerError::InvalidCipherTextLength {
                len,
                available: self.cipher_text.len(),
            });
        }
        self.cipher_text.truncate(len);
        Ok(())
    }
}
