/*! Wrapped-key slots of an onion layer header.

Each layer carries exactly [`MAX_WRAPPED_KEYS`] slots. A real slot seals
`relay UUID ‖ cipher key` under a key derived from the X25519 shared secret
between the layer's ephemeral key and the relay's long-term key; unused
slots are filled with uniform random bytes so an observer cannot tell how
many recipients are real. Slot order is randomized.

Serialized form of one slot:

Length | Content
------ | ------
`12`   | Nonce
`64`   | Ciphertext: UUID (16) ‖ cipher key (32) ‖ tag (16)

*/

use dor_binary_io::*;
use dor_crypto::{encrypt, gen_nonce, hkdf_sha256, random_array, x25519, KEY_SIZE, NONCE_SIZE, TAG_SIZE};

use cookie_factory::{do_gen, gen_slice};
use nom::bytes::streaming::take;
use nom::combinator::map_opt;
use rand::seq::SliceRandom;
use thiserror::Error;
use uuid::Uuid;

use crate::crypto_group::CryptoGroup;

/// Number of wrapped-key slots in every layer header.
pub const MAX_WRAPPED_KEYS: usize = 3;
/// Size of a slot nonce.
pub const WRAPPED_KEY_NONCE_SIZE: usize = NONCE_SIZE;
/// Size of a slot ciphertext: UUID (16) + cipher key (32) + tag (16).
pub const WRAPPED_KEY_CIPHER_SIZE: usize = 16 + KEY_SIZE + TAG_SIZE;
/// Serialized size of one slot.
pub const WRAPPED_KEY_SIZE: usize = WRAPPED_KEY_NONCE_SIZE + WRAPPED_KEY_CIPHER_SIZE;

/// HKDF salt for the wrapping-key derivation.
pub const HKDF_SALT_WRAPPED_KEY: &[u8] = b"DORv1:WrappedKey";
/// HKDF info for the wrapping-key derivation.
pub const HKDF_INFO_WRAPPED_KEY: &[u8] = b"DORv1:RelayKeyEncryption";
/// Associated data of every wrapped-key slot.
pub const WRAPPED_KEY_AAD: &[u8] = b"DORv1:WrappedKey";

/// One wrapped-key slot, real or decoy.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WrappedKey {
    /// AEAD nonce of the slot.
    pub nonce: [u8; WRAPPED_KEY_NONCE_SIZE],
    /// AEAD ciphertext of the slot, or uniform random bytes for a decoy.
    pub cipher_text: [u8; WRAPPED_KEY_CIPHER_SIZE],
}

impl WrappedKey {
    /// Try to open this slot with a derived wrapping key. Returns the relay
    /// UUID and cipher key on success, `None` for decoys and slots addressed
    /// to other relays.
    pub fn open(&self, wrapping_key: &[u8; KEY_SIZE]) -> Option<(Uuid, [u8; KEY_SIZE])> {
        let plaintext =
            dor_crypto::decrypt(wrapping_key, &self.nonce, &self.cipher_text, WRAPPED_KEY_AAD)
                .ok()?;
        let uuid = Uuid::from_slice(&plaintext[..16]).ok()?;
        let mut cipher_key = [0; KEY_SIZE];
        cipher_key.copy_from_slice(&plaintext[16..]);
        Some((uuid, cipher_key))
    }
}

impl FromBytes for WrappedKey {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, nonce) = map_opt(take(WRAPPED_KEY_NONCE_SIZE), |bytes: &[u8]| {
            <[u8; WRAPPED_KEY_NONCE_SIZE]>::try_from(bytes).ok()
        })(input)?;
        let (input, cipher_text) = map_opt(take(WRAPPED_KEY_CIPHER_SIZE), |bytes: &[u8]| {
            <[u8; WRAPPED_KEY_CIPHER_SIZE]>::try_from(bytes).ok()
        })(input)?;
        Ok((input, WrappedKey { nonce, cipher_text }))
    }
}

impl ToBytes for WrappedKey {
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        do_gen!(buf,
            gen_slice!(self.nonce.as_ref()) >>
            gen_slice!(self.cipher_text.as_ref())
        )
    }
}

/// Error of [`build_wrapped_keys`].
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum WrapKeysError {
    #[error("too many relays in group: {0} (max {max})", max = MAX_WRAPPED_KEYS)]
    TooManyRelays(usize),
    #[error("wrapped key sealing failed")]
    Seal,
}

/// Derive the wrapping key a relay uses to probe slots: HKDF over the X25519
/// shared secret with the fixed salt and info labels.
pub fn derive_wrapping_key(shared_secret: &[u8; KEY_SIZE]) -> [u8; KEY_SIZE] {
    hkdf_sha256(shared_secret, HKDF_SALT_WRAPPED_KEY, HKDF_INFO_WRAPPED_KEY)
}

/// Build the three slots for a group: one real slot per relay, random decoys
/// for the rest, in randomized order.
pub fn build_wrapped_keys(
    group: &CryptoGroup,
) -> Result<[WrappedKey; MAX_WRAPPED_KEYS], WrapKeysError> {
    let relays = &group.group.relays;
    if relays.len() > MAX_WRAPPED_KEYS {
        return Err(WrapKeysError::TooManyRelays(relays.len()));
    }

    let mut keys = [WrappedKey {
        nonce: [0; WRAPPED_KEY_NONCE_SIZE],
        cipher_text: [0; WRAPPED_KEY_CIPHER_SIZE],
    }; MAX_WRAPPED_KEYS];

    for (slot, relay) in keys.iter_mut().zip(relays.iter()) {
        let shared_secret = x25519(group.esk, relay.pub_key);
        let wrapping_key = derive_wrapping_key(&shared_secret);

        let mut plaintext = [0; 16 + KEY_SIZE];
        plaintext[..16].copy_from_slice(relay.uuid.as_bytes());
        plaintext[16..].copy_from_slice(&group.cipher_key);

        let nonce = gen_nonce();
        let sealed = encrypt(&wrapping_key, &nonce, &plaintext, WRAPPED_KEY_AAD)
            .map_err(|_| WrapKeysError::Seal)?;

        slot.nonce = nonce;
        slot.cipher_text.copy_from_slice(&sealed);
    }

    for slot in keys.iter_mut().skip(relays.len()) {
        slot.nonce = random_array();
        slot.cipher_text = random_array();
    }

    keys.shuffle(&mut rand::thread_rng());

    Ok(keys)
}
