/*! The onion frame format and its construction.

Every onion packet on the wire is exactly [`ONION_PACKET_SIZE`] bytes: a
fixed 275-byte header, an AEAD ciphertext whose true length is hidden by an
XOR mask, and fresh random padding up to the frame size. Peeling a layer
yields either the final payload or the next, already-built frame.
*/

mod builder;
mod layer;
mod layer_ciphered;
mod wrapped_key;

pub use self::builder::{build_onion, compute_path_overhead, BuildOnionError, MAX_JUMP};
pub use self::layer::{
    cipher_text_len_mask16, LayerError, OnionLayer, FIXED_HEADER_SIZE,
    HKDF_INFO_CIPHER_TEXT_LEN_MASK,
};
pub use self::layer_ciphered::{OnionLayerCiphered, INNER_METADATA_FIXED_SIZE};
pub use self::wrapped_key::{
    build_wrapped_keys, derive_wrapping_key, WrapKeysError, WrappedKey, HKDF_INFO_WRAPPED_KEY,
    HKDF_SALT_WRAPPED_KEY, MAX_WRAPPED_KEYS, WRAPPED_KEY_AAD, WRAPPED_KEY_CIPHER_SIZE,
    WRAPPED_KEY_NONCE_SIZE, WRAPPED_KEY_SIZE,
};

/// Size of every onion packet on the wire.
pub const ONION_PACKET_SIZE: usize = 4096;

/// Bit of the inner flags byte marking the final hop.
pub const FLAG_LAST_SERVER: u8 = 0x08; // 0000 1000
/// Bits of the inner flags byte carrying the next-hop count.
pub const FLAG_NB_NEXT_HOPS: u8 = 0x07; // 0000 0111

/// Whether the flags byte marks the final hop.
pub fn is_last_server(flags: u8) -> bool {
    (flags & FLAG_LAST_SERVER) != 0
}

/// Number of next-hop endpoints encoded in the flags byte.
pub fn nb_next_hops(flags: u8) -> u8 {
    flags & FLAG_NB_NEXT_HOPS
}
