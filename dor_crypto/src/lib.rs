/*! Functions for the core crypto.

Thin wrappers over ChaCha20-Poly1305, HKDF-SHA256 and X25519 with the exact
parameter shapes the DOR wire format uses: 32-byte keys, 12-byte nonces,
16-byte authentication tags and 32-byte derived secrets.
*/

#![forbid(unsafe_code)]

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;

pub use chacha20poly1305::aead::Error as AeadError;

/// Size in bytes of a symmetric key or an X25519 scalar/point.
pub const KEY_SIZE: usize = 32;
/// Size in bytes of a ChaCha20-Poly1305 nonce.
pub const NONCE_SIZE: usize = 12;
/// Size in bytes of a Poly1305 authentication tag.
pub const TAG_SIZE: usize = 16;

/// Seal `plaintext` with ChaCha20-Poly1305. The returned ciphertext is
/// `plaintext.len() + TAG_SIZE` bytes, tag appended.
pub fn encrypt(
    key: &[u8; KEY_SIZE],
    nonce: &[u8; NONCE_SIZE],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, AeadError> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher.encrypt(
        Nonce::from_slice(nonce),
        Payload {
            msg: plaintext,
            aad,
        },
    )
}

/// Open a ChaCha20-Poly1305 ciphertext. Fails on any tag, nonce or
/// associated-data mismatch.
pub fn decrypt(
    key: &[u8; KEY_SIZE],
    nonce: &[u8; NONCE_SIZE],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, AeadError> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher.decrypt(
        Nonce::from_slice(nonce),
        Payload {
            msg: ciphertext,
            aad,
        },
    )
}

/// Derive 32 bytes with HKDF-SHA256.
pub fn hkdf_sha256(ikm: &[u8], salt: &[u8], info: &[u8]) -> [u8; KEY_SIZE] {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut okm = [0; KEY_SIZE];
    hk.expand(info, &mut okm)
        .expect("32 bytes is a valid HKDF-SHA256 output length");
    okm
}

/// X25519 scalar multiplication. The scalar is clamped internally.
pub fn x25519(scalar: [u8; KEY_SIZE], point: [u8; KEY_SIZE]) -> [u8; KEY_SIZE] {
    x25519_dalek::x25519(scalar, point)
}

/// Derive the X25519 public key of a secret scalar.
pub fn derive_public_key(secret: [u8; KEY_SIZE]) -> [u8; KEY_SIZE] {
    x25519_dalek::x25519(secret, x25519_dalek::X25519_BASEPOINT_BYTES)
}

/// Apply X25519 bit clamping to raw scalar bytes.
pub fn clamp_scalar(mut scalar: [u8; KEY_SIZE]) -> [u8; KEY_SIZE] {
    scalar[0] &= 248;
    scalar[31] &= 127;
    scalar[31] |= 64;
    scalar
}

/// Fill an array of any size with cryptographically secure random bytes.
pub fn random_array<const N: usize>() -> [u8; N] {
    let mut bytes = [0; N];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// Generate a random ChaCha20-Poly1305 nonce.
pub fn gen_nonce() -> [u8; NONCE_SIZE] {
    random_array()
}

/// Generate a random symmetric key.
pub fn gen_key() -> [u8; KEY_SIZE] {
    random_array()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt() {
        let key = gen_key();
        let nonce = gen_nonce();
        let plaintext = b"onions have layers";
        let aad = b"associated data";

        let ciphertext = encrypt(&key, &nonce, plaintext, aad).unwrap();
        assert_eq!(ciphertext.len(), plaintext.len() + TAG_SIZE);

        let decrypted = decrypt(&key, &nonce, &ciphertext, aad).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn encrypt_empty_plaintext_is_tag_only() {
        let key = [0; KEY_SIZE];
        let nonce = [0; NONCE_SIZE];
        let ciphertext = encrypt(&key, &nonce, b"", b"").unwrap();
        assert_eq!(ciphertext.len(), TAG_SIZE);
        // Sealing is deterministic for a fixed key and nonce.
        assert_eq!(ciphertext, encrypt(&key, &nonce, b"", b"").unwrap());
        assert_eq!(decrypt(&key, &nonce, &ciphertext, b"").unwrap(), b"");
    }

    #[test]
    fn decrypt_rejects_flipped_ciphertext_bit() {
        let key = gen_key();
        let nonce = gen_nonce();
        let mut ciphertext = encrypt(&key, &nonce, b"payload", b"aad").unwrap();

        for i in 0..ciphertext.len() {
            ciphertext[i] ^= 0x01;
            assert!(decrypt(&key, &nonce, &ciphertext, b"aad").is_err());
            ciphertext[i] ^= 0x01;
        }
    }

    #[test]
    fn decrypt_rejects_wrong_nonce() {
        let key = gen_key();
        let nonce = gen_nonce();
        let ciphertext = encrypt(&key, &nonce, b"payload", b"").unwrap();

        let mut bad_nonce = nonce;
        bad_nonce[0] ^= 0x01;
        assert!(decrypt(&key, &bad_nonce, &ciphertext, b"").is_err());
    }

    #[test]
    fn decrypt_rejects_wrong_aad() {
        let key = gen_key();
        let nonce = gen_nonce();
        let ciphertext = encrypt(&key, &nonce, b"payload", b"aad").unwrap();

        assert!(decrypt(&key, &nonce, &ciphertext, b"bad").is_err());
    }

    #[test]
    fn hkdf_sha256_is_deterministic() {
        let out1 = hkdf_sha256(b"input key material", b"salt", b"info");
        let out2 = hkdf_sha256(b"input key material", b"salt", b"info");
        assert_eq!(out1, out2);

        let other = hkdf_sha256(b"input key material", b"salt", b"other info");
        assert_ne!(out1, other);
    }

    #[test]
    fn x25519_shared_secret_agreement() {
        let alice_sk = clamp_scalar(random_array());
        let bob_sk = clamp_scalar(random_array());
        let alice_pk = derive_public_key(alice_sk);
        let bob_pk = derive_public_key(bob_sk);

        assert_eq!(x25519(alice_sk, bob_pk), x25519(bob_sk, alice_pk));
    }

    #[test]
    fn clamp_scalar_masks_bits() {
        let clamped = clamp_scalar([0xff; KEY_SIZE]);
        assert_eq!(clamped[0] & 0x07, 0);
        assert_eq!(clamped[31] & 0x80, 0);
        assert_eq!(clamped[31] & 0x40, 0x40);
        // Clamping is idempotent.
        assert_eq!(clamp_scalar(clamped), clamped);
    }

    #[test]
    fn random_arrays_differ() {
        let a: [u8; 32] = random_array();
        let b: [u8; 32] = random_array();
        assert_ne!(a, b);
    }
}
