/*! Per-message cryptographic material attached to one relay group.

All three values are generated fresh by the sender for every message and
discarded once the frame has been emitted.
*/

use std::fmt;

use dor_crypto::{clamp_scalar, derive_public_key, gen_key, random_array, KEY_SIZE};

use crate::relay::RelayGroup;

/// A relay group together with the ephemeral secrets used to seal the layer
/// addressed to it.
#[derive(Clone)]
pub struct CryptoGroup {
    /// The relay group this material belongs to.
    pub group: RelayGroup,
    /// Symmetric key sealing this layer's body.
    pub cipher_key: [u8; KEY_SIZE],
    /// Ephemeral X25519 secret scalar, clamped.
    pub esk: [u8; KEY_SIZE],
    /// Public key of `esk`, sent in the layer header.
    pub epk: [u8; KEY_SIZE],
}

impl CryptoGroup {
    /// Attach freshly generated crypto material to a relay group.
    pub fn new(group: RelayGroup) -> CryptoGroup {
        let cipher_key = gen_key();
        let esk = clamp_scalar(random_array());
        let epk = derive_public_key(esk);
        CryptoGroup {
            group,
            cipher_key,
            esk,
            epk,
        }
    }
}

impl fmt::Display for CryptoGroup {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{{group={} cipher={} epk={}}}",
            self.group,
            hex::encode(&self.cipher_key[..4]),
            hex::encode(&self.epk[..4]),
        )
    }
}
