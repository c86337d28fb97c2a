/*! OnionLayerCiphered — the logical decrypted content of an
`OnionLayer`'s ciphertext. It is NEVER transmitted as-is.

```text
0        7        15       23       31
+--------+--------+--------+--------+
|RRRRlnnh|   Payload Len   | NNH[0] |
+--------+--------+--------+--------+
|                                   |
~ Next Hops List (Variable) [1:...] ~
|                                   |
+--------+--------+--------+--------+
|                                   |
~          Actual Payload           ~
|                                   |
+--------+--------+--------+--------+
```

`R` is reserved (4 bits), `l` the last-server flag, `nnh` the next-hop
count. For a forwarding hop the payload is the inner layer's serialized
bytes; for the last hop it is the data to deliver.
*/

use dor_binary_io::*;

use cookie_factory::{do_gen, gen_be_u16, gen_be_u8, gen_call, gen_cond, gen_many_ref, gen_slice};
use nom::combinator::{rest, success, verify};
use nom::multi::count;
use nom::number::streaming::{be_u16, be_u8};

use super::wrapped_key::MAX_WRAPPED_KEYS;
use super::{is_last_server, nb_next_hops, FLAG_LAST_SERVER, FLAG_NB_NEXT_HOPS};
use crate::endpoint::Endpoint;

/// Fixed metadata of the decrypted content: flags (1) + payload length (2).
pub const INNER_METADATA_FIXED_SIZE: usize = 1 + 2;

/// Decrypted content of one onion layer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OnionLayerCiphered {
    /// Whether the peeling relay is the final hop.
    pub last_server: bool,
    /// Candidate endpoints for the next hop. Empty on the final hop, at most
    /// [`MAX_WRAPPED_KEYS`] otherwise.
    pub next_hops: Vec<Endpoint>,
    /// Length of the meaningful prefix of `payload` at sealing time: the
    /// inner layer bytes for a forwarding hop, the user payload for the last
    /// hop. Not the length of the original message.
    pub util_payload_length: u16,
    /// Body bytes.
    pub payload: Vec<u8>,
}

impl OnionLayerCiphered {
    fn flags_byte(&self) -> u8 {
        let mut flags = 0;
        if self.last_server {
            flags |= FLAG_LAST_SERVER;
        }
        flags | (self.next_hops.len() as u8 & FLAG_NB_NEXT_HOPS)
    }
}

impl FromBytes for OnionLayerCiphered {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, flags) = be_u8(input)?;
        let (input, _) = verify(success(flags), |flags| {
            nb_next_hops(*flags) as usize <= MAX_WRAPPED_KEYS
        })(input)?;
        let (input, util_payload_length) = be_u16(input)?;
        let (input, next_hops) = count(Endpoint::from_bytes, nb_next_hops(flags) as usize)(input)?;
        let (input, payload) = rest(input)?;
        Ok((
            input,
            OnionLayerCiphered {
                last_server: is_last_server(flags),
                next_hops,
                util_payload_length,
                payload: payload.to_vec(),
            },
        ))
    }
}

impl ToBytes for OnionLayerCiphered {
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        do_gen!(buf,
            gen_cond!(
                self.next_hops.len() > MAX_WRAPPED_KEYS,
                |buf| gen_error(buf, 0)
            ) >>
            gen_be_u8!(self.flags_byte()) >>
            gen_be_u16!(self.util_payload_length) >>
            gen_many_ref!(&self.next_hops, |buf, ep| Endpoint::to_bytes(ep, buf)) >>
            gen_slice!(self.payload.as_slice()) >>
            gen_len_limit(super::ONION_PACKET_SIZE)
        )
    }
}
