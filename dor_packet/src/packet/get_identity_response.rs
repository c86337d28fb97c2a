/*! GetIdentityResponse packet
*/

use dor_binary_io::*;

use cookie_factory::{do_gen, gen_be_u16, gen_be_u8, gen_slice};
use nom::bytes::streaming::{tag, take};
use nom::combinator::{map_opt, verify};
use nom::number::streaming::be_u16;
use uuid::Uuid;

/** Identity material of a relay, sent in reply to `GetIdentityRequest`.

Serialized form:

Length | Content
------ | ------
`1`    | `0x01`
`2`    | `0x0030` (48-byte body)
`16`   | Relay UUID
`32`   | Relay X25519 public key

*/
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct GetIdentityResponse {
    /// Long-term UUID of the responding relay.
    pub uuid: Uuid,
    /// Long-term X25519 public key of the responding relay.
    pub public_key: [u8; 32],
}

impl GetIdentityResponse {
    /// Wire type byte.
    pub const PACKET_TYPE: u8 = 0x01;
    /// Declared body length: UUID (16) + public key (32).
    pub const EXPECTED_LEN: usize = 48;
}

impl FromBytes for GetIdentityResponse {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, _) = tag(&[Self::PACKET_TYPE][..])(input)?;
        let (input, _) = verify(be_u16, |len| *len as usize == Self::EXPECTED_LEN)(input)?;
        let (input, uuid) = map_opt(take(16usize), |bytes: &[u8]| Uuid::from_slice(bytes).ok())(input)?;
        let (input, public_key) = map_opt(take(32usize), |bytes: &[u8]| {
            <[u8; 32]>::try_from(bytes).ok()
        })(input)?;
        Ok((input, GetIdentityResponse { uuid, public_key }))
    }
}

impl ToBytes for GetIdentityResponse {
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        do_gen!(buf,
            gen_be_u8!(Self::PACKET_TYPE) >>
            gen_be_u16!(Self::EXPECTED_LEN as u16) >>
            gen_slice!(self.uuid.as_bytes().as_ref()) >>
            gen_slice!(self.public_key.as_ref())
        )
    }
}
