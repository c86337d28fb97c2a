/*! OnionPacket — the opaque onion datagram.
*/

use dor_binary_io::*;

use cookie_factory::{do_gen, gen_be_u16, gen_be_u8, gen_call, gen_cond, gen_slice};
use nom::bytes::streaming::{tag, take};
use nom::combinator::verify;
use nom::number::streaming::be_u16;

use crate::onion::ONION_PACKET_SIZE;

/** A full onion frame in transit. The body is exactly 4096 bytes and
opaque to everyone except the relay able to unwrap its outer layer.

Serialized form:

Length | Content
------ | ------
`1`    | `0x10`
`2`    | `0x1000` (4096-byte body)
`4096` | Onion frame

*/
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OnionPacket {
    /// The padded onion frame. Always [`ONION_PACKET_SIZE`] bytes.
    pub data: Vec<u8>,
}

impl OnionPacket {
    /// Wire type byte.
    pub const PACKET_TYPE: u8 = 0x10;
    /// Declared body length.
    pub const EXPECTED_LEN: usize = ONION_PACKET_SIZE;
}

impl FromBytes for OnionPacket {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, _) = tag(&[Self::PACKET_TYPE][..])(input)?;
        let (input, _) = verify(be_u16, |len| *len as usize == Self::EXPECTED_LEN)(input)?;
        let (input, data) = take(Self::EXPECTED_LEN)(input)?;
        Ok((
            input,
            OnionPacket {
                data: data.to_vec(),
            },
        ))
    }
}

impl ToBytes for OnionPacket {
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        do_gen!(buf,
            gen_cond!(
                self.data.len() != Self::EXPECTED_LEN,
                |buf| gen_error(buf, 0)
            ) >>
            gen_be_u8!(Self::PACKET_TYPE) >>
            gen_be_u16!(Self::EXPECTED_LEN as u16) >>
            gen_slice!(self.data.as_slice())
        )
    }
}
