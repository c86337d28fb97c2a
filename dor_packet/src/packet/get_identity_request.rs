/*! GetIdentityRequest packet
*/

use dor_binary_io::*;

use cookie_factory::{do_gen, gen_be_u16, gen_be_u8};
use nom::bytes::streaming::tag;
use nom::combinator::verify;
use nom::number::streaming::be_u16;

/** Ask a relay for its identity material.

Serialized form:

Length | Content
------ | ------
`1`    | `0x00`
`2`    | `0x0000` (empty body)

*/
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct GetIdentityRequest;

impl GetIdentityRequest {
    /// Wire type byte.
    pub const PACKET_TYPE: u8 = 0x00;
    /// Declared body length.
    pub const EXPECTED_LEN: usize = 0;
}

impl FromBytes for GetIdentityRequest {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, _) = tag(&[Self::PACKET_TYPE][..])(input)?;
        let (input, _) = verify(be_u16, |len| *len as usize == Self::EXPECTED_LEN)(input)?;
        Ok((input, GetIdentityRequest))
    }
}

impl ToBytes for GetIdentityRequest {
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        do_gen!(buf,
            gen_be_u8!(Self::PACKET_TYPE) >>
            gen_be_u16!(Self::EXPECTED_LEN as u16)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    encode_decode_test!(get_identity_request_encode_decode, GetIdentityRequest);

    #[test]
    fn non_empty_body_length_rejected() {
        let buf = [0x00, 0x00, 0x01];
        assert!(GetIdentityRequest::from_bytes(&buf).is_err());
    }
}
