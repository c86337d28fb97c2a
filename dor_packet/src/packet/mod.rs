/*! Top-level typed packets of the DOR wire protocol.

Every packet travels as `type (1 byte) ‖ length (2 bytes, big-endian) ‖
body (length bytes)`. Each registered type declares the body length it
expects; readers reject frames whose declared length differs.
*/

mod get_identity_request;
mod get_identity_response;
mod onion_packet;

pub use self::get_identity_request::GetIdentityRequest;
pub use self::get_identity_response::GetIdentityResponse;
pub use self::onion_packet::OnionPacket;

use dor_binary_io::*;

use nom::branch::alt;
use nom::combinator::map;

/// Size of the `type ‖ length` frame header.
pub const PACKET_HEADER_SIZE: usize = 3;

/// Largest body the 2-byte length field can carry.
pub const MAX_PACKET_PAYLOAD_SIZE: usize = 65535;

/// A typed DOR packet.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Packet {
    /// [`GetIdentityRequest`](./struct.GetIdentityRequest.html) structure.
    GetIdentityRequest(GetIdentityRequest),
    /// [`GetIdentityResponse`](./struct.GetIdentityResponse.html) structure.
    GetIdentityResponse(GetIdentityResponse),
    /// [`OnionPacket`](./struct.OnionPacket.html) structure.
    OnionPacket(OnionPacket),
}

impl Packet {
    /// The wire type byte of this packet.
    pub fn packet_type(&self) -> u8 {
        match self {
            Packet::GetIdentityRequest(_) => GetIdentityRequest::PACKET_TYPE,
            Packet::GetIdentityResponse(_) => GetIdentityResponse::PACKET_TYPE,
            Packet::OnionPacket(_) => OnionPacket::PACKET_TYPE,
        }
    }

    /// The declared body length of a registered packet type, or `None` for
    /// an unknown type byte.
    pub fn expected_len(packet_type: u8) -> Option<usize> {
        match packet_type {
            GetIdentityRequest::PACKET_TYPE => Some(GetIdentityRequest::EXPECTED_LEN),
            GetIdentityResponse::PACKET_TYPE => Some(GetIdentityResponse::EXPECTED_LEN),
            OnionPacket::PACKET_TYPE => Some(OnionPacket::EXPECTED_LEN),
            _ => None,
        }
    }
}

impl FromBytes for Packet {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        alt((
            map(GetIdentityRequest::from_bytes, Packet::GetIdentityRequest),
            map(GetIdentityResponse::from_bytes, Packet::GetIdentityResponse),
            map(OnionPacket::from_bytes, Packet::OnionPacket),
        ))(input)
    }
}

impl ToBytes for Packet {
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        match self {
            Packet::GetIdentityRequest(ref p) => p.to_bytes(buf),
            Packet::GetIdentityResponse(ref p) => p.to_bytes(buf),
            Packet::OnionPacket(ref p) => p.to_bytes(buf),
        }
    }
}
