/*! Endpoint — the (IP address, port) pair a relay or destination listens on.

Serialized form:

Length | Content
------ | ------
`1`    | IP type: `0x04` for IPv4, `0x06` for IPv6
`2`    | Port in BigEndian
`4` or `16` | Raw IP address bytes

*/

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use dor_binary_io::*;

use cookie_factory::{do_gen, gen_be_u16, gen_be_u8, gen_slice};
use nom::branch::alt;
use nom::bytes::streaming::{tag, take};
use nom::combinator::{map, map_opt};
use nom::number::streaming::be_u16;
use thiserror::Error;

/// IP type tag of the IPv4 wire form.
pub const ENDPOINT_V4_TYPE: u8 = 0x04;
/// IP type tag of the IPv6 wire form.
pub const ENDPOINT_V6_TYPE: u8 = 0x06;

/// Serialized size of an IPv4 endpoint.
pub const ENDPOINT_V4_SIZE: usize = 1 + 2 + 4;
/// Serialized size of an IPv6 endpoint.
pub const ENDPOINT_V6_SIZE: usize = 1 + 2 + 16;

/// Error of the string/constructor API. The wire decoder reports failures
/// through `nom` instead and tolerates a zero port.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum EndpointError {
    /// Port 0 is not a dialable endpoint.
    #[error("invalid port: 0")]
    InvalidPort,
    /// The string is not `ip:port` or `[ip]:port`.
    #[error("invalid endpoint format: {0:?}")]
    InvalidFormat(String),
}

/// Network address of a relay or of the final destination.
///
/// IPv4-mapped IPv6 addresses are normalized to their IPv4 form on
/// construction and on parse, so equality compares normalized addresses.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Endpoint {
    /// IP address, normalized.
    pub ip: IpAddr,
    /// TCP port. Never 0 when built through [`Endpoint::new`].
    pub port: u16,
}

/// Collapse an IPv4-mapped IPv6 address into its IPv4 form.
fn canonical_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(v6),
        },
        v4 => v4,
    }
}

impl Endpoint {
    /// Create an endpoint, rejecting port 0.
    pub fn new(ip: IpAddr, port: u16) -> Result<Endpoint, EndpointError> {
        if port == 0 {
            return Err(EndpointError::InvalidPort);
        }
        Ok(Endpoint {
            ip: canonical_ip(ip),
            port,
        })
    }

    /// Serialized size of this endpoint: 7 for IPv4, 19 for IPv6.
    pub fn bytes_len(&self) -> usize {
        match self.ip {
            IpAddr::V4(_) => ENDPOINT_V4_SIZE,
            IpAddr::V6(_) => ENDPOINT_V6_SIZE,
        }
    }

    /// Whether the normalized address is IPv4.
    pub fn is_ipv4(&self) -> bool {
        self.ip.is_ipv4()
    }

    /// Whether the normalized address is IPv6.
    pub fn is_ipv6(&self) -> bool {
        self.ip.is_ipv6()
    }

    /// The socket address to dial.
    pub fn to_socket_addr(self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}

impl FromBytes for Endpoint {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        alt((
            map(
                nom::sequence::preceded(
                    tag(&[ENDPOINT_V4_TYPE][..]),
                    nom::sequence::pair(
                        be_u16,
                        map_opt(take(4usize), |bytes: &[u8]| {
                            <[u8; 4]>::try_from(bytes).ok()
                        }),
                    ),
                ),
                |(port, octets)| Endpoint {
                    ip: IpAddr::from(octets),
                    port,
                },
            ),
            map(
                nom::sequence::preceded(
                    tag(&[ENDPOINT_V6_TYPE][..]),
                    nom::sequence::pair(
                        be_u16,
                        map_opt(take(16usize), |bytes: &[u8]| {
                            <[u8; 16]>::try_from(bytes).ok()
                        }),
                    ),
                ),
                |(port, octets)| Endpoint {
                    ip: canonical_ip(IpAddr::from(octets)),
                    port,
                },
            ),
        ))(input)
    }
}

impl ToBytes for Endpoint {
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        match self.ip {
            IpAddr::V4(ip) => do_gen!(buf,
                gen_be_u8!(ENDPOINT_V4_TYPE) >>
                gen_be_u16!(self.port) >>
                gen_slice!(ip.octets().as_ref())
            ),
            IpAddr::V6(ip) => do_gen!(buf,
                gen_be_u8!(ENDPOINT_V6_TYPE) >>
                gen_be_u16!(self.port) >>
                gen_slice!(ip.octets().as_ref())
            ),
        }
    }
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    /// Parse `ipv4:port` or `[ipv6]:port`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let addr = SocketAddr::from_str(s)
            .map_err(|_| EndpointError::InvalidFormat(s.to_string()))?;
        Endpoint::new(addr.ip(), addr.port())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.to_socket_addr().fmt(f)
    }
}
