/*! Codec for encoding/decoding DOR packets in terms of tokio-io.

The wire frame is `type (1) ‖ length (2, big-endian) ‖ body`. The decoder
checks the type byte against the registered packet types and the declared
length against the type's expected length before the body is even
buffered, so unknown types and length lies are rejected early.
*/

use std::io::Error as IoError;

use bytes::{Buf, BytesMut};
use cookie_factory::GenError;
use nom::error::Error as NomError;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use dor_binary_io::{FromBytes, ToBytes};
use dor_packet::onion::ONION_PACKET_SIZE;
use dor_packet::packet::{Packet, PACKET_HEADER_SIZE};

use crate::stats::Stats;

/// Largest possible frame: header plus an onion packet body.
pub const MAX_FRAME_SIZE: usize = PACKET_HEADER_SIZE + ONION_PACKET_SIZE;

/// Error that can happen when decoding a `Packet` from bytes.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The type byte is not registered.
    #[error("unknown packet type: {packet_type:#04x}")]
    UnknownPacketType {
        /// Type byte of the received frame.
        packet_type: u8,
    },
    /// The declared length differs from the type's expected length.
    #[error("invalid payload length for packet {packet_type:#04x}: got {got}, expected {expected}")]
    InvalidPayloadLength {
        /// Type byte of the received frame.
        packet_type: u8,
        /// Length declared in the frame header.
        got: usize,
        /// Length the registered type expects.
        expected: usize,
    },
    /// The frame body could not be parsed.
    #[error("deserialize packet error: {error:?}")]
    Deserialize {
        /// Parsing error.
        error: nom::Err<NomError<Vec<u8>>>,
    },
    /// General IO error that can happen on the stream.
    #[error("IO error: {0}")]
    Io(#[from] IoError),
}

impl DecodeError {
    pub(crate) fn deserialize(e: nom::Err<NomError<&[u8]>>) -> DecodeError {
        DecodeError::Deserialize {
            error: e.map(|e| NomError::new(e.input.to_vec(), e.code)),
        }
    }
}

/// Error that can happen when encoding a `Packet` to bytes.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// The packet is invalid and cannot be serialized.
    #[error("serialize packet error: {error:?}")]
    Serialize {
        /// Serialization error.
        error: GenError,
    },
    /// General IO error that can happen on the stream.
    #[error("IO error: {0}")]
    Io(#[from] IoError),
}

/// Struct to use for {de-,}serializing DOR packets over a stream.
#[derive(Clone, Default)]
pub struct PacketCodec {
    stats: Stats,
}

impl PacketCodec {
    /// Make object.
    pub fn new(stats: Stats) -> Self {
        PacketCodec { stats }
    }
}

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = DecodeError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if buf.len() < PACKET_HEADER_SIZE {
            return Ok(None);
        }

        let packet_type = buf[0];
        let declared_len = u16::from_be_bytes([buf[1], buf[2]]) as usize;

        let expected = Packet::expected_len(packet_type)
            .ok_or(DecodeError::UnknownPacketType { packet_type })?;
        if declared_len != expected {
            return Err(DecodeError::InvalidPayloadLength {
                packet_type,
                got: declared_len,
                expected,
            });
        }

        let frame_len = PACKET_HEADER_SIZE + declared_len;
        if buf.len() < frame_len {
            buf.reserve(frame_len - buf.len());
            return Ok(None);
        }

        let frame = buf.copy_to_bytes(frame_len);
        match Packet::from_bytes(&frame) {
            Ok((_, packet)) => {
                self.stats.counters.increase_incoming();
                Ok(Some(packet))
            }
            Err(error) => Err(DecodeError::deserialize(error)),
        }
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = EncodeError;

    fn encode(&mut self, packet: Packet, buf: &mut BytesMut) -> Result<(), Self::Error> {
        let mut packet_buf = [0; MAX_FRAME_SIZE];
        let size = packet
            .to_bytes((&mut packet_buf, 0))
            .map_err(|error| EncodeError::Serialize { error })?
            .1;
        self.stats.counters.increase_outgoing();
        buf.extend_from_slice(&packet_buf[..size]);
        Ok(())
    }
}
