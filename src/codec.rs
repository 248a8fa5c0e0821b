//! Incremental frame codec for the packet format.
//!
//! Sits between a byte stream and [`Packet`]: the decoder waits for the
//! fixed 8-byte header, then for the declared body, and only then
//! parses. Partial reads leave the buffer untouched so the caller can
//! keep accumulating.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::EcError;
use crate::packet::{HEADER_SIZE, Packet, PacketFlags};

/// Largest body accepted from the wire. A length field beyond this is
/// treated as corruption rather than an allocation request.
pub const MAX_BODY_SIZE: usize = 8 * 1024 * 1024;

/// Frame codec: 8-byte header, then `body_len` bytes of body.
#[derive(Debug, Default)]
pub struct EcCodec;

impl Decoder for EcCodec {
    type Item = Packet;
    type Error = EcError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, EcError> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        let flags_raw = u32::from_be_bytes(src[0..4].try_into().expect("header slice"));
        let body_len = u32::from_be_bytes(src[4..8].try_into().expect("header slice")) as usize;

        if body_len > MAX_BODY_SIZE {
            return Err(EcError::MalformedPacket("declared body length exceeds cap"));
        }
        if src.len() < HEADER_SIZE + body_len {
            src.reserve(HEADER_SIZE + body_len - src.len());
            return Ok(None);
        }

        let frame = src.split_to(HEADER_SIZE + body_len);
        let flags = PacketFlags::from_bits_truncate(flags_raw);
        Packet::parse(flags, &frame[HEADER_SIZE..]).map(Some)
    }
}

impl Encoder<&Packet> for EcCodec {
    type Error = EcError;

    fn encode(&mut self, packet: &Packet, dst: &mut BytesMut) -> Result<(), EcError> {
        dst.extend_from_slice(&packet.to_bytes()?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes::{OpCode, tag_id};
    use crate::tag::Tag;

    #[test]
    fn incomplete_header_yields_none() {
        let mut codec = EcCodec;
        let mut buf = BytesMut::from(&[0x00, 0x00, 0x00][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 3, "partial header must stay buffered");
    }

    #[test]
    fn incomplete_body_yields_none() {
        let packet = Packet::new(OpCode::StatReq, vec![]);
        let bytes = packet.to_bytes().unwrap();

        let mut codec = EcCodec;
        let mut buf = BytesMut::from(&bytes[..bytes.len() - 1]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&bytes[bytes.len() - 1..]);
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, packet);
        assert!(buf.is_empty());
    }

    #[test]
    fn two_frames_in_one_buffer() {
        let first = Packet::new(OpCode::StatReq, vec![]);
        let second = Packet::new(
            OpCode::AddLink,
            vec![Tag::text(tag_id::STRING, "ed2k://|file|a|1|00|/")],
        );

        let mut codec = EcCodec;
        let mut buf = BytesMut::new();
        codec.encode(&first, &mut buf).unwrap();
        codec.encode(&second, &mut buf).unwrap();

        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), first);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), second);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn oversized_length_field_is_rejected() {
        let mut header = Vec::new();
        header.extend_from_slice(&0x22u32.to_be_bytes());
        header.extend_from_slice(&(MAX_BODY_SIZE as u32 + 1).to_be_bytes());

        let mut codec = EcCodec;
        let mut buf = BytesMut::from(&header[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(EcError::MalformedPacket(_))
        ));
    }
}
