//! Packet framer — header, flags, compression, body build/parse.
//!
//! ## Wire format
//!
//! ```text
//! flags:u32 body_len:u32 body:u8[body_len]      (big-endian)
//! body := opcode:u8 tag_count:(u8|u16) Tag*
//! ```
//!
//! Outgoing packets always use UTF-8-numbers framing; bodies over the
//! compression threshold are zlib-deflated and flagged. On receipt both
//! numbering modes and the compression flag are honored regardless of
//! size.

use std::io::{Read, Write};

use bitflags::bitflags;
use bytes::{BufMut, BytesMut};
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use md5::{Digest, Md5};

use crate::codes::{OpCode, PROTOCOL_VERSION, tag_id};
use crate::error::EcError;
use crate::tag::{NumberingMode, Tag};

bitflags! {
    /// Flags word of the packet header.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PacketFlags: u32 {
        /// Body is zlib-compressed.
        const ZLIB = 0x0000_0001;
        /// Numeric framing fields use the compact encoding.
        const UTF8_NUMBERS = 0x0000_0002;
        /// Application base marker, set on every packet we send.
        const BASE = 0x0000_0020;
    }
}

/// Fixed header size: flags word plus body length.
pub const HEADER_SIZE: usize = 8;

/// Bodies larger than this are compressed before sending.
pub const COMPRESSION_THRESHOLD: usize = 1024;

/// A request or response: opcode plus its tag list.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub opcode: OpCode,
    pub tags: Vec<Tag>,
}

impl Packet {
    pub fn new(opcode: OpCode, tags: Vec<Tag>) -> Self {
        Self { opcode, tags }
    }

    /// Serialize header and body, compressing when the body exceeds the
    /// threshold.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EcError> {
        let mut body = BytesMut::new();
        body.put_u8(self.opcode as u8);
        if self.tags.len() > u8::MAX as usize {
            return Err(EcError::TooManyTags(self.tags.len()));
        }
        body.put_u8(self.tags.len() as u8);
        for tag in &self.tags {
            tag.encode(NumberingMode::Utf8, &mut body)?;
        }

        let mut flags = PacketFlags::BASE | PacketFlags::UTF8_NUMBERS;
        let body = if body.len() > COMPRESSION_THRESHOLD {
            flags |= PacketFlags::ZLIB;
            compress(&body)?
        } else {
            body.to_vec()
        };

        let mut out = Vec::with_capacity(HEADER_SIZE + body.len());
        out.extend_from_slice(&flags.bits().to_be_bytes());
        out.extend_from_slice(&(body.len() as u32).to_be_bytes());
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Parse a received body under the given header flags.
    ///
    /// The no-op opcode carries no tags by definition; every other
    /// opcode is followed by a tag count and that many sibling tags.
    pub fn parse(flags: PacketFlags, body: &[u8]) -> Result<Packet, EcError> {
        let decompressed;
        let body = if flags.contains(PacketFlags::ZLIB) {
            decompressed = decompress(body)?;
            decompressed.as_slice()
        } else {
            body
        };

        let opcode_byte = *body.first().ok_or(EcError::MalformedPacket("empty body"))?;
        let opcode = OpCode::try_from(opcode_byte)?;

        if opcode == OpCode::Noop {
            return Ok(Packet::new(opcode, Vec::new()));
        }

        let (mode, count, tags_at) = if flags.contains(PacketFlags::UTF8_NUMBERS) {
            let count = *body
                .get(1)
                .ok_or(EcError::MalformedPacket("missing tag count"))?;
            (NumberingMode::Utf8, count as usize, 2)
        } else {
            let raw = body
                .get(1..3)
                .ok_or(EcError::MalformedPacket("missing tag count"))?;
            (
                NumberingMode::Legacy,
                u16::from_be_bytes([raw[0], raw[1]]) as usize,
                3,
            )
        };

        let (_, tags) = Tag::decode_list(&body[tags_at..], count, mode)?;
        Ok(Packet::new(opcode, tags))
    }
}

// ── Compression ──────────────────────────────────────────────────

fn compress(body: &[u8]) -> Result<Vec<u8>, EcError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(body)
        .and_then(|_| encoder.finish())
        .map_err(|e| EcError::Decompression(e.to_string()))
}

fn decompress(body: &[u8]) -> Result<Vec<u8>, EcError> {
    let mut decoder = ZlibDecoder::new(body);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| EcError::Decompression(e.to_string()))?;
    Ok(out)
}

// ── Login packets ────────────────────────────────────────────────

/// MD5 digest of arbitrary bytes.
pub(crate) fn md5_digest(data: &[u8]) -> [u8; 16] {
    Md5::digest(data).into()
}

/// First-stage login: client identity plus the plain password digest.
pub fn login_request(client_name: &str, client_version: &str, password: &str) -> Packet {
    Packet::new(
        OpCode::AuthReq,
        vec![
            Tag::text(tag_id::CLIENT_NAME, client_name),
            Tag::text(tag_id::CLIENT_VERSION, client_version),
            Tag::uint(tag_id::PROTOCOL_VERSION, PROTOCOL_VERSION),
            Tag::hash(tag_id::PASSWD_HASH, md5_digest(password.as_bytes())),
        ],
    )
}

/// Second-stage login carrying the digest of the salted challenge.
pub fn salted_auth(challenge: &str) -> Packet {
    Packet::new(
        OpCode::AuthPasswd,
        vec![Tag::hash(tag_id::PASSWD_HASH, md5_digest(challenge.as_bytes()))],
    )
}
