//! Tag codec — the protocol's atomic data element.
//!
//! A tag is a numeric id, a typed payload, and an optional ordered list
//! of child tags, nested recursively. On the wire:
//!
//! ```text
//! tagnum:(varnum|u16)            2*id + has_children
//! type:u8
//! length:(varnum|u32)            payload bytes + subtag block bytes
//! [count:(u8|u16) Tag*]          iff has_children
//! payload:u8[..]                 per type
//! ```
//!
//! All integers are big-endian. Numeric fields are compact varnums in
//! UTF-8-numbers mode and fixed-width in legacy mode; both modes are
//! decoded, outgoing packets always use UTF-8-numbers mode.
//!
//! Decoding is streaming: every decode reports the exact number of
//! bytes it consumed so sibling tags can be walked with a cursor and
//! no re-scanning.

use std::net::{Ipv4Addr, SocketAddrV4};

use bytes::{BufMut, BytesMut};

use crate::error::EcError;
use crate::varnum;

/// How numeric framing fields are encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberingMode {
    /// Compact varnum framing (the mode this client always sends).
    Utf8,
    /// Fixed-width framing: u16 tagnum, u32 length, u16 subtag count.
    Legacy,
}

// ── Tag types ────────────────────────────────────────────────────

/// Wire type byte of a tag payload.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagType {
    Custom = 0x01,
    UInt8 = 0x02,
    UInt16 = 0x03,
    UInt32 = 0x04,
    UInt64 = 0x05,
    String = 0x06,
    Ipv4 = 0x08,
    Hash16 = 0x09,
}

impl TryFrom<u8> for TagType {
    type Error = EcError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0x01 => TagType::Custom,
            0x02 => TagType::UInt8,
            0x03 => TagType::UInt16,
            0x04 => TagType::UInt32,
            0x05 => TagType::UInt64,
            0x06 => TagType::String,
            0x08 => TagType::Ipv4,
            0x09 => TagType::Hash16,
            other => return Err(EcError::UnknownTagType(other)),
        })
    }
}

// ── TagValue ─────────────────────────────────────────────────────

/// Typed payload of a tag.
///
/// Unsigned integers are width-less in memory; the encoder always picks
/// the smallest wire width that fits, and the decoder accepts any of
/// the four widths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagValue {
    UInt(u64),
    Text(String),
    Hash16([u8; 16]),
    Ipv4(SocketAddrV4),
    Bytes(Vec<u8>),
}

impl TagValue {
    /// Wire type byte for this value.
    fn tag_type(&self) -> TagType {
        match self {
            TagValue::UInt(v) if *v < 0x100 => TagType::UInt8,
            TagValue::UInt(v) if *v < 0x1_0000 => TagType::UInt16,
            TagValue::UInt(v) if *v < 0x1_0000_0000 => TagType::UInt32,
            TagValue::UInt(_) => TagType::UInt64,
            TagValue::Text(_) => TagType::String,
            TagValue::Hash16(_) => TagType::Hash16,
            TagValue::Ipv4(_) => TagType::Ipv4,
            TagValue::Bytes(_) => TagType::Custom,
        }
    }

    /// Append the payload bytes for this value.
    fn encode_payload(&self, out: &mut BytesMut) {
        match self {
            TagValue::UInt(v) => match self.tag_type() {
                TagType::UInt8 => out.put_u8(*v as u8),
                TagType::UInt16 => out.put_u16(*v as u16),
                TagType::UInt32 => out.put_u32(*v as u32),
                _ => out.put_u64(*v),
            },
            TagValue::Text(s) => {
                out.put_slice(s.as_bytes());
                out.put_u8(0);
            }
            TagValue::Hash16(h) => out.put_slice(h),
            TagValue::Ipv4(addr) => {
                out.put_slice(&addr.ip().octets());
                out.put_u16(addr.port());
            }
            TagValue::Bytes(b) => out.put_slice(b),
        }
    }

    /// Payload length on the wire.
    fn payload_len(&self) -> usize {
        match self {
            TagValue::UInt(v) if *v < 0x100 => 1,
            TagValue::UInt(v) if *v < 0x1_0000 => 2,
            TagValue::UInt(v) if *v < 0x1_0000_0000 => 4,
            TagValue::UInt(_) => 8,
            TagValue::Text(s) => s.len() + 1,
            TagValue::Hash16(_) => 16,
            TagValue::Ipv4(_) => 6,
            TagValue::Bytes(b) => b.len(),
        }
    }

    /// Decode a payload of the given wire type.
    fn decode_payload(tag_type: TagType, payload: &[u8]) -> Result<TagValue, EcError> {
        fn need(payload: &[u8], n: usize) -> Result<&[u8], EcError> {
            payload.get(..n).ok_or_else(|| EcError::TruncatedTag {
                needed: n - payload.len(),
                have: payload.len(),
            })
        }

        Ok(match tag_type {
            TagType::UInt8 => TagValue::UInt(need(payload, 1)?[0] as u64),
            TagType::UInt16 => {
                let b = need(payload, 2)?;
                TagValue::UInt(u16::from_be_bytes([b[0], b[1]]) as u64)
            }
            TagType::UInt32 => {
                let b = need(payload, 4)?;
                TagValue::UInt(u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as u64)
            }
            TagType::UInt64 => {
                let b = need(payload, 8)?;
                let mut raw = [0u8; 8];
                raw.copy_from_slice(b);
                TagValue::UInt(u64::from_be_bytes(raw))
            }
            TagType::String => {
                let nul = payload
                    .iter()
                    .position(|&b| b == 0)
                    .ok_or(EcError::MalformedPacket("string payload has no terminator"))?;
                TagValue::Text(String::from_utf8(payload[..nul].to_vec())?)
            }
            TagType::Hash16 => {
                if payload.len() < 16 {
                    return Err(EcError::InvalidHashLength(payload.len()));
                }
                let mut hash = [0u8; 16];
                hash.copy_from_slice(&payload[..16]);
                TagValue::Hash16(hash)
            }
            TagType::Ipv4 => {
                let b = need(payload, 6)?;
                TagValue::Ipv4(SocketAddrV4::new(
                    Ipv4Addr::new(b[0], b[1], b[2], b[3]),
                    u16::from_be_bytes([b[4], b[5]]),
                ))
            }
            TagType::Custom => TagValue::Bytes(payload.to_vec()),
        })
    }
}

// ── Tag ──────────────────────────────────────────────────────────

/// Deepest child nesting accepted on decode. Hostile input could
/// otherwise recurse until the stack gives out.
const MAX_DEPTH: usize = 64;

/// A typed, possibly-nested (id, value) unit.
///
/// Pure value: built when a request is assembled or a response is
/// parsed, never mutated afterwards. A parent exclusively owns its
/// children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    /// Tag id. The wire reserves the low bit of `2*id` for the
    /// has-children flag, so ids stay below `0x8000`.
    pub id: u16,
    pub value: TagValue,
    pub children: Vec<Tag>,
}

impl Tag {
    pub fn new(id: u16, value: TagValue) -> Self {
        Self { id, value, children: Vec::new() }
    }

    pub fn with_children(id: u16, value: TagValue, children: Vec<Tag>) -> Self {
        Self { id, value, children }
    }

    pub fn uint(id: u16, value: u64) -> Self {
        Self::new(id, TagValue::UInt(value))
    }

    pub fn text(id: u16, value: impl Into<String>) -> Self {
        Self::new(id, TagValue::Text(value.into()))
    }

    pub fn hash(id: u16, value: [u8; 16]) -> Self {
        Self::new(id, TagValue::Hash16(value))
    }

    /// Append the full wire encoding of this tag (recursively).
    pub fn encode(&self, mode: NumberingMode, out: &mut BytesMut) -> Result<(), EcError> {
        debug_assert!(self.id < 0x8000, "tag id has the reserved bit set");

        let tagnum = (self.id as u32) * 2 + u32::from(!self.children.is_empty());
        match mode {
            NumberingMode::Utf8 => {
                varnum::encode(tagnum, out)?;
            }
            NumberingMode::Legacy => out.put_u16(tagnum as u16),
        }

        // Subtag block: count field, then each child fully encoded.
        let mut block = BytesMut::new();
        if !self.children.is_empty() {
            match mode {
                NumberingMode::Utf8 => {
                    if self.children.len() > u8::MAX as usize {
                        return Err(EcError::TooManyTags(self.children.len()));
                    }
                    block.put_u8(self.children.len() as u8);
                }
                NumberingMode::Legacy => {
                    if self.children.len() > u16::MAX as usize {
                        return Err(EcError::TooManyTags(self.children.len()));
                    }
                    block.put_u16(self.children.len() as u16);
                }
            }
            for child in &self.children {
                child.encode(mode, &mut block)?;
            }
        }

        out.put_u8(self.value.tag_type() as u8);

        let length = self.value.payload_len() + block.len();
        match mode {
            NumberingMode::Utf8 => {
                varnum::encode(length as u32, out)?;
            }
            NumberingMode::Legacy => out.put_u32(length as u32),
        }

        out.put_slice(&block);
        self.value.encode_payload(out);
        Ok(())
    }

    /// Decode one tag from the front of `buf`.
    ///
    /// Returns `(consumed_len, tag)`; the caller advances its cursor by
    /// exactly `consumed_len` to reach the next sibling.
    pub fn decode(buf: &[u8], mode: NumberingMode) -> Result<(usize, Tag), EcError> {
        Self::decode_at_depth(buf, mode, 0)
    }

    fn decode_at_depth(
        buf: &[u8],
        mode: NumberingMode,
        depth: usize,
    ) -> Result<(usize, Tag), EcError> {
        if depth > MAX_DEPTH {
            return Err(EcError::MalformedPacket("tag nesting too deep"));
        }

        let (tagnum_len, tagnum) = match mode {
            NumberingMode::Utf8 => varnum::decode(buf)?,
            NumberingMode::Legacy => {
                let b = buf.get(..2).ok_or_else(|| EcError::TruncatedTag {
                    needed: 2usize.saturating_sub(buf.len()),
                    have: buf.len(),
                })?;
                (2, u16::from_be_bytes([b[0], b[1]]) as u32)
            }
        };
        let id = (tagnum / 2) as u16;
        let has_children = tagnum % 2 == 1;
        let mut cursor = tagnum_len;

        let type_byte = *buf.get(cursor).ok_or(EcError::TruncatedTag { needed: 1, have: 0 })?;
        let tag_type = TagType::try_from(type_byte)?;
        cursor += 1;

        let (len_len, declared) = match mode {
            NumberingMode::Utf8 => varnum::decode(&buf[cursor..])?,
            NumberingMode::Legacy => {
                let b = buf.get(cursor..cursor + 4).ok_or_else(|| EcError::TruncatedTag {
                    needed: 4,
                    have: buf.len() - cursor,
                })?;
                (4, u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
            }
        };
        cursor += len_len;
        let declared = declared as usize;

        let block = buf.get(cursor..cursor + declared).ok_or_else(|| EcError::TruncatedTag {
            needed: declared,
            have: buf.len() - cursor,
        })?;

        let (children, payload) = if has_children {
            let (count_len, count) = match mode {
                NumberingMode::Utf8 => {
                    let b = *block.first().ok_or(EcError::TruncatedTag { needed: 1, have: 0 })?;
                    (1, b as usize)
                }
                NumberingMode::Legacy => {
                    let b = block.get(..2).ok_or_else(|| EcError::TruncatedTag {
                        needed: 2usize.saturating_sub(block.len()),
                        have: block.len(),
                    })?;
                    (2, u16::from_be_bytes([b[0], b[1]]) as usize)
                }
            };
            let mut offset = count_len;
            let mut children = Vec::with_capacity(count.min(64));
            for _ in 0..count {
                let (used, child) = Self::decode_at_depth(&block[offset..], mode, depth + 1)?;
                offset += used;
                children.push(child);
            }
            (children, &block[offset..])
        } else {
            (Vec::new(), block)
        };

        let value = TagValue::decode_payload(tag_type, payload)?;
        Ok((cursor + declared, Tag { id, value, children }))
    }

    /// Decode `count` sibling tags, threading the cursor forward.
    ///
    /// Returns the total bytes consumed and the tags in wire order.
    pub fn decode_list(
        buf: &[u8],
        count: usize,
        mode: NumberingMode,
    ) -> Result<(usize, Vec<Tag>), EcError> {
        let mut offset = 0;
        let mut tags = Vec::with_capacity(count.min(64));
        for _ in 0..count {
            let (used, tag) = Self::decode(&buf[offset..], mode)?;
            offset += used;
            tags.push(tag);
        }
        Ok((offset, tags))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_one(tag: &Tag, mode: NumberingMode) -> Vec<u8> {
        let mut buf = BytesMut::new();
        tag.encode(mode, &mut buf).unwrap();
        buf.to_vec()
    }

    fn roundtrip(tag: &Tag, mode: NumberingMode) -> Tag {
        let bytes = encode_one(tag, mode);
        let (used, decoded) = Tag::decode(&bytes, mode).unwrap();
        assert_eq!(used, bytes.len(), "consumed length must cover the encoding");
        decoded
    }

    #[test]
    fn string_tag_wire_vectors() {
        // Type 0x06, length 2, "a", NUL.
        let tag = Tag::text(0, "a");
        assert_eq!(encode_one(&tag, NumberingMode::Utf8), vec![0x00, 0x06, 0x02, 0x61, 0x00]);

        // "ñ" is two UTF-8 bytes plus the NUL.
        let tag = Tag::text(0, "ñ");
        assert_eq!(
            encode_one(&tag, NumberingMode::Utf8),
            vec![0x00, 0x06, 0x03, 0xC3, 0xB1, 0x00]
        );
    }

    #[test]
    fn uint_picks_smallest_width() {
        assert_eq!(Tag::uint(1, 0xFF).value.tag_type(), TagType::UInt8);
        assert_eq!(Tag::uint(1, 0x100).value.tag_type(), TagType::UInt16);
        assert_eq!(Tag::uint(1, 0xFFFF).value.tag_type(), TagType::UInt16);
        assert_eq!(Tag::uint(1, 0x10000).value.tag_type(), TagType::UInt32);
        assert_eq!(Tag::uint(1, 0x1_0000_0000).value.tag_type(), TagType::UInt64);
    }

    #[test]
    fn roundtrip_all_value_kinds_both_modes() {
        let values = [
            TagValue::UInt(0),
            TagValue::UInt(0xAB),
            TagValue::UInt(0xABCD),
            TagValue::UInt(0xABCD_EF01),
            TagValue::UInt(0xABCD_EF01_2345_6789),
            TagValue::Text("hello".into()),
            TagValue::Text(String::new()),
            TagValue::Hash16([0x42; 16]),
            TagValue::Ipv4(SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 7), 4662)),
            TagValue::Bytes(vec![1, 2, 3, 4, 5]),
            TagValue::Bytes(Vec::new()),
        ];
        for mode in [NumberingMode::Utf8, NumberingMode::Legacy] {
            for value in &values {
                let tag = Tag::new(0x0300, value.clone());
                assert_eq!(roundtrip(&tag, mode), tag, "mode {mode:?}, value {value:?}");
            }
        }
    }

    #[test]
    fn roundtrip_nested_children() {
        let tag = Tag::with_children(
            0x0300,
            TagValue::Hash16([7; 16]),
            vec![
                Tag::text(0x0301, "some file.iso"),
                Tag::uint(0x0307, 7),
                Tag::with_children(
                    0x0005,
                    TagValue::UInt(0x15),
                    vec![Tag::uint(0x000A, 16_777_217)],
                ),
            ],
        );
        for mode in [NumberingMode::Utf8, NumberingMode::Legacy] {
            assert_eq!(roundtrip(&tag, mode), tag);
        }
    }

    #[test]
    fn roundtrip_large_id_forces_wide_tagnum() {
        // 2*id pushes the tagnum over the one-byte varnum range.
        let tag = Tag::uint(0x0801, 3);
        for mode in [NumberingMode::Utf8, NumberingMode::Legacy] {
            assert_eq!(roundtrip(&tag, mode), tag);
        }
    }

    #[test]
    fn sibling_list_roundtrip() {
        let tags = vec![
            Tag::text(0x0000, "ed2k://|file|x|1|00000000000000000000000000000000|/"),
            Tag::uint(0x0004, 0),
            Tag::hash(0x0300, [9; 16]),
        ];
        let mut buf = BytesMut::new();
        for t in &tags {
            t.encode(NumberingMode::Utf8, &mut buf).unwrap();
        }
        let (used, decoded) = Tag::decode_list(&buf, tags.len(), NumberingMode::Utf8).unwrap();
        assert_eq!(used, buf.len());
        assert_eq!(decoded, tags);
    }

    #[test]
    fn unknown_type_byte() {
        // Valid tagnum, then a type byte outside the vocabulary.
        let bytes = [0x00, 0x07, 0x01, 0x00];
        assert!(matches!(
            Tag::decode(&bytes, NumberingMode::Utf8),
            Err(EcError::UnknownTagType(0x07))
        ));
    }

    #[test]
    fn truncated_declared_length() {
        let mut buf = BytesMut::new();
        Tag::text(0, "hello world").encode(NumberingMode::Utf8, &mut buf).unwrap();
        let bytes = buf.to_vec();
        assert!(matches!(
            Tag::decode(&bytes[..bytes.len() - 4], NumberingMode::Utf8),
            Err(EcError::TruncatedTag { .. })
        ));
    }

    #[test]
    fn short_hash_payload() {
        // Hash type with a declared length of 9.
        let mut bytes = vec![0x12, 0x09, 0x09];
        bytes.extend_from_slice(&[0xAA; 9]);
        assert!(matches!(
            Tag::decode(&bytes, NumberingMode::Utf8),
            Err(EcError::InvalidHashLength(9))
        ));
    }

    #[test]
    fn string_without_terminator() {
        // String type, declared length 3, no NUL among the bytes.
        let bytes = [0x00, 0x06, 0x03, b'a', b'b', b'c'];
        assert!(matches!(
            Tag::decode(&bytes, NumberingMode::Utf8),
            Err(EcError::MalformedPacket(_))
        ));
    }

    #[test]
    fn nesting_depth_is_bounded() {
        // Build a legitimately deep chain and push it past the cap.
        let mut tag = Tag::uint(1, 1);
        for _ in 0..(MAX_DEPTH + 2) {
            tag = Tag::with_children(1, TagValue::UInt(1), vec![tag]);
        }
        let mut buf = BytesMut::new();
        tag.encode(NumberingMode::Utf8, &mut buf).unwrap();
        assert!(matches!(
            Tag::decode(&buf, NumberingMode::Utf8),
            Err(EcError::MalformedPacket("tag nesting too deep"))
        ));
    }

    #[test]
    fn consumed_length_is_exact_with_children() {
        // Trailing sibling data after a child-bearing tag must be
        // reachable via the reported consumed length.
        let first = Tag::with_children(
            0x0300,
            TagValue::Hash16([1; 16]),
            vec![Tag::uint(0x0307, 4)],
        );
        let second = Tag::uint(0x0004, 2);
        let mut buf = BytesMut::new();
        first.encode(NumberingMode::Utf8, &mut buf).unwrap();
        let first_len = buf.len();
        second.encode(NumberingMode::Utf8, &mut buf).unwrap();

        let (used, decoded) = Tag::decode(&buf, NumberingMode::Utf8).unwrap();
        assert_eq!(used, first_len);
        assert_eq!(decoded, first);

        let (_, rest) = Tag::decode(&buf[used..], NumberingMode::Utf8).unwrap();
        assert_eq!(rest, second);
    }
}
