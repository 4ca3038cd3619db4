//! This module contains the pieces of the protobuf wire format that are needed
//! to decode the tag bytes that serialization code emits.

use crate::{
    constant::{
        VARINT_CONTINUATION_BIT,
        VARINT_MAX_BYTES,
        VARINT_PAYLOAD_BITS,
        WIRE_TYPE_BITS,
        WIRE_TYPE_MASK,
    },
    error::inspection::{Error, Result},
};

/// The encodings that a protobuf field can have on the wire.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum WireType {
    Varint,
    Fixed64,
    LengthDelimited,
    StartGroup,
    EndGroup,
    Fixed32,
}

impl WireType {
    /// Gets the wire type encoded by the low bits of `raw`, if it is a valid
    /// one.
    #[must_use]
    pub fn from_raw(raw: u64) -> Option<Self> {
        let wire_type = match raw & WIRE_TYPE_MASK {
            0 => Self::Varint,
            1 => Self::Fixed64,
            2 => Self::LengthDelimited,
            3 => Self::StartGroup,
            4 => Self::EndGroup,
            5 => Self::Fixed32,
            _ => return None,
        };
        Some(wire_type)
    }
}

/// A decoded protobuf tag, `(field_number << 3) | wire_type`.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Tag {
    raw: u64,
}

impl Tag {
    /// Wraps the `raw` value of a tag.
    #[must_use]
    pub fn new(raw: u64) -> Self {
        Self { raw }
    }

    /// Gets the raw value of the tag.
    #[must_use]
    pub fn raw(&self) -> u64 {
        self.raw
    }

    /// Gets the field number encoded in the tag.
    #[must_use]
    pub fn field_number(&self) -> u32 {
        u32::try_from(self.raw >> WIRE_TYPE_BITS).unwrap_or(u32::MAX)
    }

    /// Gets the wire type encoded in the tag, if it is valid.
    #[must_use]
    pub fn wire_type(&self) -> Option<WireType> {
        WireType::from_raw(self.raw)
    }
}

/// Decodes a little-endian base-128 varint from the start of `bytes`.
///
/// Returns the decoded value along with the number of bytes consumed, or
/// [`None`] if `bytes` ends before a terminating byte is found.
#[must_use]
pub fn decode_varint(bytes: &[u8]) -> Option<(u64, usize)> {
    let mut value: u64 = 0;
    for (index, byte) in bytes.iter().take(VARINT_MAX_BYTES).enumerate() {
        let payload = u64::from(byte & !VARINT_CONTINUATION_BIT);
        let shift = VARINT_PAYLOAD_BITS * u32::try_from(index).ok()?;
        value |= payload.checked_shl(shift).unwrap_or(0);
        if byte & VARINT_CONTINUATION_BIT == 0 {
            return Some((value, index + 1));
        }
    }

    None
}

/// The bytes that serialization code has emitted one at a time since the last
/// field write.
///
/// Generated code writes the tag for a field as individual literal bytes
/// before calling the writer for the field's payload, so these bytes
/// accumulate here until that writer call is seen.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TagBuffer {
    bytes: Vec<u8>,
}

impl TagBuffer {
    /// Creates a new, empty, tag buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `byte` to the buffer.
    pub fn push(&mut self, byte: u8) {
        self.bytes.push(byte);
    }

    /// Gets the bytes currently in the buffer.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Checks whether the buffer holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Discards the contents of the buffer.
    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    /// Decodes the buffer as exactly one varint tag, clearing it.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the buffer is empty, does not contain a terminated
    /// varint, or contains bytes beyond the end of the varint.
    pub fn take_tag(&mut self) -> Result<Tag> {
        let bytes = std::mem::take(&mut self.bytes);
        if bytes.is_empty() {
            return Err(Error::EmptyTagBuffer);
        }
        let (raw, consumed) = decode_varint(&bytes).ok_or_else(|| Error::UnterminatedTag {
            bytes: bytes.clone(),
        })?;
        if consumed != bytes.len() {
            return Err(Error::TrailingTagBytes {
                consumed,
                bytes,
            });
        }

        Ok(Tag::new(raw))
    }
}
