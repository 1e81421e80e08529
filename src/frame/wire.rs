// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Protocol Buffers wire-format cursor.
//!
//! Both the frame header and the inner payloads are protobuf encoded, but
//! their message types are only known at runtime (from the catalog). This
//! module walks the wire format field by field on top of
//! [`prost::encoding`], so typed scalar decoding can use prost's `merge`
//! functions directly on the same buffer.

use std::fmt;

use prost::bytes::Buf;
use prost::encoding::{decode_key, decode_varint};

pub use prost::encoding::WireType;

use crate::error::DecodeError;

/// One raw field value read off the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireValue<'a> {
    /// Varint payload.
    Varint(u64),
    /// Fixed 64-bit payload.
    Fixed64(u64),
    /// Length-delimited payload.
    Bytes(&'a [u8]),
    /// Fixed 32-bit payload.
    Fixed32(u32),
}

/// Cursor over protobuf wire data.
#[derive(Debug, Clone)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    len: usize,
}

impl<'a> WireReader<'a> {
    /// Creates a reader positioned at the start of `buf`.
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            len: buf.len(),
        }
    }

    /// Returns `true` when every byte has been consumed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Current byte offset.
    #[must_use]
    pub fn position(&self) -> usize {
        self.len - self.buf.len()
    }

    /// Remaining input, for decoding a value with prost's typed `merge`
    /// functions. They advance the cursor past the value they read.
    pub fn buf_mut(&mut self) -> &mut &'a [u8] {
        &mut self.buf
    }

    /// Wraps an error at the current offset.
    pub fn error(&self, reason: impl fmt::Display) -> DecodeError {
        error_at(self.position(), reason)
    }

    /// Reads the next field key.
    ///
    /// Returns `Ok(None)` at the end of the buffer.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Wire`] for malformed keys, including field
    /// number zero and invalid wire types.
    pub fn next_key(&mut self) -> Result<Option<(u32, WireType)>, DecodeError> {
        if self.is_empty() {
            return Ok(None);
        }
        let start = self.position();
        decode_key(&mut self.buf)
            .map(Some)
            .map_err(|e| error_at(start, e))
    }

    /// Reads a varint.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Wire`] on truncation or overflow.
    pub fn read_varint(&mut self) -> Result<u64, DecodeError> {
        let start = self.position();
        decode_varint(&mut self.buf).map_err(|e| error_at(start, e))
    }

    /// Reads a length-delimited value.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Wire`] when the declared length runs past the
    /// end of the buffer.
    pub fn read_length_delimited(&mut self) -> Result<&'a [u8], DecodeError> {
        let start = self.position();
        let len = prost::decode_length_delimiter(&mut self.buf).map_err(|e| error_at(start, e))?;
        if len > self.buf.len() {
            return Err(self.error("field exceeds buffer"));
        }
        let (value, rest) = self.buf.split_at(len);
        self.buf = rest;
        Ok(value)
    }

    /// Reads the value of a field whose key was just read.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Wire`] on truncated values and for groups,
    /// which this protocol never uses.
    pub fn read_value(&mut self, wire_type: WireType) -> Result<WireValue<'a>, DecodeError> {
        match wire_type {
            WireType::Varint => self.read_varint().map(WireValue::Varint),
            WireType::SixtyFourBit => {
                if self.buf.remaining() < 8 {
                    return Err(self.error("truncated fixed64"));
                }
                Ok(WireValue::Fixed64(self.buf.get_u64_le()))
            }
            WireType::LengthDelimited => self.read_length_delimited().map(WireValue::Bytes),
            WireType::ThirtyTwoBit => {
                if self.buf.remaining() < 4 {
                    return Err(self.error("truncated fixed32"));
                }
                Ok(WireValue::Fixed32(self.buf.get_u32_le()))
            }
            WireType::StartGroup | WireType::EndGroup => Err(self.error("unsupported wire type")),
        }
    }

    /// Reads the next field key and value.
    ///
    /// Returns `Ok(None)` at the end of the buffer.
    ///
    /// # Errors
    ///
    /// See [`WireReader::next_key`] and [`WireReader::read_value`].
    pub fn next_field(&mut self) -> Result<Option<(u32, WireValue<'a>)>, DecodeError> {
        let Some((number, wire_type)) = self.next_key()? else {
            return Ok(None);
        };
        self.read_value(wire_type).map(|value| Some((number, value)))
    }
}

fn error_at(offset: usize, reason: impl fmt::Display) -> DecodeError {
    DecodeError::Wire {
        offset,
        reason: reason.to_string(),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_single_byte_varint() {
        let mut reader = WireReader::new(&[0x57]);
        assert_eq!(reader.read_varint().unwrap(), 87);
        assert!(reader.is_empty());
    }

    #[test]
    fn read_multi_byte_varint() {
        // 5312 = 0x14C0
        let mut reader = WireReader::new(&[0xC0, 0x29]);
        assert_eq!(reader.read_varint().unwrap(), 5312);
        assert_eq!(reader.position(), 2);
    }

    #[test]
    fn truncated_varint_reports_offset() {
        let mut reader = WireReader::new(&[0x80, 0x80]);
        assert!(matches!(
            reader.read_varint(),
            Err(DecodeError::Wire { offset: 0, .. })
        ));
    }

    #[test]
    fn overlong_varint_fails() {
        let mut reader = WireReader::new(&[0xFF; 11]);
        assert!(reader.read_varint().is_err());
    }

    #[test]
    fn next_field_reads_all_wire_types() {
        let mut buf = Vec::new();
        encode::field_varint(4, 5312, &mut buf);
        encode::field_bytes(1, b"abc", &mut buf);
        encode::field_fixed32(3, 0x4120_0000, &mut buf);
        prost::encoding::fixed64::encode(2, &7, &mut buf);

        let mut reader = WireReader::new(&buf);
        assert_eq!(
            reader.next_field().unwrap(),
            Some((4, WireValue::Varint(5312)))
        );
        assert_eq!(
            reader.next_field().unwrap(),
            Some((1, WireValue::Bytes(b"abc")))
        );
        assert_eq!(
            reader.next_field().unwrap(),
            Some((3, WireValue::Fixed32(0x4120_0000)))
        );
        assert_eq!(
            reader.next_field().unwrap(),
            Some((2, WireValue::Fixed64(7)))
        );
        assert_eq!(reader.next_field().unwrap(), None);
    }

    #[test]
    fn length_past_end_fails() {
        // field 1, length 5, only 2 bytes follow
        let mut reader = WireReader::new(&[0x0A, 0x05, 0x01, 0x02]);
        assert!(matches!(
            reader.next_field(),
            Err(DecodeError::Wire { ref reason, .. }) if reason == "field exceeds buffer"
        ));
    }

    #[test]
    fn truncated_fixed32_fails() {
        let mut reader = WireReader::new(&[0x0D, 0x01, 0x02]);
        assert!(reader.next_field().is_err());
    }

    #[test]
    fn group_wire_type_rejected() {
        // field 1, wire type 3 (start group)
        let mut reader = WireReader::new(&[0x0B]);
        assert!(matches!(
            reader.next_field(),
            Err(DecodeError::Wire { ref reason, .. }) if reason == "unsupported wire type"
        ));
    }

    #[test]
    fn field_number_zero_rejected() {
        let mut reader = WireReader::new(&[0x00, 0x01]);
        assert!(reader.next_field().is_err());
    }

    #[test]
    fn next_key_leaves_value_for_typed_merge() {
        let mut buf = Vec::new();
        encode::field_varint(2, 5, &mut buf); // sint32 -3

        let mut reader = WireReader::new(&buf);
        let (number, wire_type) = reader.next_key().unwrap().unwrap();
        assert_eq!((number, wire_type), (2, WireType::Varint));

        let mut value = 0i32;
        prost::encoding::sint32::merge(
            wire_type,
            &mut value,
            reader.buf_mut(),
            prost::encoding::DecodeContext::default(),
        )
        .unwrap();
        assert_eq!(value, -3);
        assert!(reader.is_empty());
    }
}
