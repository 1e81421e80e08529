// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Frame header model.
//!
//! Two framing styles coexist on the wire:
//!
//! - a header collection: protobuf `HeaderMessage { repeated Header header = 1 }`
//!   where each header carries its payload in `pdata`
//! - a legacy fixed struct of 20 little-endian bytes followed by the payload
//!
//! [`parse_header`] tries the collection first and falls back to the legacy
//! layout.

use crate::error::DecodeError;

use super::wire::{WireReader, WireValue};

/// Size of the legacy fixed header.
pub const LEGACY_HEADER_LEN: usize = 20;

/// One protocol frame header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    /// Source address.
    pub src: u32,
    /// Destination address.
    pub dest: u32,
    /// Device source address.
    pub d_src: u32,
    /// Device destination address.
    pub d_dest: u32,
    /// Encryption type; `1` marks an XOR-obfuscated payload.
    pub enc_type: u32,
    /// Checksum type.
    pub check_type: u32,
    /// Command function.
    pub cmd_func: u32,
    /// Command identifier.
    pub cmd_id: u32,
    /// Declared payload length.
    pub data_len: u32,
    /// Acknowledgement requested.
    pub need_ack: u32,
    /// Frame is an acknowledgement.
    pub is_ack: u32,
    /// Sequence number, also the obfuscation key source.
    pub seq: u32,
    /// Product identifier.
    pub product_id: u32,
    /// Header version.
    pub version: u32,
    /// Payload version.
    pub payload_ver: u32,
    /// Device timestamp.
    pub time_snap: u32,
    /// Vendor code string.
    pub code: String,
    /// Sender label.
    pub from: String,
    /// Module serial number.
    pub module_sn: String,
    /// Device serial number.
    pub device_sn: String,
    /// Raw (possibly obfuscated) payload bytes.
    pub payload: Vec<u8>,
}

impl Header {
    /// Returns the payload bytes.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::MissingPayload`] if the header carries none.
    pub fn payload(&self) -> Result<&[u8], DecodeError> {
        if self.payload.is_empty() {
            Err(DecodeError::MissingPayload)
        } else {
            Ok(&self.payload)
        }
    }

    /// Returns `true` when `data_len` matches the payload length.
    #[must_use]
    pub fn length_matches(&self) -> bool {
        usize::try_from(self.data_len).is_ok_and(|len| len == self.payload.len())
    }

    /// Decodes one protobuf `Header` message.
    fn from_protobuf(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut header = Self::default();
        let mut reader = WireReader::new(buf);

        while let Some((number, value)) = reader.next_field()? {
            match (number, value) {
                (1, WireValue::Bytes(bytes)) => header.payload = bytes.to_vec(),
                (22, WireValue::Bytes(bytes)) => header.code = utf8(bytes),
                (23, WireValue::Bytes(bytes)) => header.from = utf8(bytes),
                (24, WireValue::Bytes(bytes)) => header.module_sn = utf8(bytes),
                (25, WireValue::Bytes(bytes)) => header.device_sn = utf8(bytes),
                (number, WireValue::Varint(raw)) => {
                    // int32 fields are sign-extended to ten bytes on the wire.
                    #[allow(clippy::cast_possible_truncation)]
                    let raw = raw as u32;
                    let slot = match number {
                        2 => &mut header.src,
                        3 => &mut header.dest,
                        4 => &mut header.d_src,
                        5 => &mut header.d_dest,
                        6 => &mut header.enc_type,
                        7 => &mut header.check_type,
                        8 => &mut header.cmd_func,
                        9 => &mut header.cmd_id,
                        10 => &mut header.data_len,
                        11 => &mut header.need_ack,
                        12 => &mut header.is_ack,
                        14 => &mut header.seq,
                        15 => &mut header.product_id,
                        16 => &mut header.version,
                        17 => &mut header.payload_ver,
                        18 => &mut header.time_snap,
                        _ => {
                            tracing::trace!(field = number, "Skipping unknown header field");
                            continue;
                        }
                    };
                    *slot = raw;
                }
                (1 | 22..=25, _) => {
                    return Err(DecodeError::Wire {
                        offset: reader.position(),
                        reason: "header field has wrong wire type".to_string(),
                    });
                }
                (number, _) => {
                    tracing::trace!(field = number, "Skipping unknown header field");
                }
            }
        }

        Ok(header)
    }

    /// Parses the legacy 20-byte little-endian layout.
    ///
    /// Eight `u16` values (src, dest, d_src, d_dest, cmd_func, cmd_id,
    /// data_len, seq) are followed by four `u8` values (enc_type,
    /// check_type, need_ack, version). The payload is everything after.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::ShortLegacyHeader`] for inputs under 20 bytes.
    pub fn parse_legacy(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < LEGACY_HEADER_LEN {
            return Err(DecodeError::ShortLegacyHeader {
                needed: LEGACY_HEADER_LEN,
                actual: bytes.len(),
            });
        }

        let word = |index: usize| {
            let at = index * 2;
            u32::from(u16::from_le_bytes([bytes[at], bytes[at + 1]]))
        };

        Ok(Self {
            src: word(0),
            dest: word(1),
            d_src: word(2),
            d_dest: word(3),
            cmd_func: word(4),
            cmd_id: word(5),
            data_len: word(6),
            seq: word(7),
            enc_type: u32::from(bytes[16]),
            check_type: u32::from(bytes[17]),
            need_ack: u32::from(bytes[18]),
            version: u32::from(bytes[19]),
            payload: bytes[LEGACY_HEADER_LEN..].to_vec(),
            ..Self::default()
        })
    }
}

fn utf8(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Parses a header collection envelope.
///
/// # Errors
///
/// Returns [`DecodeError::Wire`] for malformed protobuf data.
pub fn parse_collection(bytes: &[u8]) -> Result<Vec<Header>, DecodeError> {
    let mut headers = Vec::new();
    let mut reader = WireReader::new(bytes);

    while let Some((number, value)) = reader.next_field()? {
        match (number, value) {
            (1, WireValue::Bytes(inner)) => headers.push(Header::from_protobuf(inner)?),
            (1, _) => {
                return Err(DecodeError::Wire {
                    offset: reader.position(),
                    reason: "header entry is not length-delimited".to_string(),
                });
            }
            (number, _) => {
                tracing::trace!(field = number, "Skipping unknown envelope field");
            }
        }
    }

    Ok(headers)
}

/// Parses the first header of a frame.
///
/// The header collection is tried first. If it fails or holds no header,
/// the legacy layout is tried. When both fail, the collection error is
/// reported.
///
/// # Errors
///
/// Returns [`DecodeError::EmptyHeaderCollection`] or the wire error of the
/// collection parse.
pub fn parse_header(bytes: &[u8]) -> Result<Header, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }

    let rich = parse_collection(bytes).and_then(|headers| {
        let count = headers.len();
        let first = headers
            .into_iter()
            .next()
            .ok_or(DecodeError::EmptyHeaderCollection)?;
        if count > 1 {
            tracing::debug!(count, "Frame carries extra headers, using the first");
        }
        Ok(first)
    });

    let header = match rich {
        Ok(header) => header,
        Err(rich_err) => match Header::parse_legacy(bytes) {
            Ok(header) => {
                tracing::debug!(error = %rich_err, "Header collection parse failed, using legacy layout");
                header
            }
            Err(legacy_err) => {
                tracing::debug!(error = %legacy_err, "Legacy header parse failed");
                return Err(rich_err);
            }
        },
    };

    if !header.length_matches() {
        tracing::warn!(
            data_len = header.data_len,
            actual = header.payload.len(),
            cmd_id = header.cmd_id,
            cmd_func = header.cmd_func,
            "Header data length does not match payload"
        );
    }

    Ok(header)
}
