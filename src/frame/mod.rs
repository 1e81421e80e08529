// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Binary frame decoding.
//!
//! An inbound protobuf frame goes through a strictly ordered pipeline:
//!
//! ```text
//! raw bytes
//!     ↓ outer decode (strict base64, else raw)
//!     ↓ header parse (collection, else legacy struct)
//!     ↓ payload extraction
//!     ↓ deobfuscation (enc_type == 1 && src != 32)
//!     ↓ catalog dispatch on (cmd_id, cmd_func)
//!     ↓ schema decode
//!     ↓ transform
//! flat field map
//! ```
//!
//! Every stage fails with a [`DecodeError`]. [`decode_frame_lossy`] reduces
//! any failure to an empty map so a bad frame never disturbs the session.

mod header;
mod obfuscation;
pub mod wire;

use std::borrow::Cow;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::FieldMap;
use crate::catalog::Catalog;
use crate::error::DecodeError;

pub use header::{Header, LEGACY_HEADER_LEN, parse_collection, parse_header};
pub use obfuscation::{DEVICE_SELF_ADDRESS, ENC_TYPE_XOR, KeyMode, is_obfuscated, xor_decode};

/// A fully decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    /// Parsed header. Its payload is left as received.
    pub header: Header,
    /// Name of the schema the payload was decoded with.
    pub schema: &'static str,
    /// Transformed fields.
    pub fields: FieldMap,
}

/// Removes the optional base64 armor from a frame.
///
/// Decoding is strict: standard alphabet with padding. Anything that does
/// not decode is returned unchanged.
#[must_use]
pub fn outer_decode(raw: &[u8]) -> Cow<'_, [u8]> {
    match STANDARD.decode(raw) {
        Ok(decoded) if !decoded.is_empty() => {
            tracing::trace!(armored = raw.len(), decoded = decoded.len(), "Removed base64 armor");
            Cow::Owned(decoded)
        }
        _ => Cow::Borrowed(raw),
    }
}

/// Runs the full decode pipeline against `catalog`.
///
/// # Errors
///
/// Returns the [`DecodeError`] of the first stage that fails.
pub fn decode_frame(raw: &[u8], catalog: &Catalog) -> Result<DecodedFrame, DecodeError> {
    if raw.is_empty() {
        return Err(DecodeError::Empty);
    }

    let binary = outer_decode(raw);
    let header = parse_header(&binary)?;
    let payload = header.payload()?;

    let payload: Cow<'_, [u8]> = if is_obfuscated(&header) {
        tracing::trace!(seq = header.seq, mode = ?catalog.key_mode(), "Deobfuscating payload");
        Cow::Owned(xor_decode(payload, header.seq, catalog.key_mode()))
    } else {
        Cow::Borrowed(payload)
    };

    let (schema, fields) = catalog.decode(header.cmd_id, header.cmd_func, &payload)?;

    tracing::debug!(
        catalog = catalog.name(),
        schema,
        cmd_id = header.cmd_id,
        cmd_func = header.cmd_func,
        fields = fields.len(),
        "Decoded frame"
    );

    Ok(DecodedFrame {
        header,
        schema,
        fields,
    })
}

/// Runs the decode pipeline, returning an empty map on any failure.
#[must_use]
pub fn decode_frame_lossy(raw: &[u8], catalog: &Catalog) -> FieldMap {
    match decode_frame(raw, catalog) {
        Ok(frame) => frame.fields,
        Err(err @ DecodeError::UnknownMessage { .. }) => {
            tracing::warn!(catalog = catalog.name(), error = %err, "Unknown frame type");
            FieldMap::new()
        }
        Err(err @ DecodeError::Schema { .. }) => {
            tracing::warn!(catalog = catalog.name(), error = %err, "Frame payload did not match its schema");
            FieldMap::new()
        }
        Err(err) => {
            tracing::debug!(catalog = catalog.name(), error = %err, "Dropping undecodable frame");
            FieldMap::new()
        }
    }
}
