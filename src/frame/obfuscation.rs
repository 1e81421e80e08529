// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! XOR obfuscation applied to frame payloads.
//!
//! Devices obfuscate the inner payload with a single-byte XOR key taken
//! from the header sequence number. The scheme is weak and is reproduced as
//! the devices emit it. Both key modes are self-inverse.

use super::header::Header;

/// Source address a device uses for frames it sends in cleartext.
pub const DEVICE_SELF_ADDRESS: u32 = 32;

/// Encryption type flag marking an obfuscated payload.
pub const ENC_TYPE_XOR: u32 = 1;

/// How the XOR key is derived from the sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyMode {
    /// Every byte is XORed with `seq & 0xFF`.
    #[default]
    Fixed,
    /// Byte `i` is XORed with `(seq + i) & 0xFF`.
    Rolling,
}

/// Returns `true` when the payload of `header` must be deobfuscated.
#[must_use]
pub fn is_obfuscated(header: &Header) -> bool {
    header.enc_type == ENC_TYPE_XOR && header.src != DEVICE_SELF_ADDRESS
}

/// Applies the XOR transform. Calling it twice with the same arguments
/// restores the input.
#[must_use]
pub fn xor_decode(payload: &[u8], seq: u32, mode: KeyMode) -> Vec<u8> {
    let key = seq.to_le_bytes()[0];
    match mode {
        KeyMode::Fixed => payload.iter().map(|b| b ^ key).collect(),
        KeyMode::Rolling => payload
            .iter()
            .enumerate()
            .map(|(i, b)| {
                // Only the low byte of `i` can influence the key.
                #[allow(clippy::cast_possible_truncation)]
                let offset = i as u8;
                b ^ key.wrapping_add(offset)
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(enc_type: u32, src: u32) -> Header {
        Header {
            enc_type,
            src,
            ..Header::default()
        }
    }

    #[test]
    fn fixed_key_uses_low_byte_only() {
        let out = xor_decode(&[0x00, 0xFF, 0x2A], 0x0102_032A, KeyMode::Fixed);
        assert_eq!(out, vec![0x2A, 0xD5, 0x00]);
    }

    #[test]
    fn rolling_key_increments_per_byte() {
        let out = xor_decode(&[0x00, 0x00, 0x00], 0xFE, KeyMode::Rolling);
        assert_eq!(out, vec![0xFE, 0xFF, 0x00]);
    }

    #[test]
    fn codec_is_self_inverse() {
        let samples: [&[u8]; 4] = [b"", b"\x00", b"hello ecoflow", &[0xFF; 300]];
        for seq in [0u32, 1, 42, 255, 256, 0xDEAD_BEEF, u32::MAX] {
            for payload in samples {
                for mode in [KeyMode::Fixed, KeyMode::Rolling] {
                    let once = xor_decode(payload, seq, mode);
                    assert_eq!(xor_decode(&once, seq, mode), payload);
                }
            }
        }
    }

    #[test]
    fn predicate_requires_xor_flag() {
        assert!(is_obfuscated(&header(1, 1)));
        assert!(!is_obfuscated(&header(0, 1)));
        assert!(!is_obfuscated(&header(2, 1)));
    }

    #[test]
    fn predicate_skips_device_self_address() {
        assert!(!is_obfuscated(&header(1, 32)));
        assert!(is_obfuscated(&header(1, 33)));
    }
}
