//! Variable-length and signed-magnitude integer encodings.
//!
//! * VLUInt: 7 data bits per byte, big-endian, high bit set on the last byte.
//! * VLSInt: as VLUInt, but bit 6 of the first byte is the sign. `0xC0`
//!   (negative zero) stands for "no value".
//! * UInt / SInt: fixed-length big-endian magnitudes whose length comes from
//!   the enclosing descriptor. SInt keeps its sign in the top bit.

use num_bigint::{BigInt, BigUint, Sign};
use num_traits::Zero;

use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::error::{Error, Result};

/// Largest value a VLUInt may carry before the stream is considered unterminated.
pub const VLUINT_MAX: u64 = 0x7f_ffff_ffff_ffff;

/// Decode a VLUInt from the front of `data`, returning the value and the
/// number of bytes consumed.
pub fn decode_vluint(data: &[u8], diag: &mut Diagnostics) -> Result<(u64, usize)> {
    let mut value: u64 = 0;
    for (i, &byte) in data.iter().enumerate() {
        value = (value << 7) | u64::from(byte & 0x7f);
        if byte & 0x80 != 0 {
            return Ok((value, i + 1));
        }
        if value == 0 {
            diag.warn(DiagnosticKind::Notice, "VLUInt padded with 0x00");
        }
        if value > VLUINT_MAX {
            return Err(Error::malformed(
                "VLUInt value is too large, missing terminator",
            ));
        }
    }
    Err(Error::malformed("unexpected end of data in VLUInt"))
}

/// Decode a VLSInt. `Ok((None, _))` is only returned for negative zero with
/// `allow_minus_zero`; otherwise negative zero is reported and read as 0.
pub fn decode_vlsint(
    data: &[u8],
    allow_minus_zero: bool,
    diag: &mut Diagnostics,
) -> Result<(Option<i64>, usize)> {
    let Some(&first) = data.first() else {
        return Err(Error::malformed("unexpected end of data in VLSInt"));
    };

    let negative = first & 0x40 != 0;
    let mut magnitude = u64::from(first & 0x3f);
    let mut len = 1;
    let mut byte = first;

    while byte & 0x80 == 0 {
        let Some(&next) = data.get(len) else {
            return Err(Error::malformed("unexpected end of data in VLSInt"));
        };
        byte = next;
        len += 1;
        magnitude = (magnitude << 7) | u64::from(byte & 0x7f);
        if magnitude > VLUINT_MAX {
            return Err(Error::malformed(
                "VLSInt value is too large, missing terminator",
            ));
        }
    }

    let value = magnitude as i64;
    if !negative {
        return Ok((Some(value), len));
    }
    if value != 0 {
        return Ok((Some(-value), len));
    }
    if allow_minus_zero {
        return Ok((None, len));
    }
    diag.error(
        DiagnosticKind::SchemaViolation,
        "VLSInt decoded unexpected -0 value",
    );
    Ok((Some(0), len))
}

pub fn encode_vluint(value: u64, out: &mut Vec<u8>) {
    let mut groups = [0u8; 10];
    let mut n = groups.len() - 1;
    groups[n] = (value & 0x7f) as u8 | 0x80;
    let mut rest = value >> 7;
    while rest != 0 {
        n -= 1;
        groups[n] = (rest & 0x7f) as u8;
        rest >>= 7;
    }
    out.extend_from_slice(&groups[n..]);
}

/// Encode a VLSInt; `None` becomes negative zero.
pub fn encode_vlsint(value: Option<i64>, out: &mut Vec<u8>) {
    let Some(value) = value else {
        out.push(0xc0);
        return;
    };

    let start = out.len();
    encode_vluint(value.unsigned_abs(), out);
    if out[start] & 0x40 != 0 {
        out.insert(start, 0x00);
    }
    if value < 0 {
        out[start] |= 0x40;
    }
}

/// Decode an unsigned big-endian magnitude of any length.
pub fn decode_uint(data: &[u8]) -> BigUint {
    BigUint::from_bytes_be(data)
}

/// Minimal big-endian magnitude; zero encodes as no bytes.
pub fn encode_uint(value: &BigUint, out: &mut Vec<u8>) {
    if !value.is_zero() {
        out.extend_from_slice(&value.to_bytes_be());
    }
}

/// Decode a signed-magnitude integer. Empty input is zero.
pub fn decode_sint(data: &[u8]) -> BigInt {
    let Some((&first, rest)) = data.split_first() else {
        return BigInt::zero();
    };
    let mut magnitude = Vec::with_capacity(data.len());
    magnitude.push(first & 0x7f);
    magnitude.extend_from_slice(rest);
    let sign = if first & 0x80 != 0 {
        Sign::Minus
    } else {
        Sign::Plus
    };
    BigInt::from_bytes_be(sign, &magnitude)
}

/// Encode a signed-magnitude integer. Zero encodes as no bytes; a zero byte
/// is kept in front when the magnitude's top bit would collide with the sign.
pub fn encode_sint(value: &BigInt, out: &mut Vec<u8>) {
    if value.is_zero() {
        return;
    }
    let start = out.len();
    encode_uint(value.magnitude(), out);
    if out[start] & 0x80 != 0 {
        out.insert(start, 0x00);
    }
    if value.sign() == Sign::Minus {
        out[start] |= 0x80;
    }
}
