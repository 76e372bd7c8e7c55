//! Variable-length integers and bounds-checked primitive reads.
//!
//! Integers in `-112..=127` occupy one byte. Larger magnitudes start with a
//! marker byte carrying the sign and the number of big-endian magnitude bytes
//! that follow (`-113..=-120` positive, `-121..=-128` negative); negative
//! values are stored one's-complemented.

use crate::{error::TupleError, utils::util::Result};

const SINGLE_BYTE_MIN: i64 = -112;
const SINGLE_BYTE_MAX: i64 = 127;
const POSITIVE_MARKER: i8 = -112;
const NEGATIVE_MARKER: i8 = -120;

pub fn write_vlong(out: &mut Vec<u8>, value: i64) {
    if (SINGLE_BYTE_MIN..=SINGLE_BYTE_MAX).contains(&value) {
        out.push(value as i8 as u8);
        return;
    }

    let (magnitude, mut marker) = if value < 0 {
        (!value, NEGATIVE_MARKER)
    } else {
        (value, POSITIVE_MARKER)
    };
    let len = 8 - (magnitude.leading_zeros() as usize / 8);
    marker -= len as i8;
    out.push(marker as u8);
    out.extend_from_slice(&magnitude.to_be_bytes()[8 - len..]);
}

pub fn write_vint(out: &mut Vec<u8>, value: i32) {
    write_vlong(out, i64::from(value));
}

/// Number of bytes used by a varint, marker byte included.
pub fn decode_size(first: u8) -> usize {
    let first = first as i8;
    if first >= POSITIVE_MARKER {
        1
    } else if first < NEGATIVE_MARKER {
        (-119 - i32::from(first)) as usize
    } else {
        (-111 - i32::from(first)) as usize
    }
}

fn is_negative(first: i8) -> bool {
    first < NEGATIVE_MARKER || (first >= POSITIVE_MARKER && first < 0)
}

pub fn vlong_size(value: i64) -> usize {
    if (SINGLE_BYTE_MIN..=SINGLE_BYTE_MAX).contains(&value) {
        return 1;
    }
    let magnitude = if value < 0 { !value } else { value };
    1 + 8 - (magnitude.leading_zeros() as usize / 8)
}

pub fn read_vlong(buf: &[u8], pos: &mut usize) -> Result<i64> {
    let start = *pos;
    let first = *buf.get(start).ok_or(TupleError::Truncated {
        offset: start,
        needed: 1,
        available: 0,
    })?;
    let size = decode_size(first);
    if size == 1 {
        *pos += 1;
        return Ok(i64::from(first as i8));
    }
    let body = slice_at(buf, start + 1, size - 1)?;
    let mut value: i64 = 0;
    for byte in body {
        value = (value << 8) | i64::from(*byte);
    }
    *pos = start + size;
    if is_negative(first as i8) {
        value = !value;
    }
    Ok(value)
}

pub fn read_vint(buf: &[u8], pos: &mut usize) -> Result<i32> {
    let start = *pos;
    let value = read_vlong(buf, pos)?;
    i32::try_from(value).map_err(|_| TupleError::MalformedVarint { offset: start })
}

/// Reads a non-negative varint used as a length or ordinal.
pub fn read_len(buf: &[u8], pos: &mut usize) -> Result<usize> {
    let start = *pos;
    let value = read_vlong(buf, pos)?;
    usize::try_from(value).map_err(|_| TupleError::MalformedVarint { offset: start })
}

pub fn skip_vlong(buf: &[u8], pos: &mut usize) -> Result<()> {
    let first = *buf.get(*pos).ok_or(TupleError::Truncated {
        offset: *pos,
        needed: 1,
        available: 0,
    })?;
    let size = decode_size(first);
    slice_at(buf, *pos, size)?;
    *pos += size;
    Ok(())
}

/// Returns `len` bytes starting at `offset`, or a truncation error.
pub fn slice_at(buf: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    let end = offset.checked_add(len);
    match end {
        Some(end) if end <= buf.len() => Ok(&buf[offset..end]),
        _ => Err(TupleError::Truncated {
            offset,
            needed: len,
            available: buf.len().saturating_sub(offset),
        }),
    }
}

pub fn take<'a>(buf: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8]> {
    let bytes = slice_at(buf, *pos, len)?;
    *pos += len;
    Ok(bytes)
}

pub fn take_array<const N: usize>(buf: &[u8], pos: &mut usize) -> Result<[u8; N]> {
    let mut array = [0u8; N];
    array.copy_from_slice(take(buf, pos, N)?);
    Ok(array)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: i64) -> Vec<u8> {
        let mut out = Vec::new();
        write_vlong(&mut out, value);
        out
    }

    #[test]
    fn test_single_byte_range() {
        assert_eq!(encode(0), vec![0]);
        assert_eq!(encode(127), vec![127]);
        assert_eq!(encode(-112), vec![(-112i8) as u8]);
        assert_eq!(encode(-1), vec![0xff]);
    }

    #[test]
    fn test_marker_bytes() {
        // 128 needs one magnitude byte, positive
        assert_eq!(encode(128), vec![(-113i8) as u8, 0x80]);
        // -113 is stored as !(-113) = 112 with a negative one-byte marker
        assert_eq!(encode(-113), vec![(-121i8) as u8, 112]);
        assert_eq!(encode(i64::MAX).len(), 9);
        assert_eq!(encode(i64::MIN).len(), 9);
    }

    #[test]
    fn test_decode_matches_encode_at_boundaries() {
        let values = [
            0,
            1,
            -1,
            127,
            128,
            -112,
            -113,
            255,
            256,
            65_535,
            -65_536,
            i64::from(i32::MAX),
            i64::from(i32::MIN),
            i64::MAX,
            i64::MIN,
        ];
        for value in values {
            let bytes = encode(value);
            assert_eq!(bytes.len(), vlong_size(value), "size of {value}");
            assert_eq!(decode_size(bytes[0]), bytes.len(), "decode size of {value}");
            let mut pos = 0;
            let decoded = read_vlong(&bytes, &mut pos).expect("varint should decode");
            assert_eq!(decoded, value);
            assert_eq!(pos, bytes.len());
        }
    }

    #[test]
    fn test_truncated_varint_is_rejected() {
        let bytes = encode(1 << 40);
        let mut pos = 0;
        let err = read_vlong(&bytes[..3], &mut pos).expect_err("short input should fail");
        assert!(matches!(err, TupleError::Truncated { .. }));
        assert_eq!(pos, 0, "position must not advance on failure");
    }

    #[test]
    fn test_read_vint_rejects_wide_values() {
        let bytes = encode(i64::from(i32::MAX) + 1);
        let mut pos = 0;
        assert!(matches!(
            read_vint(&bytes, &mut pos),
            Err(TupleError::MalformedVarint { offset: 0 })
        ));
    }

    #[test]
    fn test_read_len_rejects_negative() {
        let bytes = encode(-5);
        let mut pos = 0;
        assert!(read_len(&bytes, &mut pos).is_err());
    }

    #[test]
    fn test_skip_advances_past_value() {
        let mut bytes = encode(300_000);
        bytes.push(42);
        let mut pos = 0;
        skip_vlong(&bytes, &mut pos).expect("skip should succeed");
        assert_eq!(bytes[pos], 42);
    }
}
