//! Fixed-width little-endian array codec.
//!
//! Every decoder checks `offset + width * count <= buf.len()` before touching
//! the buffer and returns the element values together with the offset of the
//! first byte after them, so callers can walk a shared buffer section by
//! section.

use crate::error::{BridgeError, Result};

pub const F64_WIDTH: usize = 8;
pub const F32_WIDTH: usize = 4;
pub const I32_WIDTH: usize = 4;

/// Decode `count` elements of width `N` starting at `offset`.
fn decode_with<T, const N: usize>(
    buf: &[u8],
    offset: usize,
    count: usize,
    what: &str,
    convert: impl Fn([u8; N]) -> T,
) -> Result<(Vec<T>, usize)> {
    let end = checked_end(buf, offset, N, count, what)?;
    let values = buf[offset..end]
        .chunks_exact(N)
        .map(|chunk| {
            let mut bytes = [0u8; N];
            bytes.copy_from_slice(chunk);
            convert(bytes)
        })
        .collect();
    Ok((values, end))
}

fn checked_end(buf: &[u8], offset: usize, width: usize, count: usize, what: &str) -> Result<usize> {
    width
        .checked_mul(count)
        .and_then(|len| offset.checked_add(len))
        .filter(|end| *end <= buf.len())
        .ok_or_else(|| BridgeError::protocol(format!("Buffer overrun when deserializing {what}")))
}

pub fn decode_f64(buf: &[u8], offset: usize, count: usize) -> Result<(Vec<f64>, usize)> {
    decode_with(buf, offset, count, "doubles", f64::from_le_bytes)
}

pub fn decode_f32(buf: &[u8], offset: usize, count: usize) -> Result<(Vec<f32>, usize)> {
    decode_with(buf, offset, count, "floats", f32::from_le_bytes)
}

pub fn decode_i32(buf: &[u8], offset: usize, count: usize) -> Result<(Vec<i32>, usize)> {
    decode_with(buf, offset, count, "integers", i32::from_le_bytes)
}

/// Raw byte run of `len` bytes (UTF-8 string payloads).
pub fn decode_bytes(buf: &[u8], offset: usize, len: usize) -> Result<(Vec<u8>, usize)> {
    let end = checked_end(buf, offset, 1, len, "strings")?;
    Ok((buf[offset..end].to_vec(), end))
}

/// Decode a UTF-8 string of `len` bytes. Invalid sequences are replaced.
pub fn decode_string(buf: &[u8], offset: usize, len: usize) -> Result<(String, usize)> {
    let end = checked_end(buf, offset, 1, len, "strings")?;
    Ok((String::from_utf8_lossy(&buf[offset..end]).into_owned(), end))
}

pub fn encode_f64(values: &[f64], dst: &mut Vec<u8>) {
    dst.reserve(values.len() * F64_WIDTH);
    for v in values {
        dst.extend_from_slice(&v.to_le_bytes());
    }
}

pub fn encode_f32(values: &[f32], dst: &mut Vec<u8>) {
    dst.reserve(values.len() * F32_WIDTH);
    for v in values {
        dst.extend_from_slice(&v.to_le_bytes());
    }
}

pub fn encode_i32(values: &[i32], dst: &mut Vec<u8>) {
    dst.reserve(values.len() * I32_WIDTH);
    for v in values {
        dst.extend_from_slice(&v.to_le_bytes());
    }
}
