//! SSH data type encoding (RFC 4251 Section 5).
//!
//! Readers take the whole message and a cursor offset, advancing the cursor
//! on success. Writers append to a [`BytesMut`].
//!
//! ```text
//! byte / boolean / uint32 / uint64
//! string     uint32 length + bytes
//! mpint      string holding a two's complement big-endian integer
//! name-list  string holding comma-separated ASCII names
//! ```

use bytes::{BufMut, BytesMut};
use fynx_platform::{FynxError, FynxResult};

fn truncated(what: &str, offset: usize) -> FynxError {
    FynxError::Protocol(format!("Truncated {} at offset {}", what, offset))
}

/// Reads a single byte.
pub fn read_u8(data: &[u8], offset: &mut usize) -> FynxResult<u8> {
    let b = *data.get(*offset).ok_or_else(|| truncated("byte", *offset))?;
    *offset += 1;
    Ok(b)
}

/// Reads a boolean (any non-zero byte is true).
pub fn read_bool(data: &[u8], offset: &mut usize) -> FynxResult<bool> {
    Ok(read_u8(data, offset)? != 0)
}

/// Reads a big-endian uint32.
pub fn read_u32(data: &[u8], offset: &mut usize) -> FynxResult<u32> {
    let bytes = read_fixed(data, offset, 4).map_err(|_| truncated("uint32", *offset))?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Reads a big-endian uint64.
pub fn read_u64(data: &[u8], offset: &mut usize) -> FynxResult<u64> {
    let bytes = read_fixed(data, offset, 8).map_err(|_| truncated("uint64", *offset))?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(bytes);
    Ok(u64::from_be_bytes(raw))
}

/// Reads `len` raw bytes.
pub fn read_fixed<'a>(data: &'a [u8], offset: &mut usize, len: usize) -> FynxResult<&'a [u8]> {
    let end = offset
        .checked_add(len)
        .filter(|end| *end <= data.len())
        .ok_or_else(|| truncated("field", *offset))?;
    let slice = &data[*offset..end];
    *offset = end;
    Ok(slice)
}

/// Reads a length-prefixed string as raw bytes.
pub fn read_string<'a>(data: &'a [u8], offset: &mut usize) -> FynxResult<&'a [u8]> {
    let len = read_u32(data, offset)? as usize;
    read_fixed(data, offset, len).map_err(|_| {
        FynxError::Protocol(format!(
            "String of {} bytes exceeds message at offset {}",
            len, offset
        ))
    })
}

/// Reads a length-prefixed string that must be valid UTF-8.
pub fn read_utf8(data: &[u8], offset: &mut usize) -> FynxResult<String> {
    let raw = read_string(data, offset)?;
    String::from_utf8(raw.to_vec())
        .map_err(|_| FynxError::Protocol("String contains invalid UTF-8".to_string()))
}

/// Reads a name-list. An empty string yields an empty list.
pub fn read_name_list(data: &[u8], offset: &mut usize) -> FynxResult<Vec<String>> {
    let list = read_utf8(data, offset)?;
    if list.is_empty() {
        Ok(Vec::new())
    } else {
        Ok(list.split(',').map(String::from).collect())
    }
}

/// Reads an mpint and returns its unsigned magnitude without leading zeros.
///
/// Negative values are rejected; SSH never transmits them for key material.
pub fn read_mpint<'a>(data: &'a [u8], offset: &mut usize) -> FynxResult<&'a [u8]> {
    let raw = read_string(data, offset)?;
    if raw.first().map_or(false, |b| b & 0x80 != 0) {
        return Err(FynxError::Protocol("Negative mpint".to_string()));
    }
    let start = raw.iter().position(|b| *b != 0).unwrap_or(raw.len());
    Ok(&raw[start..])
}

/// Writes a length-prefixed string.
pub fn write_string(buf: &mut BytesMut, value: &[u8]) {
    buf.put_u32(value.len() as u32);
    buf.put_slice(value);
}

/// Writes a boolean.
pub fn write_bool(buf: &mut BytesMut, value: bool) {
    buf.put_u8(u8::from(value));
}

/// Writes a name-list.
pub fn write_name_list(buf: &mut BytesMut, names: &[String]) {
    write_string(buf, names.join(",").as_bytes());
}

/// Writes an unsigned big-endian magnitude as an mpint.
///
/// Leading zero bytes are stripped and a single zero byte is prepended
/// when the high bit would otherwise mark the value negative.
pub fn write_mpint(buf: &mut BytesMut, magnitude: &[u8]) {
    let start = magnitude
        .iter()
        .position(|b| *b != 0)
        .unwrap_or(magnitude.len());
    let trimmed = &magnitude[start..];
    if trimmed.first().map_or(false, |b| b & 0x80 != 0) {
        buf.put_u32(trimmed.len() as u32 + 1);
        buf.put_u8(0);
    } else {
        buf.put_u32(trimmed.len() as u32);
    }
    buf.put_slice(trimmed);
}

/// Encodes a single string to a standalone buffer.
pub fn string_bytes(value: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(4 + value.len());
    write_string(&mut buf, value);
    buf.to_vec()
}

/// Encodes a single mpint to a standalone buffer.
pub fn mpint_bytes(magnitude: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(5 + magnitude.len());
    write_mpint(&mut buf, magnitude);
    buf.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_u32_truncated() {
        let mut offset = 0;
        assert!(read_u32(&[0, 0, 1], &mut offset).is_err());
        assert_eq!(offset, 0);
    }

    #[test]
    fn test_string_length_exceeds_data() {
        let data = [0, 0, 0, 10, b'a', b'b'];
        let mut offset = 0;
        match read_string(&data, &mut offset) {
            Err(FynxError::Protocol(msg)) => assert!(msg.contains("exceeds")),
            other => panic!("Expected Protocol error, got {:?}", other),
        }
    }

    #[test]
    fn test_name_list_empty_and_multiple() {
        let mut buf = BytesMut::new();
        write_name_list(&mut buf, &[]);
        write_name_list(&mut buf, &["a".to_string(), "b@x".to_string()]);

        let mut offset = 0;
        assert!(read_name_list(&buf, &mut offset).unwrap().is_empty());
        assert_eq!(read_name_list(&buf, &mut offset).unwrap(), vec!["a", "b@x"]);
        assert_eq!(offset, buf.len());
    }

    #[test]
    fn test_mpint_high_bit_gets_zero_prefix() {
        assert_eq!(mpint_bytes(&[0x80]), vec![0, 0, 0, 2, 0, 0x80]);
        assert_eq!(mpint_bytes(&[0x00, 0x00, 0x7f]), vec![0, 0, 0, 1, 0x7f]);
        assert_eq!(mpint_bytes(&[0, 0]), vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_read_mpint_strips_sign_byte() {
        let encoded = mpint_bytes(&[0xff, 0x01]);
        let mut offset = 0;
        assert_eq!(read_mpint(&encoded, &mut offset).unwrap(), &[0xff, 0x01]);
    }

    #[test]
    fn test_read_mpint_rejects_negative() {
        let mut offset = 0;
        assert!(read_mpint(&[0, 0, 0, 1, 0x80], &mut offset).is_err());
    }

    #[test]
    fn test_read_u64() {
        let mut offset = 0;
        let data = u64::MAX.to_be_bytes();
        assert_eq!(read_u64(&data, &mut offset).unwrap(), u64::MAX);
    }
}
