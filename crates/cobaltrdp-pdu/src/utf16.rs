//! UTF-16LE helpers for the wide strings scattered across RDP structures.

use byteorder::{LittleEndian, ReadBytesExt as _};
use cobaltrdp_core::{ensure_size, invalid_field_err, DecodeResult, EncodeResult, ReadCursor, WriteCursor};

pub fn to_utf16_bytes(value: &str) -> Vec<u8> {
    value
        .encode_utf16()
        .flat_map(|i| i.to_le_bytes().to_vec())
        .collect::<Vec<u8>>()
}

pub fn from_utf16_bytes(mut value: &[u8]) -> String {
    let mut value_u16 = vec![0x00; value.len() / 2];
    value
        .read_u16_into::<LittleEndian>(value_u16.as_mut())
        .expect("read_u16_into cannot fail at this point");

    String::from_utf16_lossy(value_u16.as_ref())
}

/// Number of bytes taken by `value` once encoded as UTF-16LE, without the
/// null terminator.
pub fn utf16_len(value: &str) -> usize {
    value.encode_utf16().count() * 2
}

/// Writes a UTF-16LE string followed by a null terminator.
pub fn write_utf16_with_terminator(dst: &mut WriteCursor<'_>, value: &str) -> EncodeResult<()> {
    ensure_size!(ctx: "UTF-16 string", in: dst, size: utf16_len(value) + 2);

    for unit in value.encode_utf16() {
        dst.write_u16(unit);
    }
    dst.write_u16(0);

    Ok(())
}

/// Writes a UTF-16LE string into a fixed-size field, zero-filling the rest.
///
/// The last two bytes of the field always hold a null terminator; overlong
/// input is truncated at a code-unit boundary.
pub fn write_utf16_fixed(dst: &mut WriteCursor<'_>, value: &str, field_size: usize) -> EncodeResult<()> {
    debug_assert!(field_size % 2 == 0);

    ensure_size!(ctx: "UTF-16 string", in: dst, size: field_size);

    let mut buffer = to_utf16_bytes(value);
    buffer.resize(field_size - 2, 0);
    dst.write_slice(&buffer);
    dst.write_u16(0);

    Ok(())
}

/// Reads `size` bytes and interprets them as a null-padded UTF-16LE string.
pub fn read_utf16_exact(src: &mut ReadCursor<'_>, size: usize) -> DecodeResult<String> {
    ensure_size!(ctx: "UTF-16 string", in: src, size: size);

    if size % 2 != 0 {
        return Err(invalid_field_err("UTF-16 string", "size", "odd byte count"));
    }

    let buffer = src.read_slice(size);

    Ok(from_utf16_bytes(buffer).trim_end_matches('\0').to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_field_is_zero_filled_and_terminated() {
        let mut buf = [0xaa; 10];
        write_utf16_fixed(&mut WriteCursor::new(&mut buf), "ab", 10).unwrap();
        assert_eq!(buf, [0x61, 0x00, 0x62, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn read_trims_trailing_nulls() {
        let buf = [0x68, 0x00, 0x69, 0x00, 0x00, 0x00];
        let s = read_utf16_exact(&mut ReadCursor::new(&buf), 6).unwrap();
        assert_eq!(s, "hi");
    }
}
