use cobaltrdp_core::{
    ensure_fixed_part_size, read_padding, unsupported_version_err, write_padding, DecodeResult, EncodeResult,
    ReadCursor, WriteCursor,
};

/// TPKT header (RFC 1006): a 4-byte length-prefixed record wrapping every
/// slow-path frame.
///
/// ```diagram
///  version (3) | reserved | length (MSB) | length (LSB)
/// ```
///
/// `length` covers the whole record, header included. The following X.224
/// TPDU is at least three bytes long, so the minimum TPKT length is 7 and the
/// maximum X.224 TPDU length is 65531.
#[derive(PartialEq, Eq, Debug)]
pub struct TpktHeader {
    /// Length of the entire packet in octets, including the header.
    pub packet_length: u16,
}

impl TpktHeader {
    pub const VERSION: u8 = 3;

    pub const SIZE: usize = 4;

    pub const NAME: &'static str = "TpktHeader";

    const FIXED_PART_SIZE: usize = Self::SIZE;

    pub fn read(src: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let version = src.read_u8();

        if version != Self::VERSION {
            return Err(unsupported_version_err!("TPKT version", version));
        }

        read_padding!(src, 1);

        let packet_length = src.read_u16_be();

        Ok(Self { packet_length })
    }

    pub fn write(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u8(Self::VERSION);

        write_padding!(dst, 1);

        dst.write_u16_be(self.packet_length);

        Ok(())
    }

    pub fn packet_length(&self) -> usize {
        usize::from(self.packet_length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_version() {
        let buf = [0x02, 0x00, 0x00, 0x08];
        let e = TpktHeader::read(&mut ReadCursor::new(&buf)).err().unwrap();
        assert!(e.to_string().contains("unsupported version"));
    }

    #[test]
    fn round_trip() {
        let mut buf = [0u8; 4];
        TpktHeader { packet_length: 19 }.write(&mut WriteCursor::new(&mut buf)).unwrap();
        assert_eq!(buf, [0x03, 0x00, 0x00, 0x13]);

        let header = TpktHeader::read(&mut ReadCursor::new(&buf)).unwrap();
        assert_eq!(header.packet_length(), 19);
    }
}
