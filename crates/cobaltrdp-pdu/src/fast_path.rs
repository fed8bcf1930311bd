//! Server fast-path output framing (TS_FP_UPDATE_PDU).

use bit_field::BitField as _;
use bitflags::bitflags;
use cobaltrdp_core::{
    decode_cursor, ensure_fixed_part_size, ensure_size, invalid_field_err, invalid_field_err_with_source, Decode,
    DecodeResult, Encode, EncodeResult, ReadCursor, WriteCursor,
};
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive as _, ToPrimitive as _};

use crate::bitmap::BitmapUpdateData;
use crate::palette::PaletteUpdateData;
use crate::per;
use crate::pointer::PointerUpdateData;

/// Fast-path output header: 1 byte action/flags plus a 1-or-2-byte length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastPathHeader {
    pub flags: EncryptionFlags,
    pub data_length: usize,
    forced_long_length: bool,
}

impl FastPathHeader {
    const NAME: &'static str = "TS_FP_UPDATE_PDU header";
    const FIXED_PART_SIZE: usize = 1;

    pub fn new(flags: EncryptionFlags, data_length: usize) -> Self {
        Self {
            flags,
            data_length,
            forced_long_length: false,
        }
    }

    fn minimal_size(&self) -> usize {
        Self::FIXED_PART_SIZE + per::sizeof_length(self.data_length as u16)
    }
}

impl Encode for FastPathHeader {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        let mut header = 0u8;
        header.set_bits(0..2, 0); // fast-path action
        header.set_bits(6..8, self.flags.bits());
        dst.write_u8(header);

        let length = self.data_length + self.size();
        let length = u16::try_from(length)
            .map_err(|_| invalid_field_err(Self::NAME, "length", "fast-path PDU length is too big"))?;

        if self.forced_long_length {
            // Preserve the same layout for the header as received.
            per::write_long_length(dst, length);
        } else {
            per::write_length(dst, length);
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        if self.forced_long_length {
            Self::FIXED_PART_SIZE + per::U16_SIZE
        } else {
            self.minimal_size()
        }
    }
}

impl<'de> Decode<'de> for FastPathHeader {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let header = src.read_u8();
        let flags = EncryptionFlags::from_bits_truncate(header.get_bits(6..8));

        let (length, sizeof_length) = per::read_length(src)
            .map_err(|e| invalid_field_err_with_source(Self::NAME, "length", "invalid encoded length", e))?;
        if usize::from(length) < sizeof_length + Self::FIXED_PART_SIZE {
            return Err(invalid_field_err!("length", "received length is smaller than the header size"));
        }
        let data_length = usize::from(length) - sizeof_length - Self::FIXED_PART_SIZE;
        // Detect the case when the received packet has a non-optimal length packing.
        let forced_long_length = per::sizeof_length(length) != sizeof_length;

        Ok(FastPathHeader {
            flags,
            data_length,
            forced_long_length,
        })
    }
}

/// TS_FP_UPDATE: one update record inside a fast-path output PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastPathUpdatePdu<'a> {
    pub fragmentation: Fragmentation,
    pub update_code: UpdateCode,
    pub compression_flags: Option<u8>,
    pub data: &'a [u8],
}

impl FastPathUpdatePdu<'_> {
    const NAME: &'static str = "TS_FP_UPDATE";
    const FIXED_PART_SIZE: usize = 1;
}

impl Encode for FastPathUpdatePdu<'_> {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        let data_length = u16::try_from(self.data.len())
            .map_err(|_| invalid_field_err(Self::NAME, "data", "fast-path update data is too big"))?;

        let mut header = 0u8;
        header.set_bits(
            0..4,
            self.update_code.to_u8().expect("update code discriminant fits in 4 bits"),
        );
        header.set_bits(4..6, self.fragmentation.to_u8().expect("fragmentation fits in 2 bits"));

        if self.compression_flags.is_some() {
            header.set_bits(6..8, Compression::COMPRESSION_USED.bits());
        }

        dst.write_u8(header);

        if let Some(compression_flags) = self.compression_flags {
            dst.write_u8(compression_flags);
        }

        dst.write_u16(data_length);
        dst.write_slice(self.data);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        let compression_flags_size = if self.compression_flags.is_some() { 1 } else { 0 };

        Self::FIXED_PART_SIZE + compression_flags_size + 2 + self.data.len()
    }
}

impl<'de> Decode<'de> for FastPathUpdatePdu<'de> {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let header = src.read_u8();

        let update_code = header.get_bits(0..4);
        let update_code =
            UpdateCode::from_u8(update_code).ok_or_else(|| invalid_field_err("updateHeader", "updateCode", "invalid update code"))?;

        let fragmentation = header.get_bits(4..6);
        let fragmentation = Fragmentation::from_u8(fragmentation)
            .ok_or_else(|| invalid_field_err("updateHeader", "fragmentation", "invalid fragmentation"))?;

        let compression = Compression::from_bits_truncate(header.get_bits(6..8));

        let compression_flags = if compression.contains(Compression::COMPRESSION_USED) {
            ensure_size!(in: src, size: 1 + 2);
            Some(src.read_u8())
        } else {
            ensure_size!(in: src, size: 2);
            None
        };

        let data_length = usize::from(src.read_u16());
        ensure_size!(in: src, size: data_length);
        let data = src.read_slice(data_length);

        Ok(Self {
            fragmentation,
            update_code,
            compression_flags,
            data,
        })
    }
}

/// Decoded fast-path update payload.
///
/// Update codes this client merely acknowledges (orders, synchronize,
/// surface commands) decode to `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FastPathUpdate<'a> {
    Bitmap(BitmapUpdateData<'a>),
    Palette(PaletteUpdateData),
    Pointer(PointerUpdateData<'a>),
}

impl<'a> FastPathUpdate<'a> {
    pub fn decode_with_code(src: &'a [u8], code: UpdateCode) -> DecodeResult<Option<Self>> {
        let mut cursor = ReadCursor::<'a>::new(src);
        Self::decode_cursor_with_code(&mut cursor, code)
    }

    pub fn decode_cursor_with_code(src: &mut ReadCursor<'a>, code: UpdateCode) -> DecodeResult<Option<Self>> {
        match code {
            UpdateCode::Bitmap => Ok(Some(Self::Bitmap(decode_cursor(src)?))),
            UpdateCode::Palette => Ok(Some(Self::Palette(decode_cursor(src)?))),
            UpdateCode::HiddenPointer => Ok(Some(Self::Pointer(PointerUpdateData::SetHidden))),
            UpdateCode::DefaultPointer => Ok(Some(Self::Pointer(PointerUpdateData::SetDefault))),
            UpdateCode::PositionPointer => Ok(Some(Self::Pointer(PointerUpdateData::SetPosition(decode_cursor(src)?)))),
            UpdateCode::ColorPointer => Ok(Some(Self::Pointer(PointerUpdateData::Color(decode_cursor(src)?)))),
            UpdateCode::CachedPointer => Ok(Some(Self::Pointer(PointerUpdateData::Cached(decode_cursor(src)?)))),
            UpdateCode::NewPointer => Ok(Some(Self::Pointer(PointerUpdateData::New(decode_cursor(src)?)))),
            UpdateCode::LargePointer => Ok(Some(Self::Pointer(PointerUpdateData::Large(decode_cursor(src)?)))),
            UpdateCode::Orders | UpdateCode::Synchronize | UpdateCode::SurfaceCommands => Ok(None),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum UpdateCode {
    Orders = 0x0,
    Bitmap = 0x1,
    Palette = 0x2,
    Synchronize = 0x3,
    SurfaceCommands = 0x4,
    HiddenPointer = 0x5,
    DefaultPointer = 0x6,
    PositionPointer = 0x8,
    ColorPointer = 0x9,
    CachedPointer = 0xa,
    NewPointer = 0xb,
    LargePointer = 0xc,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum Fragmentation {
    Single = 0x0,
    Last = 0x1,
    First = 0x2,
    Next = 0x3,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct EncryptionFlags: u8 {
        const SECURE_CHECKSUM = 0x1;
        const ENCRYPTED = 0x2;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct Compression: u8 {
        const COMPRESSION_USED = 0x2;
    }
}

#[cfg(test)]
mod tests {
    use cobaltrdp_core::decode;

    use super::*;

    #[test]
    fn header_short_length() {
        let buf = [0x00, 0x08];
        let header = decode::<FastPathHeader>(&buf).unwrap();
        assert_eq!(header.flags, EncryptionFlags::empty());
        assert_eq!(header.data_length, 6);
    }

    #[test]
    fn header_forced_long_length_survives_round_trip() {
        let buf = [0x00, 0x80, 0x08];
        let header = decode::<FastPathHeader>(&buf).unwrap();
        assert_eq!(header.data_length, 5);

        let reencoded = cobaltrdp_core::encode_vec(&header).unwrap();
        assert_eq!(reencoded, buf);
    }

    #[test]
    fn update_pdu_bitmap_code() {
        let buf = [0x01, 0x04, 0x00, 0xaa, 0xbb, 0xcc, 0xdd];
        let pdu = decode::<FastPathUpdatePdu<'_>>(&buf).unwrap();
        assert_eq!(pdu.update_code, UpdateCode::Bitmap);
        assert_eq!(pdu.fragmentation, Fragmentation::Single);
        assert_eq!(pdu.data, [0xaa, 0xbb, 0xcc, 0xdd]);
    }

    #[test]
    fn orders_update_is_accepted_and_ignored() {
        let update = FastPathUpdate::decode_with_code(&[], UpdateCode::Orders).unwrap();
        assert!(update.is_none());
    }
}
