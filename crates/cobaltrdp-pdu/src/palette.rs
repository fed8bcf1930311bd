use cobaltrdp_core::{
    ensure_fixed_part_size, ensure_size, invalid_field_err, read_padding, write_padding, Decode, DecodeResult, Encode,
    EncodeResult, ReadCursor, WriteCursor,
};

const PALETTE_SIZE: usize = 256;

/// TS_UPDATE_PALETTE_DATA
///
/// Carries the 256-entry RGB lookup table used by subsequent 8-bpp bitmap
/// updates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaletteUpdateData {
    pub entries: Vec<[u8; 3]>,
}

impl PaletteUpdateData {
    const NAME: &'static str = "TS_UPDATE_PALETTE_DATA";
    const FIXED_PART_SIZE: usize = 2 /* updateType */ + 2 /* pad */ + 4 /* numberColors */;

    const UPDATE_TYPE_PALETTE: u16 = 0x0002;
}

impl Encode for PaletteUpdateData {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        dst.write_u16(Self::UPDATE_TYPE_PALETTE);
        write_padding!(dst, 2);
        dst.write_u32(self.entries.len() as u32);

        for entry in self.entries.iter() {
            dst.write_slice(entry);
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.entries.len() * 3
    }
}

impl<'de> Decode<'de> for PaletteUpdateData {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let update_type = src.read_u16();
        if update_type != Self::UPDATE_TYPE_PALETTE {
            return Err(invalid_field_err!("updateType", "not a palette update"));
        }

        read_padding!(src, 2);

        let number_colors = src.read_u32() as usize;
        if number_colors > PALETTE_SIZE {
            return Err(invalid_field_err!("numberColors", "more than 256 palette entries"));
        }

        ensure_size!(in: src, size: number_colors * 3);

        let entries = (0..number_colors).map(|_| src.read_array::<3>()).collect();

        Ok(Self { entries })
    }
}
