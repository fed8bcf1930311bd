use cobaltrdp_core::{ensure_fixed_part_size, ensure_size, Decode, DecodeResult, Encode, EncodeResult, ReadCursor, WriteCursor};

/// TS_SAVE_SESSION_INFO_PDU_DATA
///
/// Informational; the session logs the notification type and moves on, so
/// the info payload is kept raw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveSessionInfoPdu {
    pub info_type: u32,
    pub info_data: Vec<u8>,
}

impl SaveSessionInfoPdu {
    const NAME: &'static str = "SaveSessionInfoPdu";

    const FIXED_PART_SIZE: usize = 4 /* infoType */;

    pub fn info_type_name(&self) -> &'static str {
        match self.info_type {
            0x00 => "INFOTYPE_LOGON",
            0x01 => "INFOTYPE_LOGON_LONG",
            0x02 => "INFOTYPE_LOGON_PLAINNOTIFY",
            0x03 => "INFOTYPE_LOGON_EXTENDED_INF",
            _ => "unknown",
        }
    }
}

impl Encode for SaveSessionInfoPdu {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        dst.write_u32(self.info_type);
        dst.write_slice(&self.info_data);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.info_data.len()
    }
}

impl<'de> Decode<'de> for SaveSessionInfoPdu {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let info_type = src.read_u32();
        let info_data = src.read_remaining().to_vec();

        Ok(Self { info_type, info_data })
    }
}
