use cobaltrdp_core::{
    ensure_size, invalid_field_err, Decode, DecodeResult, Encode, EncodeResult, ReadCursor, WriteCursor,
};

use crate::tpdu::{TpduCode, TpduHeader};
use crate::tpkt::TpktHeader;

/// A message carried in an X.224 TPDU.
///
/// Implementors describe only the TPDU body; the [`X224`] wrapper takes care
/// of the TPKT and TPDU headers on both paths.
pub trait X224Pdu: Sized {
    const X224_NAME: &'static str;

    const TPDU_CODE: TpduCode;

    fn x224_body_encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()>;

    fn x224_body_decode(src: &mut ReadCursor<'_>, tpkt: &TpktHeader, tpdu: &TpduHeader) -> DecodeResult<Self>;

    fn tpdu_header_variable_part_size(&self) -> usize;

    fn tpdu_user_data_size(&self) -> usize;
}

/// Wrapper adding TPKT + X.224 framing around an [`X224Pdu`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct X224<T>(pub T);

impl<T: X224Pdu> X224<T> {
    const NAME: &'static str = T::X224_NAME;
}

impl<T: X224Pdu> Encode for X224<T> {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        let packet_length = self.size();

        ensure_size!(in: dst, size: packet_length);

        TpktHeader {
            packet_length: u16::try_from(packet_length)
                .map_err(|_| invalid_field_err(Self::NAME, "packetLength", "larger than 65535"))?,
        }
        .write(dst)?;

        TpduHeader {
            li: u8::try_from(T::TPDU_CODE.header_fixed_part_size() + self.0.tpdu_header_variable_part_size() - 1)
                .map_err(|_| invalid_field_err(Self::NAME, "li", "header too big"))?,
            code: T::TPDU_CODE,
        }
        .write(dst)?;

        self.0.x224_body_encode(dst)
    }

    fn name(&self) -> &'static str {
        T::X224_NAME
    }

    fn size(&self) -> usize {
        TpktHeader::SIZE
            + T::TPDU_CODE.header_fixed_part_size()
            + self.0.tpdu_header_variable_part_size()
            + self.0.tpdu_user_data_size()
    }
}

impl<'de, T: X224Pdu> Decode<'de> for X224<T> {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        let tpkt = TpktHeader::read(src)?;

        ensure_size!(in: src, size: tpkt.packet_length().saturating_sub(TpktHeader::SIZE));

        let tpdu = TpduHeader::read(src, &tpkt)?;
        tpdu.code.check_expected(T::TPDU_CODE)?;

        if tpdu.size() < tpdu.fixed_part_size() {
            return Err(invalid_field_err(
                "TpduHeader",
                "li",
                "fixed part bigger than total header size",
            ));
        }

        T::x224_body_decode(src, &tpkt, &tpdu).map(X224)
    }
}

/// Raw user data inside an X.224 Data TPDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct X224Data {
    pub data: Vec<u8>,
}

impl X224Pdu for X224Data {
    const X224_NAME: &'static str = "X.224 Data";

    const TPDU_CODE: TpduCode = TpduCode::DATA;

    fn x224_body_encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(ctx: Self::X224_NAME, in: dst, size: self.data.len());
        dst.write_slice(&self.data);

        Ok(())
    }

    fn x224_body_decode(src: &mut ReadCursor<'_>, tpkt: &TpktHeader, tpdu: &TpduHeader) -> DecodeResult<Self> {
        let user_data_size = user_data_size(tpkt, tpdu);

        ensure_size!(ctx: Self::X224_NAME, in: src, size: user_data_size);
        let data = src.read_slice(user_data_size).to_vec();

        Ok(Self { data })
    }

    fn tpdu_header_variable_part_size(&self) -> usize {
        0
    }

    fn tpdu_user_data_size(&self) -> usize {
        self.data.len()
    }
}

pub fn user_data_size(tpkt: &TpktHeader, tpdu: &TpduHeader) -> usize {
    tpkt.packet_length() - TpktHeader::SIZE - tpdu.size()
}

#[cfg(test)]
mod tests {
    use cobaltrdp_core::{decode, encode_vec};

    use super::*;

    #[test]
    fn data_tpdu_round_trip() {
        let pdu = X224(X224Data {
            data: vec![0xde, 0xad, 0xbe, 0xef],
        });

        let encoded = encode_vec(&pdu).unwrap();
        assert_eq!(encoded[..7], [0x03, 0x00, 0x00, 0x0b, 0x02, 0xf0, 0x80]);
        assert_eq!(&encoded[7..], [0xde, 0xad, 0xbe, 0xef]);

        let decoded = decode::<X224<X224Data>>(&encoded).unwrap();
        assert_eq!(decoded.0.data, vec![0xde, 0xad, 0xbe, 0xef]);
    }
}
