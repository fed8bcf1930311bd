//! The licensing subset used during connection: the preamble and the
//! Licensing Error Message.
//!
//! A server typically short-circuits the exchange with a
//! `STATUS_VALID_CLIENT` error message; full MS-RDPELE licensing is out of
//! scope for this client.

use cobaltrdp_core::{
    ensure_fixed_part_size, ensure_size, invalid_field_err, Decode, DecodeResult, Encode, EncodeResult, ReadCursor,
    WriteCursor,
};
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive as _, ToPrimitive as _};

use crate::rdp::headers::{BasicSecurityHeader, BasicSecurityHeaderFlags};

const PREAMBLE_VERSION_3: u8 = 0x03;

/// LICENSE_PREAMBLE
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicensePreamble {
    pub message_type: LicenseMessageType,
    pub flags: u8,
    pub message_size: u16,
}

impl LicensePreamble {
    const NAME: &'static str = "LicensePreamble";

    pub const FIXED_PART_SIZE: usize = 1 /* bMsgType */ + 1 /* flags */ + 2 /* wMsgSize */;
}

impl Encode for LicensePreamble {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u8(self.message_type.to_u8().expect("message type discriminant"));
        dst.write_u8(self.flags | PREAMBLE_VERSION_3);
        dst.write_u16(self.message_size);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for LicensePreamble {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let message_type = src.read_u8();
        let message_type = LicenseMessageType::from_u8(message_type)
            .ok_or_else(|| invalid_field_err!("bMsgType", "invalid license message type"))?;
        let flags = src.read_u8();
        let message_size = src.read_u16();

        Ok(Self {
            message_type,
            flags,
            message_size,
        })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum LicenseMessageType {
    LicenseRequest = 0x01,
    PlatformChallenge = 0x02,
    NewLicense = 0x03,
    UpgradeLicense = 0x04,
    LicenseInfo = 0x12,
    NewLicenseRequest = 0x13,
    PlatformChallengeResponse = 0x15,
    ErrorAlert = 0xFF,
}

/// Licensing PDU as received on the I/O channel: a basic security header
/// with the LICENSE_PKT flag, the preamble, and the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LicensePdu {
    /// LICENSE_ERROR_MESSAGE
    ErrorMessage(LicensingErrorMessage),
    /// Any other licensing message; only its type is retained.
    Other { message_type: LicenseMessageType },
}

impl LicensePdu {
    const NAME: &'static str = "LicensePdu";
}

impl<'de> Decode<'de> for LicensePdu {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        let security_header = BasicSecurityHeader::decode(src)?;
        if !security_header.flags.contains(BasicSecurityHeaderFlags::LICENSE_PKT) {
            return Err(invalid_field_err!("securityHeader", "not a license packet"));
        }

        let preamble = LicensePreamble::decode(src)?;

        match preamble.message_type {
            LicenseMessageType::ErrorAlert => Ok(Self::ErrorMessage(LicensingErrorMessage::decode(src)?)),
            message_type => {
                // Skip the body; the caller decides whether an unexpected
                // exchange is fatal.
                let body_size = usize::from(preamble.message_size).saturating_sub(LicensePreamble::FIXED_PART_SIZE);
                src.advance(body_size.min(src.len()));

                Ok(Self::Other { message_type })
            }
        }
    }
}

impl Encode for LicensePdu {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        let body_size = match self {
            Self::ErrorMessage(message) => message.size(),
            Self::Other { .. } => 0,
        };

        let security_header = BasicSecurityHeader {
            flags: BasicSecurityHeaderFlags::LICENSE_PKT,
        };
        security_header.encode(dst)?;

        let preamble = LicensePreamble {
            message_type: match self {
                Self::ErrorMessage(_) => LicenseMessageType::ErrorAlert,
                Self::Other { message_type } => *message_type,
            },
            flags: 0,
            message_size: (LicensePreamble::FIXED_PART_SIZE + body_size) as u16,
        };
        preamble.encode(dst)?;

        if let Self::ErrorMessage(message) = self {
            message.encode(dst)?;
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        let body_size = match self {
            Self::ErrorMessage(message) => message.size(),
            Self::Other { .. } => 0,
        };

        BasicSecurityHeader::FIXED_PART_SIZE + LicensePreamble::FIXED_PART_SIZE + body_size
    }
}

/// LICENSE_ERROR_MESSAGE
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicensingErrorMessage {
    pub error_code: LicenseErrorCode,
    pub state_transition: u32,
    pub error_info: Vec<u8>,
}

impl LicensingErrorMessage {
    const NAME: &'static str = "LicensingErrorMessage";

    const FIXED_PART_SIZE: usize = 4 /* dwErrorCode */ + 4 /* dwStateTransition */ + 4 /* blob header */;
}

impl Encode for LicensingErrorMessage {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        dst.write_u32(self.error_code.to_u32().expect("error code discriminant"));
        dst.write_u32(self.state_transition);
        dst.write_u16(0x0004); // wBlobType: BB_ERROR_BLOB
        dst.write_u16(self.error_info.len() as u16);
        dst.write_slice(&self.error_info);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.error_info.len()
    }
}

impl<'de> Decode<'de> for LicensingErrorMessage {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let error_code = src.read_u32();
        let error_code = LicenseErrorCode::from_u32(error_code)
            .ok_or_else(|| invalid_field_err!("dwErrorCode", "invalid license error code"))?;
        let state_transition = src.read_u32();

        let _blob_type = src.read_u16();
        let blob_len = usize::from(src.read_u16());

        ensure_size!(in: src, size: blob_len);
        let error_info = src.read_slice(blob_len).to_vec();

        Ok(Self {
            error_code,
            state_transition,
            error_info,
        })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum LicenseErrorCode {
    InvalidServerCertificate = 0x01,
    NoLicense = 0x02,
    InvalidMac = 0x03,
    InvalidScope = 0x04,
    NoLicenseServer = 0x06,
    StatusValidClient = 0x07,
    InvalidClient = 0x08,
    InvalidProductId = 0x0B,
    InvalidMessageLen = 0x0C,
}

impl LicenseErrorCode {
    pub fn description(self) -> &'static str {
        match self {
            Self::InvalidServerCertificate => "invalid server certificate",
            Self::NoLicense => "no license available",
            Self::InvalidMac => "invalid MAC data",
            Self::InvalidScope => "invalid scope",
            Self::NoLicenseServer => "no license server available",
            Self::StatusValidClient => "valid client",
            Self::InvalidClient => "invalid client",
            Self::InvalidProductId => "invalid product id",
            Self::InvalidMessageLen => "invalid message length",
        }
    }
}

#[cfg(test)]
mod tests {
    use cobaltrdp_core::{decode, encode_vec};

    use super::*;

    #[test]
    fn valid_client_error_message_round_trip() {
        let pdu = LicensePdu::ErrorMessage(LicensingErrorMessage {
            error_code: LicenseErrorCode::StatusValidClient,
            state_transition: 2, // ST_NO_TRANSITION
            error_info: Vec::new(),
        });

        let encoded = encode_vec(&pdu).unwrap();
        assert_eq!(encoded.len(), pdu.size());
        // security header flags: SEC_LICENSE_PKT
        assert_eq!(&encoded[..2], [0x80, 0x00]);
        // preamble: ERROR_ALERT, version 3
        assert_eq!(&encoded[4..6], [0xff, 0x03]);

        let decoded = decode::<LicensePdu>(&encoded).unwrap();
        assert_eq!(decoded, pdu);
    }
}
