//! RDP-layer PDUs carried on the MCS I/O channel.

use cobaltrdp_core::{Decode, DecodeResult, Encode, EncodeResult, ReadCursor, WriteCursor};

pub mod capability_sets;
pub mod client_info;
pub mod finalization;
pub mod headers;
pub mod license;
pub mod server_error_info;
pub mod session_info;

use self::client_info::ClientInfo;
use self::headers::{BasicSecurityHeader, BasicSecurityHeaderFlags};

/// Client Info PDU: a basic security header with the INFO_PKT flag plus the
/// info packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfoPdu {
    pub security_header: BasicSecurityHeader,
    pub client_info: ClientInfo,
}

impl ClientInfoPdu {
    const NAME: &'static str = "ClientInfoPdu";

    pub fn new(client_info: ClientInfo) -> Self {
        Self {
            security_header: BasicSecurityHeader {
                flags: BasicSecurityHeaderFlags::INFO_PKT,
            },
            client_info,
        }
    }
}

impl Encode for ClientInfoPdu {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        self.security_header.encode(dst)?;
        self.client_info.encode(dst)
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        self.security_header.size() + self.client_info.size()
    }
}

impl<'de> Decode<'de> for ClientInfoPdu {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        let security_header = BasicSecurityHeader::decode(src)?;
        let client_info = ClientInfo::decode(src)?;

        Ok(Self {
            security_header,
            client_info,
        })
    }
}
