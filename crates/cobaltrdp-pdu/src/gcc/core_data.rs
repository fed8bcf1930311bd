use bitflags::bitflags;
use cobaltrdp_core::{
    ensure_fixed_part_size, ensure_size, invalid_field_err, read_padding, write_padding, Decode, DecodeResult, Encode,
    EncodeResult, ReadCursor, WriteCursor,
};
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive as _, ToPrimitive as _};
use tap::Pipe as _;

use crate::nego::SecurityProtocol;
use crate::utf16;

pub const IME_FILE_NAME_SIZE: usize = 64;

const CLIENT_NAME_SIZE: usize = 32;
const DIG_PRODUCT_ID_SIZE: usize = 64;

/// RDP protocol version advertised in the core data blocks.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RdpVersion(pub u32);

impl RdpVersion {
    pub const V4: Self = Self(0x0008_0001);
    pub const V5_PLUS: Self = Self(0x0008_0004);
    pub const V10: Self = Self(0x0008_0005);
}

/// TS_UD_CS_CORE (required part)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCoreData {
    pub version: RdpVersion,
    pub desktop_width: u16,
    pub desktop_height: u16,
    /// Ignored by servers when the postBeta2ColorDepth field is present.
    pub color_depth: ColorDepth,
    pub sec_access_sequence: SecureAccessSequence,
    pub keyboard_layout: u32,
    pub client_build: u32,
    pub client_name: String,
    pub keyboard_type: KeyboardType,
    pub keyboard_subtype: u32,
    pub keyboard_functional_keys_count: u32,
    pub ime_file_name: String,
    pub optional_data: ClientCoreOptionalData,
}

impl ClientCoreData {
    const NAME: &'static str = "ClientCoreData";

    const FIXED_PART_SIZE: usize = 4 /* version */
        + 2 /* width */
        + 2 /* height */
        + 2 /* colorDepth */
        + 2 /* SASSequence */
        + 4 /* keyboardLayout */
        + 4 /* clientBuild */
        + CLIENT_NAME_SIZE
        + 4 /* keyboardType */
        + 4 /* keyboardSubType */
        + 4 /* keyboardFunctionKey */
        + IME_FILE_NAME_SIZE;
}

impl Encode for ClientCoreData {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        dst.write_u32(self.version.0);
        dst.write_u16(self.desktop_width);
        dst.write_u16(self.desktop_height);
        dst.write_u16(self.color_depth.to_u16().expect("color depth discriminant"));
        dst.write_u16(self.sec_access_sequence.to_u16().expect("SAS discriminant"));
        dst.write_u32(self.keyboard_layout);
        dst.write_u32(self.client_build);
        utf16::write_utf16_fixed(dst, &self.client_name, CLIENT_NAME_SIZE)?;
        dst.write_u32(self.keyboard_type.to_u32().expect("keyboard type discriminant"));
        dst.write_u32(self.keyboard_subtype);
        dst.write_u32(self.keyboard_functional_keys_count);
        utf16::write_utf16_fixed(dst, &self.ime_file_name, IME_FILE_NAME_SIZE)?;

        self.optional_data.encode(dst)
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.optional_data.size()
    }
}

impl<'de> Decode<'de> for ClientCoreData {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let version = src.read_u32().pipe(RdpVersion);
        let desktop_width = src.read_u16();
        let desktop_height = src.read_u16();
        let color_depth = src
            .read_u16()
            .pipe(ColorDepth::from_u16)
            .ok_or_else(|| invalid_field_err!("colorDepth", "invalid color depth"))?;
        let sec_access_sequence = src
            .read_u16()
            .pipe(SecureAccessSequence::from_u16)
            .ok_or_else(|| invalid_field_err!("SASSequence", "invalid secure access sequence"))?;
        let keyboard_layout = src.read_u32();
        let client_build = src.read_u32();
        let client_name = utf16::read_utf16_exact(src, CLIENT_NAME_SIZE)?;
        let keyboard_type = src
            .read_u32()
            .pipe(KeyboardType::from_u32)
            .ok_or_else(|| invalid_field_err!("keyboardType", "invalid keyboard type"))?;
        let keyboard_subtype = src.read_u32();
        let keyboard_functional_keys_count = src.read_u32();
        let ime_file_name = utf16::read_utf16_exact(src, IME_FILE_NAME_SIZE)?;

        let optional_data = ClientCoreOptionalData::decode(src)?;

        Ok(Self {
            version,
            desktop_width,
            desktop_height,
            color_depth,
            sec_access_sequence,
            keyboard_layout,
            client_build,
            client_name,
            keyboard_type,
            keyboard_subtype,
            keyboard_functional_keys_count,
            ime_file_name,
            optional_data,
        })
    }
}

/// TS_UD_CS_CORE (optional part)
///
/// Every field requires all preceding fields to be present in order to form
/// a valid structure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientCoreOptionalData {
    pub post_beta2_color_depth: Option<ColorDepth>,
    pub client_product_id: Option<u16>,
    pub serial_number: Option<u32>,
    pub high_color_depth: Option<HighColorDepth>,
    pub supported_color_depths: Option<SupportedColorDepths>,
    pub early_capability_flags: Option<ClientEarlyCapabilityFlags>,
    pub dig_product_id: Option<String>,
    pub connection_type: Option<ConnectionType>,
    pub server_selected_protocol: Option<SecurityProtocol>,
}

impl ClientCoreOptionalData {
    const NAME: &'static str = "ClientCoreOptionalData";
}

macro_rules! ensure_previous_field {
    ($previous:expr, $name:expr) => {
        if $previous.is_none() {
            return Err(invalid_field_err(Self::NAME, $name, "previous optional field must be present"));
        }
    };
}

impl Encode for ClientCoreOptionalData {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        if let Some(value) = self.post_beta2_color_depth {
            dst.write_u16(value.to_u16().expect("color depth discriminant"));
        }

        if let Some(value) = self.client_product_id {
            ensure_previous_field!(self.post_beta2_color_depth, "postBeta2ColorDepth");
            dst.write_u16(value);
        }

        if let Some(value) = self.serial_number {
            ensure_previous_field!(self.client_product_id, "clientProductId");
            dst.write_u32(value);
        }

        if let Some(value) = self.high_color_depth {
            ensure_previous_field!(self.serial_number, "serialNumber");
            dst.write_u16(value.to_u16().expect("high color depth discriminant"));
        }

        if let Some(value) = self.supported_color_depths {
            ensure_previous_field!(self.high_color_depth, "highColorDepth");
            dst.write_u16(value.bits());
        }

        if let Some(value) = self.early_capability_flags {
            ensure_previous_field!(self.supported_color_depths, "supportedColorDepths");
            dst.write_u16(value.bits());
        }

        if let Some(ref value) = self.dig_product_id {
            ensure_previous_field!(self.early_capability_flags, "earlyCapabilityFlags");
            utf16::write_utf16_fixed(dst, value, DIG_PRODUCT_ID_SIZE)?;
        }

        if let Some(value) = self.connection_type {
            ensure_previous_field!(self.dig_product_id, "digProductId");
            dst.write_u8(value.to_u8().expect("connection type discriminant"));
            write_padding!(dst, 1);
        }

        if let Some(value) = self.server_selected_protocol {
            ensure_previous_field!(self.connection_type, "connectionType");
            dst.write_u32(value.bits());
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        let mut size = 0;

        if self.post_beta2_color_depth.is_some() {
            size += 2;
        }
        if self.client_product_id.is_some() {
            size += 2;
        }
        if self.serial_number.is_some() {
            size += 4;
        }
        if self.high_color_depth.is_some() {
            size += 2;
        }
        if self.supported_color_depths.is_some() {
            size += 2;
        }
        if self.early_capability_flags.is_some() {
            size += 2;
        }
        if self.dig_product_id.is_some() {
            size += DIG_PRODUCT_ID_SIZE;
        }
        if self.connection_type.is_some() {
            size += 2;
        }
        if self.server_selected_protocol.is_some() {
            size += 4;
        }

        size
    }
}

macro_rules! try_or_return {
    ($expr:expr, $ret:expr) => {
        match $expr {
            Ok(v) => v,
            Err(_) => return Ok($ret),
        }
    };
}

impl<'de> Decode<'de> for ClientCoreOptionalData {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        let mut optional_data = Self::default();

        optional_data.post_beta2_color_depth = Some(
            ColorDepth::from_u16(try_or_return!(src.try_read_u16(), optional_data))
                .ok_or_else(|| invalid_field_err!("postBeta2ColorDepth", "invalid color depth"))?,
        );

        optional_data.client_product_id = Some(try_or_return!(src.try_read_u16(), optional_data));
        optional_data.serial_number = Some(try_or_return!(src.try_read_u32(), optional_data));

        optional_data.high_color_depth = Some(
            HighColorDepth::from_u16(try_or_return!(src.try_read_u16(), optional_data))
                .ok_or_else(|| invalid_field_err!("highColorDepth", "invalid high color depth"))?,
        );

        optional_data.supported_color_depths = Some(SupportedColorDepths::from_bits_truncate(try_or_return!(
            src.try_read_u16(),
            optional_data
        )));

        optional_data.early_capability_flags = Some(ClientEarlyCapabilityFlags::from_bits_truncate(try_or_return!(
            src.try_read_u16(),
            optional_data
        )));

        if src.len() < DIG_PRODUCT_ID_SIZE {
            return Ok(optional_data);
        }
        optional_data.dig_product_id = Some(utf16::read_utf16_exact(src, DIG_PRODUCT_ID_SIZE)?);

        optional_data.connection_type = Some(
            ConnectionType::from_u8(try_or_return!(src.try_read_u8(), optional_data))
                .ok_or_else(|| invalid_field_err!("connectionType", "invalid connection type"))?,
        );
        try_or_return!(src.try_read_u8(), optional_data); // padding

        optional_data.server_selected_protocol = Some(SecurityProtocol::from_bits_truncate(try_or_return!(
            src.try_read_u32(),
            optional_data
        )));

        // Later fields (physical dimensions, orientation, scale factors) are
        // read by RdpVersion::V10+ servers only and are not produced here.
        if !src.is_empty() {
            read_padding!(src, src.len());
        }

        Ok(optional_data)
    }
}

/// TS_UD_SC_CORE
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCoreData {
    pub version: RdpVersion,
    pub client_requested_protocols: Option<SecurityProtocol>,
    pub early_capability_flags: Option<u32>,
}

impl ServerCoreData {
    const NAME: &'static str = "ServerCoreData";

    const FIXED_PART_SIZE: usize = 4 /* version */;
}

impl Encode for ServerCoreData {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        dst.write_u32(self.version.0);

        if let Some(value) = self.client_requested_protocols {
            dst.write_u32(value.bits());
        }

        if let Some(value) = self.early_capability_flags {
            ensure_previous_field!(self.client_requested_protocols, "clientRequestedProtocols");
            dst.write_u32(value);
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
            + self.client_requested_protocols.map_or(0, |_| 4)
            + self.early_capability_flags.map_or(0, |_| 4)
    }
}

impl<'de> Decode<'de> for ServerCoreData {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let version = src.read_u32().pipe(RdpVersion);

        let mut data = Self {
            version,
            client_requested_protocols: None,
            early_capability_flags: None,
        };

        data.client_requested_protocols =
            Some(SecurityProtocol::from_bits_truncate(try_or_return!(src.try_read_u32(), data)));
        data.early_capability_flags = Some(try_or_return!(src.try_read_u32(), data));

        Ok(data)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u16)]
pub enum ColorDepth {
    Bpp4 = 0xCA00,
    Bpp8 = 0xCA01,
    Rgb555Bpp16 = 0xCA02,
    Rgb565Bpp16 = 0xCA03,
    Bpp24 = 0xCA04,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u16)]
pub enum HighColorDepth {
    Bpp4 = 4,
    Bpp8 = 8,
    Bpp15 = 15,
    Bpp16 = 16,
    Bpp24 = 24,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u16)]
pub enum SecureAccessSequence {
    Del = 0xAA03,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum KeyboardType {
    IbmPcXt = 1,
    OlivettiIco = 2,
    IbmPcAt = 3,
    IbmEnhanced = 4,
    Nokia1050 = 5,
    Nokia9140 = 6,
    Japanese = 7,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum ConnectionType {
    NotUsed = 0,
    Modem = 1,
    BroadbandLow = 2,
    Satellite = 3,
    BroadbandHigh = 4,
    Wan = 5,
    Lan = 6,
    AutoDetect = 7,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct SupportedColorDepths: u16 {
        const BPP24 = 0x01;
        const BPP16 = 0x02;
        const BPP15 = 0x04;
        const BPP32 = 0x08;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct ClientEarlyCapabilityFlags: u16 {
        const SUPPORT_ERR_INFO_PDU = 0x0001;
        const WANT_32_BPP_SESSION = 0x0002;
        const SUPPORT_STATUS_INFO_PDU = 0x0004;
        const STRONG_ASYMMETRIC_KEYS = 0x0008;
        const VALID_CONNECTION_TYPE = 0x0020;
        const SUPPORT_MONITOR_LAYOUT_PDU = 0x0040;
        const SUPPORT_NET_CHAR_AUTODETECT = 0x0080;
        const SUPPORT_DYN_VC_GFX_PROTOCOL = 0x0100;
        const SUPPORT_DYNAMIC_TIME_ZONE = 0x0200;
        const SUPPORT_HEARTBEAT_PDU = 0x0400;
    }
}
