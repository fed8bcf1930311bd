//! Capability sets exchanged in the Demand Active / Confirm Active PDUs.

use bitflags::bitflags;
use cobaltrdp_core::{
    cast_length, decode, ensure_fixed_part_size, ensure_size, invalid_field_err, read_padding, write_padding, Decode,
    DecodeResult, Encode, EncodeResult, ReadCursor, WriteCursor,
};
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive as _, ToPrimitive as _};

use crate::gcc::KeyboardType;
use crate::utf16;

pub const SERVER_CHANNEL_ID: u16 = 0x03ea;

pub const PROTOCOL_VER: u16 = 0x0200;
pub const BITMAP_CACHE_ENTRIES_NUM: usize = 3;
pub const GLYPH_CACHE_NUM: usize = 10;

const SOURCE_DESCRIPTOR_LENGTH_FIELD_SIZE: usize = 2;
const COMBINED_CAPABILITIES_LENGTH_FIELD_SIZE: usize = 2;
const NUMBER_CAPABILITIES_FIELD_SIZE: usize = 2;
const PADDING_SIZE: usize = 2;
const SESSION_ID_FIELD_SIZE: usize = 4;
const CAPABILITY_SET_TYPE_FIELD_SIZE: usize = 2;
const CAPABILITY_SET_LENGTH_FIELD_SIZE: usize = 2;
const ORIGINATOR_ID_FIELD_SIZE: usize = 2;

const NULL_TERMINATOR: &str = "\0";

/// 2.2.1.13.1 Server Demand Active PDU
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerDemandActive {
    pub pdu: DemandActive,
}

impl ServerDemandActive {
    const NAME: &'static str = "ServerDemandActive";

    const FIXED_PART_SIZE: usize = SESSION_ID_FIELD_SIZE;
}

impl Encode for ServerDemandActive {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        self.pdu.encode(dst)?;
        dst.write_u32(0); // sessionId, ignored by the client

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.pdu.size()
    }
}

impl<'de> Decode<'de> for ServerDemandActive {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        let pdu = DemandActive::decode(src)?;

        ensure_size!(in: src, size: 4);
        let _session_id = src.read_u32();

        Ok(Self { pdu })
    }
}

/// 2.2.1.13.2 Client Confirm Active PDU
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfirmActive {
    /// The Microsoft RDP client takes this value from the PduSource field of
    /// the Server Demand Active PDU rather than hardcoding
    /// [`SERVER_CHANNEL_ID`].
    pub originator_id: u16,
    pub pdu: DemandActive,
}

impl ClientConfirmActive {
    const NAME: &'static str = "ClientConfirmActive";

    const FIXED_PART_SIZE: usize = ORIGINATOR_ID_FIELD_SIZE;
}

impl Encode for ClientConfirmActive {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u16(self.originator_id);

        self.pdu.encode(dst)
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.pdu.size()
    }
}

impl<'de> Decode<'de> for ClientConfirmActive {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let originator_id = src.read_u16();
        let pdu = DemandActive::decode(src)?;

        Ok(Self { originator_id, pdu })
    }
}

/// TS_DEMAND_ACTIVE_PDU
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemandActive {
    pub source_descriptor: String,
    pub capability_sets: Vec<CapabilitySet>,
}

impl DemandActive {
    const NAME: &'static str = "DemandActive";

    const FIXED_PART_SIZE: usize = SOURCE_DESCRIPTOR_LENGTH_FIELD_SIZE + COMBINED_CAPABILITIES_LENGTH_FIELD_SIZE;
}

impl Encode for DemandActive {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        let combined_length = self.capability_sets.iter().map(Encode::size).sum::<usize>()
            + NUMBER_CAPABILITIES_FIELD_SIZE
            + PADDING_SIZE;

        dst.write_u16(cast_length!(
            "sourceDescriptorLen",
            self.source_descriptor.len() + NULL_TERMINATOR.len()
        )?);
        dst.write_u16(cast_length!("combinedLen", combined_length)?);
        dst.write_slice(self.source_descriptor.as_ref());
        dst.write_slice(NULL_TERMINATOR.as_bytes());
        dst.write_u16(cast_length!("numberCapabilities", self.capability_sets.len())?);
        write_padding!(dst, 2);

        for capability_set in self.capability_sets.iter() {
            capability_set.encode(dst)?;
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
            + self.source_descriptor.len()
            + 1
            + NUMBER_CAPABILITIES_FIELD_SIZE
            + PADDING_SIZE
            + self.capability_sets.iter().map(Encode::size).sum::<usize>()
    }
}

impl<'de> Decode<'de> for DemandActive {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let source_descriptor_length = usize::from(src.read_u16());
        // Combined size of numberCapabilities, pad2Octets and capabilitySets.
        let _combined_capabilities_length = usize::from(src.read_u16());

        ensure_size!(in: src, size: source_descriptor_length);
        let source_descriptor = core::str::from_utf8(src.read_slice(source_descriptor_length))
            .map_err(|_| invalid_field_err!("sourceDescriptor", "not valid UTF-8"))?
            .trim_end_matches('\0')
            .to_owned();

        ensure_size!(in: src, size: 2 + 2);
        let capability_sets_count = usize::from(src.read_u16());
        read_padding!(src, 2);

        let mut capability_sets = Vec::with_capacity(capability_sets_count);
        for _ in 0..capability_sets_count {
            capability_sets.push(CapabilitySet::decode(src)?);
        }

        Ok(Self {
            source_descriptor,
            capability_sets,
        })
    }
}

/// TS_CAPS_SET: 4-byte {type, length} header followed by a typed body.
///
/// Sets this client does not interpret are kept as raw bytes so a Confirm
/// Active can still echo them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilitySet {
    // mandatory
    General(General),
    Bitmap(Bitmap),
    Order(Order),
    BitmapCache(BitmapCache),
    Pointer(Pointer),
    Sound(Sound),
    Input(Input),
    Brush(Brush),
    GlyphCache(GlyphCache),
    OffscreenBitmapCache(OffscreenBitmapCache),
    VirtualChannel(VirtualChannel),
    Font(Font),

    // optional
    LargePointer(LargePointer),
    MultiFragmentUpdate(MultifragmentUpdate),

    // uninterpreted passthrough
    Other { set_type: u16, payload: Vec<u8> },
}

impl CapabilitySet {
    const NAME: &'static str = "CapabilitySet";

    const FIXED_PART_SIZE: usize = CAPABILITY_SET_TYPE_FIELD_SIZE + CAPABILITY_SET_LENGTH_FIELD_SIZE;

    fn set_type(&self) -> u16 {
        match self {
            CapabilitySet::General(_) => CapabilitySetType::General as u16,
            CapabilitySet::Bitmap(_) => CapabilitySetType::Bitmap as u16,
            CapabilitySet::Order(_) => CapabilitySetType::Order as u16,
            CapabilitySet::BitmapCache(_) => CapabilitySetType::BitmapCache as u16,
            CapabilitySet::Pointer(_) => CapabilitySetType::Pointer as u16,
            CapabilitySet::Sound(_) => CapabilitySetType::Sound as u16,
            CapabilitySet::Input(_) => CapabilitySetType::Input as u16,
            CapabilitySet::Brush(_) => CapabilitySetType::Brush as u16,
            CapabilitySet::GlyphCache(_) => CapabilitySetType::GlyphCache as u16,
            CapabilitySet::OffscreenBitmapCache(_) => CapabilitySetType::OffscreenBitmapCache as u16,
            CapabilitySet::VirtualChannel(_) => CapabilitySetType::VirtualChannel as u16,
            CapabilitySet::Font(_) => CapabilitySetType::Font as u16,
            CapabilitySet::LargePointer(_) => CapabilitySetType::LargePointer as u16,
            CapabilitySet::MultiFragmentUpdate(_) => CapabilitySetType::MultiFragmentUpdate as u16,
            CapabilitySet::Other { set_type, .. } => *set_type,
        }
    }

    fn body_size(&self) -> usize {
        match self {
            CapabilitySet::General(capset) => capset.size(),
            CapabilitySet::Bitmap(capset) => capset.size(),
            CapabilitySet::Order(capset) => capset.size(),
            CapabilitySet::BitmapCache(capset) => capset.size(),
            CapabilitySet::Pointer(capset) => capset.size(),
            CapabilitySet::Sound(capset) => capset.size(),
            CapabilitySet::Input(capset) => capset.size(),
            CapabilitySet::Brush(capset) => capset.size(),
            CapabilitySet::GlyphCache(capset) => capset.size(),
            CapabilitySet::OffscreenBitmapCache(capset) => capset.size(),
            CapabilitySet::VirtualChannel(capset) => capset.size(),
            CapabilitySet::Font(capset) => capset.size(),
            CapabilitySet::LargePointer(capset) => capset.size(),
            CapabilitySet::MultiFragmentUpdate(capset) => capset.size(),
            CapabilitySet::Other { payload, .. } => payload.len(),
        }
    }
}

impl Encode for CapabilitySet {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        dst.write_u16(self.set_type());
        dst.write_u16(cast_length!(
            "lengthCapability",
            self.body_size() + CAPABILITY_SET_TYPE_FIELD_SIZE + CAPABILITY_SET_LENGTH_FIELD_SIZE
        )?);

        match self {
            CapabilitySet::General(capset) => capset.encode(dst),
            CapabilitySet::Bitmap(capset) => capset.encode(dst),
            CapabilitySet::Order(capset) => capset.encode(dst),
            CapabilitySet::BitmapCache(capset) => capset.encode(dst),
            CapabilitySet::Pointer(capset) => capset.encode(dst),
            CapabilitySet::Sound(capset) => capset.encode(dst),
            CapabilitySet::Input(capset) => capset.encode(dst),
            CapabilitySet::Brush(capset) => capset.encode(dst),
            CapabilitySet::GlyphCache(capset) => capset.encode(dst),
            CapabilitySet::OffscreenBitmapCache(capset) => capset.encode(dst),
            CapabilitySet::VirtualChannel(capset) => capset.encode(dst),
            CapabilitySet::Font(capset) => capset.encode(dst),
            CapabilitySet::LargePointer(capset) => capset.encode(dst),
            CapabilitySet::MultiFragmentUpdate(capset) => capset.encode(dst),
            CapabilitySet::Other { payload, .. } => {
                dst.write_slice(payload);
                Ok(())
            }
        }
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.body_size()
    }
}

impl<'de> Decode<'de> for CapabilitySet {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let set_type = src.read_u16();
        let length = usize::from(src.read_u16());

        if length < CAPABILITY_SET_TYPE_FIELD_SIZE + CAPABILITY_SET_LENGTH_FIELD_SIZE {
            return Err(invalid_field_err!("lengthCapability", "invalid capability set length"));
        }

        let buffer_length = length - CAPABILITY_SET_TYPE_FIELD_SIZE - CAPABILITY_SET_LENGTH_FIELD_SIZE;
        ensure_size!(in: src, size: buffer_length);
        let buffer = src.read_slice(buffer_length);

        match CapabilitySetType::from_u16(set_type) {
            Some(CapabilitySetType::General) => Ok(CapabilitySet::General(decode(buffer)?)),
            Some(CapabilitySetType::Bitmap) => Ok(CapabilitySet::Bitmap(decode(buffer)?)),
            Some(CapabilitySetType::Order) => Ok(CapabilitySet::Order(decode(buffer)?)),
            Some(CapabilitySetType::BitmapCache) => Ok(CapabilitySet::BitmapCache(decode(buffer)?)),
            Some(CapabilitySetType::Pointer) => Ok(CapabilitySet::Pointer(decode(buffer)?)),
            Some(CapabilitySetType::Sound) => Ok(CapabilitySet::Sound(decode(buffer)?)),
            Some(CapabilitySetType::Input) => Ok(CapabilitySet::Input(decode(buffer)?)),
            Some(CapabilitySetType::Brush) => Ok(CapabilitySet::Brush(decode(buffer)?)),
            Some(CapabilitySetType::GlyphCache) => Ok(CapabilitySet::GlyphCache(decode(buffer)?)),
            Some(CapabilitySetType::OffscreenBitmapCache) => Ok(CapabilitySet::OffscreenBitmapCache(decode(buffer)?)),
            Some(CapabilitySetType::VirtualChannel) => Ok(CapabilitySet::VirtualChannel(decode(buffer)?)),
            Some(CapabilitySetType::Font) => Ok(CapabilitySet::Font(decode(buffer)?)),
            Some(CapabilitySetType::LargePointer) => Ok(CapabilitySet::LargePointer(decode(buffer)?)),
            Some(CapabilitySetType::MultiFragmentUpdate) => Ok(CapabilitySet::MultiFragmentUpdate(decode(buffer)?)),
            _ => Ok(CapabilitySet::Other {
                set_type,
                payload: buffer.to_vec(),
            }),
        }
    }
}

#[derive(Copy, Clone, Debug, FromPrimitive, ToPrimitive)]
#[repr(u16)]
enum CapabilitySetType {
    General = 0x01,
    Bitmap = 0x02,
    Order = 0x03,
    BitmapCache = 0x04,
    Control = 0x05,
    WindowActivation = 0x07,
    Pointer = 0x08,
    Share = 0x09,
    ColorCache = 0x0a,
    Sound = 0x0c,
    Input = 0x0d,
    Font = 0x0e,
    Brush = 0x0f,
    GlyphCache = 0x10,
    OffscreenBitmapCache = 0x11,
    BitmapCacheHostSupport = 0x12,
    BitmapCacheRev2 = 0x13,
    VirtualChannel = 0x14,
    DrawNineGridCache = 0x15,
    DrawGdiPlus = 0x16,
    Rail = 0x17,
    WindowList = 0x18,
    DesktopComposition = 0x19,
    MultiFragmentUpdate = 0x1a,
    LargePointer = 0x1b,
    SurfaceCommands = 0x1c,
    BitmapCodecs = 0x1d,
    FrameAcknowledge = 0x1e,
}

/// TS_GENERAL_CAPABILITYSET
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct General {
    pub major_platform_type: MajorPlatformType,
    pub minor_platform_type: MinorPlatformType,
    pub extra_flags: GeneralExtraFlags,
    pub refresh_rect_support: bool,
    pub suppress_output_support: bool,
}

impl Default for General {
    fn default() -> Self {
        Self {
            major_platform_type: MajorPlatformType::UNSPECIFIED,
            minor_platform_type: MinorPlatformType::UNSPECIFIED,
            extra_flags: GeneralExtraFlags::empty(),
            refresh_rect_support: false,
            suppress_output_support: false,
        }
    }
}

impl General {
    const NAME: &'static str = "General";

    const FIXED_PART_SIZE: usize = 20;
}

impl Encode for General {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u16(self.major_platform_type.0);
        dst.write_u16(self.minor_platform_type.0);
        dst.write_u16(PROTOCOL_VER);
        write_padding!(dst, 2);
        dst.write_u16(0); // compressionTypes
        dst.write_u16(self.extra_flags.bits());
        dst.write_u16(0); // updateCapabilityFlag
        dst.write_u16(0); // remoteUnshareFlag
        dst.write_u16(0); // compressionLevel
        dst.write_u8(u8::from(self.refresh_rect_support));
        dst.write_u8(u8::from(self.suppress_output_support));

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for General {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let major_platform_type = MajorPlatformType(src.read_u16());
        let minor_platform_type = MinorPlatformType(src.read_u16());

        let protocol_ver = src.read_u16();
        if protocol_ver != PROTOCOL_VER {
            return Err(invalid_field_err!("protocolVersion", "invalid protocol version"));
        }

        read_padding!(src, 2);
        let _compression_types = src.read_u16();
        let extra_flags = GeneralExtraFlags::from_bits_truncate(src.read_u16());
        let _update_capability_flag = src.read_u16();
        let _remote_unshare_flag = src.read_u16();
        let _compression_level = src.read_u16();
        let refresh_rect_support = src.read_u8() != 0;
        let suppress_output_support = src.read_u8() != 0;

        Ok(Self {
            major_platform_type,
            minor_platform_type,
            extra_flags,
            refresh_rect_support,
            suppress_output_support,
        })
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct MajorPlatformType(pub u16);

impl MajorPlatformType {
    pub const UNSPECIFIED: Self = Self(0);
    pub const WINDOWS: Self = Self(1);
    pub const OS2: Self = Self(2);
    pub const MACINTOSH: Self = Self(3);
    pub const UNIX: Self = Self(4);
    pub const IOS: Self = Self(5);
    pub const OSX: Self = Self(6);
    pub const ANDROID: Self = Self(7);
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct MinorPlatformType(pub u16);

impl MinorPlatformType {
    pub const UNSPECIFIED: Self = Self(0);
    pub const WINDOWS_NT: Self = Self(3);
    pub const NATIVE_XSERVER: Self = Self(7);
    pub const PSEUDO_XSERVER: Self = Self(8);
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct GeneralExtraFlags: u16 {
        const FASTPATH_OUTPUT_SUPPORTED = 0x0001;
        const LONG_CREDENTIALS_SUPPORTED = 0x0004;
        const AUTORECONNECT_SUPPORTED = 0x0008;
        const ENC_SALTED_CHECKSUM = 0x0010;
        const NO_BITMAP_COMPRESSION_HDR = 0x0400;
    }
}

/// TS_BITMAP_CAPABILITYSET
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Bitmap {
    pub pref_bits_per_pix: u16,
    pub desktop_width: u16,
    pub desktop_height: u16,
    pub desktop_resize_flag: bool,
    pub drawing_flags: BitmapDrawingFlags,
}

impl Bitmap {
    const NAME: &'static str = "Bitmap";

    const FIXED_PART_SIZE: usize = 24;
}

impl Encode for Bitmap {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u16(self.pref_bits_per_pix);
        dst.write_u16(1); // receive1BitPerPixel
        dst.write_u16(1); // receive4BitsPerPixel
        dst.write_u16(1); // receive8BitsPerPixel
        dst.write_u16(self.desktop_width);
        dst.write_u16(self.desktop_height);
        write_padding!(dst, 2);
        dst.write_u16(u16::from(self.desktop_resize_flag));
        dst.write_u16(1); // bitmapCompressionFlag
        dst.write_u8(0); // highColorFlags
        dst.write_u8(self.drawing_flags.bits());
        dst.write_u16(1); // multipleRectangleSupport
        write_padding!(dst, 2);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for Bitmap {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let pref_bits_per_pix = src.read_u16();
        let _receive_1_bit_per_pixel = src.read_u16();
        let _receive_4_bit_per_pixel = src.read_u16();
        let _receive_8_bit_per_pixel = src.read_u16();
        let desktop_width = src.read_u16();
        let desktop_height = src.read_u16();
        read_padding!(src, 2);
        let desktop_resize_flag = src.read_u16() != 0;

        let is_bitmap_compress_flag_set = src.read_u16() != 0;
        if !is_bitmap_compress_flag_set {
            return Err(invalid_field_err!("bitmapCompressionFlag", "must always be set"));
        }

        let _high_color_flags = src.read_u8();
        let drawing_flags = BitmapDrawingFlags::from_bits_truncate(src.read_u8());

        let _is_multiple_rect_supported = src.read_u16();
        read_padding!(src, 2);

        Ok(Self {
            pref_bits_per_pix,
            desktop_width,
            desktop_height,
            desktop_resize_flag,
            drawing_flags,
        })
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct BitmapDrawingFlags: u8 {
        const ALLOW_DYNAMIC_COLOR_FIDELITY = 0x02;
        const ALLOW_COLOR_SUBSAMPLING = 0x04;
        const ALLOW_SKIP_ALPHA = 0x08;
    }
}

/// TS_ORDER_CAPABILITYSET
///
/// The order support array is all zeroes: drawing orders are negotiated off,
/// the server falls back to bitmap updates.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Order {
    pub order_flags: OrderFlags,
    order_support: [u8; ORDER_SUPPORT_ARRAY_LEN],
}

const ORDER_SUPPORT_ARRAY_LEN: usize = 32;

impl Order {
    const NAME: &'static str = "Order";

    const FIXED_PART_SIZE: usize = 84;

    const ORD_LEVEL_1_ORDERS: u16 = 1;
    const DESKTOP_SAVE_Y_GRAN_VAL: u16 = 20;

    pub fn new(order_flags: OrderFlags) -> Self {
        Self {
            order_flags,
            order_support: [0; ORDER_SUPPORT_ARRAY_LEN],
        }
    }
}

impl Encode for Order {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u128(0); // terminalDescriptor
        dst.write_u32(0); // padding
        dst.write_u16(1); // desktopSaveXGranularity
        dst.write_u16(Self::DESKTOP_SAVE_Y_GRAN_VAL);
        dst.write_u16(0); // padding
        dst.write_u16(Self::ORD_LEVEL_1_ORDERS); // maximumOrderLevel
        dst.write_u16(0); // numberFonts
        dst.write_u16(self.order_flags.bits());
        dst.write_slice(&self.order_support);
        dst.write_u16(0); // textFlags
        dst.write_u16(0); // orderSupportExFlags
        dst.write_u32(0); // padding
        dst.write_u32(0); // desktopSaveSize
        dst.write_u16(0); // padding
        dst.write_u16(0); // padding
        dst.write_u16(0); // textANSICodePage
        dst.write_u16(0); // padding

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for Order {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        read_padding!(src, 16); // terminalDescriptor
        read_padding!(src, 4);
        let _desktop_save_x_granularity = src.read_u16();
        let _desktop_save_y_granularity = src.read_u16();
        read_padding!(src, 2);
        let _maximum_order_level = src.read_u16();
        let _number_fonts = src.read_u16();
        let order_flags = OrderFlags::from_bits_truncate(src.read_u16());
        let order_support = src.read_array::<ORDER_SUPPORT_ARRAY_LEN>();
        let _text_flags = src.read_u16();
        let _order_support_ex_flags = src.read_u16();
        read_padding!(src, 4);
        let _desktop_save_size = src.read_u32();
        read_padding!(src, 4);
        let _text_ansi_code_page = src.read_u16();
        read_padding!(src, 2);

        Ok(Self {
            order_flags,
            order_support,
        })
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct OrderFlags: u16 {
        const NEGOTIATE_ORDER_SUPPORT = 0x0002;
        const ZERO_BOUNDS_DELTAS_SUPPORT = 0x0008;
        const COLOR_INDEX_SUPPORT = 0x0020;
        const SOLID_PATTERN_BRUSH_ONLY = 0x0040;
        const ORDER_FLAGS_EXTRA_FLAGS = 0x0080;
    }
}

/// TS_BITMAPCACHE_CAPABILITYSET (revision 1, all caches empty)
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct BitmapCache {
    pub caches: [CacheEntry; BITMAP_CACHE_ENTRIES_NUM],
}

impl BitmapCache {
    const NAME: &'static str = "BitmapCache";

    const FIXED_PART_SIZE: usize = 24 /* pad */ + BITMAP_CACHE_ENTRIES_NUM * 4;
}

impl Encode for BitmapCache {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        write_padding!(dst, 24);

        for cache in self.caches.iter() {
            dst.write_u16(cache.entries);
            dst.write_u16(cache.max_cell_size);
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for BitmapCache {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        read_padding!(src, 24);

        let mut caches = [CacheEntry::default(); BITMAP_CACHE_ENTRIES_NUM];
        for cache in caches.iter_mut() {
            cache.entries = src.read_u16();
            cache.max_cell_size = src.read_u16();
        }

        Ok(Self { caches })
    }
}

#[derive(Debug, Default, Copy, PartialEq, Eq, Clone)]
pub struct CacheEntry {
    pub entries: u16,
    pub max_cell_size: u16,
}

/// TS_POINTER_CAPABILITYSET
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Pointer {
    pub color_pointer_cache_size: u16,
    pub pointer_cache_size: u16,
}

impl Pointer {
    const NAME: &'static str = "Pointer";

    const FIXED_PART_SIZE: usize = 6;
}

impl Encode for Pointer {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u16(1); // colorPointerFlag
        dst.write_u16(self.color_pointer_cache_size);
        dst.write_u16(self.pointer_cache_size);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for Pointer {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let _color_pointer_flag = src.read_u16() != 0;
        let color_pointer_cache_size = src.read_u16();
        let pointer_cache_size = src.read_u16();

        Ok(Pointer {
            color_pointer_cache_size,
            pointer_cache_size,
        })
    }
}

/// TS_SOUND_CAPABILITYSET
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Sound {
    pub flags: SoundFlags,
}

impl Sound {
    const NAME: &'static str = "Sound";

    const FIXED_PART_SIZE: usize = 4;
}

impl Encode for Sound {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u16(self.flags.bits());
        write_padding!(dst, 2);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for Sound {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let flags = SoundFlags::from_bits_truncate(src.read_u16());
        read_padding!(src, 2);

        Ok(Sound { flags })
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct SoundFlags: u16 {
        const BEEPS = 1;
    }
}

/// TS_INPUT_CAPABILITYSET
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Input {
    pub input_flags: InputFlags,
    pub keyboard_layout: u32,
    pub keyboard_type: Option<KeyboardType>,
    pub keyboard_subtype: u32,
    pub keyboard_function_key: u32,
    pub keyboard_ime_filename: String,
}

impl Input {
    const NAME: &'static str = "Input";

    const FIXED_PART_SIZE: usize = 84;

    const IME_FILE_NAME_SIZE: usize = 64;
}

impl Encode for Input {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u16(self.input_flags.bits());
        write_padding!(dst, 2);
        dst.write_u32(self.keyboard_layout);

        let keyboard_type = self
            .keyboard_type
            .as_ref()
            .and_then(|ty| ty.to_u32())
            .unwrap_or(0);
        dst.write_u32(keyboard_type);

        dst.write_u32(self.keyboard_subtype);
        dst.write_u32(self.keyboard_function_key);
        utf16::write_utf16_fixed(dst, &self.keyboard_ime_filename, Self::IME_FILE_NAME_SIZE)?;

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for Input {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let input_flags = InputFlags::from_bits_truncate(src.read_u16());
        read_padding!(src, 2);
        let keyboard_layout = src.read_u32();
        let keyboard_type = KeyboardType::from_u32(src.read_u32());
        let keyboard_subtype = src.read_u32();
        let keyboard_function_key = src.read_u32();
        let keyboard_ime_filename = utf16::read_utf16_exact(src, Self::IME_FILE_NAME_SIZE)?;

        Ok(Input {
            input_flags,
            keyboard_layout,
            keyboard_type,
            keyboard_subtype,
            keyboard_function_key,
            keyboard_ime_filename,
        })
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct InputFlags: u16 {
        const SCANCODES = 0x0001;
        const MOUSEX = 0x0004;
        const FASTPATH_INPUT = 0x0008;
        const UNICODE = 0x0010;
        const FASTPATH_INPUT_2 = 0x0020;
        const UNUSED_1 = 0x0040;
        const MOUSE_RELATIVE = 0x0080;
        const TS_MOUSE_HWHEEL = 0x0100;
        const TS_QOE_TIMESTAMPS = 0x0200;
    }
}

/// TS_BRUSH_CAPABILITYSET
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Brush {
    pub support_level: SupportLevel,
}

impl Brush {
    const NAME: &'static str = "Brush";

    const FIXED_PART_SIZE: usize = 4;
}

impl Encode for Brush {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u32(self.support_level.to_u32().expect("support level discriminant"));

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for Brush {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let support_level = SupportLevel::from_u32(src.read_u32())
            .ok_or_else(|| invalid_field_err!("brushSupportLevel", "invalid support level"))?;

        Ok(Brush { support_level })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum SupportLevel {
    Default = 0,
    Color8x8 = 1,
    ColorFull = 2,
}

/// TS_GLYPHCACHE_CAPABILITYSET
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct GlyphCache {
    pub glyph_cache: [CacheDefinition; GLYPH_CACHE_NUM],
    pub frag_cache: CacheDefinition,
    pub glyph_support_level: GlyphSupportLevel,
}

impl GlyphCache {
    const NAME: &'static str = "GlyphCache";

    const FIXED_PART_SIZE: usize = GLYPH_CACHE_NUM * 4 + 4 + 2 + 2;
}

impl Encode for GlyphCache {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        for cache in self.glyph_cache.iter() {
            dst.write_u16(cache.entries);
            dst.write_u16(cache.max_cell_size);
        }
        dst.write_u16(self.frag_cache.entries);
        dst.write_u16(self.frag_cache.max_cell_size);
        dst.write_u16(self.glyph_support_level.to_u16().expect("support level discriminant"));
        write_padding!(dst, 2);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for GlyphCache {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let mut glyph_cache = [CacheDefinition::default(); GLYPH_CACHE_NUM];
        for cache in glyph_cache.iter_mut() {
            cache.entries = src.read_u16();
            cache.max_cell_size = src.read_u16();
        }
        let frag_cache = CacheDefinition {
            entries: src.read_u16(),
            max_cell_size: src.read_u16(),
        };
        let glyph_support_level = GlyphSupportLevel::from_u16(src.read_u16())
            .ok_or_else(|| invalid_field_err!("glyphSupportLevel", "invalid support level"))?;
        read_padding!(src, 2);

        Ok(Self {
            glyph_cache,
            frag_cache,
            glyph_support_level,
        })
    }
}

#[derive(Debug, Default, Copy, PartialEq, Eq, Clone)]
pub struct CacheDefinition {
    pub entries: u16,
    pub max_cell_size: u16,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u16)]
pub enum GlyphSupportLevel {
    None = 0,
    Partial = 1,
    Full = 2,
    Encode = 3,
}

/// TS_OFFSCREEN_CAPABILITYSET
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct OffscreenBitmapCache {
    pub is_supported: bool,
    pub cache_size: u16,
    pub cache_entries: u16,
}

impl OffscreenBitmapCache {
    const NAME: &'static str = "OffscreenBitmapCache";

    const FIXED_PART_SIZE: usize = 4 + 2 + 2;
}

impl Encode for OffscreenBitmapCache {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u32(u32::from(self.is_supported));
        dst.write_u16(self.cache_size);
        dst.write_u16(self.cache_entries);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for OffscreenBitmapCache {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let is_supported = src.read_u32() != 0;
        let cache_size = src.read_u16();
        let cache_entries = src.read_u16();

        Ok(Self {
            is_supported,
            cache_size,
            cache_entries,
        })
    }
}

/// TS_VIRTUALCHANNEL_CAPABILITYSET
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct VirtualChannel {
    pub flags: VirtualChannelFlags,
    /// Ignored in client-to-server direction.
    pub chunk_size: Option<u32>,
}

impl VirtualChannel {
    const NAME: &'static str = "VirtualChannel";

    const FIXED_PART_SIZE: usize = 4;
}

impl Encode for VirtualChannel {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        dst.write_u32(self.flags.bits());

        if let Some(chunk_size) = self.chunk_size {
            dst.write_u32(chunk_size);
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.chunk_size.map_or(0, |_| 4)
    }
}

impl<'de> Decode<'de> for VirtualChannel {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let flags = VirtualChannelFlags::from_bits_truncate(src.read_u32());

        let chunk_size = if src.len() >= 4 { Some(src.read_u32()) } else { None };

        Ok(Self { flags, chunk_size })
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct VirtualChannelFlags: u32 {
        const NO_COMPRESSION = 0;
        const COMPRESSION_SERVER_TO_CLIENT = 1;
        const COMPRESSION_CLIENT_TO_SERVER_8K = 2;
    }
}

/// TS_FONT_CAPABILITYSET
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Font {
    pub font_support_flags: u16,
}

impl Font {
    pub const FONTSUPPORT_FONTLIST: u16 = 0x0001;

    const NAME: &'static str = "Font";

    const FIXED_PART_SIZE: usize = 4;
}

impl Default for Font {
    fn default() -> Self {
        Self {
            font_support_flags: Self::FONTSUPPORT_FONTLIST,
        }
    }
}

impl Encode for Font {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u16(self.font_support_flags);
        write_padding!(dst, 2);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for Font {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        // Both fields are optional on the wire.
        let font_support_flags = if src.len() >= 2 { src.read_u16() } else { 0 };
        if src.len() >= 2 {
            read_padding!(src, 2);
        }

        Ok(Self { font_support_flags })
    }
}

/// TS_LARGE_POINTER_CAPABILITYSET
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct LargePointer {
    pub flags: LargePointerSupportFlags,
}

impl LargePointer {
    const NAME: &'static str = "LargePointer";

    const FIXED_PART_SIZE: usize = 2;
}

impl Encode for LargePointer {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u16(self.flags.bits());

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for LargePointer {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let flags = LargePointerSupportFlags::from_bits_truncate(src.read_u16());

        Ok(Self { flags })
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct LargePointerSupportFlags: u16 {
        const UP_TO_96X96_PIXELS = 1;
        const UP_TO_384X384_PIXELS = 2;
    }
}

/// TS_MULTIFRAGMENTUPDATE_CAPABILITYSET
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct MultifragmentUpdate {
    pub max_request_size: u32,
}

impl MultifragmentUpdate {
    const NAME: &'static str = "MultifragmentUpdate";

    const FIXED_PART_SIZE: usize = 4;
}

impl Encode for MultifragmentUpdate {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u32(self.max_request_size);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for MultifragmentUpdate {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let max_request_size = src.read_u32();

        Ok(Self { max_request_size })
    }
}

#[cfg(test)]
mod tests {
    use cobaltrdp_core::encode_vec;

    use super::*;

    #[test]
    fn capability_set_header_covers_body() {
        let set = CapabilitySet::Pointer(Pointer {
            color_pointer_cache_size: 20,
            pointer_cache_size: 20,
        });

        let encoded = encode_vec(&set).unwrap();
        assert_eq!(encoded.len(), 10);
        assert_eq!(&encoded[..4], [0x08, 0x00, 0x0a, 0x00]);
    }

    #[test]
    fn unknown_set_survives_round_trip() {
        let set = CapabilitySet::Other {
            set_type: 0x1d,
            payload: vec![1, 2, 3, 4],
        };

        let encoded = encode_vec(&set).unwrap();
        let decoded = cobaltrdp_core::decode::<CapabilitySet>(&encoded).unwrap();
        assert_eq!(decoded, set);
    }

    #[test]
    fn demand_active_round_trip() {
        let pdu = DemandActive {
            source_descriptor: "RDP".to_owned(),
            capability_sets: vec![
                CapabilitySet::General(General::default()),
                CapabilitySet::Sound(Sound { flags: SoundFlags::empty() }),
            ],
        };

        let encoded = encode_vec(&pdu).unwrap();
        assert_eq!(encoded.len(), pdu.size());

        let decoded = cobaltrdp_core::decode::<DemandActive>(&encoded).unwrap();
        assert_eq!(decoded, pdu);
    }
}
