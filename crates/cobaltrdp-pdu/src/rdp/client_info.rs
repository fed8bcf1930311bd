use core::fmt;

use bitflags::bitflags;
use cobaltrdp_core::{
    ensure_fixed_part_size, ensure_size, invalid_field_err, write_padding, Decode, DecodeResult, Encode, EncodeResult,
    ReadCursor, WriteCursor,
};
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive as _, ToPrimitive as _};

use crate::utf16;

const COMPRESSION_TYPE_MASK: u32 = 0x0000_1E00;
const TIMEZONE_INFO_NAME_LEN: usize = 64;
const SYSTEM_TIME_SIZE: usize = 16;

/// TS_INFO_PACKET
///
/// Strings are always written as UTF-16 (the INFO_UNICODE flag is
/// mandatory for this client).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub credentials: Credentials,
    pub code_page: u32,
    pub flags: ClientInfoFlags,
    pub compression_type: CompressionType,
    pub alternate_shell: String,
    pub work_dir: String,
    pub extra_info: ExtendedClientInfo,
}

impl ClientInfo {
    const NAME: &'static str = "ClientInfo";

    const FIXED_PART_SIZE: usize = 4 /* codePage */
        + 4 /* flags */
        + 2 * 5 /* cbDomain..cbWorkingDir */;
}

impl Encode for ClientInfo {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        if !self.flags.contains(ClientInfoFlags::UNICODE) {
            return Err(invalid_field_err!("flags", "ANSI client info is not supported"));
        }

        dst.write_u32(self.code_page);

        let flags_with_compression_type =
            self.flags.bits() | (self.compression_type.to_u32().expect("compression type discriminant") << 9);
        dst.write_u32(flags_with_compression_type);

        let domain = self.credentials.domain.as_deref().unwrap_or("");

        // Sizes exclude the length of the mandatory null terminator.
        dst.write_u16(utf16::utf16_len(domain) as u16);
        dst.write_u16(utf16::utf16_len(&self.credentials.username) as u16);
        dst.write_u16(utf16::utf16_len(&self.credentials.password) as u16);
        dst.write_u16(utf16::utf16_len(&self.alternate_shell) as u16);
        dst.write_u16(utf16::utf16_len(&self.work_dir) as u16);

        utf16::write_utf16_with_terminator(dst, domain)?;
        utf16::write_utf16_with_terminator(dst, &self.credentials.username)?;
        utf16::write_utf16_with_terminator(dst, &self.credentials.password)?;
        utf16::write_utf16_with_terminator(dst, &self.alternate_shell)?;
        utf16::write_utf16_with_terminator(dst, &self.work_dir)?;

        self.extra_info.encode(dst)
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        let domain = self.credentials.domain.as_deref().unwrap_or("");

        Self::FIXED_PART_SIZE
            + utf16::utf16_len(domain)
            + utf16::utf16_len(&self.credentials.username)
            + utf16::utf16_len(&self.credentials.password)
            + utf16::utf16_len(&self.alternate_shell)
            + utf16::utf16_len(&self.work_dir)
            + 2 * 5 // null terminators
            + self.extra_info.size()
    }
}

impl<'de> Decode<'de> for ClientInfo {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let code_page = src.read_u32();
        let flags_with_compression_type = src.read_u32();

        let flags = ClientInfoFlags::from_bits(flags_with_compression_type & !COMPRESSION_TYPE_MASK)
            .ok_or_else(|| invalid_field_err!("flags", "invalid client info flags"))?;
        let compression_type =
            CompressionType::from_u32((flags_with_compression_type & COMPRESSION_TYPE_MASK) >> 9)
                .ok_or_else(|| invalid_field_err!("flags", "invalid compression type"))?;

        if !flags.contains(ClientInfoFlags::UNICODE) {
            return Err(invalid_field_err!("flags", "ANSI client info is not supported"));
        }

        // Sizes exclude the length of the mandatory null terminator.
        let domain_size = usize::from(src.read_u16());
        let user_name_size = usize::from(src.read_u16());
        let password_size = usize::from(src.read_u16());
        let alternate_shell_size = usize::from(src.read_u16());
        let work_dir_size = usize::from(src.read_u16());

        let domain = utf16::read_utf16_exact(src, domain_size + 2)?;
        let username = utf16::read_utf16_exact(src, user_name_size + 2)?;
        let password = utf16::read_utf16_exact(src, password_size + 2)?;

        let domain = if domain.is_empty() { None } else { Some(domain) };
        let credentials = Credentials {
            username,
            password,
            domain,
        };

        let alternate_shell = utf16::read_utf16_exact(src, alternate_shell_size + 2)?;
        let work_dir = utf16::read_utf16_exact(src, work_dir_size + 2)?;

        let extra_info = ExtendedClientInfo::decode(src)?;

        Ok(Self {
            credentials,
            code_page,
            flags,
            compression_type,
            alternate_shell,
            work_dir,
            extra_info,
        })
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub domain: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Do not show the password.
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}

/// TS_EXTENDED_INFO_PACKET
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedClientInfo {
    pub address_family: AddressFamily,
    pub address: String,
    pub dir: String,
    pub timezone: TimezoneInfo,
    pub session_id: u32,
    pub performance_flags: PerformanceFlags,
}

impl ExtendedClientInfo {
    const NAME: &'static str = "ExtendedClientInfo";

    const FIXED_PART_SIZE: usize = 2 /* clientAddressFamily */ + 2 /* cbClientAddress */;
}

impl Encode for ExtendedClientInfo {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        dst.write_u16(self.address_family.to_u16().expect("address family discriminant"));

        // These sizes include the null terminator.
        dst.write_u16((utf16::utf16_len(&self.address) + 2) as u16);
        utf16::write_utf16_with_terminator(dst, &self.address)?;

        dst.write_u16((utf16::utf16_len(&self.dir) + 2) as u16);
        utf16::write_utf16_with_terminator(dst, &self.dir)?;

        self.timezone.encode(dst)?;
        dst.write_u32(self.session_id);
        dst.write_u32(self.performance_flags.bits());

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
            + utf16::utf16_len(&self.address) + 2
            + 2 /* cbClientDir */
            + utf16::utf16_len(&self.dir) + 2
            + self.timezone.size()
            + 4 /* sessionId */
            + 4 /* performanceFlags */
    }
}

impl<'de> Decode<'de> for ExtendedClientInfo {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let address_family = AddressFamily::from_u16(src.read_u16())
            .ok_or_else(|| invalid_field_err!("clientAddressFamily", "invalid address family"))?;

        let address_size = usize::from(src.read_u16());
        let address = utf16::read_utf16_exact(src, address_size)?;

        ensure_size!(in: src, size: 2);
        let dir_size = usize::from(src.read_u16());
        let dir = utf16::read_utf16_exact(src, dir_size)?;

        let timezone = TimezoneInfo::decode(src)?;

        ensure_size!(in: src, size: 8);
        let session_id = src.read_u32();
        let performance_flags = PerformanceFlags::from_bits(src.read_u32())
            .ok_or_else(|| invalid_field_err!("performanceFlags", "invalid performance flags"))?;

        Ok(Self {
            address_family,
            address,
            dir,
            timezone,
            session_id,
            performance_flags,
        })
    }
}

/// TS_TIME_ZONE_INFORMATION
///
/// The standard/daylight transition dates are not modeled; they are written
/// zeroed, which servers treat as "no transition".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimezoneInfo {
    pub bias: u32,
    pub standard_name: String,
    pub standard_bias: u32,
    pub daylight_name: String,
    pub daylight_bias: u32,
}

impl TimezoneInfo {
    const NAME: &'static str = "TimezoneInfo";

    const FIXED_PART_SIZE: usize =
        4 + TIMEZONE_INFO_NAME_LEN + SYSTEM_TIME_SIZE + 4 + TIMEZONE_INFO_NAME_LEN + SYSTEM_TIME_SIZE + 4;
}

impl Default for TimezoneInfo {
    fn default() -> Self {
        Self {
            bias: 0,
            standard_name: String::new(),
            standard_bias: 0,
            daylight_name: String::new(),
            daylight_bias: 0,
        }
    }
}

impl Encode for TimezoneInfo {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u32(self.bias);

        let mut standard_name = utf16::to_utf16_bytes(&self.standard_name);
        standard_name.resize(TIMEZONE_INFO_NAME_LEN, 0);
        dst.write_slice(&standard_name);

        write_padding!(dst, SYSTEM_TIME_SIZE); // standardDate
        dst.write_u32(self.standard_bias);

        let mut daylight_name = utf16::to_utf16_bytes(&self.daylight_name);
        daylight_name.resize(TIMEZONE_INFO_NAME_LEN, 0);
        dst.write_slice(&daylight_name);

        write_padding!(dst, SYSTEM_TIME_SIZE); // daylightDate
        dst.write_u32(self.daylight_bias);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for TimezoneInfo {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let bias = src.read_u32();
        let standard_name = utf16::read_utf16_exact(src, TIMEZONE_INFO_NAME_LEN)?;
        src.advance(SYSTEM_TIME_SIZE); // standardDate
        let standard_bias = src.read_u32();
        let daylight_name = utf16::read_utf16_exact(src, TIMEZONE_INFO_NAME_LEN)?;
        src.advance(SYSTEM_TIME_SIZE); // daylightDate
        let daylight_bias = src.read_u32();

        Ok(Self {
            bias,
            standard_name,
            standard_bias,
            daylight_name,
            daylight_bias,
        })
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct PerformanceFlags: u32 {
        const DISABLE_WALLPAPER = 0x0000_0001;
        const DISABLE_FULLWINDOWDRAG = 0x0000_0002;
        const DISABLE_MENUANIMATIONS = 0x0000_0004;
        const DISABLE_THEMING = 0x0000_0008;
        const RESERVED1 = 0x0000_0010;
        const DISABLE_CURSOR_SHADOW = 0x0000_0020;
        const DISABLE_CURSORSETTINGS = 0x0000_0040;
        const ENABLE_FONT_SMOOTHING = 0x0000_0080;
        const ENABLE_DESKTOP_COMPOSITION = 0x0000_0100;
        const RESERVED2 = 0x8000_0000;
    }
}

#[repr(u16)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum AddressFamily {
    INet = 0x0002,
    INet6 = 0x0017,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct ClientInfoFlags: u32 {
        const MOUSE = 0x0000_0001;
        const DISABLE_CTRL_ALT_DEL = 0x0000_0002;
        const AUTOLOGON = 0x0000_0008;
        const UNICODE = 0x0000_0010;
        const MAXIMIZE_SHELL = 0x0000_0020;
        const LOGON_NOTIFY = 0x0000_0040;
        const COMPRESSION = 0x0000_0080;
        const ENABLE_WINDOWS_KEY = 0x0000_0100;
        const REMOTE_CONSOLE_AUDIO = 0x0000_2000;
        const FORCE_ENCRYPTED_CS_PDU = 0x0000_4000;
        const RAIL = 0x0000_8000;
        const LOGON_ERRORS = 0x0001_0000;
        const MOUSE_HAS_WHEEL = 0x0002_0000;
        const PASSWORD_IS_SC_PIN = 0x0004_0000;
        const NO_AUDIO_PLAYBACK = 0x0008_0000;
        const USING_SAVED_CREDS = 0x0010_0000;
        const AUDIO_CAPTURE = 0x0020_0000;
        const VIDEO_DISABLE = 0x0040_0000;
        const HIDEF_RAIL_SUPPORTED = 0x0200_0000;
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum CompressionType {
    K8 = 0,
    K64 = 1,
    Rdp6 = 2,
    Rdp61 = 3,
}

#[cfg(test)]
mod tests {
    use cobaltrdp_core::{decode, encode_vec};

    use super::*;

    fn sample_client_info() -> ClientInfo {
        ClientInfo {
            credentials: Credentials {
                username: "user".to_owned(),
                password: "pass".to_owned(),
                domain: Some("CORP".to_owned()),
            },
            code_page: 0,
            flags: ClientInfoFlags::MOUSE | ClientInfoFlags::UNICODE | ClientInfoFlags::AUTOLOGON,
            compression_type: CompressionType::K8,
            alternate_shell: String::new(),
            work_dir: String::new(),
            extra_info: ExtendedClientInfo {
                address_family: AddressFamily::INet,
                address: "192.168.0.100".to_owned(),
                dir: "C:\\Windows".to_owned(),
                timezone: TimezoneInfo::default(),
                session_id: 0,
                performance_flags: PerformanceFlags::DISABLE_WALLPAPER,
            },
        }
    }

    #[test]
    fn round_trip() {
        let info = sample_client_info();

        let encoded = encode_vec(&info).unwrap();
        assert_eq!(encoded.len(), info.size());

        let decoded = decode::<ClientInfo>(&encoded).unwrap();
        assert_eq!(decoded, info);
    }

    #[test]
    fn debug_never_prints_password() {
        let info = sample_client_info();
        let debug = format!("{:?}", info.credentials);
        assert!(!debug.contains("pass"));
    }
}
