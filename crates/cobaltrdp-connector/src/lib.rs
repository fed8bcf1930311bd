#![cfg_attr(doc, doc = include_str!("../README.md"))]

#[macro_use]
extern crate tracing;

#[macro_use]
mod macros;

mod channel_connection;
mod connection;
mod finalization;
mod license;
mod server_name;

pub mod credssp;
pub mod io_channel;

use core::any::Any;
use core::fmt;

use cobaltrdp_core::{encode_buf, encode_vec, Encode, WriteBuf};
use cobaltrdp_pdu::gcc::KeyboardType;
use cobaltrdp_pdu::rdp::capability_sets::MajorPlatformType;
use cobaltrdp_pdu::{mcs, x224::X224, x224::X224Data, PduHint};
pub use sspi;

pub use self::channel_connection::{ChannelConnectionSequence, ChannelConnectionState};
pub use self::connection::{ClientConnector, ClientConnectorState, ConnectionResult, NegotiatedCapabilities};
pub use self::finalization::{ConnectionFinalizationSequence, ConnectionFinalizationState};
pub use self::license::{LicenseExchangeSequence, LicenseExchangeState};
pub use self::server_name::ServerName;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DesktopSize {
    pub width: u16,
    pub height: u16,
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub domain: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // NOTE: do not show the secret
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}

/// Everything the connection sequence needs to know up front.
///
/// The caller provides host and port out of band; this configuration only
/// describes the session to negotiate.
#[derive(Debug, Clone)]
pub struct Config {
    pub credentials: Credentials,
    /// The initial desktop size to request.
    pub desktop_size: DesktopSize,
    /// Requested session color depth; one of 16, 24 or 32.
    pub color_depth: u32,
    /// Keep the desktop wallpaper. Off by default for automation sessions,
    /// which maps to PERF_DISABLE_WALLPAPER.
    pub enable_wallpaper: bool,
    /// Ask for fast-path input encoding when the server supports it.
    pub enable_fast_path_input: bool,
    /// If true, the INFO_AUTOLOGON flag is set in the Client Info PDU.
    pub autologon: bool,
    /// The build number of the client.
    pub client_build: u32,
    /// Name of the client computer, truncated to 15 characters.
    pub client_name: String,
    pub client_dir: String,
    pub keyboard_type: KeyboardType,
    pub keyboard_subtype: u32,
    pub keyboard_functional_keys_count: u32,
    pub keyboard_layout: u32,
    pub ime_file_name: String,
    pub dig_product_id: String,
    pub platform: MajorPlatformType,
}

cobaltrdp_core::assert_impl!(Config: Send, Sync);

/// A state of one of the connection sequences.
pub trait State: Send + fmt::Debug + 'static {
    fn name(&self) -> &'static str;
    fn is_terminal(&self) -> bool;
    fn as_any(&self) -> &dyn Any;
}

cobaltrdp_core::assert_obj_safe!(State);

impl State for () {
    fn name(&self) -> &'static str {
        "()"
    }

    fn is_terminal(&self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Written {
    Nothing,
    Size(core::num::NonZeroUsize),
}

impl Written {
    #[inline]
    pub fn from_size(value: usize) -> ConnectorResult<Self> {
        core::num::NonZeroUsize::new(value)
            .map(Self::Size)
            .ok_or_else(|| ConnectorError::general("invalid written length (can’t be zero)"))
    }

    #[inline]
    pub fn is_nothing(self) -> bool {
        matches!(self, Self::Nothing)
    }

    #[inline]
    pub fn size(self) -> Option<usize> {
        if let Self::Size(size) = self {
            Some(size.get())
        } else {
            None
        }
    }
}

/// An I/O-free, resumable sub-protocol.
///
/// The transport reads a frame according to `next_pdu_hint`, feeds it to
/// `step`, and writes out whatever `step` produced.
pub trait Sequence: Send {
    fn next_pdu_hint(&self) -> Option<&dyn PduHint>;

    fn state(&self) -> &dyn State;

    fn step(&mut self, input: &[u8], output: &mut WriteBuf) -> ConnectorResult<Written>;

    fn step_no_input(&mut self, output: &mut WriteBuf) -> ConnectorResult<Written> {
        self.step(&[], output)
    }
}

cobaltrdp_core::assert_obj_safe!(Sequence);

pub type ConnectorResult<T> = Result<T, ConnectorError>;

#[non_exhaustive]
#[derive(Debug)]
pub enum ConnectorErrorKind {
    Encode(cobaltrdp_core::EncodeError),
    Decode(cobaltrdp_core::DecodeError),
    Credssp(sspi::Error),
    Negotiation(cobaltrdp_pdu::nego::FailureCode),
    License(cobaltrdp_pdu::rdp::license::LicenseErrorCode),
    AccessDenied,
    Reason(String),
    General,
    Custom,
}

impl fmt::Display for ConnectorErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            ConnectorErrorKind::Encode(_) => write!(f, "encode error"),
            ConnectorErrorKind::Decode(_) => write!(f, "decode error"),
            ConnectorErrorKind::Credssp(_) => write!(f, "CredSSP"),
            ConnectorErrorKind::Negotiation(code) => write!(f, "negotiation failure: {}", code.description()),
            ConnectorErrorKind::License(code) => write!(f, "license error: {}", code.description()),
            ConnectorErrorKind::AccessDenied => write!(f, "access denied"),
            ConnectorErrorKind::Reason(description) => write!(f, "reason: {description}"),
            ConnectorErrorKind::General => write!(f, "general error"),
            ConnectorErrorKind::Custom => write!(f, "custom error"),
        }
    }
}

impl std::error::Error for ConnectorErrorKind {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self {
            ConnectorErrorKind::Encode(e) => Some(e),
            ConnectorErrorKind::Decode(e) => Some(e),
            ConnectorErrorKind::Credssp(e) => Some(e),
            _ => None,
        }
    }
}

pub type ConnectorError = cobaltrdp_core::Error<ConnectorErrorKind>;

pub trait ConnectorErrorExt {
    fn encode(error: cobaltrdp_core::EncodeError) -> Self;
    fn decode(error: cobaltrdp_core::DecodeError) -> Self;
    fn general(context: &'static str) -> Self;
    fn reason(context: &'static str, reason: impl Into<String>) -> Self;
    fn custom<E>(context: &'static str, e: E) -> Self
    where
        E: std::error::Error + Sync + Send + 'static;
}

impl ConnectorErrorExt for ConnectorError {
    fn encode(error: cobaltrdp_core::EncodeError) -> Self {
        Self::new("encode error", ConnectorErrorKind::Encode(error))
    }

    fn decode(error: cobaltrdp_core::DecodeError) -> Self {
        Self::new("decode error", ConnectorErrorKind::Decode(error))
    }

    fn general(context: &'static str) -> Self {
        Self::new(context, ConnectorErrorKind::General)
    }

    fn reason(context: &'static str, reason: impl Into<String>) -> Self {
        Self::new(context, ConnectorErrorKind::Reason(reason.into()))
    }

    fn custom<E>(context: &'static str, e: E) -> Self
    where
        E: std::error::Error + Sync + Send + 'static,
    {
        Self::new(context, ConnectorErrorKind::Custom).with_source(e)
    }
}

pub trait ConnectorResultExt {
    #[must_use]
    fn with_context(self, context: &'static str) -> Self;
}

impl<T> ConnectorResultExt for ConnectorResult<T> {
    fn with_context(self, context: &'static str) -> Self {
        self.map_err(|mut e| {
            e.context = context;
            e
        })
    }
}

/// Encodes a message wrapped in TPKT + X.224 Data framing.
pub fn encode_x224_packet<T>(x224_msg: &T, buf: &mut WriteBuf) -> ConnectorResult<usize>
where
    T: Encode,
{
    let x224_msg_buf = encode_vec(x224_msg).map_err(ConnectorError::encode)?;

    let pdu = X224Data { data: x224_msg_buf };

    let written = encode_buf(&X224(pdu), buf).map_err(ConnectorError::encode)?;

    Ok(written)
}

/// Encodes a message wrapped in an MCS Send Data Request on the given channel.
pub fn encode_send_data_request<T: Encode>(
    initiator_id: u16,
    channel_id: u16,
    user_msg: &T,
    buf: &mut WriteBuf,
) -> ConnectorResult<usize> {
    let user_data = encode_vec(user_msg).map_err(ConnectorError::encode)?;

    let pdu = mcs::SendDataRequest {
        initiator_id,
        channel_id,
        user_data,
    };

    let written = encode_buf(&X224(pdu), buf).map_err(ConnectorError::encode)?;

    Ok(written)
}
