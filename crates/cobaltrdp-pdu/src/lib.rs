#![cfg_attr(doc, doc = include_str!("../README.md"))]

pub mod ber;
pub mod bitmap;
pub mod fast_path;
pub mod gcc;
pub mod geometry;
pub mod input;
pub mod mcs;
pub mod nego;
pub mod palette;
pub mod per;
pub mod pointer;
pub mod rdp;
pub mod tpdu;
pub mod tpkt;
pub mod utf16;
pub mod x224;

use cobaltrdp_core::{DecodeError, DecodeResult, ReadCursor, UnexpectedMessageTypeErr as _};

/// Protocol family of an incoming frame, judged from its first byte.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum Action {
    FastPath = 0x00,
    X224 = 0x03,
}

impl Action {
    pub fn from_fp_output_header(fp_output_header: u8) -> Result<Self, u8> {
        match fp_output_header & 0b11 {
            0x00 => Ok(Self::FastPath),
            0x03 => Ok(Self::X224),
            unknown_action_bits => Err(unknown_action_bits),
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PduInfo {
    pub action: Action,
    pub length: usize,
}

/// Finds the next RDP PDU size by reading the next few bytes.
pub fn find_size(bytes: &[u8]) -> DecodeResult<Option<PduInfo>> {
    macro_rules! ensure_enough {
        ($bytes:expr, $len:expr) => {
            if $bytes.len() < $len {
                return Ok(None);
            }
        };
    }

    ensure_enough!(bytes, 1);
    let fp_output_header = bytes[0];

    let action = Action::from_fp_output_header(fp_output_header)
        .map_err(|unknown_action| DecodeError::unexpected_message_type("fpOutputHeader", unknown_action))?;

    match action {
        Action::X224 => {
            ensure_enough!(bytes, tpkt::TpktHeader::SIZE);
            let tpkt = tpkt::TpktHeader::read(&mut ReadCursor::new(bytes))?;

            Ok(Some(PduInfo {
                action,
                length: tpkt.packet_length(),
            }))
        }
        Action::FastPath => {
            ensure_enough!(bytes, 2);
            let a = bytes[1];

            let fast_path_length = if a & 0x80 != 0 {
                ensure_enough!(bytes, 3);
                let b = bytes[2];

                ((u16::from(a) & !0x80) << 8) + u16::from(b)
            } else {
                u16::from(a)
            };

            Ok(Some(PduInfo {
                action,
                length: usize::from(fast_path_length),
            }))
        }
    }
}

/// Hint for reading a full frame of a given kind from a byte stream.
///
/// `find_size` returns `(matched, length)`: the length of the next frame and
/// whether it is of the hinted kind. A non-matching frame is meant to be
/// discarded by the transport.
pub trait PduHint: Send + Sync + core::fmt::Debug + 'static {
    fn find_size(&self, bytes: &[u8]) -> DecodeResult<Option<(bool, usize)>>;
}

// Matches both X224 and FastPath frames.
#[derive(Clone, Copy, Debug)]
pub struct RdpHint;

pub const RDP_HINT: RdpHint = RdpHint;

impl PduHint for RdpHint {
    fn find_size(&self, bytes: &[u8]) -> DecodeResult<Option<(bool, usize)>> {
        find_size(bytes).map(|opt| opt.map(|info| (true, info.length)))
    }
}

#[derive(Clone, Copy, Debug)]
pub struct X224Hint;

pub const X224_HINT: X224Hint = X224Hint;

impl PduHint for X224Hint {
    fn find_size(&self, bytes: &[u8]) -> DecodeResult<Option<(bool, usize)>> {
        match find_size(bytes)? {
            Some(pdu_info) => {
                let matched = pdu_info.action == Action::X224;
                Ok(Some((matched, pdu_info.length)))
            }
            None => Ok(None),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct FastPathHint;

pub const FAST_PATH_HINT: FastPathHint = FastPathHint;

impl PduHint for FastPathHint {
    fn find_size(&self, bytes: &[u8]) -> DecodeResult<Option<(bool, usize)>> {
        match find_size(bytes)? {
            Some(pdu_info) => {
                let matched = pdu_info.action == Action::FastPath;
                Ok(Some((matched, pdu_info.length)))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_size_classifies_x224() {
        let frame = [0x03, 0x00, 0x00, 0x0b, 0x06, 0xd0, 0x00, 0x00, 0x12, 0x34, 0x00];
        let info = find_size(&frame).unwrap().unwrap();
        assert_eq!(info.action, Action::X224);
        assert_eq!(info.length, 11);
    }

    #[test]
    fn find_size_classifies_fast_path_short_length() {
        let frame = [0x00, 0x08, 0, 0, 0, 0, 0, 0];
        let info = find_size(&frame).unwrap().unwrap();
        assert_eq!(info.action, Action::FastPath);
        assert_eq!(info.length, 8);
    }

    #[test]
    fn find_size_classifies_fast_path_long_length() {
        let frame = [0x00, 0x81, 0x2a];
        let info = find_size(&frame).unwrap().unwrap();
        assert_eq!(info.action, Action::FastPath);
        assert_eq!(info.length, 0x12a);
    }

    #[test]
    fn find_size_needs_more_bytes() {
        assert!(find_size(&[0x03, 0x00]).unwrap().is_none());
    }
}
