use cobaltrdp_connector::io_channel::encode_share_data;
use cobaltrdp_connector::ConnectionResult;
use cobaltrdp_core::{encode_buf, WriteBuf};
use cobaltrdp_pdu::input::fast_path::{
    FastPathInput, FastPathInputEvent, KeyboardFlags as FastPathKeyboardFlags,
};
use cobaltrdp_pdu::input::{
    InputEvent as InputEventPduVariant, InputEventPdu, KeyboardFlags, MousePdu, PointerFlags, ScanCodePdu, UnicodePdu,
};
use cobaltrdp_pdu::rdp::headers::ShareDataPdu;

use crate::{session_custom_err, session_reason_err, SessionError, SessionErrorExt as _, SessionResult};

/// Mouse buttons carried by [`InputEvent::MouseButton`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    fn flags(self) -> PointerFlags {
        match self {
            MouseButton::Left => PointerFlags::LEFT_BUTTON,
            MouseButton::Right => PointerFlags::RIGHT_BUTTON,
            MouseButton::Middle => PointerFlags::MIDDLE_BUTTON_OR_WHEEL,
        }
    }
}

/// The input operations exposed to callers, in emission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    MouseMove { x: u16, y: u16 },
    MouseButton { x: u16, y: u16, button: MouseButton, pressed: bool },
    /// `delta` is a multiple of 120; the wire carries a signed 9-bit value.
    MouseWheel { x: u16, y: u16, delta: i16 },
    KeyScancode { code: u8, pressed: bool, extended: bool },
    KeyUnicode { codepoint: u16, pressed: bool },
}

/// Turns input events into wire frames.
///
/// Mouse events take the fast-path encoding when it was both negotiated and
/// enabled; otherwise every event is wrapped in a slow-path TS_INPUT_PDU.
/// The fallback is transparent to callers.
pub struct InputEncoder {
    io_channel_id: u16,
    user_channel_id: u16,
    share_id: u32,
    fast_path: bool,
}

impl InputEncoder {
    pub fn new(connection: &ConnectionResult) -> Self {
        Self {
            io_channel_id: connection.io_channel_id,
            user_channel_id: connection.user_channel_id,
            share_id: connection.share_id,
            fast_path: connection.capabilities.fast_path_input,
        }
    }

    pub fn uses_fast_path(&self) -> bool {
        self.fast_path
    }

    /// Encodes one event into a complete outgoing frame.
    pub fn encode(&self, event: &InputEvent, output: &mut WriteBuf) -> SessionResult<usize> {
        if self.fast_path {
            let fast_path_event = to_fast_path_event(event)?;
            let pdu = FastPathInput(vec![fast_path_event]);

            encode_buf(&pdu, output).map_err(SessionError::encode)
        } else {
            let slow_path_event = to_slow_path_event(event);
            let pdu = ShareDataPdu::Input(InputEventPdu(vec![slow_path_event]));

            encode_share_data(self.user_channel_id, self.io_channel_id, self.share_id, pdu, output)
                .map_err(|e| session_custom_err!("input encoding", e))
        }
    }
}

fn wheel_delta_flags(delta: i16) -> SessionResult<(PointerFlags, i16)> {
    // The rotation magnitude is a 9-bit field; reject values that cannot be
    // represented instead of silently truncating.
    if delta.unsigned_abs() > 0xFF {
        return Err(session_reason_err!("mouse wheel", "wheel delta {delta} out of range"));
    }

    Ok((PointerFlags::VERTICAL_WHEEL, delta))
}

fn to_fast_path_event(event: &InputEvent) -> SessionResult<FastPathInputEvent> {
    let event = match event {
        InputEvent::MouseMove { x, y } => FastPathInputEvent::MouseEvent(MousePdu {
            flags: PointerFlags::MOVE,
            number_of_wheel_rotation_units: 0,
            x_position: *x,
            y_position: *y,
        }),
        InputEvent::MouseButton { x, y, button, pressed } => {
            let mut flags = button.flags();
            if *pressed {
                flags |= PointerFlags::DOWN;
            }

            FastPathInputEvent::MouseEvent(MousePdu {
                flags,
                number_of_wheel_rotation_units: 0,
                x_position: *x,
                y_position: *y,
            })
        }
        InputEvent::MouseWheel { x, y, delta } => {
            let (flags, units) = wheel_delta_flags(*delta)?;

            FastPathInputEvent::MouseEvent(MousePdu {
                flags,
                number_of_wheel_rotation_units: units,
                x_position: *x,
                y_position: *y,
            })
        }
        InputEvent::KeyScancode { code, pressed, extended } => {
            let mut flags = FastPathKeyboardFlags::empty();
            if !*pressed {
                flags |= FastPathKeyboardFlags::RELEASE;
            }
            if *extended {
                flags |= FastPathKeyboardFlags::EXTENDED;
            }

            FastPathInputEvent::KeyboardEvent(flags, *code)
        }
        InputEvent::KeyUnicode { codepoint, pressed } => {
            let mut flags = FastPathKeyboardFlags::empty();
            if !*pressed {
                flags |= FastPathKeyboardFlags::RELEASE;
            }

            FastPathInputEvent::UnicodeKeyboardEvent(flags, *codepoint)
        }
    };

    Ok(event)
}

fn to_slow_path_event(event: &InputEvent) -> InputEventPduVariant {
    match event {
        InputEvent::MouseMove { x, y } => InputEventPduVariant::Mouse(MousePdu {
            flags: PointerFlags::MOVE,
            number_of_wheel_rotation_units: 0,
            x_position: *x,
            y_position: *y,
        }),
        InputEvent::MouseButton { x, y, button, pressed } => {
            let mut flags = button.flags();
            if *pressed {
                flags |= PointerFlags::DOWN;
            }

            InputEventPduVariant::Mouse(MousePdu {
                flags,
                number_of_wheel_rotation_units: 0,
                x_position: *x,
                y_position: *y,
            })
        }
        InputEvent::MouseWheel { x, y, delta } => InputEventPduVariant::Mouse(MousePdu {
            flags: PointerFlags::VERTICAL_WHEEL,
            number_of_wheel_rotation_units: *delta,
            x_position: *x,
            y_position: *y,
        }),
        InputEvent::KeyScancode { code, pressed, extended } => {
            let mut flags = KeyboardFlags::empty();
            if !*pressed {
                flags |= KeyboardFlags::RELEASE;
            }
            if *extended {
                flags |= KeyboardFlags::EXTENDED;
            }

            InputEventPduVariant::ScanCode(ScanCodePdu {
                flags,
                key_code: u16::from(*code),
            })
        }
        InputEvent::KeyUnicode { codepoint, pressed } => {
            let mut flags = KeyboardFlags::empty();
            if !*pressed {
                flags |= KeyboardFlags::RELEASE;
            }

            InputEventPduVariant::Unicode(UnicodePdu {
                flags,
                unicode_code: *codepoint,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use cobaltrdp_connector::{DesktopSize, NegotiatedCapabilities};

    use super::*;

    fn encoder(fast_path: bool) -> InputEncoder {
        InputEncoder::new(&ConnectionResult {
            io_channel_id: 1003,
            user_channel_id: 1004,
            share_id: 0x1000_0001,
            capabilities: NegotiatedCapabilities {
                desktop_size: DesktopSize { width: 800, height: 600 },
                fast_path_input: fast_path,
                pointer_cache_size: 25,
            },
        })
    }

    #[test]
    fn fast_path_mouse_move_encoding() {
        let encoder = encoder(true);

        let mut buf = WriteBuf::new();
        let written = encoder
            .encode(&InputEvent::MouseMove { x: 100, y: 200 }, &mut buf)
            .unwrap();

        assert_eq!(written, 9);
        assert_eq!(
            buf.filled(),
            [0x04, 0x09, 0x20, 0x00, 0x08, 0x64, 0x00, 0xc8, 0x00]
        );
    }

    #[test]
    fn slow_path_fallback_wraps_event_in_input_pdu() {
        let encoder = encoder(false);

        let mut buf = WriteBuf::new();
        let written = encoder
            .encode(&InputEvent::MouseMove { x: 1, y: 2 }, &mut buf)
            .unwrap();

        // TPKT + X.224 + MCS + share control + share data + input PDU
        assert!(written > 30);
        // Slow path frames start with a TPKT header.
        assert_eq!(buf.filled()[0], 0x03);
    }

    #[test]
    fn wheel_delta_out_of_range_is_rejected() {
        let encoder = encoder(true);

        let mut buf = WriteBuf::new();
        let result = encoder.encode(
            &InputEvent::MouseWheel {
                x: 0,
                y: 0,
                delta: 360,
            },
            &mut buf,
        );

        assert!(result.is_err());
    }

    #[test]
    fn negative_wheel_delta_sets_negative_flag() {
        let encoder = encoder(true);

        let mut buf = WriteBuf::new();
        encoder
            .encode(
                &InputEvent::MouseWheel {
                    x: 0,
                    y: 0,
                    delta: -120,
                },
                &mut buf,
            )
            .unwrap();

        // eventHeader, then little-endian pointer flags
        let flags = u16::from_le_bytes([buf.filled()[3], buf.filled()[4]]);
        assert_ne!(flags & PointerFlags::WHEEL_NEGATIVE.bits(), 0);
        assert_ne!(flags & PointerFlags::VERTICAL_WHEEL.bits(), 0);
        assert_eq!(flags & 0xFF, 120);
    }
}
