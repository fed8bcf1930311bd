use cobaltrdp_core::{decode, ReadCursor};
use cobaltrdp_pdu::bitmap::BitmapUpdateData;
use cobaltrdp_pdu::mcs::{DisconnectReason, McsMessage};
use cobaltrdp_pdu::palette::PaletteUpdateData;
use cobaltrdp_pdu::rdp::headers::{ShareControlPdu, ShareDataPdu};
use cobaltrdp_pdu::x224::X224;

use crate::{session_reason_err, Framebuffer, PointerState, SessionError, SessionErrorExt as _, SessionResult};

/// What a slow-path frame amounted to.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum SlowPathOutcome {
    Handled,
    /// The server tore the connection down.
    Disconnected(DisconnectReason),
}

/// Slow-path (X.224 / MCS / share data) dispatcher for the active phase.
pub(crate) struct Processor {
    io_channel_id: u16,
}

impl Processor {
    pub(crate) fn new(io_channel_id: u16) -> Self {
        Self { io_channel_id }
    }

    pub(crate) fn process(
        &mut self,
        framebuffer: &mut Framebuffer,
        pointer: &mut PointerState,
        frame: &[u8],
    ) -> SessionResult<SlowPathOutcome> {
        let message = decode::<X224<McsMessage>>(frame).map_err(SessionError::decode)?.0;

        let indication = match message {
            McsMessage::SendDataIndication(indication) => indication,
            McsMessage::DisconnectProviderUltimatum(ultimatum) => {
                info!(reason = %ultimatum.reason, "Server disconnected");
                return Ok(SlowPathOutcome::Disconnected(ultimatum.reason));
            }
            other => {
                warn!(message = ?other, "Unexpected MCS message during active phase");
                return Ok(SlowPathOutcome::Handled);
            }
        };

        if indication.channel_id != self.io_channel_id {
            // Virtual channels beyond the static I/O channel are not joined,
            // so traffic on them is unexpected but harmless.
            warn!(
                channel_id = indication.channel_id,
                "Ignoring data on an unexpected channel"
            );
            return Ok(SlowPathOutcome::Handled);
        }

        let header = decode::<cobaltrdp_pdu::rdp::headers::ShareControlHeader>(&indication.user_data)
            .map_err(SessionError::decode)?;

        match header.share_control_pdu {
            ShareControlPdu::Data(data_header) => self.process_share_data(framebuffer, pointer, data_header.share_data_pdu),
            ShareControlPdu::ServerDeactivateAll(_) => {
                // Deactivation-reactivation (e.g. server-side resize) is not
                // supported; the session keeps serving the last framebuffer.
                warn!("Server Deactivate All PDU ignored");
                Ok(SlowPathOutcome::Handled)
            }
            other => {
                warn!(pdu = other.as_short_name(), "Unexpected Share Control PDU");
                Ok(SlowPathOutcome::Handled)
            }
        }
    }

    fn process_share_data(
        &mut self,
        framebuffer: &mut Framebuffer,
        pointer: &mut PointerState,
        pdu: ShareDataPdu,
    ) -> SessionResult<SlowPathOutcome> {
        match pdu {
            ShareDataPdu::Update(raw) => {
                self.process_slow_path_update(framebuffer, &raw)?;
                Ok(SlowPathOutcome::Handled)
            }
            ShareDataPdu::Pointer(_) => {
                // Pointer updates travel fast-path once FASTPATH_OUTPUT is
                // negotiated; the slow-path variant is not expected.
                let _ = pointer;
                warn!("Ignoring slow-path pointer PDU");
                Ok(SlowPathOutcome::Handled)
            }
            ShareDataPdu::SaveSessionInfo(info) => {
                info!(info_type = info.info_type_name(), "Session information saved");
                Ok(SlowPathOutcome::Handled)
            }
            ShareDataPdu::ServerSetErrorInfo(error_info) => {
                if error_info.is_error() {
                    error!(code = error_info.0, "Server set error info");
                    Err(session_reason_err!(
                        "server error info",
                        "{}",
                        error_info.description()
                    ))
                } else {
                    Ok(SlowPathOutcome::Handled)
                }
            }
            ShareDataPdu::ShutdownDenied => {
                // The server acknowledges the shutdown request; the client
                // proceeds with the disconnect ultimatum.
                debug!("Shutdown request denied (acknowledged)");
                Ok(SlowPathOutcome::Handled)
            }
            other => {
                debug!(pdu = other.as_short_name(), "Ignored share data PDU");
                Ok(SlowPathOutcome::Handled)
            }
        }
    }

    /// Slow-path graphics update: the payload starts with the update type
    /// word, which the bitmap/palette codecs re-read as part of their own
    /// headers.
    fn process_slow_path_update(&mut self, framebuffer: &mut Framebuffer, raw: &[u8]) -> SessionResult<()> {
        const UPDATETYPE_ORDERS: u16 = 0x0000;
        const UPDATETYPE_BITMAP: u16 = 0x0001;
        const UPDATETYPE_PALETTE: u16 = 0x0002;
        const UPDATETYPE_SYNCHRONIZE: u16 = 0x0003;

        let mut cursor = ReadCursor::new(raw);
        if cursor.len() < 2 {
            return Err(session_reason_err!("slow-path update", "update payload too short"));
        }

        match cursor.peek_u16() {
            UPDATETYPE_BITMAP => {
                let update = decode::<BitmapUpdateData<'_>>(raw).map_err(SessionError::decode)?;
                framebuffer.apply_bitmap_update(&update)?;
                framebuffer.bump_version();
            }
            UPDATETYPE_PALETTE => {
                let update = decode::<PaletteUpdateData>(raw).map_err(SessionError::decode)?;
                framebuffer.apply_palette_update(&update);
                framebuffer.bump_version();
            }
            UPDATETYPE_ORDERS | UPDATETYPE_SYNCHRONIZE => {
                debug!("Ignored slow-path orders/synchronize update");
            }
            other => {
                warn!(update_type = other, "Unknown slow-path update type");
            }
        }

        Ok(())
    }
}
