//! Client licensing stage.
//!
//! The expected outcome is a `LICENSE_ERROR_MESSAGE` carrying
//! `STATUS_VALID_CLIENT`, which servers send to short-circuit the exchange.
//! A server that actually initiates an MS-RDPELE license exchange is
//! reported as a license error rather than half-answered.

use std::mem;

use cobaltrdp_core::{decode, WriteBuf};
use cobaltrdp_pdu::rdp::license::{LicenseErrorCode, LicensePdu};
use cobaltrdp_pdu::PduHint;

use crate::io_channel::decode_send_data_indication;
use crate::{ConnectorError, ConnectorErrorExt as _, ConnectorErrorKind, ConnectorResult, Sequence, State, Written};

#[derive(Default, Debug)]
#[non_exhaustive]
pub enum LicenseExchangeState {
    #[default]
    Consumed,

    WaitLicenseMessage,
    LicenseExchanged,
}

impl State for LicenseExchangeState {
    fn name(&self) -> &'static str {
        match self {
            Self::Consumed => "Consumed",
            Self::WaitLicenseMessage => "WaitLicenseMessage",
            Self::LicenseExchanged => "LicenseExchanged",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::LicenseExchanged)
    }

    fn as_any(&self) -> &dyn core::any::Any {
        self
    }
}

#[derive(Debug)]
pub struct LicenseExchangeSequence {
    pub state: LicenseExchangeState,
    pub io_channel_id: u16,
}

impl LicenseExchangeSequence {
    pub fn new(io_channel_id: u16) -> Self {
        Self {
            state: LicenseExchangeState::WaitLicenseMessage,
            io_channel_id,
        }
    }
}

impl Sequence for LicenseExchangeSequence {
    fn next_pdu_hint(&self) -> Option<&dyn PduHint> {
        match self.state {
            LicenseExchangeState::Consumed => None,
            LicenseExchangeState::WaitLicenseMessage => Some(&cobaltrdp_pdu::X224_HINT),
            LicenseExchangeState::LicenseExchanged => None,
        }
    }

    fn state(&self) -> &dyn State {
        &self.state
    }

    fn step(&mut self, input: &[u8], _output: &mut WriteBuf) -> ConnectorResult<Written> {
        let (written, next_state) = match mem::take(&mut self.state) {
            LicenseExchangeState::Consumed => {
                return Err(general_err!("license exchange sequence state is consumed (this is a bug)"))
            }

            LicenseExchangeState::WaitLicenseMessage => {
                let send_data_indication_ctx = decode_send_data_indication(input)?;

                if send_data_indication_ctx.channel_id != self.io_channel_id {
                    warn!(
                        channel_id = send_data_indication_ctx.channel_id,
                        io_channel_id = self.io_channel_id,
                        "License message received on an unexpected channel"
                    );
                }

                let license_pdu =
                    decode::<LicensePdu>(&send_data_indication_ctx.user_data).map_err(ConnectorError::decode)?;

                match license_pdu {
                    LicensePdu::ErrorMessage(error_message) => {
                        if error_message.error_code != LicenseErrorCode::StatusValidClient {
                            return Err(ConnectorError::new(
                                "license exchange",
                                ConnectorErrorKind::License(error_message.error_code),
                            ));
                        }

                        debug!(message = ?error_message, "Received");
                        info!("Server granted the connection as a valid client");

                        (Written::Nothing, LicenseExchangeState::LicenseExchanged)
                    }
                    LicensePdu::Other { message_type } => {
                        error!(?message_type, "Server initiated a license exchange");
                        return Err(reason_err!(
                            "license exchange",
                            "server-initiated license exchange ({message_type:?}) is not supported",
                        ));
                    }
                }
            }

            LicenseExchangeState::LicenseExchanged => return Err(general_err!("license already exchanged")),
        };

        self.state = next_state;

        Ok(written)
    }
}
