//! Helpers for the RDP PDUs riding the MCS I/O channel: MCS Send Data
//! wrapping plus share control / share data headers.

use cobaltrdp_core::{decode, WriteBuf};
use cobaltrdp_pdu::rdp::headers::{
    CompressionFlags, ShareControlHeader, ShareControlPdu, ShareDataHeader, ShareDataPdu, StreamPriority,
};
use cobaltrdp_pdu::x224::X224;
use cobaltrdp_pdu::{mcs, Action};

use crate::{ConnectorError, ConnectorErrorExt as _, ConnectorResult};

#[derive(Debug, Clone)]
pub struct SendDataIndicationCtx {
    pub initiator_id: u16,
    pub channel_id: u16,
    pub user_data: Vec<u8>,
}

/// Decodes a full TPKT frame down to the MCS Send Data Indication payload.
pub fn decode_send_data_indication(input: &[u8]) -> ConnectorResult<SendDataIndicationCtx> {
    let message = decode::<X224<mcs::McsMessage>>(input)
        .map_err(ConnectorError::decode)?
        .0;

    match message {
        mcs::McsMessage::SendDataIndication(indication) => Ok(SendDataIndicationCtx {
            initiator_id: indication.initiator_id,
            channel_id: indication.channel_id,
            user_data: indication.user_data,
        }),
        mcs::McsMessage::DisconnectProviderUltimatum(ultimatum) => Err(reason_err!(
            "decode_send_data_indication",
            "server disconnected: {}",
            ultimatum.reason
        )),
        _ => Err(reason_err!(
            "decode_send_data_indication",
            "unexpected MCS message received"
        )),
    }
}

#[derive(Debug, Clone)]
pub struct ShareControlCtx {
    pub initiator_id: u16,
    pub channel_id: u16,
    pub share_id: u32,
    pub pdu_source: u16,
    pub pdu: ShareControlPdu,
}

pub fn decode_share_control(ctx: SendDataIndicationCtx) -> ConnectorResult<ShareControlCtx> {
    let header = decode::<ShareControlHeader>(&ctx.user_data).map_err(ConnectorError::decode)?;

    Ok(ShareControlCtx {
        initiator_id: ctx.initiator_id,
        channel_id: ctx.channel_id,
        share_id: header.share_id,
        pdu_source: header.pdu_source,
        pdu: header.share_control_pdu,
    })
}

#[derive(Debug, Clone)]
pub struct ShareDataCtx {
    pub initiator_id: u16,
    pub channel_id: u16,
    pub share_id: u32,
    pub pdu: ShareDataPdu,
}

pub fn decode_share_data(ctx: SendDataIndicationCtx) -> ConnectorResult<ShareDataCtx> {
    let ctx = decode_share_control(ctx)?;

    let ShareControlPdu::Data(share_data_header) = ctx.pdu else {
        return Err(reason_err!(
            "decode_share_data",
            "expected a Share Data PDU, got {}",
            ctx.pdu.as_short_name()
        ));
    };

    Ok(ShareDataCtx {
        initiator_id: ctx.initiator_id,
        channel_id: ctx.channel_id,
        share_id: ctx.share_id,
        pdu: share_data_header.share_data_pdu,
    })
}

pub fn encode_share_control(
    initiator_id: u16,
    channel_id: u16,
    share_id: u32,
    pdu: ShareControlPdu,
    buf: &mut WriteBuf,
) -> ConnectorResult<usize> {
    let header = ShareControlHeader {
        share_control_pdu: pdu,
        pdu_source: initiator_id,
        share_id,
    };

    crate::encode_send_data_request(initiator_id, channel_id, &header, buf)
}

pub fn encode_share_data(
    initiator_id: u16,
    channel_id: u16,
    share_id: u32,
    pdu: ShareDataPdu,
    buf: &mut WriteBuf,
) -> ConnectorResult<usize> {
    let share_data_header = ShareDataHeader {
        share_data_pdu: pdu,
        stream_priority: StreamPriority::Medium,
        compression_flags: CompressionFlags::empty(),
    };

    encode_share_control(
        initiator_id,
        channel_id,
        share_id,
        ShareControlPdu::Data(share_data_header),
        buf,
    )
}

/// Sanity check used by callers dealing with raw frames.
pub fn is_x224_frame(frame: &[u8]) -> bool {
    frame.first().copied() == Some(Action::X224.as_u8())
}
