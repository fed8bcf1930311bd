//! Async drivers feeding frames into the connector state machines.

use std::time::Duration;

use cobaltrdp_connector::credssp::CredsspSequence;
use cobaltrdp_connector::sspi::credssp::ClientState;
use cobaltrdp_connector::sspi::generator::GeneratorState;
use cobaltrdp_connector::{
    custom_err, reason_err, ClientConnector, ClientConnectorState, ConnectionResult, ConnectorError,
    ConnectorErrorExt as _, ConnectorResult, Sequence as _, ServerName, State as _,
};
use cobaltrdp_core::WriteBuf;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::framed::Framed;

/// Token proving the connector reached the TLS upgrade point.
#[non_exhaustive]
pub struct ShouldUpgrade;

/// Drives the connector until the TLS security upgrade is required.
///
/// `step_deadline` bounds every read-step-write round; reads during setup
/// are never indefinite.
pub async fn connect_begin<S>(
    framed: &mut Framed<S>,
    connector: &mut ClientConnector,
    step_deadline: Duration,
) -> ConnectorResult<ShouldUpgrade>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = WriteBuf::new();

    info!("Begin connection procedure");

    while !connector.should_perform_security_upgrade() {
        with_deadline(step_deadline, single_connect_step(framed, connector, &mut buf)).await?;
    }

    Ok(ShouldUpgrade)
}

#[non_exhaustive]
pub struct Upgraded;

/// Marks the TLS upgrade as performed on the connector.
pub fn mark_as_upgraded(_: ShouldUpgrade, connector: &mut ClientConnector) -> ConnectorResult<Upgraded> {
    trace!("Marked as upgraded");
    connector.mark_security_upgrade_as_done()?;
    Ok(Upgraded)
}

/// Performs CredSSP and then the rest of the connection sequence.
pub async fn connect_finalize<S>(
    _: Upgraded,
    framed: &mut Framed<S>,
    mut connector: ClientConnector,
    server_name: ServerName,
    server_public_key: Vec<u8>,
    step_deadline: Duration,
) -> ConnectorResult<ConnectionResult>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = WriteBuf::new();

    if connector.should_perform_credssp() {
        perform_credssp_steps(framed, &mut connector, &mut buf, server_name, server_public_key, step_deadline).await?;
        connector.mark_credssp_as_done()?;
    }

    let result = loop {
        with_deadline(step_deadline, single_connect_step(framed, &mut connector, &mut buf)).await?;

        if let ClientConnectorState::Connected { result } = connector.state {
            break result;
        }
    };

    info!("Connected with success");

    Ok(result)
}

async fn perform_credssp_steps<S>(
    framed: &mut Framed<S>,
    connector: &mut ClientConnector,
    buf: &mut WriteBuf,
    server_name: ServerName,
    server_public_key: Vec<u8>,
    step_deadline: Duration,
) -> ConnectorResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    debug_assert!(connector.should_perform_credssp());

    let selected_protocol = connector
        .selected_protocol()
        .ok_or_else(|| ConnectorError::general("no selected protocol during CredSSP (this is a bug)"))?;

    let (mut sequence, mut ts_request) = CredsspSequence::init(
        &connector.config.credentials,
        selected_protocol,
        server_name,
        server_public_key,
    )?;

    loop {
        let client_state = {
            let mut generator = sequence.process_ts_request(ts_request);
            resolve_generator(&mut generator)?
        };

        buf.clear();
        let written = sequence.handle_process_result(client_state, buf)?;

        if let Some(response_len) = written.size() {
            let response = &buf[..response_len];
            trace!(response_len, "Send CredSSP response");
            with_deadline(step_deadline, async {
                framed.write_all(response).await.map_err(|e| custom_err!("write all", e))
            })
            .await?;
        }

        let Some(next_pdu_hint) = sequence.next_pdu_hint() else {
            break;
        };

        debug!(hint = ?next_pdu_hint, "Wait for PDU");

        let pdu = with_deadline(step_deadline, async {
            framed
                .read_by_hint(next_pdu_hint)
                .await
                .map_err(|e| custom_err!("read frame by hint", e))
        })
        .await?;

        trace!(length = pdu.len(), "PDU received");

        let Some(request) = sequence.decode_server_message(&pdu)? else {
            break;
        };

        ts_request = request;
    }

    if !sequence.is_done() {
        return Err(ConnectorError::general("CredSSP sequence ended prematurely"));
    }

    Ok(())
}

/// NTLM never suspends on network requests, so the generator resolves
/// synchronously.
fn resolve_generator(
    generator: &mut cobaltrdp_connector::credssp::CredsspProcessGenerator<'_>,
) -> ConnectorResult<ClientState> {
    let state = generator.start();

    match state {
        GeneratorState::Suspended(_) => Err(ConnectorError::general(
            "CredSSP generator requested network I/O, which NTLM never does",
        )),
        GeneratorState::Completed(client_state) => {
            client_state.map_err(|e| ConnectorError::new("CredSSP", cobaltrdp_connector::ConnectorErrorKind::Credssp(e)))
        }
    }
}

/// Performs one read-step-write round with a connector sequence.
pub async fn single_connect_step<S>(
    framed: &mut Framed<S>,
    connector: &mut ClientConnector,
    buf: &mut WriteBuf,
) -> ConnectorResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    buf.clear();

    let written = if let Some(next_pdu_hint) = connector.next_pdu_hint() {
        debug!(
            connector.state = connector.state.name(),
            hint = ?next_pdu_hint,
            "Wait for PDU"
        );

        let pdu = framed
            .read_by_hint(next_pdu_hint)
            .await
            .map_err(|e| custom_err!("read frame by hint", e))?;

        trace!(length = pdu.len(), "PDU received");

        connector.step(&pdu, buf)?
    } else {
        connector.step_no_input(buf)?
    };

    if let Some(response_len) = written.size() {
        debug_assert_eq!(buf.filled_len(), response_len);
        let response = buf.filled();
        trace!(response_len, "Send response");
        framed
            .write_all(response)
            .await
            .map_err(|e| custom_err!("write all", e))?;
    }

    Ok(())
}

async fn with_deadline<T>(
    deadline: Duration,
    fut: impl core::future::Future<Output = ConnectorResult<T>>,
) -> ConnectorResult<T> {
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(reason_err!("setup", "transport deadline exceeded")),
    }
}
