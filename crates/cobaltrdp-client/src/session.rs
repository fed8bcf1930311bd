use std::sync::{Arc, Mutex};
use std::time::Duration;

use cobaltrdp_connector::{ClientConnector, ConnectionResult, ServerName};
use cobaltrdp_core::{encode_buf, WriteBuf};
use cobaltrdp_graphics::pointer::DecodedPointer;
use cobaltrdp_pdu::mcs::{DisconnectProviderUltimatum, DisconnectReason};
use cobaltrdp_pdu::x224::X224;
use cobaltrdp_session::{ActiveStage, ActiveStageOutput, FrameSnapshot, Framebuffer, InputEncoder, InputEvent, MouseButton, PointerState};
use cobaltrdp_tokio::Framed;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt as _};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::{ClientError, ClientResult, Config};

/// Deadline applied to every transport read before the session is active.
const SETUP_READ_TIMEOUT: Duration = Duration::from_secs(30);
/// Deadline applied to every send.
const SEND_TIMEOUT: Duration = Duration::from_secs(10);
/// How long `shutdown` waits for queued input to drain.
const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_millis(250);

/// Bound of the outbound input queue.
const INPUT_QUEUE_DEPTH: usize = 64;

type Transport = cobaltrdp_tls::TlsStream<TcpStream>;

#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub host: String,
    pub port: u16,
    pub config: Config,
}

/// Where the session is in its lifecycle once the engine took over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Active,
    Terminating,
    Closed,
}

struct SessionState {
    framebuffer: Framebuffer,
    pointer: PointerState,
    phase: Phase,
    /// First fatal error observed by the receive task, surfaced to the
    /// caller on their next operation.
    failure: Option<String>,
}

/// Pointer presentation state, captured copy-on-read like the framebuffer.
#[derive(Debug, Clone)]
pub struct PointerSnapshot {
    pub position: (u16, u16),
    pub visible: bool,
    pub current: Option<DecodedPointer>,
}

/// A live RDP session: one receive task applying server updates to the
/// shared state, one send task draining the input queue.
pub struct RdpSession {
    shared: Arc<Mutex<SessionState>>,
    desktop_size: (u16, u16),
    input_tx: Mutex<Option<mpsc::Sender<InputEvent>>>,
    update_rx: watch::Receiver<u64>,
    recv_task: Mutex<Option<JoinHandle<()>>>,
    send_task: Mutex<Option<JoinHandle<()>>>,
}

/// Establishes a connection and hands back a running session.
///
/// All errors of the establishment phases are returned here; once this
/// function returns the session is `Active`.
pub async fn connect(options: ConnectOptions) -> ClientResult<RdpSession> {
    if !matches!(options.config.color_depth, 16 | 24 | 32) {
        return Err(ClientError::InvalidConfig("color depth must be 16, 24 or 32"));
    }

    let addr = (options.host.as_str(), options.port);
    let stream = tokio::time::timeout(SETUP_READ_TIMEOUT, TcpStream::connect(addr))
        .await
        .map_err(|_| ClientError::Timeout("connecting"))??;
    stream.set_nodelay(true)?;

    let client_addr = stream
        .local_addr()
        .map(|a| a.ip().to_string())
        .unwrap_or_else(|_| String::from("0.0.0.0"));

    let server_name = ServerName::new(&options.host);

    let mut connector = ClientConnector::new(options.config, client_addr);

    // X.224 negotiation over the raw TCP stream, with the setup deadline
    // bounding every read.
    let mut framed = Framed::new(stream);
    let should_upgrade = cobaltrdp_tokio::connect_begin(&mut framed, &mut connector, SETUP_READ_TIMEOUT).await?;

    // TLS upgrade; everything from here on travels inside the TLS channel,
    // and no pre-TLS codec is ever entered again.
    let initial_stream = framed.into_inner_no_leftover();
    let (tls_stream, server_public_key) = tokio::time::timeout(
        SETUP_READ_TIMEOUT,
        cobaltrdp_tls::upgrade(initial_stream, server_name.as_str()),
    )
    .await
    .map_err(|_| ClientError::Timeout("upgrading to TLS"))??;

    let upgraded = cobaltrdp_tokio::mark_as_upgraded(should_upgrade, &mut connector)?;

    let mut framed = Framed::new(tls_stream);
    let connection_result = cobaltrdp_tokio::connect_finalize(
        upgraded,
        &mut framed,
        connector,
        server_name,
        server_public_key,
        SETUP_READ_TIMEOUT,
    )
    .await?;

    info!(
        width = connection_result.capabilities.desktop_size.width,
        height = connection_result.capabilities.desktop_size.height,
        fast_path_input = connection_result.capabilities.fast_path_input,
        "Session is active"
    );

    Ok(RdpSession::spawn(framed, connection_result))
}

impl RdpSession {
    fn spawn(framed: Framed<Transport>, connection: ConnectionResult) -> Self {
        let desktop_size = connection.capabilities.desktop_size;

        let shared = Arc::new(Mutex::new(SessionState {
            framebuffer: Framebuffer::new(desktop_size.width, desktop_size.height),
            pointer: PointerState::new(connection.capabilities.pointer_cache_size),
            phase: Phase::Active,
            failure: None,
        }));

        let (update_tx, update_rx) = watch::channel(0u64);
        let (input_tx, input_rx) = mpsc::channel(INPUT_QUEUE_DEPTH);

        let (stream, leftover) = framed.into_inner();
        let (read_half, write_half) = tokio::io::split(stream);
        let framed_read = Framed::new_with_leftover(read_half, leftover);

        let active_stage = ActiveStage::new(&connection);
        let input_encoder = InputEncoder::new(&connection);

        let recv_task = tokio::spawn(receive_loop(framed_read, active_stage, Arc::clone(&shared), update_tx));
        let send_task = tokio::spawn(send_loop(write_half, input_encoder, input_rx, Arc::clone(&shared)));

        Self {
            shared,
            desktop_size: (desktop_size.width, desktop_size.height),
            input_tx: Mutex::new(Some(input_tx)),
            update_rx,
            recv_task: Mutex::new(Some(recv_task)),
            send_task: Mutex::new(Some(send_task)),
        }
    }

    pub fn desktop_size(&self) -> (u16, u16) {
        self.desktop_size
    }

    /// Copy-on-read framebuffer snapshot.
    ///
    /// Remains available while the session is terminating so final reads
    /// stay valid; fails with [`ClientError::NotConnected`] once closed.
    pub fn snapshot(&self) -> ClientResult<FrameSnapshot> {
        let state = self.shared.lock().expect("session lock");

        match state.phase {
            Phase::Closed => Err(ClientError::NotConnected),
            _ => Ok(state.framebuffer.snapshot()),
        }
    }

    /// Copy-on-read pointer snapshot, same lifecycle as [`Self::snapshot`].
    pub fn pointer(&self) -> ClientResult<PointerSnapshot> {
        let state = self.shared.lock().expect("session lock");

        match state.phase {
            Phase::Closed => Err(ClientError::NotConnected),
            _ => Ok(PointerSnapshot {
                position: state.pointer.position,
                visible: state.pointer.visible,
                current: state.pointer.current_pointer().cloned(),
            }),
        }
    }

    /// Waits until the framebuffer version advances past `since_version`
    /// and returns the new version.
    pub async fn wait_for_update(&self, since_version: u64) -> ClientResult<u64> {
        let mut update_rx = self.update_rx.clone();

        loop {
            let current = *update_rx.borrow();
            if current > since_version {
                return Ok(current);
            }

            if update_rx.changed().await.is_err() {
                // The receive task is gone.
                return Err(self.terminated_error());
            }
        }
    }

    pub async fn mouse_move(&self, x: u16, y: u16) -> ClientResult<()> {
        self.send_input(InputEvent::MouseMove { x, y }).await
    }

    pub async fn mouse_button(&self, x: u16, y: u16, button: MouseButton, pressed: bool) -> ClientResult<()> {
        self.send_input(InputEvent::MouseButton { x, y, button, pressed }).await
    }

    /// `delta` must be a multiple of 120 in the range of the wire encoding.
    pub async fn mouse_wheel(&self, x: u16, y: u16, delta: i16) -> ClientResult<()> {
        self.send_input(InputEvent::MouseWheel { x, y, delta }).await
    }

    pub async fn key_scancode(&self, code: u8, pressed: bool, extended: bool) -> ClientResult<()> {
        self.send_input(InputEvent::KeyScancode { code, pressed, extended }).await
    }

    pub async fn key_unicode(&self, codepoint: u16, pressed: bool) -> ClientResult<()> {
        self.send_input(InputEvent::KeyUnicode { codepoint, pressed }).await
    }

    async fn send_input(&self, event: InputEvent) -> ClientResult<()> {
        {
            let state = self.shared.lock().expect("session lock");

            match state.phase {
                Phase::Active => {}
                Phase::Terminating | Phase::Closed => {
                    if let Some(failure) = &state.failure {
                        return Err(ClientError::Terminated(failure.clone()));
                    }
                    return Err(ClientError::NotConnected);
                }
            }
        }

        let sender = {
            let guard = self.input_tx.lock().expect("input sender lock");
            guard.clone()
        };

        let Some(sender) = sender else {
            return Err(ClientError::NotConnected);
        };

        sender.send(event).await.map_err(|_| self.terminated_error())?;

        Ok(())
    }

    /// Gracefully tears the session down:
    ///
    /// 1. stops accepting input and flips the phase to terminating,
    /// 2. lets queued input drain for up to 250 ms,
    /// 3. has the send task emit the MCS Disconnect Provider Ultimatum and
    ///    close TLS,
    /// 4. stops the receive task and marks the session closed.
    pub async fn shutdown(&self) -> ClientResult<()> {
        {
            let mut state = self.shared.lock().expect("session lock");
            if state.phase == Phase::Closed {
                return Ok(());
            }
            state.phase = Phase::Terminating;
        }

        // Dropping the sender closes the queue; the send task drains what is
        // left, sends the ultimatum and closes the TLS stream.
        let sender = self.input_tx.lock().expect("input sender lock").take();
        drop(sender);

        let send_task = self.send_task.lock().expect("send task lock").take();
        if let Some(send_task) = send_task {
            match tokio::time::timeout(SHUTDOWN_DRAIN_TIMEOUT + SEND_TIMEOUT, send_task).await {
                Ok(_) => {}
                Err(_) => warn!("Send task did not drain in time"),
            }
        }

        let recv_task = self.recv_task.lock().expect("recv task lock").take();
        if let Some(recv_task) = recv_task {
            recv_task.abort();
            let _ = recv_task.await;
        }

        let mut state = self.shared.lock().expect("session lock");
        state.phase = Phase::Closed;

        Ok(())
    }

    fn terminated_error(&self) -> ClientError {
        let state = self.shared.lock().expect("session lock");
        match &state.failure {
            Some(failure) => ClientError::Terminated(failure.clone()),
            None => ClientError::NotConnected,
        }
    }
}

/// Receive task: reads one frame at a time and applies it to the shared
/// state. Reads have no deadline while active; absence of data is not an
/// error. The lock is only held for the synchronous decode-and-apply of one
/// frame, never across an await point.
async fn receive_loop<R>(
    mut framed: Framed<R>,
    mut active_stage: ActiveStage,
    shared: Arc<Mutex<SessionState>>,
    update_tx: watch::Sender<u64>,
) where
    R: AsyncRead + Unpin,
{
    loop {
        let (action, frame) = match framed.read_pdu().await {
            Ok(frame) => frame,
            Err(e) => {
                let mut state = shared.lock().expect("session lock");
                if state.phase == Phase::Active {
                    debug!(error = %e, "Receive loop I/O error");
                    state.failure = Some(format!("transport error: {e}"));
                    state.phase = Phase::Terminating;
                }
                break;
            }
        };

        // The lock is released before publishing the new version so readers
        // never contend with the watch channel.
        let mut version_to_publish = None;

        {
            let mut guard = shared.lock().expect("session lock");

            if guard.phase != Phase::Active {
                break;
            }

            let state = &mut *guard;
            match active_stage.process(&mut state.framebuffer, &mut state.pointer, action, &frame) {
                Ok(ActiveStageOutput::GraphicsUpdated) => {
                    version_to_publish = Some(state.framebuffer.version());
                }
                Ok(ActiveStageOutput::Handled) => {}
                Ok(ActiveStageOutput::Terminate(reason)) => {
                    info!(%reason, "Session terminated by server");
                    state.failure = Some(format!("server disconnected: {reason}"));
                    state.phase = Phase::Terminating;
                    break;
                }
                Err(e) => {
                    error!(error = %e, "Session processing error");
                    state.failure = Some(e.report().to_string());
                    state.phase = Phase::Terminating;
                    break;
                }
            }
        }

        if let Some(version) = version_to_publish {
            let _ = update_tx.send(version);
        }
    }
}

/// Send task: drains the outbound queue in FIFO order, serializing each
/// event into exactly one PDU under the single transport writer. When the
/// queue closes it emits the disconnect ultimatum and closes TLS.
async fn send_loop<W>(
    mut write_half: W,
    encoder: InputEncoder,
    mut input_rx: mpsc::Receiver<InputEvent>,
    shared: Arc<Mutex<SessionState>>,
) where
    W: AsyncWrite + Unpin,
{
    let mut buf = WriteBuf::new();

    while let Some(event) = input_rx.recv().await {
        buf.clear();

        if let Err(e) = encoder.encode(&event, &mut buf) {
            error!(error = %e, "Failed to encode input event");
            let mut state = shared.lock().expect("session lock");
            state.failure = Some(e.report().to_string());
            state.phase = Phase::Terminating;
            return;
        }

        match tokio::time::timeout(SEND_TIMEOUT, write_half.write_all(buf.filled())).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(error = %e, "Send loop I/O error");
                let mut state = shared.lock().expect("session lock");
                state.failure = Some(format!("transport error: {e}"));
                state.phase = Phase::Terminating;
                return;
            }
            Err(_) => {
                warn!("Send deadline exceeded");
                let mut state = shared.lock().expect("session lock");
                state.failure = Some(String::from("send deadline exceeded"));
                state.phase = Phase::Terminating;
                return;
            }
        }
    }

    // Orderly goodbye: Disconnect Provider Ultimatum, then TLS close.
    buf.clear();
    let ultimatum = X224(DisconnectProviderUltimatum::from_reason(DisconnectReason::UserRequested));
    if encode_buf(&ultimatum, &mut buf).is_ok()
        && tokio::time::timeout(SEND_TIMEOUT, write_half.write_all(buf.filled()))
            .await
            .is_err()
    {
        warn!("Timed out sending the disconnect ultimatum");
    }

    let _ = tokio::time::timeout(SEND_TIMEOUT, write_half.shutdown()).await;
}

#[cfg(test)]
mod tests {
    use cobaltrdp_connector::{DesktopSize, NegotiatedCapabilities};
    use tokio::io::AsyncReadExt as _;

    use super::*;

    fn test_connection() -> ConnectionResult {
        ConnectionResult {
            io_channel_id: 1003,
            user_channel_id: 1004,
            share_id: 0x66538,
            capabilities: NegotiatedCapabilities {
                desktop_size: DesktopSize { width: 640, height: 480 },
                fast_path_input: true,
                pointer_cache_size: 25,
            },
        }
    }

    fn empty_session_state() -> Arc<Mutex<SessionState>> {
        Arc::new(Mutex::new(SessionState {
            framebuffer: Framebuffer::new(640, 480),
            pointer: PointerState::new(25),
            phase: Phase::Active,
            failure: None,
        }))
    }

    #[tokio::test]
    async fn send_loop_preserves_emission_order() {
        let connection = test_connection();
        let encoder = InputEncoder::new(&connection);

        let (tx, rx) = mpsc::channel(INPUT_QUEUE_DEPTH);
        let (client, mut server) = tokio::io::duplex(4096);

        let task = tokio::spawn(send_loop(client, InputEncoder::new(&connection), rx, empty_session_state()));

        let events = [
            InputEvent::MouseMove { x: 1, y: 1 },
            InputEvent::KeyScancode {
                code: 0x1c,
                pressed: true,
                extended: false,
            },
            InputEvent::MouseMove { x: 2, y: 2 },
            InputEvent::KeyScancode {
                code: 0x1c,
                pressed: false,
                extended: false,
            },
        ];

        let mut expected = Vec::new();
        for event in &events {
            let mut buf = WriteBuf::new();
            encoder.encode(event, &mut buf).unwrap();
            expected.extend_from_slice(buf.filled());

            tx.send(event.clone()).await.unwrap();
        }

        // Closing the queue ends the loop with the disconnect ultimatum.
        drop(tx);

        let mut ultimatum_buf = WriteBuf::new();
        encode_buf(
            &X224(DisconnectProviderUltimatum::from_reason(DisconnectReason::UserRequested)),
            &mut ultimatum_buf,
        )
        .unwrap();
        expected.extend_from_slice(ultimatum_buf.filled());

        task.await.unwrap();

        let mut received = Vec::new();
        server.read_to_end(&mut received).await.unwrap();

        assert_eq!(received, expected);
    }

    #[tokio::test]
    async fn send_loop_emits_nothing_after_the_queue_closes() {
        let connection = test_connection();

        let (tx, rx) = mpsc::channel::<InputEvent>(INPUT_QUEUE_DEPTH);
        let (client, mut server) = tokio::io::duplex(4096);

        let task = tokio::spawn(send_loop(client, InputEncoder::new(&connection), rx, empty_session_state()));

        drop(tx);
        task.await.unwrap();

        // Only the ultimatum, then EOF: the transport is closed.
        let mut received = Vec::new();
        server.read_to_end(&mut received).await.unwrap();

        let mut ultimatum_buf = WriteBuf::new();
        encode_buf(
            &X224(DisconnectProviderUltimatum::from_reason(DisconnectReason::UserRequested)),
            &mut ultimatum_buf,
        )
        .unwrap();

        assert_eq!(received, ultimatum_buf.filled());
    }
}
