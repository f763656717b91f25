//! RCON connection actor (C2): socket lifecycle, auth handshake,
//! reconnect/backoff and the heartbeat, wrapping the command queue (C3).
//! Modeled on the teacher's paired-task-per-connection design, collapsed
//! into a single actor task because C3 requires serialized access to one
//! socket — there is nothing left to run concurrently once only one
//! command may be in flight at a time.

use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use domain::error::{ErrorContext, ParseErrorKind, SupervisorError};
use protocol::chat::{self, ChatClassification};
use protocol::codec::{
    self, DecodeOutcome, Frame, ID_AUTH_FAILED, ID_END, ID_MID, TYPE_AUTH,
    TYPE_EXEC_OR_AUTH_RESPONSE, TYPE_RESPONSE,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot, Notify};
use tokio::time::{self, Instant};

use crate::backoff::reconnect_delay;
use crate::queue::{CommandQueue, PendingCommand};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticating,
    Connected,
    Disconnecting,
}

/// Clone-able summary of a [`SupervisorError`], since the error type
/// itself doesn't need to be (and the broadcast channel requires `Clone`).
#[derive(Debug, Clone)]
pub struct ErrorSummary {
    pub code: &'static str,
    pub message: String,
    pub recoverable: bool,
}

impl From<&SupervisorError> for ErrorSummary {
    fn from(err: &SupervisorError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
            recoverable: err.recoverable(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    StateChanged(ConnectionState),
    Error(ErrorSummary),
}

#[derive(Debug, Clone)]
pub struct RconConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
    pub connect_timeout: Duration,
    pub auto_reconnect: bool,
    pub reconnect_delay: Duration,
    /// 0 means infinite.
    pub max_reconnect_attempts: u32,
    pub command_timeout: Duration,
    pub heartbeat_interval: Duration,
}

impl Default for RconConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 21114,
            password: String::new(),
            connect_timeout: Duration::from_secs(5),
            auto_reconnect: true,
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_attempts: 0,
            command_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

/// A handle to a running connection actor. Cloning it is cheap; every
/// clone shares the same underlying socket and command queue.
#[derive(Clone)]
pub struct RconHandle {
    command_tx: mpsc::Sender<PendingCommand>,
    chat_tx: broadcast::Sender<ChatClassification>,
    event_tx: broadcast::Sender<ConnectionEvent>,
    shutdown: Arc<Notify>,
}

impl RconHandle {
    pub fn spawn(config: RconConfig) -> Self {
        let (command_tx, command_rx) = mpsc::channel(64);
        let (chat_tx, _) = broadcast::channel(256);
        let (event_tx, _) = broadcast::channel(64);
        let shutdown = Arc::new(Notify::new());

        let task_chat_tx = chat_tx.clone();
        let task_event_tx = event_tx.clone();
        let task_shutdown = shutdown.clone();
        tokio::spawn(async move { run(config, command_rx, task_chat_tx, task_event_tx, task_shutdown).await });

        Self {
            command_tx,
            chat_tx,
            event_tx,
            shutdown,
        }
    }

    /// Closes the socket and ends the connection actor's task (§5:
    /// "closes the RCON socket"). In-flight and queued commands fail
    /// `COMMAND_ABORTED`; auto-reconnect is not attempted afterward.
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }

    pub async fn execute(&self, command: impl Into<String>) -> Result<String, SupervisorError> {
        self.execute_with_deadline(command, None).await
    }

    pub async fn execute_with_deadline(
        &self,
        command: impl Into<String>,
        deadline: Option<Instant>,
    ) -> Result<String, SupervisorError> {
        let (tx, rx) = oneshot::channel();
        let command = command.into();
        let pending = PendingCommand {
            command: command.clone(),
            count: 0,
            deadline,
            respond_to: tx,
        };
        self.command_tx.send(pending).await.map_err(|_| SupervisorError::NotConnected {
            context: ErrorContext::new(),
        })?;
        rx.await.map_err(|_| SupervisorError::CommandAborted {
            command,
            context: ErrorContext::new(),
        })?
    }

    pub fn subscribe_chat(&self) -> broadcast::Receiver<ChatClassification> {
        self.chat_tx.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.event_tx.subscribe()
    }
}

fn report_state(event_tx: &broadcast::Sender<ConnectionEvent>, state: ConnectionState) {
    let _ = event_tx.send(ConnectionEvent::StateChanged(state));
}

fn report_error(event_tx: &broadcast::Sender<ConnectionEvent>, err: &SupervisorError) {
    tracing::warn!(code = err.code(), message = %err, "rcon connection error");
    let _ = event_tx.send(ConnectionEvent::Error(err.into()));
}

async fn run(
    config: RconConfig,
    mut command_rx: mpsc::Receiver<PendingCommand>,
    chat_tx: broadcast::Sender<ChatClassification>,
    event_tx: broadcast::Sender<ConnectionEvent>,
    shutdown: Arc<Notify>,
) {
    let mut attempt: u32 = 0;

    loop {
        report_state(&event_tx, ConnectionState::Connecting);
        let mut buf = BytesMut::with_capacity(8192);

        let connect_outcome = tokio::select! {
            outcome = time::timeout(
                config.connect_timeout,
                TcpStream::connect((config.host.as_str(), config.port)),
            ) => outcome,
            _ = shutdown.notified() => {
                report_state(&event_tx, ConnectionState::Disconnected);
                return;
            }
        };

        let mut stream = match connect_outcome {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                report_error(
                    &event_tx,
                    &SupervisorError::ConnectionRefused {
                        message: e.to_string(),
                        context: ErrorContext::new(),
                    },
                );
                if !schedule_reconnect(&config, &mut attempt, &shutdown).await {
                    return;
                }
                continue;
            }
            Err(_) => {
                report_error(
                    &event_tx,
                    &SupervisorError::ConnectionTimeout {
                        message: "connect timed out".to_string(),
                        context: ErrorContext::new(),
                    },
                );
                if !schedule_reconnect(&config, &mut attempt, &shutdown).await {
                    return;
                }
                continue;
            }
        };

        report_state(&event_tx, ConnectionState::Authenticating);
        match authenticate(&mut stream, &config.password, &mut buf).await {
            Ok(()) => {
                tracing::info!(host = %config.host, port = config.port, "rcon authenticated");
                attempt = 0;
            }
            Err(err @ SupervisorError::AuthFailed { .. }) => {
                report_error(&event_tx, &err);
                report_state(&event_tx, ConnectionState::Disconnected);
                return;
            }
            Err(err) => {
                report_error(&event_tx, &err);
                report_state(&event_tx, ConnectionState::Disconnected);
                if !schedule_reconnect(&config, &mut attempt, &shutdown).await {
                    return;
                }
                continue;
            }
        }

        report_state(&event_tx, ConnectionState::Connected);
        let outcome = serve(&mut stream, &config, &mut command_rx, &chat_tx, &event_tx, &mut buf, &shutdown).await;
        report_state(&event_tx, ConnectionState::Disconnected);

        match outcome {
            ServeOutcome::Shutdown => return,
            ServeOutcome::Reconnect => {
                if !schedule_reconnect(&config, &mut attempt, &shutdown).await {
                    return;
                }
            }
        }
    }
}

/// Returns `false` when reconnection is disabled, the attempt budget is
/// exhausted, or `shutdown` fires while waiting — in every case the actor
/// should give up entirely rather than reconnect.
async fn schedule_reconnect(config: &RconConfig, attempt: &mut u32, shutdown: &Notify) -> bool {
    if !config.auto_reconnect {
        return false;
    }
    if config.max_reconnect_attempts != 0 && *attempt >= config.max_reconnect_attempts {
        return false;
    }
    let delay = reconnect_delay(config.reconnect_delay, *attempt);
    *attempt += 1;
    tracing::info!(attempt, delay_ms = delay.as_millis() as u64, "scheduling rcon reconnect");
    tokio::select! {
        _ = time::sleep(delay) => true,
        _ = shutdown.notified() => false,
    }
}

async fn read_one_frame(stream: &mut TcpStream, buf: &mut BytesMut) -> Result<Frame, SupervisorError> {
    let mut chunk = [0u8; 4096];
    loop {
        match codec::decode_packet(buf) {
            DecodeOutcome::Frame { frame: Some(frame), consumed } => {
                let _ = buf.split_to(consumed);
                return Ok(frame);
            }
            DecodeOutcome::Frame { frame: None, consumed } => {
                let _ = buf.split_to(consumed);
                continue;
            }
            DecodeOutcome::Incomplete { .. } => {
                let n = stream.read(&mut chunk).await.map_err(|e| SupervisorError::ConnectionReset {
                    message: e.to_string(),
                    context: ErrorContext::new(),
                })?;
                if n == 0 {
                    return Err(SupervisorError::ConnectionClosed {
                        message: "peer closed during handshake".to_string(),
                        context: ErrorContext::new(),
                    });
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            DecodeOutcome::InvalidSize { size } => {
                return Err(SupervisorError::ParseError {
                    kind: ParseErrorKind::InvalidResponse,
                    message: format!("invalid frame size {size}"),
                    context: ErrorContext::new(),
                });
            }
            DecodeOutcome::Malformed { reason } => {
                return Err(SupervisorError::ParseError {
                    kind: ParseErrorKind::InvalidResponse,
                    message: reason,
                    context: ErrorContext::new(),
                });
            }
        }
    }
}

/// Sends the `AUTH` frame and classifies the server's reply. The pre-auth
/// echo (a plain `RESPONSE` with `id=END`) is accepted and discarded
/// before looking for the real `AUTH_RESPONSE` (§4.2).
async fn authenticate(stream: &mut TcpStream, password: &str, buf: &mut BytesMut) -> Result<(), SupervisorError> {
    let auth = codec::encode_packet(TYPE_AUTH, ID_END, 0, password);
    stream.write_all(&auth).await.map_err(|e| SupervisorError::ConnectionReset {
        message: e.to_string(),
        context: ErrorContext::new(),
    })?;

    let first = read_one_frame(stream, buf).await?;
    let response = if first.packet_type == TYPE_RESPONSE && first.id == ID_END {
        read_one_frame(stream, buf).await?
    } else {
        first
    };

    if response.id == ID_END {
        Ok(())
    } else if response.id == ID_AUTH_FAILED {
        Err(SupervisorError::AuthFailed {
            message: "invalid rcon password".to_string(),
            context: ErrorContext::new(),
        })
    } else {
        Err(SupervisorError::ParseError {
            kind: ParseErrorKind::UnexpectedFormat,
            message: format!("unexpected auth response id {}", response.id),
            context: ErrorContext::new(),
        })
    }
}

enum ServeOutcome {
    Reconnect,
    Shutdown,
}

fn dispatch_frame(frame: Frame, queue: &mut CommandQueue, chat_tx: &broadcast::Sender<ChatClassification>) {
    if chat::looks_like_chat(&frame.body) {
        if let Some(classified) = chat::classify(&frame.body) {
            let _ = chat_tx.send(classified);
        }
        return;
    }
    if frame.id == ID_MID {
        queue.append_fragment(&frame.body);
    } else if frame.id == ID_END {
        queue.complete_in_flight();
    } else {
        tracing::trace!(id = frame.id, count = frame.count, "frame outside command flow");
    }
}

/// Runs the serving phase of one connection: admits queued commands one
/// at a time, assembles multi-packet responses, fires the heartbeat, and
/// enforces per-command deadlines, all on a single `select!` so nothing
/// races the socket.
async fn serve(
    stream: &mut TcpStream,
    config: &RconConfig,
    command_rx: &mut mpsc::Receiver<PendingCommand>,
    chat_tx: &broadcast::Sender<ChatClassification>,
    event_tx: &broadcast::Sender<ConnectionEvent>,
    buf: &mut BytesMut,
    shutdown: &Notify,
) -> ServeOutcome {
    let mut queue = CommandQueue::new();
    let mut heartbeat = time::interval(config.heartbeat_interval);
    heartbeat.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
    heartbeat.tick().await; // the first real tick is one interval away (§4.10 discipline applied here too)

    let mut read_buf = vec![0u8; 8192];

    loop {
        if !queue.has_in_flight() {
            if let Some((command, count)) = queue.admit_next(config.command_timeout) {
                let mid = codec::encode_packet(TYPE_EXEC_OR_AUTH_RESPONSE, ID_MID, count, &command);
                let end = codec::encode_packet(TYPE_EXEC_OR_AUTH_RESPONSE, ID_END, count, "");
                if stream.write_all(&mid).await.is_err() || stream.write_all(&end).await.is_err() {
                    queue.abort_all();
                    return ServeOutcome::Reconnect;
                }
                continue;
            }
        }

        let sleep_until = queue.in_flight_deadline().unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));
        let deadline_sleep = time::sleep_until(sleep_until);
        tokio::pin!(deadline_sleep);

        tokio::select! {
            _ = shutdown.notified() => {
                queue.abort_all();
                return ServeOutcome::Shutdown;
            }

            _ = &mut deadline_sleep, if queue.has_in_flight() => {
                queue.timeout_in_flight();
            }

            _ = heartbeat.tick(), if !queue.has_in_flight() => {
                let (tx, _rx) = oneshot::channel();
                queue.submit(PendingCommand {
                    command: "ShowNextMap".to_string(),
                    count: 0,
                    deadline: Some(Instant::now() + config.command_timeout),
                    respond_to: tx,
                });
            }

            maybe_pending = command_rx.recv() => {
                match maybe_pending {
                    Some(pending) => queue.submit(pending),
                    None => {
                        queue.abort_all();
                        return ServeOutcome::Shutdown;
                    }
                }
            }

            read_result = stream.read(&mut read_buf) => {
                match read_result {
                    Ok(0) => {
                        report_error(event_tx, &SupervisorError::ConnectionClosed {
                            message: "peer closed the connection".to_string(),
                            context: ErrorContext::new(),
                        });
                        queue.abort_all();
                        return ServeOutcome::Reconnect;
                    }
                    Ok(n) => {
                        buf.extend_from_slice(&read_buf[..n]);
                        loop {
                            match codec::decode_packet(buf) {
                                DecodeOutcome::Frame { frame, consumed } => {
                                    let _ = buf.split_to(consumed);
                                    if let Some(frame) = frame {
                                        dispatch_frame(frame, &mut queue, chat_tx);
                                    }
                                }
                                _ => break,
                            }
                        }
                    }
                    Err(e) => {
                        report_error(event_tx, &SupervisorError::ConnectionReset {
                            message: e.to_string(),
                            context: ErrorContext::new(),
                        });
                        queue.abort_all();
                        return ServeOutcome::Reconnect;
                    }
                }
            }
        }
    }
}
