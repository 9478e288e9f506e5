use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::Config;
use crate::connection::gate::{SendGate, SendStatus};
use crate::connection::metadata::Metadata;
use crate::connection::state::{ConnectionState, SharedState};
use crate::error::{Error, Result};
use crate::events::Observers;
use crate::protocol::{CloseCode, CloseFrame, Frame, HandshakeRequest, HandshakeResponse, OpCode};
use crate::scheduler::Scheduler;

/// Everything a connection is built from once the handshake succeeded.
pub(crate) struct ConnectionParts {
    pub gate: SendGate,
    pub local_addr: SocketAddr,
    pub remote_addr: SocketAddr,
    pub request: HandshakeRequest,
    pub response: HandshakeResponse,
    pub subprotocol: Option<String>,
    pub config: Config,
    pub observers: Observers,
    pub cancel: CancellationToken,
}

struct Inner {
    state: SharedState,
    gate: SendGate,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    created_at: SystemTime,
    request: HandshakeRequest,
    response: HandshakeResponse,
    subprotocol: Option<String>,
    metadata: Metadata,
    config: Config,
    observers: Observers,
    /// Background activity: receive loop, timers.
    cancel: CancellationToken,
    /// Fires once teardown has finished.
    closed: CancellationToken,
    close_sent: AtomicBool,
    peer_close: Mutex<Option<CloseFrame>>,
    scheduler: Mutex<Option<Scheduler>>,
}

/// An open WebSocket client connection.
///
/// Cheap to clone; every clone refers to the same session. Frames are sent
/// through an internal gate, so any number of tasks may send concurrently.
///
/// The receive loop holds its own clone, so dropping every handle does not
/// end an open session. Call [`Connection::close`] or cancel the token from
/// [`Connection::cancellation_token`] to stop it.
///
/// ## Example
///
/// ```rust,ignore
/// let (conn, outcome) = client.connect(timeout, 0, |_| {}, cancel).await?;
/// if outcome.is_open() {
///     conn.send_text("hello").await?;
///     conn.close(CloseCode::Normal, "bye").await?;
/// }
/// ```
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl Connection {
    pub(crate) fn from_parts(parts: ConnectionParts, state: ConnectionState) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: SharedState::new(state),
                gate: parts.gate,
                local_addr: parts.local_addr,
                remote_addr: parts.remote_addr,
                created_at: SystemTime::now(),
                request: parts.request,
                response: parts.response,
                subprotocol: parts.subprotocol,
                metadata: Metadata::new(),
                config: parts.config,
                observers: parts.observers,
                cancel: parts.cancel,
                closed: CancellationToken::new(),
                close_sent: AtomicBool::new(false),
                peer_close: Mutex::new(None),
                scheduler: Mutex::new(None),
            }),
        }
    }

    /// Get the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.state.get()
    }

    /// Check if the connection is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Local socket address.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    /// Remote socket address.
    #[must_use]
    pub fn remote_addr(&self) -> SocketAddr {
        self.inner.remote_addr
    }

    /// When the connection was created.
    #[must_use]
    pub fn created_at(&self) -> SystemTime {
        self.inner.created_at
    }

    /// The upgrade request that was sent.
    #[must_use]
    pub fn request(&self) -> &HandshakeRequest {
        &self.inner.request
    }

    /// The upgrade response that was received.
    #[must_use]
    pub fn response(&self) -> &HandshakeResponse {
        &self.inner.response
    }

    /// Negotiated subprotocol.
    #[must_use]
    pub fn subprotocol(&self) -> Option<&str> {
        self.inner.subprotocol.as_deref()
    }

    /// Caller-defined metadata.
    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.inner.metadata
    }

    /// Token cancelled when the connection's background activity stops.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    /// The Close frame received from the peer, if any.
    #[must_use]
    pub fn peer_close(&self) -> Option<CloseFrame> {
        self.inner.peer_close.lock().clone()
    }

    /// Resolves once the connection is torn down.
    pub async fn closed(&self) {
        self.inner.closed.cancelled().await;
    }

    pub(crate) fn config(&self) -> &Config {
        &self.inner.config
    }

    pub(crate) fn observers(&self) -> &Observers {
        &self.inner.observers
    }

    /// Handshaking -> Open. False if the connection already moved on.
    pub(crate) fn mark_open(&self) -> bool {
        self.inner
            .state
            .transition(ConnectionState::Handshaking, ConnectionState::Open)
    }

    pub(crate) fn attach_scheduler(&self, scheduler: Scheduler) {
        *self.inner.scheduler.lock() = Some(scheduler);
    }

    /// Send a text frame.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConnectionClosed` if the connection is not open.
    pub async fn send_text(&self, text: impl Into<String>) -> Result<SendStatus> {
        self.send_frame(Frame::text(text)).await
    }

    /// Send a binary frame.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConnectionClosed` if the connection is not open.
    pub async fn send_binary(&self, data: impl Into<bytes::Bytes>) -> Result<SendStatus> {
        self.send_frame(Frame::binary(data)).await
    }

    /// Send a ping frame.
    ///
    /// # Errors
    ///
    /// - `Error::ConnectionClosed` if the connection is not open
    /// - `Error::ControlFrameTooLarge` for payloads over 125 bytes
    pub async fn send_ping(&self, payload: impl Into<bytes::Bytes>) -> Result<SendStatus> {
        self.send_frame(Frame::ping(payload)).await
    }

    /// Send an unsolicited pong frame.
    ///
    /// # Errors
    ///
    /// - `Error::ConnectionClosed` if the connection is not open
    /// - `Error::ControlFrameTooLarge` for payloads over 125 bytes
    pub async fn send_pong(&self, payload: impl Into<bytes::Bytes>) -> Result<SendStatus> {
        self.send_frame(Frame::pong(payload)).await
    }

    /// Send an arbitrary frame.
    ///
    /// A Close frame starts the close handshake, as [`Connection::close`]
    /// does, but without waiting for it to finish. A `FatalError` tears the
    /// connection down.
    ///
    /// # Errors
    ///
    /// - `Error::ConnectionClosed` if the connection is not open
    /// - validation errors from [`Frame::validate`]
    pub async fn send_frame(&self, frame: Frame) -> Result<SendStatus> {
        if !self.state().can_send() {
            return Err(self.closed_error());
        }
        frame.validate()?;

        if frame.opcode() == OpCode::Close {
            let close = frame.close_frame()?;
            let code = close.as_ref().map(|c| c.code.as_u16());
            let reason = close.map(|c| c.reason).unwrap_or_default();
            return Ok(self.begin_close(code, &reason).await);
        }

        let status = self.transmit(&frame).await;
        if status == SendStatus::FatalError {
            self.teardown("fatal send error").await;
        }
        Ok(status)
    }

    /// Close the connection.
    ///
    /// Sends one Close frame, waits for the peer's Close (at most
    /// `Timeouts::close`) and releases the transport. Calling it on a
    /// connection that is already closing or closed just waits for teardown.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidCloseCode` for codes that must not be sent.
    pub async fn close(&self, code: CloseCode, reason: &str) -> Result<()> {
        if !code.is_valid() {
            return Err(Error::InvalidCloseCode(code.as_u16()));
        }

        match self.state() {
            ConnectionState::Open => {
                self.begin_close(Some(code.as_u16()), reason).await;
            }
            ConnectionState::Closing => {}
            ConnectionState::Handshaking => {
                self.teardown("closed before open").await;
            }
            ConnectionState::Closed => return Ok(()),
        }

        self.closed().await;
        Ok(())
    }

    fn closed_error(&self) -> Error {
        let code = self.inner.peer_close.lock().as_ref().map(|c| c.code.as_u16());
        Error::ConnectionClosed(code)
    }

    /// Write a frame and notify observers. No state checks.
    pub(crate) async fn transmit(&self, frame: &Frame) -> SendStatus {
        let status = self.inner.gate.send_frame(frame).await;
        if status.is_success() {
            self.observers()
                .notify("frame_sent", |o| o.on_frame_sent(self, frame));
        }
        status
    }

    /// Send the single Close frame of this session. Later calls send nothing.
    async fn send_close_once(&self, frame: &Frame) -> SendStatus {
        if self.inner.close_sent.swap(true, Ordering::AcqRel) {
            return SendStatus::Success;
        }
        self.transmit(frame).await
    }

    /// Open -> Closing: send our Close and arm the close watchdog.
    pub(crate) async fn begin_close(&self, code: Option<u16>, reason: &str) -> SendStatus {
        if !self
            .inner
            .state
            .transition(ConnectionState::Open, ConnectionState::Closing)
        {
            return SendStatus::Error;
        }

        debug!(remote = %self.inner.remote_addr, code = ?code, reason, "closing");
        let status = self.send_close_once(&Frame::close(code, reason)).await;
        if status == SendStatus::FatalError {
            self.teardown("close frame could not be sent").await;
        } else {
            self.spawn_close_watchdog();
        }
        status
    }

    fn spawn_close_watchdog(&self) {
        let conn = self.clone();
        let timeout = self.inner.config.timeouts.close;
        tokio::spawn(async move {
            tokio::select! {
                () = conn.inner.closed.cancelled() => {}
                () = tokio::time::sleep(timeout) => {
                    debug!(remote = %conn.inner.remote_addr, "peer did not answer Close in time");
                    conn.teardown("close timeout").await;
                }
            }
        });
    }

    /// The peer sent Close: echo it once (if we have not sent ours) and tear down.
    pub(crate) async fn handle_peer_close(&self, frame: Option<CloseFrame>) {
        let echo = match &frame {
            Some(close) => Frame::close(Some(close.code.as_u16()), ""),
            None => Frame::close(None, ""),
        };
        *self.inner.peer_close.lock() = frame;

        if self
            .inner
            .state
            .transition(ConnectionState::Open, ConnectionState::Closing)
        {
            self.send_close_once(&echo).await;
        }
        self.teardown("peer closed").await;
    }

    /// Protocol failure: best-effort Close with `code`, then tear down.
    pub(crate) async fn fail(&self, code: u16, reason: &str) {
        if self
            .inner
            .state
            .transition(ConnectionState::Open, ConnectionState::Closing)
        {
            self.send_close_once(&Frame::close(Some(code), reason)).await;
        }
        self.teardown(reason).await;
    }

    /// Enter Closed and release everything. Idempotent.
    pub(crate) async fn teardown(&self, reason: &str) {
        if self.inner.state.close() == ConnectionState::Closed {
            return;
        }

        info!(remote = %self.inner.remote_addr, reason, "connection closed");
        self.inner.cancel.cancel();
        let scheduler = self.inner.scheduler.lock().take();
        if let Some(scheduler) = scheduler {
            scheduler.stop();
        }
        self.inner.gate.shutdown().await;
        self.inner.closed.cancel();
        self.observers().notify("closed", |o| o.on_closed(self));
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state())
            .field("local_addr", &self.inner.local_addr)
            .field("remote_addr", &self.inner.remote_addr)
            .field("subprotocol", &self.inner.subprotocol)
            .finish_non_exhaustive()
    }
}
