//! The receive loop: reads frames off the stream and dispatches them.

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, trace, warn};

use crate::connection::Connection;
use crate::connection::gate::SendStatus;
use crate::error::Error;
use crate::protocol::{Frame, MessageAssembler, OpCode, ParseOptions, Parsed};

enum Flow {
    Continue,
    Stop,
}

/// Spawn the receive loop for `conn`.
///
/// `pending` holds bytes that arrived together with the handshake response.
pub(crate) fn spawn<R>(conn: Connection, reader: R, pending: BytesMut) -> tokio::task::JoinHandle<()>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    tokio::spawn(run(conn, reader, pending))
}

/// Run until the peer closes, the stream fails or the connection is cancelled.
pub(crate) async fn run<R>(conn: Connection, mut reader: R, mut pending: BytesMut)
where
    R: AsyncRead + Unpin,
{
    let config = conn.config().clone();
    let options = ParseOptions::server_frames(&config.limits);
    let mut assembler = MessageAssembler::new(config.limits.clone());
    let cancel = conn.cancellation_token();

    'read: loop {
        loop {
            match Frame::parse(&pending, &options) {
                Ok(Parsed::Frame { frame, consumed }) => {
                    pending.advance(consumed);
                    if let Flow::Stop = dispatch(&conn, &mut assembler, frame).await {
                        return;
                    }
                }
                Ok(Parsed::Unexpected { opcode, consumed }) => {
                    pending.advance(consumed);
                    warn!(remote = %conn.remote_addr(), opcode, "unexpected opcode");
                    conn.observers()
                        .notify("unexpected", |o| o.on_unexpected(&conn, opcode));
                    if config.close_on_protocol_violation && conn.is_open() {
                        conn.begin_close(Some(1002), "unexpected opcode").await;
                    }
                }
                Ok(Parsed::Incomplete { needed }) => {
                    trace!(needed, buffered = pending.len(), "waiting for more bytes");
                    break;
                }
                Err(e) => {
                    protocol_failure(&conn, &e).await;
                    return;
                }
            }
        }

        if cancel.is_cancelled() {
            break;
        }

        pending.reserve(config.read_buffer_size);
        let read = tokio::select! {
            () = cancel.cancelled() => break 'read,
            read = tokio::time::timeout(config.timeouts.read, reader.read_buf(&mut pending)) => read,
        };

        match read {
            // Idle: no data within the read timeout
            Err(_) => continue,
            Ok(Ok(0)) => {
                debug!(remote = %conn.remote_addr(), "peer closed the stream");
                break;
            }
            Ok(Ok(n)) => trace!(len = n, "read"),
            Ok(Err(e)) => {
                warn!(remote = %conn.remote_addr(), error = %e, "read failed");
                break;
            }
        }
    }

    conn.teardown("receive loop ended").await;
}

async fn dispatch(conn: &Connection, assembler: &mut MessageAssembler, frame: Frame) -> Flow {
    if let Err(e) = frame.validate() {
        protocol_failure(conn, &e).await;
        return Flow::Stop;
    }

    trace!(opcode = %frame.opcode(), len = frame.payload().len(), fin = frame.fin(), "frame");

    match frame.opcode() {
        OpCode::Text | OpCode::Binary | OpCode::Continuation => match assembler.push(&frame) {
            Ok(Some(message)) if message.opcode == OpCode::Text => match message.into_text() {
                Ok(text) => {
                    conn.observers().notify("text", |o| o.on_text(conn, &text));
                    Flow::Continue
                }
                Err(e) => {
                    protocol_failure(conn, &e).await;
                    Flow::Stop
                }
            },
            Ok(Some(message)) => {
                let data = message.into_binary();
                conn.observers().notify("binary", |o| o.on_binary(conn, &data));
                Flow::Continue
            }
            Ok(None) => Flow::Continue,
            Err(e) => {
                protocol_failure(conn, &e).await;
                Flow::Stop
            }
        },
        OpCode::Ping => {
            conn.observers()
                .notify("ping", |o| o.on_ping(conn, frame.payload()));
            if !conn.is_open() {
                return Flow::Continue;
            }
            let pong = Frame::pong(frame.into_payload());
            if conn.transmit(&pong).await == SendStatus::FatalError {
                conn.fail(1002, "pong could not be sent").await;
                return Flow::Stop;
            }
            Flow::Continue
        }
        OpCode::Pong => {
            conn.observers()
                .notify("pong", |o| o.on_pong(conn, frame.payload()));
            Flow::Continue
        }
        OpCode::Close => {
            let close = match frame.close_frame() {
                Ok(close) => close,
                Err(e) => {
                    protocol_failure(conn, &e).await;
                    return Flow::Stop;
                }
            };
            debug!(
                remote = %conn.remote_addr(),
                code = ?close.as_ref().map(|c| c.code.as_u16()),
                "close received"
            );
            conn.observers()
                .notify("close", |o| o.on_close(conn, close.as_ref()));
            conn.handle_peer_close(close).await;
            Flow::Stop
        }
    }
}

async fn protocol_failure(conn: &Connection, err: &Error) {
    warn!(remote = %conn.remote_addr(), error = %err, code = err.close_code(), "protocol error");
    conn.fail(err.close_code(), "protocol error").await;
}
