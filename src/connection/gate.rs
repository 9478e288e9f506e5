//! Serialized access to the write half of a connection.

use std::io::ErrorKind;
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::protocol::Frame;

/// Outcome of one send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    /// All bytes were written and flushed.
    Success,
    /// The write failed but the connection may still be usable.
    Error,
    /// The transport is gone; the connection must be torn down.
    FatalError,
}

impl SendStatus {
    /// Classify an I/O error from a write.
    #[must_use]
    pub fn from_io_error(err: &std::io::Error) -> Self {
        match err.kind() {
            ErrorKind::ConnectionReset
            | ErrorKind::BrokenPipe
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::UnexpectedEof
            | ErrorKind::WriteZero => SendStatus::FatalError,
            _ => SendStatus::Error,
        }
    }

    /// Whether the send succeeded.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, SendStatus::Success)
    }
}

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Write half guarded so that one frame's bytes are contiguous on the wire.
pub struct SendGate {
    writer: Mutex<Option<BoxedWriter>>,
    write_timeout: Duration,
    slow_write: Option<Duration>,
}

impl SendGate {
    /// Wrap a writer.
    ///
    /// With `slow_write` set, bytes are written one at a time with that delay
    /// between them.
    pub fn new<W>(writer: W, write_timeout: Duration, slow_write: Option<Duration>) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            writer: Mutex::new(Some(Box::new(writer))),
            write_timeout,
            slow_write,
        }
    }

    /// Serialize `frame` with a fresh mask and write it.
    pub async fn send_frame(&self, frame: &Frame) -> SendStatus {
        self.send_bytes(&frame.serialize_masked()).await
    }

    /// Write `bytes` as one uninterrupted unit.
    ///
    /// A writer that has been shut down reports `FatalError`.
    pub async fn send_bytes(&self, bytes: &[u8]) -> SendStatus {
        let mut guard = self.writer.lock().await;
        let Some(writer) = guard.as_mut() else {
            return SendStatus::FatalError;
        };

        let write = Self::write_all(writer, bytes, self.slow_write);
        match tokio::time::timeout(self.write_timeout, write).await {
            Ok(Ok(())) => SendStatus::Success,
            Ok(Err(e)) => {
                let status = SendStatus::from_io_error(&e);
                warn!(error = %e, ?status, len = bytes.len(), "write failed");
                status
            }
            Err(_) => {
                warn!(timeout = ?self.write_timeout, len = bytes.len(), "write timed out");
                SendStatus::Error
            }
        }
    }

    async fn write_all(
        writer: &mut BoxedWriter,
        bytes: &[u8],
        slow_write: Option<Duration>,
    ) -> std::io::Result<()> {
        match slow_write {
            None => writer.write_all(bytes).await?,
            Some(delay) => {
                for byte in bytes {
                    writer.write_all(std::slice::from_ref(byte)).await?;
                    writer.flush().await?;
                    tokio::time::sleep(delay).await;
                }
            }
        }
        writer.flush().await
    }

    /// Shut the writer down. Later sends report `FatalError`. Idempotent.
    pub async fn shutdown(&self) {
        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            match tokio::time::timeout(self.write_timeout, writer.shutdown()).await {
                Ok(Ok(())) => debug!("writer shut down"),
                Ok(Err(e)) => debug!(error = %e, "writer shutdown failed"),
                Err(_) => debug!("writer shutdown timed out"),
            }
        }
    }

    /// Whether the writer has been shut down.
    pub async fn is_shut_down(&self) -> bool {
        self.writer.lock().await.is_none()
    }
}

impl std::fmt::Debug for SendGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendGate")
            .field("write_timeout", &self.write_timeout)
            .field("slow_write", &self.slow_write)
            .finish_non_exhaustive()
    }
}
