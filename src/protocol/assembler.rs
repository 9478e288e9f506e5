//! Reassembly of fragmented data messages (RFC 6455 Section 5.4).

use bytes::{Bytes, BytesMut};

use crate::config::Limits;
use crate::error::{Error, Result};
use crate::protocol::{Frame, OpCode};

/// Reassembles fragmented WebSocket messages.
///
/// Control frames may arrive between fragments; they are not part of the
/// message and are ignored here.
#[derive(Debug)]
pub struct MessageAssembler {
    buffer: BytesMut,
    fragment_count: usize,
    opcode: Option<OpCode>,
    limits: Limits,
}

impl MessageAssembler {
    /// Create an assembler bounded by `limits`.
    #[must_use]
    pub fn new(limits: Limits) -> Self {
        Self {
            buffer: BytesMut::new(),
            fragment_count: 0,
            opcode: None,
            limits,
        }
    }

    /// Add a frame to the message being assembled.
    ///
    /// Returns `Some(message)` once the final fragment has arrived.
    ///
    /// # Errors
    ///
    /// - `Error::ProtocolViolation` on a continuation with no message in
    ///   progress, or a new data frame while one is in progress
    /// - `Error::TooManyFragments` / `Error::MessageTooLarge` past the limits
    /// - `Error::InvalidUtf8` if a completed text message is not UTF-8
    pub fn push(&mut self, frame: &Frame) -> Result<Option<AssembledMessage>> {
        let opcode = frame.opcode();
        if opcode.is_control() {
            return Ok(None);
        }

        if opcode == OpCode::Continuation {
            if self.opcode.is_none() {
                return Err(Error::ProtocolViolation(
                    "Unexpected continuation frame".into(),
                ));
            }
        } else {
            if self.opcode.is_some() {
                return Err(Error::ProtocolViolation(
                    "Expected continuation frame".into(),
                ));
            }
            self.opcode = Some(opcode);
        }

        self.limits.check_fragment_count(self.fragment_count + 1)?;
        self.limits
            .check_message_size(self.buffer.len() + frame.payload().len())?;

        self.buffer.extend_from_slice(frame.payload());
        self.fragment_count += 1;

        if !frame.fin() {
            return Ok(None);
        }

        let Some(opcode) = self.opcode.take() else {
            return Ok(None);
        };
        let payload = self.buffer.split().freeze();
        self.fragment_count = 0;

        if opcode == OpCode::Text {
            std::str::from_utf8(&payload)?;
        }

        Ok(Some(AssembledMessage { opcode, payload }))
    }
}

/// A fully assembled WebSocket message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledMessage {
    /// `Text` or `Binary`.
    pub opcode: OpCode,
    /// Concatenated payload of all fragments.
    pub payload: Bytes,
}

impl AssembledMessage {
    /// Convert into a `String`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUtf8` if the payload is not UTF-8.
    pub fn into_text(self) -> Result<String> {
        String::from_utf8(self.payload.to_vec()).map_err(|_| Error::InvalidUtf8)
    }

    /// Take the raw payload.
    #[must_use]
    pub fn into_binary(self) -> Bytes {
        self.payload
    }
}
