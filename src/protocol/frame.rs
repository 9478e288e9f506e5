//! WebSocket frame parsing and serialization (RFC 6455).

use bytes::Bytes;

use crate::config::Limits;
use crate::error::{Error, Result};
use crate::protocol::OpCode;
use crate::protocol::close::{CloseCode, CloseFrame};
use crate::protocol::mask::{apply_mask, apply_mask_fast, generate_mask_key};

/// Maximum payload size for control frames (RFC 6455).
pub const MAX_CONTROL_FRAME_PAYLOAD: usize = 125;

/// Whether incoming frames may, must, or must not carry a masking key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskPolicy {
    /// Frames must not be masked (server-to-client direction).
    Forbidden,
    /// Frames must be masked (client-to-server direction).
    Required,
    /// Either is accepted.
    Optional,
}

/// Per-call parsing constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Largest payload accepted, checked as soon as the length is known.
    pub max_frame_size: usize,
    /// Masking rule for incoming frames.
    pub mask_policy: MaskPolicy,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            max_frame_size: Limits::default().max_frame_size,
            mask_policy: MaskPolicy::Optional,
        }
    }
}

impl ParseOptions {
    /// Options for frames a client receives from a server.
    #[must_use]
    pub fn server_frames(limits: &Limits) -> Self {
        Self {
            max_frame_size: limits.max_frame_size,
            mask_policy: MaskPolicy::Forbidden,
        }
    }
}

/// Result of one parse attempt over the pending buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed {
    /// A complete frame and the number of bytes it occupied.
    Frame {
        /// The decoded frame.
        frame: Frame,
        /// Bytes consumed from the front of the buffer.
        consumed: usize,
    },
    /// A complete frame whose opcode is not defined by RFC 6455.
    Unexpected {
        /// The raw 4-bit opcode.
        opcode: u8,
        /// Bytes consumed from the front of the buffer.
        consumed: usize,
    },
    /// The buffer does not yet hold a whole frame.
    Incomplete {
        /// Minimum number of additional bytes required.
        needed: usize,
    },
}

#[derive(Debug, Clone)]
struct FrameHeader {
    fin: bool,
    rsv1: bool,
    rsv2: bool,
    rsv3: bool,
    opcode: u8,
    mask: Option<[u8; 4]>,
    payload_len: usize,
    header_len: usize,
}

enum Header {
    Ready(FrameHeader),
    Incomplete(usize),
}

/// Parse the frame header from the front of `buf`.
///
/// # Errors
///
/// - `Error::PayloadTooLargeForPlatform` if the 64-bit length does not fit `usize`
#[inline]
fn parse_header(buf: &[u8]) -> Result<Header> {
    if buf.len() < 2 {
        return Ok(Header::Incomplete(2 - buf.len()));
    }

    let byte0 = buf[0];
    let byte1 = buf[1];

    let fin = (byte0 & 0x80) != 0;
    let rsv1 = (byte0 & 0x40) != 0;
    let rsv2 = (byte0 & 0x20) != 0;
    let rsv3 = (byte0 & 0x10) != 0;
    let opcode = byte0 & 0x0F;

    let masked = (byte1 & 0x80) != 0;
    let payload_len_initial = byte1 & 0x7F;

    let (payload_len, header_size) = match payload_len_initial {
        0..=125 => (payload_len_initial as usize, 2),
        126 => {
            if buf.len() < 4 {
                return Ok(Header::Incomplete(4 - buf.len()));
            }
            (u16::from_be_bytes([buf[2], buf[3]]) as usize, 4)
        }
        _ => {
            if buf.len() < 10 {
                return Ok(Header::Incomplete(10 - buf.len()));
            }
            let len_u64 = u64::from_be_bytes([
                buf[2], buf[3], buf[4], buf[5], buf[6], buf[7], buf[8], buf[9],
            ]);
            let len = usize::try_from(len_u64).map_err(|_| Error::PayloadTooLargeForPlatform {
                size: len_u64,
                max: usize::MAX as u64,
            })?;
            (len, 10)
        }
    };

    let total_header_size = if masked { header_size + 4 } else { header_size };
    if buf.len() < total_header_size {
        return Ok(Header::Incomplete(total_header_size - buf.len()));
    }

    let mask = masked.then(|| {
        [
            buf[header_size],
            buf[header_size + 1],
            buf[header_size + 2],
            buf[header_size + 3],
        ]
    });

    Ok(Header::Ready(FrameHeader {
        fin,
        rsv1,
        rsv2,
        rsv3,
        opcode,
        mask,
        payload_len,
        header_len: total_header_size,
    }))
}

/// A WebSocket frame as defined in RFC 6455.
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-------+-+-------------+-------------------------------+
/// |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
/// |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
/// |N|V|V|V|       |S|             |   (if payload len==126/127)   |
/// | |1|2|3|       |K|             |                               |
/// +-+-+-+-+-------+-+-------------+-------------------------------+
/// |                     Masking key (if present)                  |
/// +---------------------------------------------------------------+
/// |                          Payload data                         |
/// +---------------------------------------------------------------+
/// ```
///
/// Frames are immutable once built. The payload is always held unmasked;
/// a parsed frame remembers the key it arrived with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    fin: bool,
    rsv1: bool,
    rsv2: bool,
    rsv3: bool,
    opcode: OpCode,
    mask: Option<[u8; 4]>,
    payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    #[must_use]
    pub fn new(fin: bool, opcode: OpCode, payload: impl Into<Bytes>) -> Self {
        Self {
            fin,
            rsv1: false,
            rsv2: false,
            rsv3: false,
            opcode,
            mask: None,
            payload: payload.into(),
        }
    }

    /// Create a text frame.
    #[must_use]
    pub fn text(data: impl Into<String>) -> Self {
        Self::new(true, OpCode::Text, Bytes::from(data.into()))
    }

    /// Create a binary frame.
    #[must_use]
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Binary, data)
    }

    /// Create a close frame with optional status code and reason.
    ///
    /// The reason is cut at a character boundary so the payload stays within
    /// the 125-byte control frame limit.
    #[must_use]
    pub fn close(code: Option<u16>, reason: &str) -> Self {
        let payload = if let Some(code) = code {
            let mut end = reason.len().min(MAX_CONTROL_FRAME_PAYLOAD - 2);
            while !reason.is_char_boundary(end) {
                end -= 1;
            }
            let mut data = code.to_be_bytes().to_vec();
            data.extend_from_slice(&reason.as_bytes()[..end]);
            data
        } else {
            Vec::new()
        };
        Self::new(true, OpCode::Close, payload)
    }

    /// Create a ping frame.
    #[must_use]
    pub fn ping(data: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Ping, data)
    }

    /// Create a pong frame.
    #[must_use]
    pub fn pong(data: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Pong, data)
    }

    /// Final fragment flag.
    #[must_use]
    pub const fn fin(&self) -> bool {
        self.fin
    }

    /// Frame opcode.
    #[must_use]
    pub const fn opcode(&self) -> OpCode {
        self.opcode
    }

    /// Reserved bits as `(rsv1, rsv2, rsv3)`.
    #[must_use]
    pub const fn rsv(&self) -> (bool, bool, bool) {
        (self.rsv1, self.rsv2, self.rsv3)
    }

    /// The masking key the frame arrived with, if any.
    #[must_use]
    pub const fn mask(&self) -> Option<[u8; 4]> {
        self.mask
    }

    /// Get the (unmasked) payload bytes.
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Take ownership of the payload.
    #[must_use]
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Status code carried by a Close frame.
    ///
    /// Returns `None` for non-close frames and close frames without a code.
    #[must_use]
    pub fn close_code(&self) -> Option<CloseCode> {
        if self.opcode != OpCode::Close || self.payload.len() < 2 {
            return None;
        }
        Some(CloseCode::from_u16(u16::from_be_bytes([
            self.payload[0],
            self.payload[1],
        ])))
    }

    /// Reason text carried by a Close frame (empty when absent).
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUtf8` if the reason is not valid UTF-8.
    pub fn close_reason(&self) -> Result<&str> {
        if self.opcode != OpCode::Close || self.payload.len() <= 2 {
            return Ok("");
        }
        Ok(std::str::from_utf8(&self.payload[2..])?)
    }

    /// Decode a Close frame payload.
    ///
    /// Returns `Ok(None)` when the frame carries no status code.
    ///
    /// # Errors
    ///
    /// - `Error::ProtocolViolation` for a 1-byte payload or a code outside
    ///   1000-1003, 1007-1014 and 3000-4999
    /// - `Error::InvalidUtf8` if the reason is not valid UTF-8
    pub fn close_frame(&self) -> Result<Option<CloseFrame>> {
        match self.payload.len() {
            0 => Ok(None),
            1 => Err(Error::ProtocolViolation(
                "Close payload of one byte".into(),
            )),
            _ => {
                let code = self.close_code().unwrap_or(CloseCode::NoStatus);
                if !code.is_valid() {
                    return Err(Error::ProtocolViolation(format!(
                        "Invalid close code {}",
                        code
                    )));
                }
                Ok(Some(CloseFrame::new(code, self.close_reason()?)))
            }
        }
    }

    /// Parse one frame from the front of a buffer.
    ///
    /// Incomplete input is not an error: `Parsed::Incomplete` tells the caller
    /// how many more bytes are needed at minimum. Unknown opcodes are consumed
    /// and reported as `Parsed::Unexpected`.
    ///
    /// ## Errors
    ///
    /// - `Error::FrameTooLarge` if the declared length exceeds `options.max_frame_size`
    /// - `Error::MaskedServerFrame` if a mask is present under `MaskPolicy::Forbidden`
    /// - `Error::UnmaskedFrame` if no mask is present under `MaskPolicy::Required`
    /// - `Error::PayloadTooLargeForPlatform` on 64-bit lengths beyond `usize`
    #[inline]
    pub fn parse(buf: &[u8], options: &ParseOptions) -> Result<Parsed> {
        let header = match parse_header(buf)? {
            Header::Ready(header) => header,
            Header::Incomplete(needed) => return Ok(Parsed::Incomplete { needed }),
        };

        match (options.mask_policy, header.mask.is_some()) {
            (MaskPolicy::Forbidden, true) => return Err(Error::MaskedServerFrame),
            (MaskPolicy::Required, false) => return Err(Error::UnmaskedFrame),
            _ => {}
        }

        if header.payload_len > options.max_frame_size {
            return Err(Error::FrameTooLarge {
                size: header.payload_len,
                max: options.max_frame_size,
            });
        }

        let total_size = header.header_len.checked_add(header.payload_len).ok_or(
            Error::PayloadTooLargeForPlatform {
                size: header.payload_len as u64,
                max: usize::MAX as u64,
            },
        )?;

        if buf.len() < total_size {
            return Ok(Parsed::Incomplete {
                needed: total_size - buf.len(),
            });
        }

        let Some(opcode) = OpCode::from_u8(header.opcode) else {
            return Ok(Parsed::Unexpected {
                opcode: header.opcode,
                consumed: total_size,
            });
        };

        let mut data = buf[header.header_len..total_size].to_vec();
        if let Some(mask) = header.mask {
            apply_mask_fast(&mut data, mask);
        }

        let frame = Frame {
            fin: header.fin,
            rsv1: header.rsv1,
            rsv2: header.rsv2,
            rsv3: header.rsv3,
            opcode,
            mask: header.mask,
            payload: Bytes::from(data),
        };

        Ok(Parsed::Frame {
            frame,
            consumed: total_size,
        })
    }

    /// Validate the frame according to RFC 6455.
    ///
    /// # Errors
    ///
    /// - `Error::ReservedBitsSet` if RSV bits are set without extension
    /// - `Error::FragmentedControlFrame` if control frame has FIN=0
    /// - `Error::ControlFrameTooLarge` if control frame payload > 125 bytes
    pub fn validate(&self) -> Result<()> {
        if self.rsv1 || self.rsv2 || self.rsv3 {
            return Err(Error::ReservedBitsSet);
        }

        if self.opcode.is_control() {
            if !self.fin {
                return Err(Error::FragmentedControlFrame);
            }
            if self.payload.len() > MAX_CONTROL_FRAME_PAYLOAD {
                return Err(Error::ControlFrameTooLarge(self.payload.len()));
            }
        }

        Ok(())
    }

    /// Write the frame to a buffer.
    ///
    /// Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidFrame` if the buffer is too small.
    pub fn write(&self, buf: &mut [u8], mask: Option<[u8; 4]>) -> Result<usize> {
        let payload_len = self.payload.len();

        let (len_bytes, extended_len_size) = if payload_len <= 125 {
            (payload_len as u8, 0)
        } else if payload_len <= 65535 {
            (126, 2)
        } else {
            (127, 8)
        };

        let total_size = self.wire_size(mask.is_some());
        if buf.len() < total_size {
            return Err(Error::InvalidFrame(format!(
                "Buffer too small: need {} bytes, have {}",
                total_size,
                buf.len()
            )));
        }

        let mut byte0 = self.opcode.as_u8();
        if self.fin {
            byte0 |= 0x80;
        }
        if self.rsv1 {
            byte0 |= 0x40;
        }
        if self.rsv2 {
            byte0 |= 0x20;
        }
        if self.rsv3 {
            byte0 |= 0x10;
        }
        buf[0] = byte0;
        buf[1] = if mask.is_some() { len_bytes | 0x80 } else { len_bytes };

        let mut offset = 2;
        match extended_len_size {
            2 => {
                buf[offset..offset + 2].copy_from_slice(&(payload_len as u16).to_be_bytes());
                offset += 2;
            }
            8 => {
                buf[offset..offset + 8].copy_from_slice(&(payload_len as u64).to_be_bytes());
                offset += 8;
            }
            _ => {}
        }

        if let Some(mask_key) = mask {
            buf[offset..offset + 4].copy_from_slice(&mask_key);
            offset += 4;
        }

        buf[offset..offset + payload_len].copy_from_slice(&self.payload);
        if let Some(mask_key) = mask {
            apply_mask(&mut buf[offset..offset + payload_len], mask_key);
        }

        Ok(total_size)
    }

    /// Serialize the frame into a new buffer.
    #[must_use]
    pub fn serialize(&self, mask: Option<[u8; 4]>) -> Vec<u8> {
        let mut buf = vec![0u8; self.wire_size(mask.is_some())];
        // The buffer is sized by wire_size, so write cannot fail.
        let written = self.write(&mut buf, mask).unwrap_or(0);
        buf.truncate(written);
        buf
    }

    /// Serialize as a client frame with a fresh random masking key.
    #[must_use]
    pub fn serialize_masked(&self) -> Vec<u8> {
        self.serialize(Some(generate_mask_key()))
    }

    /// Calculate the size needed to write this frame.
    #[must_use]
    pub fn wire_size(&self, masked: bool) -> usize {
        let payload_len = self.payload.len();
        let extended_len_size = if payload_len <= 125 {
            0
        } else if payload_len <= 65535 {
            2
        } else {
            8
        };
        let mask_size = if masked { 4 } else { 0 };
        2 + extended_len_size + mask_size + payload_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_any(data: &[u8]) -> Result<Parsed> {
        Frame::parse(data, &ParseOptions::default())
    }

    fn expect_frame(data: &[u8]) -> (Frame, usize) {
        match parse_any(data).unwrap() {
            Parsed::Frame { frame, consumed } => (frame, consumed),
            other => panic!("expected frame, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_unmasked_text_frame() {
        // FIN=1, opcode=1 (text), unmasked, payload="Hello"
        let (frame, len) = expect_frame(&[0x81, 0x05, 0x48, 0x65, 0x6c, 0x6c, 0x6f]);
        assert_eq!(len, 7);
        assert!(frame.fin());
        assert_eq!(frame.rsv(), (false, false, false));
        assert_eq!(frame.opcode(), OpCode::Text);
        assert_eq!(frame.payload(), b"Hello");
        assert_eq!(frame.mask(), None);
    }

    #[test]
    fn test_parse_masked_text_frame() {
        let data = &[
            0x81, 0x85, // FIN + Text, MASK + len=5
            0x37, 0xfa, 0x21, 0x3d, // Mask key
            0x7f, 0x9f, 0x4d, 0x51, 0x58, // Masked "Hello"
        ];
        let (frame, len) = expect_frame(data);
        assert_eq!(len, 11);
        assert_eq!(frame.payload(), b"Hello");
        assert_eq!(frame.mask(), Some([0x37, 0xfa, 0x21, 0x3d]));
    }

    #[test]
    fn test_parse_control_frames() {
        let (close, _) = expect_frame(&[0x88, 0x02, 0x03, 0xe8]);
        assert_eq!(close.opcode(), OpCode::Close);
        assert_eq!(close.close_code(), Some(CloseCode::Normal));

        let (ping, _) = expect_frame(&[0x89, 0x04, 0x70, 0x69, 0x6e, 0x67]);
        assert_eq!(ping.opcode(), OpCode::Ping);
        assert_eq!(ping.payload(), b"ping");

        let (pong, _) = expect_frame(&[0x8a, 0x04, 0x70, 0x6f, 0x6e, 0x67]);
        assert_eq!(pong.opcode(), OpCode::Pong);
    }

    #[test]
    fn test_parse_fragmented_and_continuation() {
        let (first, _) = expect_frame(&[0x01, 0x03, 0x48, 0x65, 0x6c]);
        assert!(!first.fin());
        assert_eq!(first.opcode(), OpCode::Text);

        let (cont, _) = expect_frame(&[0x80, 0x02, 0x6c, 0x6f]);
        assert!(cont.fin());
        assert_eq!(cont.opcode(), OpCode::Continuation);
    }

    #[test]
    fn test_parse_extended_length_126() {
        let mut data = vec![0x82, 0x7e, 0x01, 0x00]; // len=256
        data.extend(vec![0xab; 256]);

        let (frame, len) = expect_frame(&data);
        assert_eq!(len, 4 + 256);
        assert_eq!(frame.payload().len(), 256);
        assert!(frame.payload().iter().all(|&b| b == 0xab));
    }

    #[test]
    fn test_parse_extended_length_127() {
        let mut data = vec![0x82, 0x7f];
        data.extend(65536u64.to_be_bytes());
        data.extend(vec![0xcd; 65536]);

        let (frame, len) = expect_frame(&data);
        assert_eq!(len, 10 + 65536);
        assert_eq!(frame.payload().len(), 65536);
    }

    #[test]
    fn test_parse_unexpected_opcode_is_consumed() {
        // FIN=1, opcode=3 (reserved), len=2
        let data = &[0x83, 0x02, 0xaa, 0xbb, 0x81, 0x00];
        let parsed = parse_any(data).unwrap();
        assert_eq!(
            parsed,
            Parsed::Unexpected {
                opcode: 0x3,
                consumed: 4
            }
        );

        let parsed = parse_any(&[0x8b, 0x00]).unwrap();
        assert!(matches!(parsed, Parsed::Unexpected { opcode: 0xB, .. }));
    }

    #[test]
    fn test_parse_incomplete() {
        assert_eq!(parse_any(&[0x81]).unwrap(), Parsed::Incomplete { needed: 1 });
        assert_eq!(
            parse_any(&[0x81, 0x05, 0x48, 0x65, 0x6c]).unwrap(),
            Parsed::Incomplete { needed: 2 }
        );
        assert_eq!(
            parse_any(&[0x82, 0x7e, 0x01]).unwrap(),
            Parsed::Incomplete { needed: 1 }
        );
        assert_eq!(
            parse_any(&[0x82, 0x7f, 0x00, 0x00, 0x00]).unwrap(),
            Parsed::Incomplete { needed: 5 }
        );
        assert!(matches!(
            parse_any(&[0x81, 0x85, 0x37, 0xfa]).unwrap(),
            Parsed::Incomplete { .. }
        ));
    }

    #[test]
    fn test_parse_mask_policy() {
        let masked = Frame::text("x").serialize(Some([1, 2, 3, 4]));
        let unmasked = Frame::text("x").serialize(None);
        let limits = Limits::default();

        let server = ParseOptions::server_frames(&limits);
        assert!(matches!(
            Frame::parse(&masked, &server),
            Err(Error::MaskedServerFrame)
        ));
        assert!(Frame::parse(&unmasked, &server).is_ok());

        let required = ParseOptions {
            mask_policy: MaskPolicy::Required,
            ..ParseOptions::default()
        };
        assert!(matches!(
            Frame::parse(&unmasked, &required),
            Err(Error::UnmaskedFrame)
        ));
    }

    #[test]
    fn test_parse_frame_too_large_before_payload_arrives() {
        let options = ParseOptions {
            max_frame_size: 100,
            mask_policy: MaskPolicy::Optional,
        };
        // Header only: declares 256 bytes, none of them present yet
        let result = Frame::parse(&[0x82, 0x7e, 0x01, 0x00], &options);
        assert!(matches!(
            result,
            Err(Error::FrameTooLarge { size: 256, max: 100 })
        ));
    }

    #[test]
    fn test_payload_exceeds_platform_max() {
        let mut data = vec![0x82, 0xFF];
        data.extend_from_slice(&u64::MAX.to_be_bytes());
        data.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);

        // Either the size limit or the platform limit rejects it; never a panic
        assert!(parse_any(&data).is_err());
    }

    #[test]
    fn test_validate() {
        assert!(Frame::text("Valid frame").validate().is_ok());
        assert!(Frame::ping(vec![0u8; 125]).validate().is_ok());
        assert!(matches!(
            Frame::new(false, OpCode::Ping, b"test".to_vec()).validate(),
            Err(Error::FragmentedControlFrame)
        ));
        assert!(matches!(
            Frame::ping(vec![0u8; 126]).validate(),
            Err(Error::ControlFrameTooLarge(126))
        ));

        // FIN=1, RSV1=1, opcode=1 (text), unmasked, len=0
        let (frame, _) = expect_frame(&[0xc1, 0x00]);
        assert_eq!(frame.rsv(), (true, false, false));
        assert!(matches!(frame.validate(), Err(Error::ReservedBitsSet)));
    }

    #[test]
    fn test_write_unmasked_text_frame() {
        let frame = Frame::text("Hello");
        let mut buf = vec![0u8; 32];
        let len = frame.write(&mut buf, None).unwrap();
        assert_eq!(len, 7);
        assert_eq!(&buf[..7], &[0x81, 0x05, 0x48, 0x65, 0x6c, 0x6c, 0x6f]);
    }

    #[test]
    fn test_write_masked_text_frame() {
        let mask = [0x37, 0xfa, 0x21, 0x3d];
        let bytes = Frame::text("Hello").serialize(Some(mask));
        assert_eq!(bytes.len(), 11);
        assert_eq!(bytes[0], 0x81);
        assert_eq!(bytes[1], 0x85);
        assert_eq!(&bytes[2..6], &mask);
        assert_eq!(&bytes[6..11], &[0x7f, 0x9f, 0x4d, 0x51, 0x58]);
    }

    #[test]
    fn test_write_extended_lengths() {
        let bytes = Frame::binary(vec![0xab; 256]).serialize(None);
        assert_eq!(bytes[1], 0x7e);
        assert_eq!(&bytes[2..4], &[0x01, 0x00]);

        let bytes = Frame::binary(vec![0xcd; 65536]).serialize(None);
        assert_eq!(bytes[1], 0x7f);
        assert_eq!(&bytes[2..10], &65536u64.to_be_bytes());
    }

    #[test]
    fn test_write_buffer_too_small() {
        let mut buf = vec![0u8; 4];
        let result = Frame::text("Hello").write(&mut buf, None);
        assert!(matches!(result, Err(Error::InvalidFrame(_))));
    }

    #[test]
    fn test_serialize_masked_sets_mask_bit() {
        let bytes = Frame::binary(vec![1, 2, 3]).serialize_masked();
        assert_eq!(bytes[1] & 0x80, 0x80);
        let mut payload = bytes[6..].to_vec();
        apply_mask(&mut payload, [bytes[2], bytes[3], bytes[4], bytes[5]]);
        assert_eq!(payload, vec![1, 2, 3]);
    }

    #[test]
    fn test_wire_size() {
        let frame = Frame::text("Hello");
        assert_eq!(frame.wire_size(false), 7);
        assert_eq!(frame.wire_size(true), 11);

        let frame = Frame::binary(vec![0u8; 256]);
        assert_eq!(frame.wire_size(false), 260);

        let frame = Frame::binary(vec![0u8; 65536]);
        assert_eq!(frame.wire_size(true), 65550);
    }

    #[test]
    fn test_close_frame_accessors() {
        let frame = Frame::close(Some(1000), "Normal closure");
        assert_eq!(frame.opcode(), OpCode::Close);
        assert_eq!(frame.close_code(), Some(CloseCode::Normal));
        assert_eq!(frame.close_reason().unwrap(), "Normal closure");
        assert_eq!(
            frame.close_frame().unwrap(),
            Some(CloseFrame::new(CloseCode::Normal, "Normal closure"))
        );

        let empty = Frame::close(None, "");
        assert_eq!(empty.close_code(), None);
        assert_eq!(empty.close_frame().unwrap(), None);

        let short = Frame::new(true, OpCode::Close, vec![0x03]);
        assert!(matches!(
            short.close_frame(),
            Err(Error::ProtocolViolation(_))
        ));

        let bad_utf8 = Frame::new(true, OpCode::Close, vec![0x03, 0xe8, 0xff, 0xfe]);
        assert!(matches!(bad_utf8.close_frame(), Err(Error::InvalidUtf8)));

        for code in [0u16, 999, 1005, 1015, 2000, 2999, 5000] {
            let invalid = Frame::close(Some(code), "");
            assert!(
                matches!(invalid.close_frame(), Err(Error::ProtocolViolation(_))),
                "code {}",
                code
            );
        }
        for code in [1003u16, 1014, 3000, 4999] {
            let frame = Frame::close(Some(code), "");
            assert_eq!(frame.close_frame().unwrap().unwrap().code.as_u16(), code);
        }
    }

    #[test]
    fn test_close_reason_truncated_to_control_limit() {
        let reason = "é".repeat(100); // 200 bytes
        let frame = Frame::close(Some(1000), &reason);
        assert!(frame.payload().len() <= MAX_CONTROL_FRAME_PAYLOAD);
        assert!(frame.validate().is_ok());
        assert!(frame.close_reason().is_ok());
    }

    #[test]
    fn test_roundtrip_masked_keeps_mask() {
        let mask = [0x12, 0x34, 0x56, 0x78];
        let bytes = Frame::text("Masked roundtrip test!").serialize(Some(mask));
        let (parsed, consumed) = expect_frame(&bytes);
        assert_eq!(consumed, bytes.len());
        assert_eq!(parsed.payload(), b"Masked roundtrip test!");
        assert_eq!(parsed.serialize(parsed.mask()), bytes);
    }
}
