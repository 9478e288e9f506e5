//! Property-based tests for frame encoding, parsing and masking.
//!
//! These tests use proptest to fuzz the frame codec and the handshake
//! response parser.

use proptest::prelude::*;
use wsconn::protocol::{
    Frame, HandshakeResponse, MaskPolicy, OpCode, ParseOptions, Parsed, apply_mask,
};

fn data_opcode_strategy() -> impl Strategy<Value = OpCode> {
    prop_oneof![
        Just(OpCode::Text),
        Just(OpCode::Binary),
        Just(OpCode::Continuation),
    ]
}

fn control_opcode_strategy() -> impl Strategy<Value = OpCode> {
    prop_oneof![Just(OpCode::Close), Just(OpCode::Ping), Just(OpCode::Pong),]
}

fn any_opcode_strategy() -> impl Strategy<Value = OpCode> {
    prop_oneof![
        Just(OpCode::Continuation),
        Just(OpCode::Text),
        Just(OpCode::Binary),
        Just(OpCode::Close),
        Just(OpCode::Ping),
        Just(OpCode::Pong),
    ]
}

fn options(mask_policy: MaskPolicy) -> ParseOptions {
    ParseOptions {
        max_frame_size: 1 << 20,
        mask_policy,
    }
}

fn parse_one(buf: &[u8], mask_policy: MaskPolicy) -> (Frame, usize) {
    match Frame::parse(buf, &options(mask_policy)).unwrap() {
        Parsed::Frame { frame, consumed } => (frame, consumed),
        other => panic!("expected a frame, got {:?}", other),
    }
}

proptest! {
    // Server-direction frames: unmasked, parsed with masks forbidden
    #[test]
    fn test_roundtrip_unmasked(
        fin in any::<bool>(),
        opcode in data_opcode_strategy(),
        payload in prop::collection::vec(any::<u8>(), 0..1000)
    ) {
        let frame = Frame::new(fin, opcode, payload.clone());
        let bytes = frame.serialize(None);

        let (parsed, consumed) = parse_one(&bytes, MaskPolicy::Forbidden);
        prop_assert_eq!(consumed, bytes.len());
        prop_assert_eq!(parsed.payload(), payload.as_slice());
        prop_assert_eq!(parsed.fin(), fin);
        prop_assert_eq!(parsed.opcode(), opcode);
        prop_assert!(parsed.mask().is_none());
    }

    // Client-direction frames: the mask is carried and XOR recovers the payload
    #[test]
    fn test_roundtrip_masked(
        fin in any::<bool>(),
        opcode in data_opcode_strategy(),
        payload in prop::collection::vec(any::<u8>(), 0..500),
        mask in any::<[u8; 4]>()
    ) {
        let frame = Frame::new(fin, opcode, payload.clone());
        let bytes = frame.serialize(Some(mask));
        prop_assert_eq!(bytes[1] & 0x80, 0x80);

        let (parsed, _) = parse_one(&bytes, MaskPolicy::Required);
        prop_assert_eq!(parsed.mask(), Some(mask));
        prop_assert_eq!(parsed.payload(), payload.as_slice());

        // Unmasking the wire bytes gives back the payload
        let header_len = bytes.len() - payload.len();
        let mut wire = bytes[header_len..].to_vec();
        apply_mask(&mut wire, mask);
        prop_assert_eq!(wire, payload);
    }

    #[test]
    fn test_mask_reversible(
        data in prop::collection::vec(any::<u8>(), 0..2000),
        mask in any::<[u8; 4]>()
    ) {
        let mut masked = data.clone();
        apply_mask(&mut masked, mask);
        apply_mask(&mut masked, mask);
        prop_assert_eq!(data, masked);
    }

    #[test]
    fn test_serialize_masked_uses_fresh_key(
        payload in prop::collection::vec(any::<u8>(), 1..200)
    ) {
        let frame = Frame::binary(payload.clone());
        let bytes = frame.serialize_masked();
        let (parsed, _) = parse_one(&bytes, MaskPolicy::Required);
        prop_assert!(parsed.mask().is_some());
        prop_assert_eq!(parsed.payload(), payload.as_slice());
    }

    #[test]
    fn test_control_frame_size_limit(
        opcode in control_opcode_strategy(),
        payload in prop::collection::vec(any::<u8>(), 0..=125)
    ) {
        // Close payloads need a valid code; use ping-like bytes for the others
        prop_assume!(opcode != OpCode::Close || payload.is_empty());
        let frame = Frame::new(true, opcode, payload);
        prop_assert!(frame.validate().is_ok());
    }

    #[test]
    fn test_control_frame_exceeds_limit(
        opcode in control_opcode_strategy(),
        payload in prop::collection::vec(any::<u8>(), 126..256)
    ) {
        let frame = Frame::new(true, opcode, payload);
        prop_assert!(frame.validate().is_err());
    }

    #[test]
    fn test_wire_size_accuracy(
        fin in any::<bool>(),
        opcode in any_opcode_strategy(),
        payload in prop::collection::vec(any::<u8>(), 0..10000),
        masked in any::<bool>()
    ) {
        let frame = Frame::new(fin, opcode, payload);
        let mask = if masked { Some([0x12, 0x34, 0x56, 0x78]) } else { None };
        prop_assert_eq!(frame.wire_size(masked), frame.serialize(mask).len());
    }

    // Truncated input never yields a frame and never loses bytes
    #[test]
    fn test_incomplete_frame_detection(
        opcode in data_opcode_strategy(),
        payload in prop::collection::vec(any::<u8>(), 1..500),
        truncate_by in 1..50usize
    ) {
        let bytes = Frame::new(true, opcode, payload).serialize(None);
        let truncated_len = bytes.len().saturating_sub(truncate_by);
        let result = Frame::parse(&bytes[..truncated_len], &options(MaskPolicy::Forbidden)).unwrap();
        prop_assert!(
            matches!(result, Parsed::Incomplete { .. }),
            "expected Incomplete, got {:?}",
            result
        );
    }

    // Back-to-back frames parse in order and consume exactly the buffer
    #[test]
    fn test_sequential_frame_parsing(
        payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..100), 1..5)
    ) {
        let mut buf = Vec::new();
        for p in &payloads {
            buf.extend(Frame::binary(p.clone()).serialize(None));
        }

        let mut offset = 0;
        for (i, original) in payloads.iter().enumerate() {
            let (parsed, consumed) = parse_one(&buf[offset..], MaskPolicy::Forbidden);
            prop_assert_eq!(parsed.payload(), original.as_slice(), "frame {} payload mismatch", i);
            offset += consumed;
        }
        prop_assert_eq!(offset, buf.len());
    }

    #[test]
    fn test_response_parse_no_panic(data in prop::collection::vec(any::<u8>(), 0..2000)) {
        let _ = HandshakeResponse::parse(&data);
    }

    #[test]
    fn test_response_valid_variations(
        status in 100u16..600,
        reason in "[A-Za-z ]{0,20}",
        value in "[A-Za-z0-9+/=]{1,30}"
    ) {
        let head = format!("HTTP/1.1 {} {}\r\nX-Value: {}\r\n\r\n", status, reason, value);
        let response = HandshakeResponse::parse(head.as_bytes());
        prop_assert!(response.is_ok(), "valid head should parse: {:?}", response);
        let response = response.unwrap();
        prop_assert_eq!(response.status, status);
        prop_assert_eq!(response.headers.get("x-value"), Some(value.as_str()));
    }
}

mod targeted_tests {
    use super::*;

    #[test]
    fn test_length_encoding_boundaries() {
        for (len, header) in [
            (0usize, 2usize),
            (1, 2),
            (125, 2),
            (126, 4),
            (65535, 4),
            (65536, 10),
        ] {
            let frame = Frame::binary(vec![0xAB; len]);
            let bytes = frame.serialize(None);
            assert_eq!(bytes.len(), header + len, "len {}", len);

            let (parsed, consumed) = parse_one(&bytes, MaskPolicy::Forbidden);
            assert_eq!(consumed, bytes.len());
            assert_eq!(parsed.payload().len(), len);

            let masked = frame.serialize(Some([1, 2, 3, 4]));
            assert_eq!(masked.len(), header + 4 + len);
            let (parsed, _) = parse_one(&masked, MaskPolicy::Required);
            assert_eq!(parsed.payload(), frame.payload());
        }
    }

    #[test]
    fn test_all_opcodes_roundtrip() {
        for opcode in [
            OpCode::Continuation,
            OpCode::Text,
            OpCode::Binary,
            OpCode::Ping,
            OpCode::Pong,
        ] {
            let frame = Frame::new(true, opcode, b"abc".to_vec());
            let (parsed, _) = parse_one(&frame.serialize(None), MaskPolicy::Forbidden);
            assert_eq!(parsed.opcode(), opcode);
        }
        let close = Frame::close(Some(1001), "away");
        let (parsed, _) = parse_one(&close.serialize(None), MaskPolicy::Forbidden);
        assert_eq!(parsed.close_reason().unwrap(), "away");
    }

    #[test]
    fn test_mask_policies_enforced() {
        let masked = Frame::text("x").serialize(Some([9, 9, 9, 9]));
        assert!(Frame::parse(&masked, &options(MaskPolicy::Forbidden)).is_err());

        let unmasked = Frame::text("x").serialize(None);
        assert!(Frame::parse(&unmasked, &options(MaskPolicy::Required)).is_err());
        assert!(Frame::parse(&unmasked, &options(MaskPolicy::Optional)).is_ok());
    }
}
