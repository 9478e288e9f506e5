//! WebSocket protocol core (RFC 6455): framing, reassembly and the opening handshake.

pub mod assembler;
pub mod auth;
pub mod close;
pub mod frame;
pub mod handshake;
pub mod mask;
pub mod opcode;

pub use assembler::{AssembledMessage, MessageAssembler};
pub use auth::{HashAlgorithm, SignatureChallenge, SigningKey};
pub use close::{CloseCode, CloseFrame};
pub use frame::{Frame, MaskPolicy, ParseOptions, Parsed};
pub use handshake::{
    HandshakeOutcome, HandshakeRequest, HandshakeResponse, Headers, WS_GUID, compute_accept_key,
};
pub use mask::{apply_mask, apply_mask_fast, generate_mask_key};
pub use opcode::OpCode;
