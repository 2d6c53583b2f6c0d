//! WebSocket protocol layer (RFC 6455): handshake and frame codecs.

pub mod codec;
pub mod frame;
pub mod handshake;
pub mod mask;
pub mod opcode;

pub use codec::{FrameDecoder, FrameEncoder};
pub use frame::Frame;
pub use handshake::{ClientHandshake, Negotiated, WS_GUID, WS_VERSION, compute_accept_key};
pub use mask::apply_mask;
pub use opcode::OpCode;
