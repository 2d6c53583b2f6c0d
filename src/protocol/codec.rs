//! Message-level frame codec.
//!
//! [`FrameEncoder`] turns one outgoing payload into one masked frame.
//! [`FrameDecoder`] buffers inbound bytes and yields complete messages,
//! reassembling continuation frames. Decoder output depends only on the
//! concatenated input, never on how that input was split across `feed` calls.

use bytes::{Buf, Bytes, BytesMut};

use crate::config::Limits;
use crate::error::{Error, Result};
use crate::message::{CloseFrame, Message, MessageKind};
use crate::protocol::frame::{Frame, MAX_CONTROL_FRAME_PAYLOAD};
use crate::protocol::mask::MaskGenerator;
use crate::protocol::OpCode;

/// Handshake versions whose framing this codec speaks (hybi-08 and RFC 6455).
const SUPPORTED_VERSIONS: [u8; 2] = [8, 13];

/// Encodes outgoing client messages.
#[derive(Debug, Default)]
pub struct FrameEncoder {
    masks: MaskGenerator,
}

impl FrameEncoder {
    /// Create an encoder with a freshly seeded mask generator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode `payload` as a single masked frame of the given kind.
    ///
    /// # Errors
    ///
    /// - `Error::ProtocolViolation` for a handshake version this codec cannot frame
    /// - `Error::InvalidUtf8` if a text payload is not UTF-8
    /// - `Error::ControlFrameTooLarge` if a control payload exceeds 125 bytes
    pub fn encode(&mut self, payload: &[u8], kind: MessageKind, version: u8) -> Result<Bytes> {
        if !SUPPORTED_VERSIONS.contains(&version) {
            return Err(Error::ProtocolViolation(format!(
                "Unsupported protocol version: {version}"
            )));
        }

        let opcode = kind.opcode();
        if opcode == OpCode::Text {
            std::str::from_utf8(payload)?;
        }
        if opcode.is_control() && payload.len() > MAX_CONTROL_FRAME_PAYLOAD {
            return Err(Error::ControlFrameTooLarge(payload.len()));
        }

        let frame = Frame::new(true, opcode, payload.to_vec());
        let mut out = BytesMut::with_capacity(frame.wire_size(true));
        frame.write(&mut out, Some(self.masks.next_key()));
        Ok(out.freeze())
    }
}

#[derive(Debug)]
enum Assembly {
    Idle,
    Collecting {
        opcode: OpCode,
        payload: Vec<u8>,
        fragments: usize,
    },
    /// Dropping the rest of a message that already failed a limit check.
    Discarding,
}

/// Decodes server frames into messages.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    limits: Limits,
    assembly: Assembly,
}

impl FrameDecoder {
    /// Create a decoder enforcing `limits`.
    #[must_use]
    pub fn new(limits: Limits) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            limits,
            assembly: Assembly::Idle,
        }
    }

    /// Append inbound bytes.
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Append a single inbound byte.
    pub fn push(&mut self, byte: u8) {
        self.buffer.extend_from_slice(&[byte]);
    }

    /// Number of buffered bytes not yet decoded.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Decode the next complete message, if one is buffered.
    ///
    /// Call repeatedly until it returns `Ok(None)` to drain everything that
    /// the bytes fed so far contain.
    ///
    /// # Errors
    ///
    /// Frame header violations and fragmentation errors leave the decoder
    /// unusable ([`Error::is_fatal`]). `InvalidUtf8`, `MessageTooLarge` and
    /// `TooManyFragments` drop only the offending message.
    pub fn next_message(&mut self) -> Result<Option<Message>> {
        loop {
            let (frame, consumed) = match Frame::parse(&self.buffer, &self.limits) {
                Ok(parsed) => parsed,
                Err(Error::IncompleteFrame { .. }) => return Ok(None),
                Err(err) => return Err(err),
            };
            self.buffer.advance(consumed);

            if let Some(message) = self.accept_frame(frame)? {
                return Ok(Some(message));
            }
        }
    }

    fn accept_frame(&mut self, frame: Frame) -> Result<Option<Message>> {
        match frame.opcode {
            OpCode::Ping => Ok(Some(Message::Ping(frame.into_payload()))),
            OpCode::Pong => Ok(Some(Message::Pong(frame.into_payload()))),
            OpCode::Close => Ok(Some(Message::Close(CloseFrame::parse(frame.payload())))),
            OpCode::Text | OpCode::Binary => {
                if !matches!(self.assembly, Assembly::Idle) {
                    return Err(Error::ProtocolViolation(
                        "Expected continuation frame".into(),
                    ));
                }
                self.assembly = Assembly::Collecting {
                    opcode: frame.opcode,
                    payload: Vec::new(),
                    fragments: 0,
                };
                self.extend(frame)
            }
            OpCode::Continuation => match self.assembly {
                Assembly::Idle => Err(Error::ProtocolViolation(
                    "Unexpected continuation frame".into(),
                )),
                Assembly::Discarding => {
                    if frame.fin {
                        self.assembly = Assembly::Idle;
                    }
                    Ok(None)
                }
                Assembly::Collecting { .. } => self.extend(frame),
            },
        }
    }

    fn extend(&mut self, frame: Frame) -> Result<Option<Message>> {
        let Assembly::Collecting {
            payload, fragments, ..
        } = &mut self.assembly
        else {
            return Ok(None);
        };

        *fragments += 1;
        let checked = self
            .limits
            .check_fragment_count(*fragments)
            .and_then(|()| self.limits.check_message_size(payload.len() + frame.payload().len()));
        if let Err(err) = checked {
            self.assembly = if frame.fin {
                Assembly::Idle
            } else {
                Assembly::Discarding
            };
            return Err(err);
        }

        payload.extend_from_slice(frame.payload());
        if !frame.fin {
            return Ok(None);
        }

        let Assembly::Collecting {
            opcode, payload, ..
        } = std::mem::replace(&mut self.assembly, Assembly::Idle)
        else {
            return Ok(None);
        };
        match opcode {
            OpCode::Text => String::from_utf8(payload)
                .map(|text| Some(Message::Text(text)))
                .map_err(|_| Error::InvalidUtf8),
            _ => Ok(Some(Message::Binary(payload))),
        }
    }
}
