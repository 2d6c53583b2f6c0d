//! WebSocket frame parsing and serialization (RFC 6455).
//!
//! Parsing is written for the client side: server frames must arrive
//! unmasked, and every header is checked against [`Limits`] as soon as it is
//! complete, before the payload has been buffered.

use bytes::{BufMut, BytesMut};

use crate::config::Limits;
use crate::error::{Error, Result};
use crate::protocol::OpCode;
use crate::protocol::mask::apply_mask;

/// Maximum payload size for control frames (RFC 6455).
pub const MAX_CONTROL_FRAME_PAYLOAD: usize = 125;

#[derive(Debug, Clone)]
struct FrameHeader {
    fin: bool,
    opcode: OpCode,
    payload_len: usize,
    header_len: usize,
}

/// Parse and validate a frame header from the start of `buf`.
///
/// # Errors
///
/// - `Error::IncompleteFrame` if the header is not fully buffered yet
/// - `Error::ReservedOpcode` / `Error::InvalidOpcode` for unknown opcodes
/// - `Error::MaskedServerFrame` if the server masked its frame
/// - `Error::ReservedBitsSet` if any RSV bit is set
/// - `Error::FrameTooLarge` if the payload exceeds `limits.max_frame_size`
/// - `Error::FragmentedControlFrame` / `Error::ControlFrameTooLarge` for
///   malformed control frames
fn parse_header(buf: &[u8], limits: &Limits) -> Result<FrameHeader> {
    if buf.len() < 2 {
        return Err(Error::IncompleteFrame {
            needed: 2 - buf.len(),
        });
    }

    let byte0 = buf[0];
    let byte1 = buf[1];

    let fin = (byte0 & 0x80) != 0;
    let opcode = OpCode::from_u8(byte0 & 0x0F)?;
    let masked = (byte1 & 0x80) != 0;

    if masked {
        return Err(Error::MaskedServerFrame);
    }
    if byte0 & 0x70 != 0 {
        return Err(Error::ReservedBitsSet);
    }

    let (payload_len, header_len) = match byte1 & 0x7F {
        len @ 0..=125 => (len as usize, 2),
        126 => {
            if buf.len() < 4 {
                return Err(Error::IncompleteFrame {
                    needed: 4 - buf.len(),
                });
            }
            (u16::from_be_bytes([buf[2], buf[3]]) as usize, 4)
        }
        _ => {
            if buf.len() < 10 {
                return Err(Error::IncompleteFrame {
                    needed: 10 - buf.len(),
                });
            }
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&buf[2..10]);
            let len_u64 = u64::from_be_bytes(raw);
            let len = usize::try_from(len_u64).map_err(|_| Error::PayloadTooLargeForPlatform {
                size: len_u64,
                max: usize::MAX as u64,
            })?;
            (len, 10)
        }
    };

    if opcode.is_control() {
        if !fin {
            return Err(Error::FragmentedControlFrame);
        }
        if payload_len > MAX_CONTROL_FRAME_PAYLOAD {
            return Err(Error::ControlFrameTooLarge(payload_len));
        }
    }
    limits.check_frame_size(payload_len)?;

    Ok(FrameHeader {
        fin,
        opcode,
        payload_len,
        header_len,
    })
}

/// A single WebSocket frame.
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-------+-+-------------+-------------------------------+
/// |F|R|R|R| opcode |M| Payload len |    Extended payload length    |
/// |I|S|S|S|  (4)   |A|     (7)     |             (16/64)           |
/// |N|V|V|V|       |S|             |   (if payload len==126/127)   |
/// | |1|2|3|       |K|             |                               |
/// +-+-+-+-+-------+-+-------------+-------------------------------+
/// |                         Masking key (if present)              |
/// +---------------------------------------------------------------+
/// |                     Payload data                              |
/// +---------------------------------------------------------------+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Final fragment flag.
    pub fin: bool,
    /// Frame opcode.
    pub opcode: OpCode,
    payload: Vec<u8>,
}

impl Frame {
    /// Create a new frame.
    #[must_use]
    pub fn new(fin: bool, opcode: OpCode, payload: Vec<u8>) -> Self {
        Self {
            fin,
            opcode,
            payload,
        }
    }

    /// Create a close frame with optional status code and reason.
    #[must_use]
    pub fn close(code: Option<u16>, reason: &str) -> Self {
        let payload = match code {
            Some(code) => {
                let mut data = code.to_be_bytes().to_vec();
                data.extend_from_slice(reason.as_bytes());
                data
            }
            None => Vec::new(),
        };
        Self::new(true, OpCode::Close, payload)
    }

    /// Get the payload bytes.
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Take ownership of the payload.
    #[must_use]
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Parse one server frame from the front of `buf`.
    ///
    /// Returns the frame and the number of bytes consumed.
    ///
    /// # Errors
    ///
    /// `Error::IncompleteFrame` while more bytes are needed, otherwise any
    /// header validation error (see the module documentation).
    pub fn parse(buf: &[u8], limits: &Limits) -> Result<(Self, usize)> {
        let header = parse_header(buf, limits)?;

        let total_size = header.header_len.checked_add(header.payload_len).ok_or(
            Error::PayloadTooLargeForPlatform {
                size: header.payload_len as u64,
                max: usize::MAX as u64,
            },
        )?;

        if buf.len() < total_size {
            return Err(Error::IncompleteFrame {
                needed: total_size - buf.len(),
            });
        }

        let payload = buf[header.header_len..total_size].to_vec();
        Ok((Self::new(header.fin, header.opcode, payload), total_size))
    }

    /// Append the wire encoding of this frame to `out`.
    ///
    /// Client frames must always carry a `mask`.
    pub fn write(&self, out: &mut BytesMut, mask: Option<[u8; 4]>) {
        let payload_len = self.payload.len();
        out.reserve(self.wire_size(mask.is_some()));

        let mut byte0 = self.opcode.as_u8();
        if self.fin {
            byte0 |= 0x80;
        }
        out.put_u8(byte0);

        let mask_bit = if mask.is_some() { 0x80 } else { 0x00 };
        if payload_len <= 125 {
            out.put_u8(mask_bit | payload_len as u8);
        } else if payload_len <= 65535 {
            out.put_u8(mask_bit | 126);
            out.put_u16(payload_len as u16);
        } else {
            out.put_u8(mask_bit | 127);
            out.put_u64(payload_len as u64);
        }

        let start = match mask {
            Some(key) => {
                out.put_slice(&key);
                out.len()
            }
            None => out.len(),
        };
        out.put_slice(&self.payload);

        if let Some(key) = mask {
            apply_mask(&mut out[start..], key);
        }
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
