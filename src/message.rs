//! Application messages, send kinds and close codes (RFC 6455).

use crate::protocol::OpCode;

/// WebSocket close status code per RFC 6455 Section 7.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum CloseCode {
    /// Normal closure (1000).
    #[default]
    Normal,
    /// Going away (1001).
    GoingAway,
    /// Protocol error (1002).
    ProtocolError,
    /// Unsupported data (1003).
    UnsupportedData,
    /// Invalid payload (1007).
    InvalidPayload,
    /// Policy violation (1008).
    PolicyViolation,
    /// Message too big (1009).
    MessageTooBig,
    /// Internal error (1011).
    InternalError,
    /// Any other code.
    Other(u16),
}

impl CloseCode {
    /// Create a `CloseCode` from its numeric value.
    #[must_use]
    pub const fn from_u16(code: u16) -> Self {
        match code {
            1000 => CloseCode::Normal,
            1001 => CloseCode::GoingAway,
            1002 => CloseCode::ProtocolError,
            1003 => CloseCode::UnsupportedData,
            1007 => CloseCode::InvalidPayload,
            1008 => CloseCode::PolicyViolation,
            1009 => CloseCode::MessageTooBig,
            1011 => CloseCode::InternalError,
            other => CloseCode::Other(other),
        }
    }

    /// Get the numeric value of this close code.
    #[must_use]
    pub const fn as_u16(&self) -> u16 {
        match self {
            CloseCode::Normal => 1000,
            CloseCode::GoingAway => 1001,
            CloseCode::ProtocolError => 1002,
            CloseCode::UnsupportedData => 1003,
            CloseCode::InvalidPayload => 1007,
            CloseCode::PolicyViolation => 1008,
            CloseCode::MessageTooBig => 1009,
            CloseCode::InternalError => 1011,
            CloseCode::Other(code) => *code,
        }
    }
}

/// Close frame payload: status code and reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    /// The close status code.
    pub code: CloseCode,
    /// Human-readable reason for closing.
    pub reason: String,
}

impl CloseFrame {
    /// Create a new close frame with the given code and reason.
    #[must_use]
    pub fn new(code: CloseCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Parse the payload of a received close frame.
    ///
    /// An empty payload carries no status. A one-byte payload or a reason
    /// that is not UTF-8 is reported as a protocol error by the peer.
    #[must_use]
    pub fn parse(payload: &[u8]) -> Option<Self> {
        match payload {
            [] => None,
            [hi, lo, reason @ ..] => {
                let code = CloseCode::from_u16(u16::from_be_bytes([*hi, *lo]));
                match std::str::from_utf8(reason) {
                    Ok(reason) => Some(CloseFrame::new(code, reason)),
                    Err(_) => Some(CloseFrame::new(CloseCode::InvalidPayload, "")),
                }
            }
            [_] => Some(CloseFrame::new(
                CloseCode::ProtocolError,
                "Invalid close frame",
            )),
        }
    }
}

/// Type of an outgoing message, as passed to [`Client::send`](crate::Client::send).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MessageKind {
    /// UTF-8 text message.
    #[default]
    Text,
    /// Binary message.
    Binary,
    /// Close control frame.
    Close,
    /// Ping control frame.
    Ping,
    /// Pong control frame.
    Pong,
}

impl MessageKind {
    /// Opcode used on the wire for this kind.
    #[must_use]
    pub const fn opcode(self) -> OpCode {
        match self {
            MessageKind::Text => OpCode::Text,
            MessageKind::Binary => OpCode::Binary,
            MessageKind::Close => OpCode::Close,
            MessageKind::Ping => OpCode::Ping,
            MessageKind::Pong => OpCode::Pong,
        }
    }
}

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Message {
    /// A text message (UTF-8 encoded).
    Text(String),
    /// A binary message (arbitrary bytes).
    Binary(Vec<u8>),
    /// A ping frame.
    Ping(Vec<u8>),
    /// A pong frame.
    Pong(Vec<u8>),
    /// A close frame, with status code and reason if present.
    Close(Option<CloseFrame>),
}

impl Message {
    /// Create a text message.
    #[must_use]
    pub fn text(s: impl Into<String>) -> Self {
        Message::Text(s.into())
    }

    /// Create a binary message.
    #[must_use]
    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Message::Binary(data.into())
    }

    /// The kind of this message.
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        match self {
            Message::Text(_) => MessageKind::Text,
            Message::Binary(_) => MessageKind::Binary,
            Message::Ping(_) => MessageKind::Ping,
            Message::Pong(_) => MessageKind::Pong,
            Message::Close(_) => MessageKind::Close,
        }
    }

    /// Returns `true` if this is a control message (ping, pong, or close).
    #[must_use]
    pub const fn is_control(&self) -> bool {
        matches!(
            self,
            Message::Ping(_) | Message::Pong(_) | Message::Close(_)
        )
    }

    /// Borrow the text content, if this is a text message.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Message::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow the binary content, if this is a binary message.
    #[must_use]
    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            Message::Binary(data) => Some(data),
            _ => None,
        }
    }

    /// Consume and return the text content, if this is a text message.
    #[must_use]
    pub fn into_text(self) -> Option<String> {
        match self {
            Message::Text(s) => Some(s),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_code_mapping() {
        assert_eq!(CloseCode::from_u16(1000), CloseCode::Normal);
        assert_eq!(CloseCode::from_u16(1001), CloseCode::GoingAway);
        assert_eq!(CloseCode::from_u16(1011), CloseCode::InternalError);
        assert_eq!(CloseCode::from_u16(4000), CloseCode::Other(4000));
        assert_eq!(CloseCode::Other(3500).as_u16(), 3500);
        assert_eq!(CloseCode::GoingAway.as_u16(), 1001);
    }

    #[test]
    fn test_close_frame_parse() {
        assert_eq!(CloseFrame::parse(&[]), None);

        let frame = CloseFrame::parse(&[0x03, 0xe8, b'b', b'y', b'e']).unwrap();
        assert_eq!(frame.code, CloseCode::Normal);
        assert_eq!(frame.reason, "bye");

        let frame = CloseFrame::parse(&[0x03]).unwrap();
        assert_eq!(frame.code, CloseCode::ProtocolError);

        let frame = CloseFrame::parse(&[0x03, 0xe9, 0xff, 0xfe]).unwrap();
        assert_eq!(frame.code, CloseCode::InvalidPayload);
    }

    #[test]
    fn test_kind_opcodes() {
        assert_eq!(MessageKind::default(), MessageKind::Text);
        assert_eq!(MessageKind::Text.opcode(), OpCode::Text);
        assert_eq!(MessageKind::Binary.opcode(), OpCode::Binary);
        assert_eq!(MessageKind::Close.opcode(), OpCode::Close);
    }

    #[test]
    fn test_message_accessors() {
        let msg = Message::text("hello");
        assert_eq!(msg.kind(), MessageKind::Text);
        assert_eq!(msg.as_text(), Some("hello"));
        assert_eq!(msg.as_binary(), None);
        assert!(!msg.is_control());
        assert_eq!(msg.into_text(), Some("hello".to_string()));

        let msg = Message::binary([1u8, 2, 3]);
        assert_eq!(msg.as_binary(), Some([1, 2, 3].as_slice()));
        assert!(Message::Ping(vec![]).is_control());
        assert_eq!(Message::Close(None).kind(), MessageKind::Close);
    }
}
