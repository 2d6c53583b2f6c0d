//! Client side of the WebSocket opening handshake (RFC 6455 Section 4.1).
//!
//! [`ClientHandshake`] renders the HTTP upgrade request and then consumes the
//! server response one byte at a time until the header block is complete.

use std::collections::HashMap;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use sha1::{Digest, Sha1};

use crate::config::Limits;
use crate::error::{Error, Result};

/// The WebSocket GUID used in the Sec-WebSocket-Accept calculation (RFC 6455).
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Protocol version sent in `Sec-WebSocket-Version`.
pub const WS_VERSION: u8 = 13;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Computes the Sec-WebSocket-Accept value for a Sec-WebSocket-Key.
///
/// The accept key is calculated as: Base64(SHA-1(key + GUID))
///
/// # Example
///
/// ```
/// use wsclient::protocol::handshake::compute_accept_key;
///
/// let key = "dGhlIHNhbXBsZSBub25jZQ==";
/// assert_eq!(compute_accept_key(key), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Generate a fresh base64 `Sec-WebSocket-Key` (16 random bytes).
fn generate_key() -> String {
    let mut nonce = [0u8; 16];
    if getrandom::getrandom(&mut nonce).is_err() {
        use std::time::{SystemTime, UNIX_EPOCH};
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        nonce = seed.to_le_bytes();
    }
    BASE64.encode(nonce)
}

/// Reject header values that would let a caller inject extra header lines.
/// Header names must be non-empty RFC 7230 tokens.
fn validate_header_name(name: &str) -> Result<()> {
    let is_tchar = |b: u8| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b);
    if name.is_empty() || !name.bytes().all(is_tchar) {
        return Err(Error::InvalidHeaderValue {
            header: name.to_string(),
            reason: "header name is not a valid HTTP token".to_string(),
        });
    }
    Ok(())
}

fn validate_header_value(header_name: &str, value: &str) -> Result<()> {
    if value.contains('\r') || value.contains('\n') {
        return Err(Error::InvalidHeaderValue {
            header: header_name.to_string(),
            reason: "contains CR or LF characters".to_string(),
        });
    }
    Ok(())
}

/// Parse HTTP header lines into a map keyed by lowercase name.
fn parse_headers<'a>(lines: impl Iterator<Item = &'a str>) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_lowercase(), value.trim().to_string());
        }
    }
    headers
}

/// Result of a completed handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Negotiated {
    /// Protocol version used for framing.
    pub version: u8,
    /// The Sec-WebSocket-Accept value returned by the server.
    pub accept: String,
    /// The subprotocol selected by the server, if any.
    pub protocol: Option<String>,
    /// Extensions listed by the server.
    pub extensions: Vec<String>,
}

#[derive(Debug)]
enum Progress {
    Pending,
    Finished(Negotiated),
    Failed(Error),
}

/// Incremental client handshake.
#[derive(Debug)]
pub struct ClientHandshake {
    host: String,
    resource: String,
    key: String,
    headers: Vec<(String, String)>,
    protocols: Vec<String>,
    limits: Limits,
    buffer: Vec<u8>,
    progress: Progress,
}

impl ClientHandshake {
    /// Prepare a handshake for `resource` on `host`.
    ///
    /// `host` is the value of the `Host` header (including a non-default
    /// port), `resource` the request target (path and query).
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHeaderValue` if an extra header name is not an
    /// HTTP token, or a header value or protocol contains CR or LF.
    pub fn new(
        host: impl Into<String>,
        resource: impl Into<String>,
        headers: &[(String, String)],
        protocols: &[String],
        limits: Limits,
    ) -> Result<Self> {
        for (name, value) in headers {
            validate_header_name(name)?;
            validate_header_value(name, value)?;
        }
        for protocol in protocols {
            validate_header_value("Sec-WebSocket-Protocol", protocol)?;
        }

        Ok(Self {
            host: host.into(),
            resource: resource.into(),
            key: generate_key(),
            headers: headers.to_vec(),
            protocols: protocols.to_vec(),
            limits,
            buffer: Vec::with_capacity(512),
            progress: Progress::Pending,
        })
    }

    /// The Sec-WebSocket-Key sent with the request.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Serialized HTTP upgrade request.
    #[must_use]
    pub fn to_wire_request(&self) -> Vec<u8> {
        let mut request = format!(
            "GET {} HTTP/1.1\r\n\
             Host: {}\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Key: {}\r\n\
             Sec-WebSocket-Version: {}\r\n",
            self.resource, self.host, self.key, WS_VERSION
        );
        if !self.protocols.is_empty() {
            request.push_str(&format!(
                "Sec-WebSocket-Protocol: {}\r\n",
                self.protocols.join(", ")
            ));
        }
        for (name, value) in &self.headers {
            request.push_str(&format!("{name}: {value}\r\n"));
        }
        request.push_str("\r\n");
        request.into_bytes()
    }

    /// Feed one byte of the server response.
    ///
    /// Returns `Ok(true)` when this byte completed the handshake. Bytes fed
    /// after completion are not consumed and yield `Ok(false)`.
    ///
    /// # Errors
    ///
    /// `Error::HandshakeTooLarge` if the header block grows past the limit,
    /// `Error::InvalidHandshake` if the completed response is rejected. Once
    /// failed, every further call returns the same error.
    pub fn feed(&mut self, byte: u8) -> Result<bool> {
        match &self.progress {
            Progress::Finished(_) => return Ok(false),
            Progress::Failed(err) => return Err(err.clone()),
            Progress::Pending => {}
        }

        self.buffer.push(byte);
        if let Err(err) = self.limits.check_handshake_size(self.buffer.len()) {
            self.progress = Progress::Failed(err.clone());
            return Err(err);
        }
        if !self.buffer.ends_with(HEADER_TERMINATOR) {
            return Ok(false);
        }

        match self.parse_response() {
            Ok(negotiated) => {
                self.progress = Progress::Finished(negotiated);
                self.buffer = Vec::new();
                Ok(true)
            }
            Err(err) => {
                self.progress = Progress::Failed(err.clone());
                Err(err)
            }
        }
    }

    /// Whether the server accepted the upgrade.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self.progress, Progress::Finished(_))
    }

    /// Negotiated protocol version, available once finished.
    #[must_use]
    pub fn version(&self) -> Option<u8> {
        self.negotiated().map(|n| n.version)
    }

    /// Negotiated parameters, available once finished.
    #[must_use]
    pub fn negotiated(&self) -> Option<&Negotiated> {
        match &self.progress {
            Progress::Finished(negotiated) => Some(negotiated),
            _ => None,
        }
    }

    fn parse_response(&self) -> Result<Negotiated> {
        let text = std::str::from_utf8(&self.buffer)
            .map_err(|_| Error::InvalidHandshake("Invalid UTF-8".into()))?;

        let mut lines = text.lines();

        // Status line: "HTTP/1.1 101 Switching Protocols"
        let status_line = lines
            .next()
            .ok_or_else(|| Error::InvalidHandshake("Empty response".into()))?;
        let mut parts = status_line.split_whitespace();
        let http_version = parts.next().unwrap_or_default();
        let status = parts.next().unwrap_or_default();
        if !http_version.starts_with("HTTP/1.1") || status != "101" {
            return Err(Error::InvalidHandshake(format!(
                "Expected 101 status, got: {status_line}"
            )));
        }

        let headers = parse_headers(lines);

        let upgrade = headers
            .get("upgrade")
            .ok_or_else(|| Error::InvalidHandshake("Missing Upgrade header in response".into()))?;
        if !upgrade.eq_ignore_ascii_case("websocket") {
            return Err(Error::InvalidHandshake(format!(
                "Invalid Upgrade header: {upgrade}"
            )));
        }

        let connection = headers.get("connection").ok_or_else(|| {
            Error::InvalidHandshake("Missing Connection header in response".into())
        })?;
        if !connection.to_lowercase().contains("upgrade") {
            return Err(Error::InvalidHandshake(format!(
                "Invalid Connection header: {connection}"
            )));
        }

        let accept = headers
            .get("sec-websocket-accept")
            .ok_or_else(|| Error::InvalidHandshake("Missing Sec-WebSocket-Accept header".into()))?
            .clone();
        if accept != compute_accept_key(&self.key) {
            return Err(Error::InvalidHandshake(
                "Sec-WebSocket-Accept does not match the request key".into(),
            ));
        }

        let protocol = headers.get("sec-websocket-protocol").cloned();
        if let Some(selected) = &protocol {
            if !self.protocols.iter().any(|p| p == selected) {
                return Err(Error::InvalidHandshake(format!(
                    "Server selected unrequested protocol: {selected}"
                )));
            }
        }

        let extensions = headers
            .get("sec-websocket-extensions")
            .map(|e| e.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_default();

        Ok(Negotiated {
            version: WS_VERSION,
            accept,
            protocol,
            extensions,
        })
    }
}
