//! Connection targets and byte transports.
//!
//! A [`Target`] is what the client needs from a URL: where to dial, whether
//! to wrap the socket in TLS, and what to put in the request line. The
//! [`Connector`] opens the TCP socket and, for secure targets, runs the TLS
//! handshake before any WebSocket bytes are written.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, warn};
use url::{Host, Url};

use crate::config::ClientOptions;
use crate::error::{Error, Result};

/// Byte stream a client can run over.
pub trait Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Stream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// A connected transport, plain or TLS.
pub type Transport = Box<dyn Stream>;

/// Where and how to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Host name or IP literal, without IPv6 brackets.
    pub host: String,
    /// TCP port, defaulted from the scheme when the URL has none.
    pub port: u16,
    /// Whether the transport is wrapped in TLS (`wss`/`https`).
    pub secure: bool,
    /// Request target: path plus optional query.
    pub resource: String,
}

impl Target {
    /// Resolve a `ws`, `wss`, `http` or `https` URL.
    ///
    /// # Errors
    ///
    /// `Error::InvalidUrl` for unparsable URLs, other schemes, or URLs
    /// without a host.
    pub fn parse(url: &str) -> Result<Self> {
        let parsed = Url::parse(url)?;

        let secure = match parsed.scheme() {
            "ws" | "http" => false,
            "wss" | "https" => true,
            other => {
                return Err(Error::InvalidUrl(format!("unsupported scheme: {other}")));
            }
        };

        let host = match parsed.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            None => return Err(Error::InvalidUrl(format!("missing host: {url}"))),
        };

        let port = parsed
            .port_or_known_default()
            .unwrap_or(if secure { 443 } else { 80 });

        let mut resource = parsed.path().to_string();
        if resource.is_empty() {
            resource.push('/');
        }
        if let Some(query) = parsed.query() {
            resource.push('?');
            resource.push_str(query);
        }

        Ok(Self {
            host,
            port,
            secure,
            resource,
        })
    }

    fn default_port(&self) -> u16 {
        if self.secure { 443 } else { 80 }
    }

    /// Value of the `Host` request header.
    ///
    /// IPv6 literals are bracketed; the port is appended only when it differs
    /// from the scheme default.
    #[must_use]
    pub fn host_header(&self) -> String {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        if self.port == self.default_port() {
            host
        } else {
            format!("{host}:{}", self.port)
        }
    }
}

/// Opens transports for a [`Target`].
#[derive(Debug, Clone)]
pub enum Connector {
    /// Plain TCP.
    Plain,
    /// TCP wrapped in TLS.
    #[cfg(feature = "tls-rustls")]
    Tls(crate::tls::TlsConnector),
}

impl Connector {
    /// Choose a connector for `target`.
    ///
    /// For secure targets the TLS configuration is built here, so missing
    /// certificate or key files are reported before any socket is opened.
    /// Plain targets never look at the TLS options.
    ///
    /// # Errors
    ///
    /// `Error::Config` for unusable TLS options, or for a secure target when
    /// the crate was built without TLS support.
    pub fn for_target(target: &Target, options: &ClientOptions) -> Result<Self> {
        if target.secure {
            Self::secure(options)
        } else {
            Ok(Connector::Plain)
        }
    }

    #[cfg(feature = "tls-rustls")]
    fn secure(options: &ClientOptions) -> Result<Self> {
        let config = crate::tls::build_client_config(options)?;
        Ok(Connector::Tls(crate::tls::TlsConnector::new(config)))
    }

    #[cfg(not(feature = "tls-rustls"))]
    fn secure(_options: &ClientOptions) -> Result<Self> {
        Err(Error::Config(
            "secure URL requires the tls-rustls feature".into(),
        ))
    }

    /// Connect to `target`, completing the TLS handshake if needed.
    ///
    /// # Errors
    ///
    /// `Error::Io` if the TCP connect fails, `Error::Tls` if the TLS
    /// handshake fails.
    pub async fn connect(&self, target: &Target) -> Result<Transport> {
        let tcp = TcpStream::connect((target.host.as_str(), target.port)).await?;
        if let Err(err) = tcp.set_nodelay(true) {
            warn!(error = %err, "failed to set TCP_NODELAY");
        }
        debug!(host = %target.host, port = target.port, "tcp connected");

        match self {
            Connector::Plain => Ok(Box::new(tcp)),
            #[cfg(feature = "tls-rustls")]
            Connector::Tls(tls) => {
                let stream = tls.connect(&target.host, tcp).await?;
                debug!(host = %target.host, "tls handshake complete");
                Ok(Box::new(stream))
            }
        }
    }
}
