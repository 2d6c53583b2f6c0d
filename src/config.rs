//! Client options and protocol limits.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration limits for inbound data.
///
/// These limits bound the memory a misbehaving server can make the
/// client allocate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum size of a single frame payload in bytes.
    ///
    /// Default: 16 MB (16 * 1024 * 1024)
    pub max_frame_size: usize,

    /// Maximum size of a complete message in bytes.
    ///
    /// This applies to the total size after reassembling all fragments.
    ///
    /// Default: 64 MB (64 * 1024 * 1024)
    pub max_message_size: usize,

    /// Maximum number of fragments in a single message.
    ///
    /// Default: 128
    pub max_fragment_count: usize,

    /// Maximum size of the handshake response header block in bytes.
    ///
    /// Default: 8 KB (8192)
    pub max_handshake_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_frame_size: 16 * 1024 * 1024,   // 16 MB
            max_message_size: 64 * 1024 * 1024, // 64 MB
            max_fragment_count: 128,
            max_handshake_size: 8192,
        }
    }
}

impl Limits {
    /// Create new limits with custom values.
    #[must_use]
    pub const fn new(
        max_frame_size: usize,
        max_message_size: usize,
        max_fragment_count: usize,
        max_handshake_size: usize,
    ) -> Self {
        Self {
            max_frame_size,
            max_message_size,
            max_fragment_count,
            max_handshake_size,
        }
    }

    /// Create limits suitable for small embedded systems.
    ///
    /// - Max frame: 64 KB
    /// - Max message: 256 KB
    /// - Max fragments: 16
    /// - Max handshake: 4 KB
    #[must_use]
    pub const fn embedded() -> Self {
        Self {
            max_frame_size: 64 * 1024,
            max_message_size: 256 * 1024,
            max_fragment_count: 16,
            max_handshake_size: 4096,
        }
    }

    /// Validate that message size is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MessageTooLarge`](crate::Error::MessageTooLarge) if `size` exceeds the configured maximum.
    pub const fn check_message_size(&self, size: usize) -> Result<(), crate::Error> {
        if size > self.max_message_size {
            Err(crate::Error::MessageTooLarge {
                size,
                max: self.max_message_size,
            })
        } else {
            Ok(())
        }
    }

    /// Validate that frame size is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FrameTooLarge`](crate::Error::FrameTooLarge) if `size` exceeds the configured maximum.
    pub const fn check_frame_size(&self, size: usize) -> Result<(), crate::Error> {
        if size > self.max_frame_size {
            Err(crate::Error::FrameTooLarge {
                size,
                max: self.max_frame_size,
            })
        } else {
            Ok(())
        }
    }

    /// Validate that fragment count is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TooManyFragments`](crate::Error::TooManyFragments) if `count` exceeds the configured maximum.
    pub const fn check_fragment_count(&self, count: usize) -> Result<(), crate::Error> {
        if count > self.max_fragment_count {
            Err(crate::Error::TooManyFragments {
                count,
                max: self.max_fragment_count,
            })
        } else {
            Ok(())
        }
    }

    /// Validate that handshake size is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HandshakeTooLarge`](crate::Error::HandshakeTooLarge) if `size` exceeds the configured maximum.
    pub const fn check_handshake_size(&self, size: usize) -> Result<(), crate::Error> {
        if size > self.max_handshake_size {
            Err(crate::Error::HandshakeTooLarge {
                size,
                max: self.max_handshake_size,
            })
        } else {
            Ok(())
        }
    }
}

/// TLS protocol version selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TlsVersion {
    /// Negotiate any supported version (TLS 1.2 or 1.3).
    #[default]
    Any,
    /// TLS 1.2 only.
    Tls12,
    /// TLS 1.3 only.
    Tls13,
}

/// Peer certificate verification strictness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VerifyMode {
    /// Accept any server certificate.
    ///
    /// Handshake signatures are still checked, but the certificate chain and
    /// host name are not. Use [`VerifyMode::Peer`] for real authentication.
    #[default]
    None,
    /// Verify the server certificate chain and host name against the trust store.
    Peer,
}

/// Trust anchors used with [`VerifyMode::Peer`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CertStore {
    /// Bundled Mozilla root certificates.
    #[default]
    System,
    /// PEM file containing one or more trusted certificates.
    PemFile(PathBuf),
    /// DER-encoded trusted certificates.
    Certificates(Vec<Vec<u8>>),
}

/// Options recognized by [`Client::connect`](crate::Client::connect).
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// TLS protocol selection.
    ///
    /// Default: [`TlsVersion::Any`]
    pub ssl_version: TlsVersion,

    /// Server certificate verification.
    ///
    /// Default: [`VerifyMode::None`]
    pub verify_mode: VerifyMode,

    /// Trust anchors for peer verification.
    ///
    /// Default: [`CertStore::System`]
    pub cert_store: CertStore,

    /// PEM file with the client certificate chain.
    pub cert_chain_file: Option<PathBuf>,

    /// PEM file with the client private key.
    pub private_key_file: Option<PathBuf>,

    /// Extra headers appended to the opening handshake request.
    pub headers: Vec<(String, String)>,

    /// Values for the `Sec-WebSocket-Protocol` request header.
    pub protocols: Vec<String>,

    /// Resource limits for inbound data.
    pub limits: Limits,

    /// Read chunk size used by the background receiver (in bytes).
    ///
    /// Default: 8 KB (8192)
    pub read_buffer_size: usize,

    /// How long `close` waits for the background receiver to stop before
    /// aborting it.
    ///
    /// Default: 1 second
    pub shutdown_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            ssl_version: TlsVersion::default(),
            verify_mode: VerifyMode::default(),
            cert_store: CertStore::default(),
            cert_chain_file: None,
            private_key_file: None,
            headers: Vec::new(),
            protocols: Vec::new(),
            limits: Limits::default(),
            read_buffer_size: 8192,
            shutdown_timeout: Duration::from_secs(1),
        }
    }
}

impl ClientOptions {
    /// Create options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the TLS protocol version.
    #[must_use]
    pub const fn with_ssl_version(mut self, version: TlsVersion) -> Self {
        self.ssl_version = version;
        self
    }

    /// Set the peer verification mode.
    #[must_use]
    pub const fn with_verify_mode(mut self, mode: VerifyMode) -> Self {
        self.verify_mode = mode;
        self
    }

    /// Set the trust store.
    #[must_use]
    pub fn with_cert_store(mut self, store: CertStore) -> Self {
        self.cert_store = store;
        self
    }

    /// Set the client certificate chain file.
    #[must_use]
    pub fn with_cert_chain_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.cert_chain_file = Some(path.into());
        self
    }

    /// Set the client private key file.
    #[must_use]
    pub fn with_private_key_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.private_key_file = Some(path.into());
        self
    }

    /// Add an extra handshake header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Request subprotocols via `Sec-WebSocket-Protocol`.
    #[must_use]
    pub fn with_protocols(mut self, protocols: Vec<String>) -> Self {
        self.protocols = protocols;
        self
    }

    /// Set custom limits.
    #[must_use]
    pub const fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Set the receiver read chunk size.
    #[must_use]
    pub const fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Set the receiver shutdown bound.
    #[must_use]
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_default() {
        let limits = Limits::default();
        assert_eq!(limits.max_frame_size, 16 * 1024 * 1024);
        assert_eq!(limits.max_message_size, 64 * 1024 * 1024);
        assert_eq!(limits.max_fragment_count, 128);
        assert_eq!(limits.max_handshake_size, 8192);
    }

    #[test]
    fn test_limits_embedded() {
        let limits = Limits::embedded();
        assert_eq!(limits.max_frame_size, 64 * 1024);
        assert_eq!(limits.max_message_size, 256 * 1024);
        assert_eq!(limits.max_fragment_count, 16);
        assert_eq!(limits.max_handshake_size, 4096);
    }

    #[test]
    fn test_limits_checks() {
        let limits = Limits::default();
        assert!(limits.check_handshake_size(1024).is_ok());
        assert!(limits.check_handshake_size(10000).is_err());
        assert!(limits.check_message_size(100 * 1024 * 1024).is_err());
        assert!(limits.check_frame_size(20 * 1024 * 1024).is_err());
        assert!(limits.check_fragment_count(50).is_ok());
        assert!(limits.check_fragment_count(200).is_err());
    }

    #[test]
    fn test_options_defaults_are_permissive() {
        let options = ClientOptions::default();
        assert_eq!(options.ssl_version, TlsVersion::Any);
        assert_eq!(options.verify_mode, VerifyMode::None);
        assert_eq!(options.cert_store, CertStore::System);
        assert!(options.cert_chain_file.is_none());
        assert!(options.private_key_file.is_none());
        assert!(options.headers.is_empty());
        assert_eq!(options.shutdown_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_options_builder() {
        let options = ClientOptions::new()
            .with_ssl_version(TlsVersion::Tls13)
            .with_verify_mode(VerifyMode::Peer)
            .with_cert_chain_file("/tmp/client.pem")
            .with_private_key_file("/tmp/client.key")
            .with_header("Authorization", "Bearer abc")
            .with_limits(Limits::embedded())
            .with_read_buffer_size(1024);

        assert_eq!(options.ssl_version, TlsVersion::Tls13);
        assert_eq!(options.verify_mode, VerifyMode::Peer);
        assert_eq!(
            options.cert_chain_file,
            Some(PathBuf::from("/tmp/client.pem"))
        );
        assert_eq!(
            options.headers,
            vec![("Authorization".to_string(), "Bearer abc".to_string())]
        );
        assert_eq!(options.limits.max_frame_size, 64 * 1024);
        assert_eq!(options.read_buffer_size, 1024);
    }
}
