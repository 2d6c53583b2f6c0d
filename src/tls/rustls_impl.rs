use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, WebPkiSupportedAlgorithms};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, RootCertStore, SignatureScheme, SupportedProtocolVersion};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::ClientConfig;

use crate::config::{CertStore, ClientOptions, TlsVersion, VerifyMode};
use crate::error::Error;

#[derive(Debug)]
pub enum TlsError {
    Io(std::io::Error),
    Configuration(String),
    NoCertificatesFound,
    NoPrivateKeyFound,
    InvalidDnsName(String),
}

impl std::fmt::Display for TlsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TlsError::Io(e) => write!(f, "TLS I/O error: {}", e),
            TlsError::Configuration(msg) => write!(f, "TLS configuration error: {}", msg),
            TlsError::NoCertificatesFound => write!(f, "no certificates found in file"),
            TlsError::NoPrivateKeyFound => write!(f, "no private key found in file"),
            TlsError::InvalidDnsName(name) => write!(f, "invalid DNS name: {}", name),
        }
    }
}

impl std::error::Error for TlsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TlsError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TlsError {
    fn from(err: std::io::Error) -> Self {
        TlsError::Io(err)
    }
}

impl From<rustls::Error> for TlsError {
    fn from(err: rustls::Error) -> Self {
        TlsError::Configuration(err.to_string())
    }
}

impl From<TlsError> for Error {
    fn from(err: TlsError) -> Self {
        match err {
            TlsError::Configuration(_)
            | TlsError::NoCertificatesFound
            | TlsError::NoPrivateKeyFound => Error::Config(err.to_string()),
            TlsError::Io(_) | TlsError::InvalidDnsName(_) => Error::Tls(err.to_string()),
        }
    }
}

/// Accepts any server certificate while still checking that the server
/// owns the key it presented.
#[derive(Debug)]
struct AcceptAnyServerCert {
    algorithms: WebPkiSupportedAlgorithms,
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

static TLS12_ONLY: &[&SupportedProtocolVersion] = &[&rustls::version::TLS12];
static TLS13_ONLY: &[&SupportedProtocolVersion] = &[&rustls::version::TLS13];

fn protocol_versions(version: TlsVersion) -> &'static [&'static SupportedProtocolVersion] {
    match version {
        TlsVersion::Any => rustls::ALL_VERSIONS,
        TlsVersion::Tls12 => TLS12_ONLY,
        TlsVersion::Tls13 => TLS13_ONLY,
    }
}

fn root_store(store: &CertStore) -> Result<RootCertStore, Error> {
    match store {
        CertStore::System => Ok(RootCertStore::from_iter(
            webpki_roots::TLS_SERVER_ROOTS.iter().cloned(),
        )),
        CertStore::PemFile(path) => {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "trust store file not found: {}",
                    path.display()
                )));
            }
            let mut roots = RootCertStore::empty();
            for cert in load_certs_from_file(path)? {
                roots.add(cert).map_err(TlsError::from)?;
            }
            Ok(roots)
        }
        CertStore::Certificates(ders) => {
            let mut roots = RootCertStore::empty();
            for der in ders {
                roots
                    .add(CertificateDer::from(der.clone()))
                    .map_err(TlsError::from)?;
            }
            Ok(roots)
        }
    }
}

type ClientIdentity = (Vec<CertificateDer<'static>>, PrivateKeyDer<'static>);

fn client_identity(options: &ClientOptions) -> Result<Option<ClientIdentity>, Error> {
    match (&options.cert_chain_file, &options.private_key_file) {
        (None, None) => Ok(None),
        (Some(cert_path), Some(key_path)) => {
            if !cert_path.exists() {
                return Err(Error::Config(format!(
                    "certificate file not found: {}",
                    cert_path.display()
                )));
            }
            if !key_path.exists() {
                return Err(Error::Config(format!(
                    "private key file not found: {}",
                    key_path.display()
                )));
            }
            let chain = load_certs_from_file(cert_path)?;
            let key = load_private_key_from_file(key_path)?;
            Ok(Some((chain, key)))
        }
        (Some(_), None) => Err(Error::Config(
            "cert_chain_file requires private_key_file".into(),
        )),
        (None, Some(_)) => Err(Error::Config(
            "private_key_file requires cert_chain_file".into(),
        )),
    }
}

/// Build a rustls client configuration from the TLS-related options.
///
/// Only local files are touched; no network I/O happens here.
///
/// # Errors
///
/// `Error::Config` if a configured certificate, key or trust store file is
/// missing or unusable, or the protocol selection is rejected by rustls.
pub fn build_client_config(options: &ClientOptions) -> Result<Arc<ClientConfig>, Error> {
    let identity = client_identity(options)?;

    let provider: Arc<CryptoProvider> = Arc::new(rustls::crypto::ring::default_provider());
    let algorithms = provider.signature_verification_algorithms;
    let builder = ClientConfig::builder_with_provider(provider)
        .with_protocol_versions(protocol_versions(options.ssl_version))
        .map_err(TlsError::from)?;

    let builder = match options.verify_mode {
        VerifyMode::None => builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert { algorithms })),
        VerifyMode::Peer => builder.with_root_certificates(root_store(&options.cert_store)?),
    };

    let config = match identity {
        Some((chain, key)) => builder
            .with_client_auth_cert(chain, key)
            .map_err(TlsError::from)?,
        None => builder.with_no_client_auth(),
    };

    Ok(Arc::new(config))
}

#[derive(Clone)]
pub struct TlsConnector {
    inner: tokio_rustls::TlsConnector,
}

impl TlsConnector {
    pub fn new(config: Arc<ClientConfig>) -> Self {
        Self {
            inner: tokio_rustls::TlsConnector::from(config),
        }
    }

    /// Run the TLS handshake over `stream`, using `domain` for SNI and
    /// (with [`VerifyMode::Peer`]) host name verification.
    pub async fn connect<S>(&self, domain: &str, stream: S) -> Result<TlsStream<S>, TlsError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let server_name = ServerName::try_from(domain.to_string())
            .map_err(|_| TlsError::InvalidDnsName(domain.to_string()))?;

        self.inner
            .connect(server_name, stream)
            .await
            .map_err(TlsError::Io)
    }
}

impl std::fmt::Debug for TlsConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConnector").finish_non_exhaustive()
    }
}

pub fn load_certs_from_file(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let certs: Vec<CertificateDer<'static>> =
        rustls_pemfile::certs(&mut reader).collect::<Result<Vec<_>, _>>()?;

    if certs.is_empty() {
        return Err(TlsError::NoCertificatesFound);
    }

    Ok(certs)
}

pub fn load_private_key_from_file(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    for item in rustls_pemfile::read_all(&mut reader) {
        match item? {
            rustls_pemfile::Item::Pkcs1Key(key) => return Ok(PrivateKeyDer::Pkcs1(key)),
            rustls_pemfile::Item::Pkcs8Key(key) => return Ok(PrivateKeyDer::Pkcs8(key)),
            rustls_pemfile::Item::Sec1Key(key) => return Ok(PrivateKeyDer::Sec1(key)),
            _ => continue,
        }
    }

    Err(TlsError::NoPrivateKeyFound)
}
