//! TLS support for `wss://` connections.
//!
//! The rustls backend (feature `tls-rustls`, on by default) builds a client
//! configuration from [`ClientOptions`](crate::ClientOptions): protocol
//! version, verification mode, trust store and optional client certificate.

mod rustls_impl;

pub use rustls_impl::{
    TlsConnector, TlsError, build_client_config, load_certs_from_file,
    load_private_key_from_file,
};
