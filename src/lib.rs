//! # wsclient - event-driven WebSocket client
//!
//! `wsclient` connects to a WebSocket server over plain TCP or TLS, performs
//! the RFC 6455 opening handshake and delivers traffic as events.
//!
//! ## Features
//!
//! - **Event interface**: `open`, `message`, `error` and `close` handlers,
//!   persistent or one-shot
//! - **Background receiver** with cooperative cancellation and a bounded
//!   shutdown
//! - **Exactly-once close** whether the caller, the peer or a failed write
//!   ends the connection
//! - **TLS** via rustls (`tls-rustls` feature, on by default)
//! - **Resource limits** for handshake, frame and message sizes
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use wsclient::{ClientOptions, MessageKind};
//!
//! # async fn run() -> wsclient::Result<()> {
//! let client = wsclient::connect("ws://localhost:9001/", ClientOptions::default(), |client| {
//!     client.on_open(|| println!("connected"));
//!     client.on_message(|message| println!("received {message:?}"));
//!     client.on_close(|err| println!("closed: {err:?}"));
//! })
//! .await?;
//!
//! client.send("hello", MessageKind::Text).await?;
//! client.close().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod event;
pub mod message;
pub mod protocol;
pub mod transport;

#[cfg(feature = "tls-rustls")]
pub mod tls;

pub use config::{CertStore, ClientOptions, Limits, TlsVersion, VerifyMode};
pub use connection::{Client, ConnectionState, WeakClient, connect};
pub use error::{Error, Result};
pub use event::{EventEmitter, EventKind, SubscriptionId};
pub use message::{CloseCode, CloseFrame, Message, MessageKind};
pub use protocol::{
    ClientHandshake, FrameDecoder, FrameEncoder, Negotiated, OpCode, WS_GUID, compute_accept_key,
};

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn test_public_types_are_send() {
        assert_send::<Client>();
        assert_send::<WeakClient>();
        assert_send::<Error>();
        assert_send::<ClientOptions>();
        assert_send::<Limits>();
        assert_send::<Message>();
        assert_send::<CloseCode>();
        assert_send::<CloseFrame>();
        assert_send::<ConnectionState>();
        assert_send::<FrameDecoder>();
        assert_send::<ClientHandshake>();
    }

    #[test]
    fn test_public_types_are_sync() {
        assert_sync::<Client>();
        assert_sync::<Error>();
        assert_sync::<ClientOptions>();
        assert_sync::<Limits>();
        assert_sync::<Message>();
        assert_sync::<CloseCode>();
        assert_sync::<CloseFrame>();
        assert_sync::<ConnectionState>();
        assert_sync::<EventEmitter>();
    }
}
