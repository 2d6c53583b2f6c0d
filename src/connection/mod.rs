//! Client connection management.
//!
//! [`Client`] owns one connection at a time and drives it through the
//! lifecycle in [`ConnectionState`]:
//!
//! 1. **Disconnected** - created, not yet connected
//! 2. **Connecting** - TCP (and TLS) being established
//! 3. **HandshakePending** - upgrade request written, receiver running
//! 4. **Open** - handshake accepted, `open` fired
//! 5. **Closed** - terminal, `close` fired exactly once
//!
//! A background receiver task reads the transport, completes the handshake
//! and turns inbound frames into events. Closing can start from the caller,
//! the peer or a transport failure; all three share one close path that
//! runs exactly once.
//!
//! Handlers are stored inside the client, so they should reach it through a
//! [`WeakClient`]; otherwise the client lives until the connection closes.
//!
//! ## Example
//!
//! ```rust,no_run
//! use wsclient::{Client, ClientOptions};
//!
//! # async fn run() -> wsclient::Result<()> {
//! let client = Client::new();
//! let replies = client.downgrade();
//! client.on_message(move |message| {
//!     if let (Some(text), Some(replies)) = (message.as_text(), replies.upgrade()) {
//!         let echo = text.to_string();
//!         tokio::spawn(async move { replies.send_text(&echo).await });
//!     }
//! });
//! client.connect("ws://localhost:9001/", ClientOptions::default()).await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod receiver;
mod state;

pub use client::{Client, WeakClient, connect};
pub use state::ConnectionState;
