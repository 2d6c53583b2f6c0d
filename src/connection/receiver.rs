//! Background receive loop.
//!
//! One task per client, alive from `HandshakePending` until `Closed`. It
//! reads chunks from the transport, feeds the handshake codec until the
//! upgrade completes, then feeds the frame decoder and fires one `message`
//! event per decoded message, in decode order.
//!
//! Failures that end the connection (EOF, read errors, framing and
//! handshake errors) fire `error` and then `close`, both carrying the
//! same error.

use std::ops::ControlFlow;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, ReadHalf};
use tracing::{debug, trace, warn};

use super::client::{Initiator, Shared};
use super::state::ConnectionState;
use crate::error::{Error, Result};
use crate::message::{Message, MessageKind};
use crate::protocol::codec::FrameDecoder;
use crate::protocol::handshake::ClientHandshake;
use crate::transport::Transport;

pub(crate) struct Receiver {
    shared: Arc<Shared>,
    reader: ReadHalf<Transport>,
    handshake: ClientHandshake,
    decoder: FrameDecoder,
    buf: Vec<u8>,
}

/// Feed `chunk` to the handshake one byte at a time.
///
/// Returns the number of bytes consumed once the handshake finishes, or
/// `None` if the whole chunk was consumed without finishing it.
fn feed_handshake(handshake: &mut ClientHandshake, chunk: &[u8]) -> Result<Option<usize>> {
    for (i, &byte) in chunk.iter().enumerate() {
        if handshake.feed(byte)? {
            return Ok(Some(i + 1));
        }
    }
    Ok(None)
}

impl Receiver {
    pub(crate) fn new(
        shared: Arc<Shared>,
        reader: ReadHalf<Transport>,
        handshake: ClientHandshake,
        decoder: FrameDecoder,
        read_buffer_size: usize,
    ) -> Self {
        Self {
            shared,
            reader,
            handshake,
            decoder,
            buf: vec![0u8; read_buffer_size.max(1)],
        }
    }

    pub(crate) async fn run(mut self) {
        let cancel = self.shared.cancel.clone();
        loop {
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                read = self.reader.read(&mut self.buf) => read,
            };

            match read {
                Ok(0) => {
                    debug!("transport reached EOF");
                    self.fail(Error::ConnectionClosed(None)).await;
                    break;
                }
                Ok(n) => {
                    trace!(bytes = n, "read");
                    if self.process(n).await.is_break() {
                        break;
                    }
                }
                Err(err) => {
                    let err = Error::from(err);
                    if err.is_broken_pipe() {
                        self.shared.mark_pipe_broken();
                    }
                    self.fail(err).await;
                    break;
                }
            }
        }
        trace!("receiver stopped");
    }

    async fn close(&mut self, error: Option<Error>) {
        self.shared.shutdown(error, Initiator::Receiver).await;
    }

    /// Report a receive failure, then end the connection with it.
    ///
    /// Failures caused by a close already in progress are not reported.
    async fn fail(&mut self, error: Error) {
        if !self.shared.is_closing() {
            self.shared.emitter.emit_error(&error);
        }
        self.close(Some(error)).await;
    }

    async fn process(&mut self, n: usize) -> ControlFlow<()> {
        if self.handshake.is_finished() {
            self.decoder.feed(&self.buf[..n]);
        } else {
            match feed_handshake(&mut self.handshake, &self.buf[..n]) {
                Ok(None) => return ControlFlow::Continue(()),
                Ok(Some(used)) => {
                    // Frames may follow the response in the same read.
                    self.decoder.feed(&self.buf[used..n]);
                    if self.open().is_break() {
                        return ControlFlow::Break(());
                    }
                }
                Err(err) => {
                    warn!(error = %err, "handshake rejected");
                    self.fail(err).await;
                    return ControlFlow::Break(());
                }
            }
        }
        self.drain().await
    }

    fn open(&self) -> ControlFlow<()> {
        if let Some(negotiated) = self.handshake.negotiated() {
            self.shared.set_negotiated(negotiated.clone());
        }
        if !self
            .shared
            .state
            .transition(ConnectionState::HandshakePending, ConnectionState::Open)
        {
            return ControlFlow::Break(());
        }
        debug!(version = ?self.handshake.version(), "handshake complete");
        self.shared.emitter.emit_open();
        ControlFlow::Continue(())
    }

    /// Emit every message the decoder can produce from what it holds.
    async fn drain(&mut self) -> ControlFlow<()> {
        loop {
            match self.decoder.next_message() {
                Ok(None) => return ControlFlow::Continue(()),
                Ok(Some(Message::Close(frame))) => {
                    debug!(?frame, "peer closed the connection");
                    self.shared.set_peer_close(frame);
                    self.close(None).await;
                    return ControlFlow::Break(());
                }
                Ok(Some(message)) => {
                    self.shared.emitter.emit_message(&message);
                    if let Message::Ping(payload) = &message {
                        if let Err(err) = self
                            .shared
                            .send(payload, MessageKind::Pong, Initiator::Receiver)
                            .await
                        {
                            warn!(error = %err, "failed to answer ping");
                        }
                    }
                    if self.shared.state.get().is_closed() {
                        return ControlFlow::Break(());
                    }
                }
                Err(err) if !err.is_fatal() => {
                    warn!(error = %err, "dropping inbound message");
                    self.shared.emitter.emit_error(&err);
                }
                Err(err) => {
                    warn!(error = %err, "inbound framing error");
                    self.fail(err).await;
                    return ControlFlow::Break(());
                }
            }
        }
    }
}
