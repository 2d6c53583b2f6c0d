use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::io::{AsyncWriteExt, WriteHalf};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::receiver::Receiver;
use super::state::{ConnectionState, StateCell};
use crate::config::ClientOptions;
use crate::error::{Error, Result};
use crate::event::{EventEmitter, SubscriptionId};
use crate::message::{CloseCode, CloseFrame, Message, MessageKind};
use crate::protocol::codec::{FrameDecoder, FrameEncoder};
use crate::protocol::handshake::{ClientHandshake, Negotiated, WS_VERSION};
use crate::transport::{Connector, Stream, Target, Transport};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Which actor runs the close path. Only the caller joins the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Initiator {
    Caller,
    Receiver,
}

struct Writer {
    half: WriteHalf<Transport>,
    encoder: FrameEncoder,
}

/// State shared by every `Client` handle and the receiver task.
pub(crate) struct Shared {
    pub(crate) state: StateCell,
    pub(crate) emitter: EventEmitter,
    pub(crate) cancel: CancellationToken,
    writer: tokio::sync::Mutex<Option<Writer>>,
    url: Mutex<Option<String>>,
    negotiated: Mutex<Option<Negotiated>>,
    peer_close: Mutex<Option<CloseFrame>>,
    receiver: Mutex<Option<JoinHandle<()>>>,
    shutdown_timeout: Mutex<Duration>,
    pipe_broken: AtomicBool,
    closing: AtomicBool,
}

impl Shared {
    pub(crate) fn new() -> Self {
        Self {
            state: StateCell::default(),
            emitter: EventEmitter::new(),
            cancel: CancellationToken::new(),
            writer: tokio::sync::Mutex::new(None),
            url: Mutex::new(None),
            negotiated: Mutex::new(None),
            peer_close: Mutex::new(None),
            receiver: Mutex::new(None),
            shutdown_timeout: Mutex::new(ClientOptions::default().shutdown_timeout),
            pipe_broken: AtomicBool::new(false),
            closing: AtomicBool::new(false),
        }
    }

    fn version(&self) -> u8 {
        lock(&self.negotiated)
            .as_ref()
            .map_or(WS_VERSION, |negotiated| negotiated.version)
    }

    pub(crate) fn set_negotiated(&self, negotiated: Negotiated) {
        *lock(&self.negotiated) = Some(negotiated);
    }

    pub(crate) fn set_peer_close(&self, frame: Option<CloseFrame>) {
        *lock(&self.peer_close) = frame;
    }

    /// Whether the close path has started.
    pub(crate) fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    pub(crate) fn mark_pipe_broken(&self) {
        self.pipe_broken.store(true, Ordering::Release);
    }

    /// Encode and write one message if the connection is open.
    ///
    /// Transport failures end the connection through [`Shared::shutdown`]
    /// and are not returned; only encoding errors reach the caller.
    pub(crate) async fn send(
        &self,
        payload: &[u8],
        kind: MessageKind,
        initiator: Initiator,
    ) -> Result<()> {
        if !self.state.get().can_send() {
            trace!(state = %self.state.get(), "send ignored");
            return Ok(());
        }
        let version = self.version();

        let mut writer = self.writer.lock().await;
        let Some(w) = writer.as_mut() else {
            return Ok(());
        };
        let frame = w.encoder.encode(payload, kind, version)?;

        let written = match w.half.write_all(&frame).await {
            Ok(()) => w.half.flush().await,
            Err(err) => Err(err),
        };
        if let Err(err) = written {
            let err = Error::from(err);
            warn!(error = %err, "write failed, closing connection");
            self.mark_pipe_broken();
            drop(writer);
            self.shutdown(Some(err), initiator).await;
        }
        Ok(())
    }

    /// The unified close path. Runs its body exactly once, whichever actor
    /// gets here first.
    pub(crate) async fn shutdown(&self, error: Option<Error>, initiator: Initiator) {
        if self.closing.swap(true, Ordering::AcqRel) {
            return;
        }
        let timeout = *lock(&self.shutdown_timeout);

        {
            let mut writer = self.writer.lock().await;
            let previous = self.state.close();

            if let Some(mut w) = writer.take() {
                if previous == ConnectionState::Open && !self.pipe_broken.load(Ordering::Acquire) {
                    let payload = self.close_reply();
                    match w.encoder.encode(&payload, MessageKind::Close, self.version()) {
                        Ok(frame) => {
                            let write = async {
                                w.half.write_all(&frame).await?;
                                w.half.flush().await
                            };
                            match tokio::time::timeout(timeout, write).await {
                                Ok(Ok(())) => trace!("close frame sent"),
                                Ok(Err(err)) => warn!(error = %err, "failed to send close frame"),
                                Err(_) => warn!("timed out sending close frame"),
                            }
                        }
                        Err(err) => warn!(error = %err, "failed to encode close frame"),
                    }
                }
                if let Err(err) = w.half.shutdown().await {
                    trace!(error = %err, "transport shutdown failed");
                }
            }
        }

        self.cancel.cancel();
        match &error {
            Some(err) => debug!(error = %err, ?initiator, "connection closed"),
            None => debug!(?initiator, "connection closed"),
        }
        self.emitter.emit_close(error.as_ref());

        if initiator == Initiator::Caller {
            let handle = lock(&self.receiver).take();
            if let Some(mut handle) = handle {
                if tokio::time::timeout(timeout, &mut handle).await.is_err() {
                    warn!(?timeout, "receiver did not stop in time, aborting");
                    handle.abort();
                }
            }
        }
    }

    /// Close payload we send: echo the peer's code when answering a close,
    /// otherwise a normal closure.
    fn close_reply(&self) -> Vec<u8> {
        let code = lock(&self.peer_close)
            .as_ref()
            .map_or(CloseCode::Normal, |frame| frame.code);
        code.as_u16().to_be_bytes().to_vec()
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Owns the receiver task on behalf of every `Client` clone.
struct Handle {
    shared: Arc<Shared>,
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
        if let Some(handle) = lock(&self.shared.receiver).take() {
            handle.abort();
        }
    }
}

/// An event-driven WebSocket client.
///
/// `Client` is a cheap handle: clones share the same connection. Dropping
/// the last handle stops the background receiver and releases the
/// transport.
///
/// Handlers are owned by the client, so a handler that needs the client
/// should capture a [`WeakClient`] from [`Client::downgrade`]. A strong
/// clone captured in a handler keeps the connection alive until it closes.
///
/// # Example
///
/// ```rust,no_run
/// use wsclient::{Client, ClientOptions, MessageKind};
///
/// # async fn run() -> wsclient::Result<()> {
/// let client = Client::new();
/// client.on_message(|message| println!("received {message:?}"));
/// client.on_close(|err| println!("closed: {err:?}"));
///
/// client.connect("ws://localhost:9001/", ClientOptions::default()).await?;
/// client.send("hello", MessageKind::Text).await?;
/// client.close().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<Handle>,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    /// Create a client in the `Disconnected` state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Handle {
                shared: Arc::new(Shared::new()),
            }),
        }
    }

    fn shared(&self) -> &Arc<Shared> {
        &self.inner.shared
    }

    /// Connect to `url` and send the opening handshake.
    ///
    /// Returns once the upgrade request is written; `open` fires later from
    /// the background receiver. For `wss`/`https` URLs the TLS configuration
    /// is built before any socket is opened, and the TLS handshake completes
    /// before this returns.
    ///
    /// Only the first call on a client does anything; later calls return
    /// `Ok(())`.
    ///
    /// # Errors
    ///
    /// Configuration and URL errors, TCP connect failures, TLS failures and
    /// failures writing the request. The client is left `Disconnected`.
    ///
    /// `Error::ConnectionClosed(None)` if [`Client::close`] ran before the
    /// connection was established; the transport is dropped and the client
    /// stays `Closed`.
    pub async fn connect(&self, url: &str, options: ClientOptions) -> Result<()> {
        let shared = self.shared();
        if !shared
            .state
            .transition(ConnectionState::Disconnected, ConnectionState::Connecting)
        {
            debug!(state = %shared.state.get(), "connect ignored");
            return Ok(());
        }
        debug!(%url, "connecting");

        let prepared = async {
            let (target, handshake) = prepare(url, &options)?;
            let connector = Connector::for_target(&target, &options)?;
            let transport = connector.connect(&target).await?;
            Ok::<_, Error>((handshake, transport))
        };
        let prepared = tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => Err(Error::ConnectionClosed(None)),
            prepared = prepared => prepared,
        };

        match prepared {
            Ok((handshake, transport)) => self.start(url, handshake, transport, options).await,
            Err(err) => {
                shared
                    .state
                    .transition(ConnectionState::Connecting, ConnectionState::Disconnected);
                debug!(error = %err, "connect failed");
                Err(err)
            }
        }
    }

    /// Create a handle that does not keep the connection alive.
    #[must_use]
    pub fn downgrade(&self) -> WeakClient {
        WeakClient {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Run the client over an already connected stream.
    ///
    /// `url` supplies the `Host` header and request target; no socket is
    /// opened and no TLS is negotiated.
    ///
    /// # Errors
    ///
    /// URL and header errors, or a failure writing the request.
    /// `Error::ConnectionClosed(None)` if the client was closed first.
    pub async fn connect_with_stream<S: Stream>(
        &self,
        url: &str,
        stream: S,
        options: ClientOptions,
    ) -> Result<()> {
        let shared = self.shared();
        if !shared
            .state
            .transition(ConnectionState::Disconnected, ConnectionState::Connecting)
        {
            return Ok(());
        }

        match prepare(url, &options) {
            Ok((_, handshake)) => self.start(url, handshake, Box::new(stream), options).await,
            Err(err) => {
                shared
                    .state
                    .transition(ConnectionState::Connecting, ConnectionState::Disconnected);
                Err(err)
            }
        }
    }

    async fn start(
        &self,
        url: &str,
        handshake: ClientHandshake,
        transport: Transport,
        options: ClientOptions,
    ) -> Result<()> {
        let shared = self.shared();
        let (reader, mut half) = tokio::io::split(transport);

        let request = handshake.to_wire_request();
        let written = tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => None,
            written = write_request(&mut half, &request) => Some(written),
        };
        match written {
            // Dropping both halves closes the transport.
            None => {
                debug!("closed while connecting, dropping transport");
                return Err(Error::ConnectionClosed(None));
            }
            Some(Err(err)) => {
                shared
                    .state
                    .transition(ConnectionState::Connecting, ConnectionState::Disconnected);
                return Err(err.into());
            }
            Some(Ok(())) => trace!(bytes = request.len(), "handshake request sent"),
        }

        *lock(&shared.url) = Some(url.to_string());
        *lock(&shared.shutdown_timeout) = options.shutdown_timeout;

        // The close path takes this lock before marking the state closed, so
        // either it sees the writer and receiver below or we see `Closed`.
        let mut writer = shared.writer.lock().await;
        if !shared
            .state
            .transition(ConnectionState::Connecting, ConnectionState::HandshakePending)
        {
            debug!("closed while connecting, dropping transport");
            return Err(Error::ConnectionClosed(None));
        }
        *writer = Some(Writer {
            half,
            encoder: FrameEncoder::new(),
        });

        let receiver = Receiver::new(
            Arc::clone(shared),
            reader,
            handshake,
            FrameDecoder::new(options.limits),
            options.read_buffer_size,
        );
        *lock(&shared.receiver) = Some(tokio::spawn(receiver.run()));
        Ok(())
    }

    /// Send a message.
    ///
    /// Does nothing unless the connection is open. A transport failure
    /// closes the connection (the `close` event carries the error) instead
    /// of being returned.
    ///
    /// # Errors
    ///
    /// Encoding errors only: `Error::InvalidUtf8` for non-UTF-8 text,
    /// `Error::ControlFrameTooLarge` for control payloads over 125 bytes.
    pub async fn send(&self, data: impl AsRef<[u8]>, kind: MessageKind) -> Result<()> {
        self.shared()
            .send(data.as_ref(), kind, Initiator::Caller)
            .await
    }

    pub async fn send_text(&self, text: &str) -> Result<()> {
        self.send(text, MessageKind::Text).await
    }

    pub async fn send_binary(&self, data: impl AsRef<[u8]>) -> Result<()> {
        self.send(data, MessageKind::Binary).await
    }

    pub async fn ping(&self, payload: impl AsRef<[u8]>) -> Result<()> {
        self.send(payload, MessageKind::Ping).await
    }

    /// Close the connection. Idempotent.
    ///
    /// Sends a close frame if the connection is open and the write side is
    /// healthy, releases the transport, fires `close`, then waits up to the
    /// configured shutdown timeout for the receiver to stop.
    pub async fn close(&self) {
        self.shared().shutdown(None, Initiator::Caller).await;
    }

    /// `true` after the handshake finished and before the connection closed.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.shared().state.get() == ConnectionState::Open
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared().state.get()
    }

    /// URL passed to the successful `connect`.
    #[must_use]
    pub fn url(&self) -> Option<String> {
        lock(&self.shared().url).clone()
    }

    /// Parameters negotiated by the opening handshake.
    #[must_use]
    pub fn handshake(&self) -> Option<Negotiated> {
        lock(&self.shared().negotiated).clone()
    }

    /// Close frame received from the server, if it initiated the close.
    #[must_use]
    pub fn peer_close_frame(&self) -> Option<CloseFrame> {
        lock(&self.shared().peer_close).clone()
    }

    /// The client's event emitter.
    #[must_use]
    pub fn events(&self) -> &EventEmitter {
        &self.shared().emitter
    }

    pub fn on_open<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.events().on_open(handler)
    }

    pub fn once_open<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.events().once_open(handler)
    }

    pub fn on_message<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.events().on_message(handler)
    }

    pub fn once_message<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.events().once_message(handler)
    }

    pub fn on_error<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.events().on_error(handler)
    }

    pub fn once_error<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.events().once_error(handler)
    }

    pub fn on_close<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(Option<&Error>) + Send + Sync + 'static,
    {
        self.events().on_close(handler)
    }

    pub fn once_close<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(Option<&Error>) + Send + Sync + 'static,
    {
        self.events().once_close(handler)
    }

    pub fn off(&self, id: SubscriptionId) -> bool {
        self.events().off(id)
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("url", &self.url())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// A non-owning [`Client`] handle, for event handlers.
#[derive(Clone)]
pub struct WeakClient {
    inner: Weak<Handle>,
}

impl WeakClient {
    /// The client, if any strong handle is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<Client> {
        self.inner.upgrade().map(|inner| Client { inner })
    }
}

impl std::fmt::Debug for WeakClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakClient")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

async fn write_request(half: &mut WriteHalf<Transport>, request: &[u8]) -> std::io::Result<()> {
    half.write_all(request).await?;
    half.flush().await
}

/// Resolve the URL and build the handshake. No I/O.
fn prepare(url: &str, options: &ClientOptions) -> Result<(Target, ClientHandshake)> {
    let target = Target::parse(url)?;
    let handshake = ClientHandshake::new(
        target.host_header(),
        target.resource.clone(),
        &options.headers,
        &options.protocols,
        options.limits.clone(),
    )?;
    Ok((target, handshake))
}

/// Create a client, let `setup` subscribe to its events, then connect.
///
/// ```rust,no_run
/// # async fn run() -> wsclient::Result<()> {
/// let client = wsclient::connect("wss://example.com/feed", Default::default(), |client| {
///     client.on_open(|| println!("open"));
///     client.on_message(|message| println!("{message:?}"));
/// })
/// .await?;
/// # drop(client);
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Everything [`Client::connect`] returns.
pub async fn connect<F>(url: &str, options: ClientOptions, setup: F) -> Result<Client>
where
    F: FnOnce(&Client),
{
    let client = Client::new();
    setup(&client);
    client.connect(url, options).await?;
    Ok(client)
}
