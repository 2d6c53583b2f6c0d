//! Scripted WebSocket server side for integration tests.
//!
//! The server reads the client's upgrade request, then lets a test decide
//! exactly which bytes go back: a valid 101, a broken one, raw frames.

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use wsclient::protocol::apply_mask;

pub struct TestServer {
    listener: TcpListener,
    pub addr: SocketAddr,
}

impl TestServer {
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        Self { listener, addr }
    }

    pub fn url(&self, path: &str) -> String {
        format!("ws://127.0.0.1:{}{}", self.addr.port(), path)
    }

    pub async fn accept_tcp(&self) -> TcpStream {
        let (stream, _) = self.listener.accept().await.unwrap();
        stream
    }

    /// Accept a connection and read its upgrade request.
    pub async fn accept(&self) -> ServerConn<TcpStream> {
        let stream = self.accept_tcp().await;
        ServerConn::read_request(stream).await
    }
}

pub struct ServerConn<S> {
    stream: S,
    pub request: String,
}

impl<S: AsyncRead + AsyncWrite + Unpin> ServerConn<S> {
    /// Read an HTTP request header block from `stream`.
    pub async fn read_request(mut stream: S) -> Self {
        let mut raw = Vec::new();
        let mut byte = [0u8; 1];
        while !raw.ends_with(b"\r\n\r\n") {
            let n = stream.read(&mut byte).await.unwrap();
            assert_ne!(n, 0, "client closed before finishing the request");
            raw.push(byte[0]);
        }
        Self {
            stream,
            request: String::from_utf8(raw).unwrap(),
        }
    }

    /// Value of a request header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<String> {
        self.request.lines().find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then(|| value.trim().to_string())
        })
    }

    pub fn upgrade_response(&self) -> Vec<u8> {
        let key = self.header("Sec-WebSocket-Key").unwrap();
        format!(
            "HTTP/1.1 101 Switching Protocols\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Accept: {}\r\n\r\n",
            wsclient::compute_accept_key(&key)
        )
        .into_bytes()
    }

    pub async fn accept_upgrade(&mut self) {
        let response = self.upgrade_response();
        self.send_raw(&response).await;
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
        self.stream.flush().await.unwrap();
    }

    pub async fn send_frame(&mut self, opcode: u8, payload: &[u8]) {
        self.send_raw(&server_frame(true, opcode, payload)).await;
    }

    /// Read one masked client frame. `None` once the client has gone away.
    pub async fn read_frame(&mut self) -> Option<(u8, Vec<u8>)> {
        let mut head = [0u8; 2];
        if self.stream.read_exact(&mut head).await.is_err() {
            return None;
        }
        assert_ne!(head[1] & 0x80, 0, "client frames must be masked");

        let len = match head[1] & 0x7F {
            126 => {
                let mut ext = [0u8; 2];
                self.stream.read_exact(&mut ext).await.ok()?;
                u16::from_be_bytes(ext) as usize
            }
            127 => {
                let mut ext = [0u8; 8];
                self.stream.read_exact(&mut ext).await.ok()?;
                u64::from_be_bytes(ext) as usize
            }
            n => n as usize,
        };
        let mut mask = [0u8; 4];
        self.stream.read_exact(&mut mask).await.ok()?;
        let mut payload = vec![0u8; len];
        self.stream.read_exact(&mut payload).await.ok()?;
        apply_mask(&mut payload, mask);

        Some((head[0] & 0x0F, payload))
    }

    pub async fn shutdown(&mut self) {
        let _ = self.stream.shutdown().await;
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

/// Encode an unmasked server frame.
pub fn server_frame(fin: bool, opcode: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = vec![if fin { 0x80 } else { 0x00 } | opcode];
    match payload.len() {
        n if n < 126 => out.push(n as u8),
        n if n <= u16::MAX as usize => {
            out.push(126);
            out.extend_from_slice(&(n as u16).to_be_bytes());
        }
        n => {
            out.push(127);
            out.extend_from_slice(&(n as u64).to_be_bytes());
        }
    }
    out.extend_from_slice(payload);
    out
}

/// In-memory stream whose writes can be switched to fail with `BrokenPipe`.
pub struct FailingStream {
    inner: DuplexStream,
    fail_writes: Arc<AtomicBool>,
}

impl FailingStream {
    pub fn new(inner: DuplexStream) -> (Self, Arc<AtomicBool>) {
        let fail_writes = Arc::new(AtomicBool::new(false));
        (
            Self {
                inner,
                fail_writes: Arc::clone(&fail_writes),
            },
            fail_writes,
        )
    }
}

impl AsyncRead for FailingStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for FailingStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "simulated broken pipe",
            )));
        }
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
