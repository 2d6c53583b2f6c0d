//! Integration tests for the client lifecycle.
//!
//! A scripted server on a loopback socket (or an in-memory duplex stream)
//! plays the server side byte for byte.

mod harness;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::io::AsyncReadExt;

use harness::{FailingStream, Recorded, Recorder, ServerConn, TestServer, server_frame};
use wsclient::{Client, ClientOptions, CloseCode, ConnectionState, Error, Message, MessageKind};

const TEXT: u8 = 0x1;
const BINARY: u8 = 0x2;
const CONTINUATION: u8 = 0x0;
const CLOSE: u8 = 0x8;
const PING: u8 = 0x9;
const PONG: u8 = 0xA;

async fn open_client(server: &TestServer) -> (Client, Recorder, ServerConn<tokio::net::TcpStream>) {
    let client = Client::new();
    let recorder = Recorder::attach(&client);
    client
        .connect(&server.url("/chat?room=1"), ClientOptions::default())
        .await
        .unwrap();
    let mut conn = server.accept().await;
    conn.accept_upgrade().await;
    recorder.wait_open().await;
    (client, recorder, conn)
}

#[tokio::test]
async fn test_handshake_opens_once() {
    let server = TestServer::bind().await;
    let (client, recorder, conn) = open_client(&server).await;

    assert!(conn.request.starts_with("GET /chat?room=1 HTTP/1.1\r\n"));
    assert_eq!(
        conn.header("Host"),
        Some(format!("127.0.0.1:{}", server.addr.port()))
    );
    assert_eq!(conn.header("Sec-WebSocket-Version").as_deref(), Some("13"));

    assert!(client.is_open());
    assert_eq!(client.state(), ConnectionState::Open);
    assert_eq!(client.url(), Some(server.url("/chat?room=1")));
    assert_eq!(client.handshake().map(|h| h.version), Some(13));

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(recorder.opens(), 1);
}

#[tokio::test]
async fn test_extra_headers_are_sent() {
    let server = TestServer::bind().await;
    let client = Client::new();
    let options = ClientOptions::new()
        .with_header("Authorization", "Bearer token")
        .with_header("Origin", "http://example.com");
    client.connect(&server.url("/"), options).await.unwrap();

    let conn = server.accept().await;
    assert_eq!(conn.header("Authorization").as_deref(), Some("Bearer token"));
    assert_eq!(conn.header("Origin").as_deref(), Some("http://example.com"));
}

#[tokio::test]
async fn test_messages_arrive_in_order() {
    let server = TestServer::bind().await;
    let (_client, recorder, mut conn) = open_client(&server).await;

    let mut burst = Vec::new();
    burst.extend(server_frame(true, TEXT, b"first"));
    burst.extend(server_frame(true, BINARY, &[1, 2, 3]));
    burst.extend(server_frame(false, TEXT, b"frag"));
    burst.extend(server_frame(true, CONTINUATION, b"mented"));
    burst.extend(server_frame(true, TEXT, b"last"));
    conn.send_raw(&burst).await;

    recorder.wait_messages(4).await;
    assert_eq!(
        recorder.messages(),
        vec![
            Message::text("first"),
            Message::binary(vec![1u8, 2, 3]),
            Message::text("fragmented"),
            Message::text("last"),
        ]
    );
}

#[tokio::test]
async fn test_frames_in_handshake_read_are_delivered() {
    let server = TestServer::bind().await;
    let client = Client::new();
    let recorder = Recorder::attach(&client);
    client.connect(&server.url("/"), ClientOptions::default()).await.unwrap();

    let mut conn = server.accept().await;
    let mut bytes = conn.upgrade_response();
    bytes.extend(server_frame(true, TEXT, b"early"));
    conn.send_raw(&bytes).await;

    recorder.wait_messages(1).await;
    assert_eq!(
        recorder.events(),
        vec![Recorded::Open, Recorded::Message(Message::text("early"))]
    );
}

#[tokio::test]
async fn test_send_reaches_server() {
    let server = TestServer::bind().await;
    let (client, _recorder, mut conn) = open_client(&server).await;

    client.send("hello", MessageKind::Text).await.unwrap();
    client.send_binary([0xde_u8, 0xad]).await.unwrap();
    client.ping(b"hb").await.unwrap();

    assert_eq!(conn.read_frame().await, Some((TEXT, b"hello".to_vec())));
    assert_eq!(conn.read_frame().await, Some((BINARY, vec![0xde, 0xad])));
    assert_eq!(conn.read_frame().await, Some((PING, b"hb".to_vec())));
}

#[tokio::test]
async fn test_send_before_handshake_is_noop() {
    let server = TestServer::bind().await;
    let client = Client::new();
    let recorder = Recorder::attach(&client);
    client.connect(&server.url("/"), ClientOptions::default()).await.unwrap();
    let mut conn = server.accept().await;

    assert_eq!(client.state(), ConnectionState::HandshakePending);
    assert!(client.send_text("too early").await.is_ok());

    conn.accept_upgrade().await;
    recorder.wait_open().await;
    client.send_text("on time").await.unwrap();

    assert_eq!(conn.read_frame().await, Some((TEXT, b"on time".to_vec())));
}

#[tokio::test]
async fn test_encoding_errors_are_returned() {
    let server = TestServer::bind().await;
    let (client, recorder, _conn) = open_client(&server).await;

    let result = client.ping(vec![0u8; 126]).await;
    assert!(matches!(result, Err(Error::ControlFrameTooLarge(126))));
    let result = client.send([0xff_u8, 0xfe], MessageKind::Text).await;
    assert!(matches!(result, Err(Error::InvalidUtf8)));

    assert!(client.is_open());
    assert!(recorder.closes().is_empty());
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let server = TestServer::bind().await;
    let (client, recorder, mut conn) = open_client(&server).await;

    client.close().await;
    client.close().await;
    client.close().await;

    assert_eq!(recorder.closes(), vec![None]);
    assert!(!client.is_open());
    assert_eq!(client.state(), ConnectionState::Closed);

    // Normal closure, then nothing more.
    assert_eq!(conn.read_frame().await, Some((CLOSE, vec![0x03, 0xE8])));
    assert!(client.send_text("after close").await.is_ok());
    assert_eq!(conn.read_frame().await, None);
    assert_eq!(recorder.events().last(), Some(&Recorded::Close(None)));
}

#[tokio::test]
async fn test_concurrent_close_fires_once() {
    let server = TestServer::bind().await;
    let (client, recorder, _conn) = open_client(&server).await;

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let client = client.clone();
        tasks.push(tokio::spawn(async move { client.close().await }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(recorder.closes().len(), 1);
}

#[tokio::test]
async fn test_peer_close() {
    let server = TestServer::bind().await;
    let (client, recorder, mut conn) = open_client(&server).await;

    let mut payload = 1001u16.to_be_bytes().to_vec();
    payload.extend_from_slice(b"bye");
    conn.send_frame(CLOSE, &payload).await;

    recorder.wait_close().await;
    assert_eq!(recorder.closes(), vec![None]);
    assert!(!client.is_open());

    let frame = client.peer_close_frame().unwrap();
    assert_eq!(frame.code, CloseCode::GoingAway);
    assert_eq!(frame.reason, "bye");

    // The reply echoes the peer's code.
    assert_eq!(conn.read_frame().await, Some((CLOSE, vec![0x03, 0xE9])));
}

#[tokio::test]
async fn test_ping_is_answered() {
    let server = TestServer::bind().await;
    let (_client, recorder, mut conn) = open_client(&server).await;

    conn.send_frame(PING, b"beat").await;

    assert_eq!(conn.read_frame().await, Some((PONG, b"beat".to_vec())));
    recorder.wait_messages(1).await;
    assert_eq!(recorder.messages(), vec![Message::Ping(b"beat".to_vec())]);
}

#[tokio::test]
async fn test_server_eof_closes_with_error() {
    let server = TestServer::bind().await;
    let (client, recorder, mut conn) = open_client(&server).await;

    conn.shutdown().await;
    drop(conn);

    recorder.wait_close().await;
    assert_eq!(
        recorder.events(),
        vec![
            Recorded::Open,
            Recorded::Error(Error::ConnectionClosed(None)),
            Recorded::Close(Some(Error::ConnectionClosed(None))),
        ]
    );
    assert_eq!(client.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_invalid_utf8_is_transient() {
    let server = TestServer::bind().await;
    let (client, recorder, mut conn) = open_client(&server).await;

    conn.send_frame(TEXT, &[0xff, 0xfe]).await;
    conn.send_frame(TEXT, b"still here").await;

    recorder.wait_messages(1).await;
    assert_eq!(
        recorder.events(),
        vec![
            Recorded::Open,
            Recorded::Error(Error::InvalidUtf8),
            Recorded::Message(Message::text("still here")),
        ]
    );
    assert!(client.is_open());
}

#[tokio::test]
async fn test_framing_error_is_fatal() {
    let server = TestServer::bind().await;
    let (client, recorder, mut conn) = open_client(&server).await;

    // Reserved opcode 0x3.
    conn.send_raw(&[0x83, 0x00]).await;

    recorder.wait_close().await;
    assert_eq!(
        recorder.events(),
        vec![
            Recorded::Open,
            Recorded::Error(Error::ReservedOpcode(0x3)),
            Recorded::Close(Some(Error::ReservedOpcode(0x3))),
        ]
    );
    assert!(!client.is_open());
}

#[tokio::test]
async fn test_bad_accept_key_never_opens() {
    let server = TestServer::bind().await;
    let client = Client::new();
    let recorder = Recorder::attach(&client);
    client.connect(&server.url("/"), ClientOptions::default()).await.unwrap();

    let mut conn = server.accept().await;
    conn.send_raw(
        b"HTTP/1.1 101 Switching Protocols\r\n\
          Upgrade: websocket\r\n\
          Connection: Upgrade\r\n\
          Sec-WebSocket-Accept: bm90IHRoZSByaWdodCBrZXk=\r\n\r\n",
    )
    .await;

    recorder.wait_close().await;
    assert_eq!(recorder.opens(), 0);
    assert!(matches!(recorder.errors().as_slice(), [Error::InvalidHandshake(_)]));
    assert!(matches!(
        recorder.closes().as_slice(),
        [Some(Error::InvalidHandshake(_))]
    ));
}

#[tokio::test]
async fn test_second_connect_is_ignored() {
    let server = TestServer::bind().await;
    let (client, recorder, _conn) = open_client(&server).await;

    assert!(client.connect("ws://127.0.0.1:1/", ClientOptions::default()).await.is_ok());
    assert!(client.is_open());
    assert_eq!(client.url(), Some(server.url("/chat?room=1")));
    assert_eq!(recorder.opens(), 1);
}

#[tokio::test]
async fn test_connect_refused() {
    let server = TestServer::bind().await;
    let url = server.url("/");
    drop(server);

    let client = Client::new();
    let result = client.connect(&url, ClientOptions::default()).await;
    assert!(matches!(result, Err(Error::Io { .. })));
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_broken_pipe_on_send_closes_once() {
    let (client_side, server_side) = tokio::io::duplex(4096);
    let (stream, fail_writes) = FailingStream::new(client_side);

    let client = Client::new();
    let recorder = Recorder::attach(&client);
    client
        .connect_with_stream("ws://localhost/", stream, ClientOptions::default())
        .await
        .unwrap();

    let mut conn = ServerConn::read_request(server_side).await;
    assert_eq!(conn.header("Host").as_deref(), Some("localhost"));
    conn.accept_upgrade().await;
    recorder.wait_open().await;

    fail_writes.store(true, Ordering::SeqCst);
    assert!(client.send_text("lost").await.is_ok());

    let closes = recorder.closes();
    assert_eq!(closes.len(), 1);
    assert!(closes[0].as_ref().is_some_and(Error::is_broken_pipe));
    assert!(recorder.errors().is_empty());
    assert!(!client.is_open());

    client.close().await;
    assert!(client.send_text("ignored").await.is_ok());
    assert_eq!(recorder.closes().len(), 1);
}

#[tokio::test]
async fn test_handlers_can_use_the_client() {
    let server = TestServer::bind().await;
    let client = Client::new();
    let replies = client.clone();
    client.on_message(move |message| {
        if let Some(text) = message.as_text() {
            let replies = replies.clone();
            let echo = format!("echo: {text}");
            tokio::spawn(async move { replies.send_text(&echo).await });
        }
    });
    client.connect(&server.url("/"), ClientOptions::default()).await.unwrap();

    let mut conn = server.accept().await;
    conn.accept_upgrade().await;
    conn.send_frame(TEXT, b"hi").await;

    assert_eq!(conn.read_frame().await, Some((TEXT, b"echo: hi".to_vec())));
    client.close().await;
}

#[tokio::test]
async fn test_once_handlers_and_off() {
    let server = TestServer::bind().await;
    let client = Client::new();
    let once = Arc::new(AtomicUsize::new(0));
    let removed = Arc::new(AtomicUsize::new(0));

    let o = Arc::clone(&once);
    client.once_message(move |_| {
        o.fetch_add(1, Ordering::SeqCst);
    });
    let r = Arc::clone(&removed);
    let id = client.on_message(move |_| {
        r.fetch_add(1, Ordering::SeqCst);
    });
    assert!(client.off(id));
    let recorder = Recorder::attach(&client);

    client.connect(&server.url("/"), ClientOptions::default()).await.unwrap();
    let mut conn = server.accept().await;
    conn.accept_upgrade().await;
    conn.send_frame(TEXT, b"one").await;
    conn.send_frame(TEXT, b"two").await;

    recorder.wait_messages(2).await;
    assert_eq!(once.load(Ordering::SeqCst), 1);
    assert_eq!(removed.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_connect_helper_subscribes_before_connecting() {
    let server = TestServer::bind().await;
    let opened = Arc::new(AtomicUsize::new(0));
    let o = Arc::clone(&opened);

    let client = wsclient::connect(&server.url("/"), ClientOptions::default(), move |client| {
        client.on_open(move || {
            o.fetch_add(1, Ordering::SeqCst);
        });
    })
    .await
    .unwrap();
    let recorder = Recorder::attach(&client);

    let mut conn = server.accept().await;
    conn.accept_upgrade().await;
    recorder.wait_open().await;
    assert_eq!(opened.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_dropping_client_stops_receiver() {
    let server = TestServer::bind().await;
    let (client, _recorder, mut conn) = open_client(&server).await;

    drop(client);

    // The receiver owned the read half; once it is gone the socket closes.
    assert_eq!(
        tokio::time::timeout(Duration::from_secs(5), conn.read_frame())
            .await
            .unwrap(),
        None
    );
}

#[tokio::test]
async fn test_close_during_connect_releases_transport() {
    // The request does not fit in the pipe, so connect stalls writing it.
    let (client_side, mut server_side) = tokio::io::duplex(16);
    let client = Client::new();
    let recorder = Recorder::attach(&client);
    let connect = tokio::spawn({
        let client = client.clone();
        async move {
            client
                .connect_with_stream("ws://localhost/", client_side, ClientOptions::default())
                .await
        }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(client.state(), ConnectionState::Connecting);
    client.close().await;

    assert_eq!(connect.await.unwrap(), Err(Error::ConnectionClosed(None)));
    assert_eq!(recorder.closes(), vec![None]);
    assert_eq!(client.state(), ConnectionState::Closed);

    // Only what was already buffered arrives, then EOF.
    let mut received = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), server_side.read_to_end(&mut received))
        .await
        .expect("transport was not released")
        .unwrap();
    assert!(received.len() <= 16);
    assert!(client.send_text("ignored").await.is_ok());
}

#[tokio::test]
async fn test_weak_handle_in_handler_lets_client_drop() {
    let server = TestServer::bind().await;
    let client = Client::new();
    let weak = client.downgrade();
    client.on_message(move |message| {
        if let (Some(text), Some(client)) = (message.as_text(), weak.upgrade()) {
            let echo = format!("echo: {text}");
            tokio::spawn(async move { client.send_text(&echo).await });
        }
    });
    client.connect(&server.url("/"), ClientOptions::default()).await.unwrap();

    let mut conn = server.accept().await;
    conn.accept_upgrade().await;
    conn.send_frame(TEXT, b"hi").await;
    assert_eq!(conn.read_frame().await, Some((TEXT, b"echo: hi".to_vec())));

    drop(client);
    assert_eq!(
        tokio::time::timeout(Duration::from_secs(5), conn.read_frame())
            .await
            .unwrap(),
        None
    );
}

#[tokio::test]
async fn test_close_releases_clients_captured_by_handlers() {
    let server = TestServer::bind().await;
    let (client, _recorder, _conn) = open_client(&server).await;

    let captured = client.clone();
    client.on_message(move |_| {
        let _ = captured.is_open();
    });
    let weak = client.downgrade();

    client.close().await;
    drop(client);
    assert!(weak.upgrade().is_none());
}
