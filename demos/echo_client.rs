//! Event-driven echo client.
//!
//! Connects to a WebSocket echo server, sends a few messages and prints
//! whatever comes back.
//!
//! Run: cargo run --example echo_client -- ws://127.0.0.1:9001/
//! Set RUST_LOG=wsclient=debug to see lifecycle logging.

use std::error::Error;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use wsclient::{ClientOptions, Message};

const DEFAULT_URL: &str = "ws://127.0.0.1:9001/";

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let url = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_URL.to_string());
    println!("Connecting to {url}");

    let (opened_tx, mut opened_rx) = mpsc::unbounded_channel();
    let (closed_tx, mut closed_rx) = mpsc::unbounded_channel();

    let client = wsclient::connect(&url, ClientOptions::default(), move |client| {
        client.on_open(move || {
            println!("Handshake complete");
            let _ = opened_tx.send(());
        });
        client.on_message(|message| match message {
            Message::Text(text) => println!("Received: {text}"),
            Message::Binary(data) => println!("Received {} bytes", data.len()),
            other => println!("Received control message: {other:?}"),
        });
        client.on_error(|err| eprintln!("Error: {err}"));
        client.on_close(move |err| {
            match err {
                Some(err) => println!("Closed: {err}"),
                None => println!("Closed"),
            }
            let _ = closed_tx.send(());
        });
    })
    .await?;

    if tokio::time::timeout(Duration::from_secs(5), opened_rx.recv())
        .await
        .is_err()
    {
        client.close().await;
        return Err("handshake timed out".into());
    }

    for text in ["Hello, WebSocket!", "second message", "third message"] {
        println!("Sending: {text}");
        client.send_text(text).await?;
    }
    client.send_binary(vec![0u8, 1, 2, 3]).await?;

    tokio::time::sleep(Duration::from_millis(500)).await;
    client.close().await;
    let _ = closed_rx.recv().await;

    Ok(())
}
