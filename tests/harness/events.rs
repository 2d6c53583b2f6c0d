//! Records every event a client fires, in order.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use wsclient::{Client, Error, Message};

#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Open,
    Message(Message),
    Error(Error),
    Close(Option<Error>),
}

#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<Recorded>>>,
}

impl Recorder {
    pub fn attach(client: &Client) -> Self {
        let recorder = Self::default();

        let events = Arc::clone(&recorder.events);
        client.on_open(move || events.lock().unwrap().push(Recorded::Open));
        let events = Arc::clone(&recorder.events);
        client.on_message(move |message| {
            events
                .lock()
                .unwrap()
                .push(Recorded::Message(message.clone()))
        });
        let events = Arc::clone(&recorder.events);
        client.on_error(move |err| events.lock().unwrap().push(Recorded::Error(err.clone())));
        let events = Arc::clone(&recorder.events);
        client.on_close(move |err| {
            events
                .lock()
                .unwrap()
                .push(Recorded::Close(err.cloned()))
        });

        recorder
    }

    pub fn events(&self) -> Vec<Recorded> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Recorded) -> bool) -> usize {
        self.events().iter().filter(|e| pred(e)).count()
    }

    pub fn opens(&self) -> usize {
        self.count(|e| matches!(e, Recorded::Open))
    }

    pub fn closes(&self) -> Vec<Option<Error>> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Recorded::Close(err) => Some(err),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<Error> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Recorded::Error(err) => Some(err),
                _ => None,
            })
            .collect()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Recorded::Message(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    /// Wait until `pred` holds for the recorded events, failing after 5s.
    pub async fn wait_for(&self, pred: impl Fn(&[Recorded]) -> bool) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            if pred(&self.events()) {
                return;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for events, got {:?}",
                self.events()
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    pub async fn wait_open(&self) {
        self.wait_for(|events| events.contains(&Recorded::Open)).await;
    }

    pub async fn wait_close(&self) {
        self.wait_for(|events| events.iter().any(|e| matches!(e, Recorded::Close(_))))
            .await;
    }

    pub async fn wait_messages(&self, n: usize) {
        self.wait_for(|events| {
            events
                .iter()
                .filter(|e| matches!(e, Recorded::Message(_)))
                .count()
                >= n
        })
        .await;
    }
}
