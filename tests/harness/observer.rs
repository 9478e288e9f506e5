//! Observer that forwards every event to a channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use wsconn::{CloseFrame, Connection, ConnectionObserver, HandshakeRequest, HandshakeResponse, ObserverResult};

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Request(String),
    Response(u16),
    Open,
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close(Option<u16>),
    Unexpected(u8),
    Closed,
}

pub struct EventLog {
    tx: mpsc::UnboundedSender<Event>,
}

impl EventLog {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }

    fn push(&self, event: Event) -> ObserverResult {
        let _ = self.tx.send(event);
        Ok(())
    }

    /// Wait for the next event matching `pred`, skipping the rest.
    pub async fn wait_for(
        rx: &mut mpsc::UnboundedReceiver<Event>,
        pred: impl Fn(&Event) -> bool,
    ) -> Event {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let event = rx.recv().await.expect("event channel closed");
                if pred(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("timed out waiting for event")
    }
}

impl ConnectionObserver for EventLog {
    fn on_request(&self, _request: &HandshakeRequest, raw: &[u8]) -> ObserverResult {
        self.push(Event::Request(String::from_utf8_lossy(raw).into_owned()))
    }
    fn on_response(&self, response: &HandshakeResponse) -> ObserverResult {
        self.push(Event::Response(response.status))
    }
    fn on_open(&self, _conn: &Connection) -> ObserverResult {
        self.push(Event::Open)
    }
    fn on_text(&self, _conn: &Connection, text: &str) -> ObserverResult {
        self.push(Event::Text(text.to_string()))
    }
    fn on_binary(&self, _conn: &Connection, data: &[u8]) -> ObserverResult {
        self.push(Event::Binary(data.to_vec()))
    }
    fn on_ping(&self, _conn: &Connection, payload: &[u8]) -> ObserverResult {
        self.push(Event::Ping(payload.to_vec()))
    }
    fn on_pong(&self, _conn: &Connection, payload: &[u8]) -> ObserverResult {
        self.push(Event::Pong(payload.to_vec()))
    }
    fn on_close(&self, _conn: &Connection, frame: Option<&CloseFrame>) -> ObserverResult {
        self.push(Event::Close(frame.map(|f| f.code.as_u16())))
    }
    fn on_unexpected(&self, _conn: &Connection, opcode: u8) -> ObserverResult {
        self.push(Event::Unexpected(opcode))
    }
    fn on_closed(&self, _conn: &Connection) -> ObserverResult {
        self.push(Event::Closed)
    }
}
