//! Scripted WebSocket server for integration tests.
//!
//! The server side is driven step by step from the test body so each test
//! can assert exactly which bytes the client put on the wire.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use wsconn::protocol::{Frame, MaskPolicy, ParseOptions, Parsed, compute_accept_key};

const READ_DEADLINE: Duration = Duration::from_secs(5);

/// A listener on a random loopback port.
pub struct TestServer {
    listener: TcpListener,
    addr: SocketAddr,
}

impl TestServer {
    pub async fn bind() -> (Self, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        (Self { listener, addr }, addr)
    }

    pub fn url(&self) -> String {
        format!("ws://{}/", self.addr)
    }

    pub async fn accept(&self) -> ServerConn {
        let (stream, _) = self.listener.accept().await.unwrap();
        ServerConn {
            stream,
            buf: Vec::new(),
        }
    }
}

/// Server end of one accepted connection.
pub struct ServerConn {
    stream: TcpStream,
    buf: Vec<u8>,
}

impl ServerConn {
    /// Read the upgrade request head.
    pub async fn read_request(&mut self) -> String {
        loop {
            if let Some(pos) = self.buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head: Vec<u8> = self.buf.drain(..pos + 4).collect();
                return String::from_utf8(head).unwrap();
            }
            self.fill().await;
        }
    }

    /// Value of `name` in a request head, case-insensitive.
    pub fn header<'a>(head: &'a str, name: &str) -> Option<&'a str> {
        head.lines().find_map(|line| {
            let (n, v) = line.split_once(':')?;
            n.trim().eq_ignore_ascii_case(name).then(|| v.trim())
        })
    }

    /// Read the request and accept it with a correct 101.
    pub async fn upgrade(&mut self) -> String {
        self.upgrade_with(&[]).await
    }

    /// Accept with extra response header lines.
    pub async fn upgrade_with(&mut self, extra: &[&str]) -> String {
        let head = self.read_request().await;
        let key = Self::header(&head, "Sec-WebSocket-Key").unwrap();
        let mut response = format!(
            "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: {}\r\n",
            compute_accept_key(key)
        );
        for line in extra {
            response.push_str(line);
            response.push_str("\r\n");
        }
        response.push_str("\r\n");
        self.write_raw(response.as_bytes()).await;
        head
    }

    pub async fn write_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
    }

    /// Send an unmasked frame.
    pub async fn send(&mut self, frame: &Frame) {
        self.write_raw(&frame.serialize(None)).await;
    }

    /// Read one client frame, which must be masked.
    pub async fn read_frame(&mut self) -> Frame {
        let options = ParseOptions {
            max_frame_size: 16 << 20,
            mask_policy: MaskPolicy::Required,
        };
        loop {
            if let Parsed::Frame { frame, consumed } = Frame::parse(&self.buf, &options).unwrap() {
                self.buf.drain(..consumed);
                return frame;
            }
            self.fill().await;
        }
    }

    /// Assert the client sends nothing more and shuts its side down.
    pub async fn expect_eof(&mut self) {
        assert!(self.buf.is_empty(), "unread bytes: {:?}", self.buf);
        let mut rest = Vec::new();
        tokio::time::timeout(READ_DEADLINE, self.stream.read_to_end(&mut rest))
            .await
            .expect("client did not shut down")
            .unwrap();
        assert!(rest.is_empty(), "unexpected bytes after close: {:?}", rest);
    }

    async fn fill(&mut self) {
        let mut chunk = [0u8; 4096];
        let n = tokio::time::timeout(READ_DEADLINE, self.stream.read(&mut chunk))
            .await
            .expect("timed out waiting for client bytes")
            .unwrap();
        assert!(n > 0, "client closed the stream");
        self.buf.extend_from_slice(&chunk[..n]);
    }
}
