//! # wsconn - Single-connection WebSocket client
//!
//! `wsconn` opens one RFC 6455 WebSocket session at a time over TCP or TLS and
//! keeps it running in the background.
//!
//! ## Features
//!
//! - **Transport setup** with pluggable DNS resolution, rustls-based TLS,
//!   certificate policies and client certificates
//! - **Upgrade handshake** with accept-key validation, subprotocol
//!   negotiation and `Signature` challenge answering
//! - **Frame engine** with strict server-frame validation and message
//!   reassembly
//! - **Serialized send path** so concurrent senders never interleave bytes
//! - **Keepalive pings and maintenance ticks** that never pile up
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use wsconn::{Client, CloseCode, Config};
//!
//! let client = Client::new("wss://example.com/feed", Config::default())?;
//! let (conn, outcome) = client
//!     .connect(Duration::from_secs(10), 2, |_| {}, CancellationToken::new())
//!     .await?;
//! if outcome.is_open() {
//!     conn.send_text("hello").await?;
//!     conn.close(CloseCode::Normal, "done").await?;
//! }
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod protocol;
pub mod scheduler;
pub mod transport;

pub use client::Client;
pub use config::{Config, KeepaliveConfig, Limits, MaintenanceConfig, Timeouts};
pub use connection::{Connection, ConnectionState, MetaValue, Metadata, SendStatus};
pub use error::{Error, Result};
pub use events::{ConnectionObserver, ObserverResult, Observers};
pub use protocol::{
    CloseCode, CloseFrame, Frame, HandshakeOutcome, HandshakeRequest, HandshakeResponse, Headers,
    OpCode, SigningKey, WS_GUID, compute_accept_key,
};
pub use scheduler::{MaintenanceHook, NoopMaintenance};
pub use transport::{
    CertificatePolicy, CertificateValidator, ClientCertificate, Resolver, SystemResolver,
};
