//! WebSocket connection management and state machine.
//!
//! This module provides the [`Connection`] handle returned by
//! [`Client::connect`](crate::Client::connect), the receive loop that drives
//! it, and the send gate every writer goes through.
//!
//! ## Connection Lifecycle
//!
//! 1. **Handshaking** - Transport up, upgrade not yet accepted
//! 2. **Open** - Upgrade accepted; frames flow both ways
//! 3. **Closing** - One Close frame sent, waiting for the peer's
//! 4. **Closed** - Transport released; sends fail
//!
//! ## Example
//!
//! ```rust,ignore
//! use wsconn::{Client, CloseCode, Config};
//!
//! let client = Client::new(url, Config::default());
//! let (conn, outcome) = client.connect(timeout, 2, |_| {}, cancel).await?;
//! if outcome.is_open() {
//!     conn.send_text("Hello").await?;
//!     conn.close(CloseCode::Normal, "done").await?;
//! }
//! ```

pub mod gate;
pub mod metadata;
pub(crate) mod runtime;
mod state;

#[allow(clippy::module_inception)]
pub(crate) mod connection;

pub use connection::Connection;
pub use gate::{SendGate, SendStatus};
pub use metadata::{MetaValue, Metadata};
pub use state::ConnectionState;
