//! Connection event observers.
//!
//! Observers are called in registration order from the task that produced
//! the event. A failing observer is logged and skipped; it never stops
//! delivery to the others or the receive loop itself.

use std::sync::Arc;

use tracing::warn;

use crate::connection::Connection;
use crate::protocol::{CloseFrame, Frame, HandshakeRequest, HandshakeResponse};

/// Result returned by observer callbacks.
pub type ObserverResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Receives connection events. Every method defaults to doing nothing.
///
/// Callbacks run on the receive loop (or the sending task) and should not
/// block; spawn a task for slow work.
#[allow(unused_variables)]
pub trait ConnectionObserver: Send + Sync {
    /// The upgrade request is about to be sent.
    fn on_request(&self, request: &HandshakeRequest, raw: &[u8]) -> ObserverResult {
        Ok(())
    }

    /// A response head was read (or synthesized).
    fn on_response(&self, response: &HandshakeResponse) -> ObserverResult {
        Ok(())
    }

    /// The session is open.
    fn on_open(&self, conn: &Connection) -> ObserverResult {
        Ok(())
    }

    /// A complete text message arrived.
    fn on_text(&self, conn: &Connection, text: &str) -> ObserverResult {
        Ok(())
    }

    /// A complete binary message arrived.
    fn on_binary(&self, conn: &Connection, data: &[u8]) -> ObserverResult {
        Ok(())
    }

    /// A Ping arrived. The Pong is sent after observers return.
    fn on_ping(&self, conn: &Connection, payload: &[u8]) -> ObserverResult {
        Ok(())
    }

    /// A Pong arrived.
    fn on_pong(&self, conn: &Connection, payload: &[u8]) -> ObserverResult {
        Ok(())
    }

    /// A Close arrived; `None` when it carried no status code.
    fn on_close(&self, conn: &Connection, frame: Option<&CloseFrame>) -> ObserverResult {
        Ok(())
    }

    /// A frame of any type was written to the wire.
    fn on_frame_sent(&self, conn: &Connection, frame: &Frame) -> ObserverResult {
        Ok(())
    }

    /// A frame with an opcode outside RFC 6455 arrived and was skipped.
    fn on_unexpected(&self, conn: &Connection, opcode: u8) -> ObserverResult {
        Ok(())
    }

    /// The connection was torn down.
    fn on_closed(&self, conn: &Connection) -> ObserverResult {
        Ok(())
    }
}

/// Ordered list of observers.
#[derive(Clone, Default)]
pub struct Observers {
    list: Vec<Arc<dyn ConnectionObserver>>,
}

impl Observers {
    /// Create an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer.
    pub fn push(&mut self, observer: Arc<dyn ConnectionObserver>) {
        self.list.push(observer);
    }

    /// Number of observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// Whether no observers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Invoke `f` on every observer, logging failures.
    pub fn notify<F>(&self, event: &'static str, f: F)
    where
        F: Fn(&dyn ConnectionObserver) -> ObserverResult,
    {
        for (index, observer) in self.list.iter().enumerate() {
            if let Err(e) = f(observer.as_ref()) {
                warn!(event, observer = index, error = %e, "observer failed");
            }
        }
    }
}

impl std::fmt::Debug for Observers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observers")
            .field("len", &self.list.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(AtomicUsize);

    impl ConnectionObserver for Counting {
        fn on_response(&self, _response: &HandshakeResponse) -> ObserverResult {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Failing;

    impl ConnectionObserver for Failing {
        fn on_response(&self, _response: &HandshakeResponse) -> ObserverResult {
            Err("boom".into())
        }
    }

    #[test]
    fn test_failing_observer_does_not_stop_others() {
        let counting = Arc::new(Counting(AtomicUsize::new(0)));
        let mut observers = Observers::new();
        observers.push(counting.clone());
        observers.push(Arc::new(Failing));
        observers.push(counting.clone());
        assert_eq!(observers.len(), 3);

        let response = HandshakeResponse::synthetic(502, "test");
        observers.notify("response", |o| o.on_response(&response));

        assert_eq!(counting.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_defaults_are_noops() {
        struct Silent;
        impl ConnectionObserver for Silent {}

        let mut observers = Observers::new();
        observers.push(Arc::new(Silent));
        let response = HandshakeResponse::synthetic(408, "timeout");
        observers.notify("response", |o| o.on_response(&response));
        assert!(!observers.is_empty());
    }
}
