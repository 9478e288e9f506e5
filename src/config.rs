//! Configuration and limits for the WebSocket client.

use std::time::Duration;

use crate::protocol::auth::SigningKey;
use crate::transport::tls::{CertificatePolicy, ClientCertificate};

/// Configuration limits for WebSocket connections.
///
/// These limits prevent resource exhaustion and keep memory usage bounded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum size of a single frame in bytes.
    ///
    /// Default: 16 MB (16 * 1024 * 1024)
    pub max_frame_size: usize,

    /// Maximum size of a complete message in bytes, after reassembling all
    /// fragments.
    ///
    /// Default: 64 MB (64 * 1024 * 1024)
    pub max_message_size: usize,

    /// Maximum number of fragments in a single message.
    ///
    /// Default: 128
    pub max_fragment_count: usize,

    /// Maximum size of the handshake response head in bytes.
    ///
    /// Default: 8 KB (8192)
    pub max_handshake_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_frame_size: 16 * 1024 * 1024,   // 16 MB
            max_message_size: 64 * 1024 * 1024, // 64 MB
            max_fragment_count: 128,
            max_handshake_size: 8192,
        }
    }
}

impl Limits {
    /// Create new limits with custom values.
    #[must_use]
    pub const fn new(
        max_frame_size: usize,
        max_message_size: usize,
        max_fragment_count: usize,
        max_handshake_size: usize,
    ) -> Self {
        Self {
            max_frame_size,
            max_message_size,
            max_fragment_count,
            max_handshake_size,
        }
    }

    /// Validate that message size is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MessageTooLarge`](crate::Error::MessageTooLarge) if `size` exceeds the configured maximum.
    pub const fn check_message_size(&self, size: usize) -> Result<(), crate::Error> {
        if size > self.max_message_size {
            Err(crate::Error::MessageTooLarge {
                size,
                max: self.max_message_size,
            })
        } else {
            Ok(())
        }
    }

    /// Validate that fragment count is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TooManyFragments`](crate::Error::TooManyFragments) if `count` exceeds the configured maximum.
    pub const fn check_fragment_count(&self, count: usize) -> Result<(), crate::Error> {
        if count > self.max_fragment_count {
            Err(crate::Error::TooManyFragments {
                count,
                max: self.max_fragment_count,
            })
        } else {
            Ok(())
        }
    }

    /// Validate that handshake size is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HandshakeTooLarge`](crate::Error::HandshakeTooLarge) if `size` exceeds the configured maximum.
    pub const fn check_handshake_size(&self, size: usize) -> Result<(), crate::Error> {
        if size > self.max_handshake_size {
            Err(crate::Error::HandshakeTooLarge {
                size,
                max: self.max_handshake_size,
            })
        } else {
            Ok(())
        }
    }
}

/// Timeout configuration for a client connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeouts {
    /// Request timeout.
    ///
    /// Bounds TCP connect, the TLS handshake and reading the handshake
    /// response head when `Client::connect` is given `Duration::ZERO`.
    /// Default: 30 seconds
    pub request: Duration,

    /// Read timeout.
    ///
    /// A receive-loop read that sees no data for this long is treated as idle
    /// time; the loop re-checks cancellation and keeps reading.
    /// Default: 60 seconds
    pub read: Duration,

    /// Write timeout.
    ///
    /// A frame write that does not complete in time reports a soft error.
    /// Default: 30 seconds
    pub write: Duration,

    /// Close timeout.
    ///
    /// How long a Closing connection waits for the peer's Close frame before
    /// the transport is disposed anyway.
    /// Default: 5 seconds
    pub close: Duration,

    /// Longest wait for the shared keepalive/maintenance guard before a tick
    /// is skipped.
    /// Default: 1 second
    pub tick_guard: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            request: Duration::from_secs(30),
            read: Duration::from_secs(60),
            write: Duration::from_secs(30),
            close: Duration::from_secs(5),
            tick_guard: Duration::from_secs(1),
        }
    }
}

/// Periodic ping configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeepaliveConfig {
    /// Whether keepalive pings are sent.
    ///
    /// Default: false
    pub enabled: bool,
    /// Interval between pings.
    ///
    /// Default: 30 seconds
    pub interval: Duration,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: Duration::from_secs(30),
        }
    }
}

/// Periodic maintenance hook configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaintenanceConfig {
    /// Whether the maintenance hook runs.
    ///
    /// Default: false
    pub enabled: bool,
    /// Interval between hook invocations.
    ///
    /// Default: 60 seconds
    pub interval: Duration,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: Duration::from_secs(60),
        }
    }
}

/// WebSocket client configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Resource limits.
    pub limits: Limits,

    /// Timeout configuration.
    pub timeouts: Timeouts,

    /// Subprotocols offered in `Sec-WebSocket-Protocol`, in preference order.
    ///
    /// Default: empty
    pub subprotocols: Vec<String>,

    /// Value for the `Authorization` header of the upgrade request.
    ///
    /// Default: None
    pub authorization: Option<String>,

    /// Key used to answer a `401` signature challenge.
    ///
    /// Default: None
    pub signing_key: Option<SigningKey>,

    /// How the server certificate is validated on `wss://` connections.
    ///
    /// Default: [`CertificatePolicy::AcceptAll`]. Accepting every certificate
    /// disables server authentication; set a real policy in production.
    pub certificate_policy: CertificatePolicy,

    /// Client certificate presented during the TLS handshake.
    ///
    /// Default: None
    pub client_certificate: Option<ClientCertificate>,

    /// Keepalive ping scheduling.
    pub keepalive: KeepaliveConfig,

    /// Maintenance hook scheduling.
    pub maintenance: MaintenanceConfig,

    /// Start a close handshake with 1002 when the server sends an
    /// unexpected opcode.
    ///
    /// Default: false
    pub close_on_protocol_violation: bool,

    /// Diagnostic mode: write frames one byte at a time with this delay
    /// between bytes.
    ///
    /// Default: None
    pub slow_write: Option<Duration>,

    /// Read buffer size (in bytes).
    ///
    /// Default: 8 KB (8192)
    pub read_buffer_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            timeouts: Timeouts::default(),
            subprotocols: Vec::new(),
            authorization: None,
            signing_key: None,
            certificate_policy: CertificatePolicy::default(),
            client_certificate: None,
            keepalive: KeepaliveConfig::default(),
            maintenance: MaintenanceConfig::default(),
            close_on_protocol_violation: false,
            slow_write: None,
            read_buffer_size: 8192,
        }
    }
}

impl Config {
    /// Create a new configuration with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set custom limits.
    #[must_use]
    pub const fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Set timeout configuration.
    #[must_use]
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Set the request timeout only.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.request = timeout;
        self
    }

    /// Offer the given subprotocols during the handshake.
    #[must_use]
    pub fn with_subprotocols<I, S>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subprotocols = protocols.into_iter().map(Into::into).collect();
        self
    }

    /// Send an `Authorization` header with the upgrade request.
    #[must_use]
    pub fn with_authorization(mut self, value: impl Into<String>) -> Self {
        self.authorization = Some(value.into());
        self
    }

    /// Set the key used to answer signature challenges.
    #[must_use]
    pub fn with_signing_key(mut self, key: SigningKey) -> Self {
        self.signing_key = Some(key);
        self
    }

    /// Set the server certificate policy.
    #[must_use]
    pub fn with_certificate_policy(mut self, policy: CertificatePolicy) -> Self {
        self.certificate_policy = policy;
        self
    }

    /// Present a client certificate during the TLS handshake.
    #[must_use]
    pub fn with_client_certificate(mut self, certificate: ClientCertificate) -> Self {
        self.client_certificate = Some(certificate);
        self
    }

    /// Enable keepalive pings at the given interval.
    #[must_use]
    pub const fn with_keepalive(mut self, interval: Duration) -> Self {
        self.keepalive = KeepaliveConfig {
            enabled: true,
            interval,
        };
        self
    }

    /// Enable the maintenance hook at the given interval.
    #[must_use]
    pub const fn with_maintenance(mut self, interval: Duration) -> Self {
        self.maintenance = MaintenanceConfig {
            enabled: true,
            interval,
        };
        self
    }

    /// Close with a protocol error on unexpected opcodes.
    #[must_use]
    pub const fn with_close_on_protocol_violation(mut self, close: bool) -> Self {
        self.close_on_protocol_violation = close;
        self
    }

    /// Write frames byte by byte with a delay (slow network simulation).
    #[must_use]
    pub const fn with_slow_write(mut self, delay: Duration) -> Self {
        self.slow_write = Some(delay);
        self
    }

    /// Set read buffer size.
    #[must_use]
    pub const fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }
}
