//! Client entry point: establish the transport, run the upgrade and hand
//! back a running [`Connection`].

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::config::Config;
use crate::connection::connection::ConnectionParts;
use crate::connection::{Connection, ConnectionState, SendGate, runtime};
use crate::error::{Error, Result};
use crate::events::{ConnectionObserver, Observers};
use crate::protocol::handshake::{self, STATUS_BAD_GATEWAY, STATUS_TIMEOUT};
use crate::protocol::{HandshakeOutcome, HandshakeRequest};
use crate::scheduler::{MaintenanceHook, NoopMaintenance, Scheduler};
use crate::transport::{self, Resolver, SystemResolver, Target};

/// A WebSocket client for one target URL.
///
/// Each call to [`Client::connect`] produces an independent connection.
pub struct Client {
    url: Url,
    config: Config,
    observers: Observers,
    resolver: Arc<dyn Resolver>,
    hook: Arc<dyn MaintenanceHook>,
}

impl Client {
    /// Create a client for `url` (ws, wss, http or https).
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUrl` if the URL does not parse or has no usable
    /// scheme or host.
    pub fn new(url: &str, config: Config) -> Result<Self> {
        let url = Url::parse(url)?;
        Target::from_url(&url)?;
        Ok(Self {
            url,
            config,
            observers: Observers::new(),
            resolver: Arc::new(SystemResolver),
            hook: Arc::new(NoopMaintenance),
        })
    }

    /// Register an event observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ConnectionObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Replace the DNS resolver.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Set the hook run by the maintenance timer.
    #[must_use]
    pub fn with_maintenance_hook(mut self, hook: Arc<dyn MaintenanceHook>) -> Self {
        self.hook = hook;
        self
    }

    /// Target URL.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Client configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Connect and perform the opening handshake.
    ///
    /// `timeout` bounds each TCP connect, the TLS handshake and the read of
    /// the response head; `Duration::ZERO` uses `Timeouts::request` from the
    /// client's config. `customize` may edit the upgrade request before it
    /// is sent. The connection's token is a child of `cancel`.
    ///
    /// A rejected or timed-out handshake is not an error: the returned
    /// outcome is not open, carries the (possibly synthetic) response, and
    /// the connection is already `Closed`.
    ///
    /// # Errors
    ///
    /// - `Error::Resolution`, `Error::Connect` or `Error::Tls` when the
    ///   transport cannot be established
    /// - `Error::InvalidHeaderValue` if `customize` left an invalid header
    /// - `Error::Cancelled` if `cancel` fires before the handshake completes
    #[instrument(skip(self, customize, cancel), fields(url = %self.url))]
    pub async fn connect<F>(
        &self,
        timeout: Duration,
        max_retries: u32,
        customize: F,
        cancel: CancellationToken,
    ) -> Result<(Connection, HandshakeOutcome)>
    where
        F: FnOnce(&mut HandshakeRequest),
    {
        let timeout = if timeout.is_zero() {
            self.config.timeouts.request
        } else {
            timeout
        };
        let token = cancel.child_token();
        tokio::select! {
            biased;
            () = token.cancelled() => {
                debug!("connect cancelled");
                Err(Error::Cancelled)
            }
            result = self.open(timeout, max_retries, customize, token.clone()) => result,
        }
    }

    async fn open<F>(
        &self,
        timeout: Duration,
        max_retries: u32,
        customize: F,
        token: CancellationToken,
    ) -> Result<(Connection, HandshakeOutcome)>
    where
        F: FnOnce(&mut HandshakeRequest),
    {
        let established = transport::establish(
            &self.url,
            &self.config,
            self.resolver.as_ref(),
            timeout,
            max_retries,
        )
        .await?;
        let mut stream = established.stream;

        let mut request = HandshakeRequest::new(&self.url, &self.config)?;
        customize(&mut request);
        let mut raw = Vec::with_capacity(256);
        request.write(&mut raw)?;
        self.observers
            .notify("request", |o| o.on_request(&request, &raw));

        let (outcome, leftover) =
            match handshake::exchange(&mut stream, &request, &self.config.limits, timeout).await {
                Ok((response, leftover)) => {
                    self.observers
                        .notify("response", |o| o.on_response(&response));
                    let outcome = HandshakeOutcome::evaluate(
                        &request,
                        response,
                        self.config.signing_key.as_ref(),
                    );
                    (outcome, leftover)
                }
                Err(e) => {
                    let status = match e {
                        Error::HandshakeTimeout(_) => STATUS_TIMEOUT,
                        _ => STATUS_BAD_GATEWAY,
                    };
                    warn!(remote = %established.remote_addr, error = %e, status, "handshake failed");
                    let outcome = HandshakeOutcome::failed(status, e.to_string());
                    self.observers
                        .notify("response", |o| o.on_response(outcome.response()));
                    (outcome, Default::default())
                }
            };

        let (reader, writer) = tokio::io::split(stream);
        let parts = ConnectionParts {
            gate: SendGate::new(writer, self.config.timeouts.write, self.config.slow_write),
            local_addr: established.local_addr,
            remote_addr: established.remote_addr,
            request,
            response: outcome.response().clone(),
            subprotocol: outcome.subprotocol().map(str::to_string),
            config: self.config.clone(),
            observers: self.observers.clone(),
            cancel: token,
        };
        let conn = Connection::from_parts(parts, ConnectionState::Handshaking);

        if !outcome.is_open() {
            info!(
                remote = %conn.remote_addr(),
                status = outcome.status(),
                reason = outcome.close_reason().unwrap_or_default(),
                "handshake rejected"
            );
            conn.teardown("handshake rejected").await;
            return Ok((conn, outcome));
        }

        if !conn.mark_open() {
            return Ok((conn, outcome));
        }
        info!(
            remote = %conn.remote_addr(),
            subprotocol = outcome.subprotocol().unwrap_or_default(),
            "connection open"
        );
        self.observers.notify("open", |o| o.on_open(&conn));

        runtime::spawn(conn.clone(), reader, leftover);

        if self.config.keepalive.enabled || self.config.maintenance.enabled {
            conn.attach_scheduler(Scheduler::start(&conn, self.hook.clone()));
        }

        Ok((conn, outcome))
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("url", &self.url.as_str())
            .field("config", &self.config)
            .field("observers", &self.observers)
            .finish_non_exhaustive()
    }
}
