//! Opening the byte stream a WebSocket session runs over.

pub mod resolve;
pub mod stream;
pub mod tls;

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpStream;
use tracing::{debug, warn};
use url::{Host, Url};

use crate::config::Config;
use crate::error::{Error, Result};

pub use resolve::{Resolver, SystemResolver, resolve_host};
pub use stream::MaybeTlsStream;
pub use tls::{CertificatePolicy, CertificateValidator, ClientCertificate, TlsConnector, TlsError};

/// Where to connect, taken from a `ws://`/`wss://` (or `http(s)://`) URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    host: Host<String>,
    port: u16,
    secure: bool,
}

impl Target {
    /// Extract the target from a URL.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUrl` for other schemes or a missing host.
    pub fn from_url(url: &Url) -> Result<Self> {
        let secure = match url.scheme() {
            "ws" | "http" => false,
            "wss" | "https" => true,
            other => return Err(Error::InvalidUrl(format!("Unsupported scheme: {}", other))),
        };
        let host = url
            .host()
            .ok_or_else(|| Error::InvalidUrl(format!("{} has no host", url)))?
            .to_owned();
        let port = url
            .port_or_known_default()
            .unwrap_or(if secure { 443 } else { 80 });
        Ok(Self { host, port, secure })
    }

    /// Destination port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Whether TLS is required.
    #[must_use]
    pub const fn is_secure(&self) -> bool {
        self.secure
    }

    /// Host name used for SNI and certificate checks (no brackets on IPv6).
    #[must_use]
    pub fn server_name(&self) -> String {
        match &self.host {
            Host::Domain(name) => name.clone(),
            Host::Ipv4(ip) => ip.to_string(),
            Host::Ipv6(ip) => ip.to_string(),
        }
    }

    fn host_ref(&self) -> Host<&str> {
        match &self.host {
            Host::Domain(name) => Host::Domain(name.as_str()),
            Host::Ipv4(ip) => Host::Ipv4(*ip),
            Host::Ipv6(ip) => Host::Ipv6(*ip),
        }
    }
}

/// A connected stream and its endpoints.
#[derive(Debug)]
pub struct Established {
    /// The stream, TLS-wrapped for secure targets.
    pub stream: MaybeTlsStream,
    /// Local socket address.
    pub local_addr: SocketAddr,
    /// Remote socket address.
    pub remote_addr: SocketAddr,
}

/// Resolve, connect and (for secure targets) run the TLS handshake.
///
/// `timeout` bounds each TCP connect and each TLS handshake. A failed TCP
/// connect is retried up to `max_retries` more times. A failed TLS handshake
/// restarts the whole sequence once.
///
/// # Errors
///
/// - `Error::InvalidUrl` for unusable URLs
/// - `Error::Resolution` if the host does not resolve
/// - `Error::Connect` when every TCP attempt fails
/// - `Error::Tls` when TLS setup fails or the retried handshake fails again
pub async fn establish(
    url: &Url,
    config: &Config,
    resolver: &dyn Resolver,
    timeout: Duration,
    max_retries: u32,
) -> Result<Established> {
    let target = Target::from_url(url)?;
    let connector = if target.is_secure() {
        Some(TlsConnector::new(tls::client_config(
            &config.certificate_policy,
            config.client_certificate.as_ref(),
        )?))
    } else {
        None
    };

    let mut tls_retried = false;
    loop {
        let tcp = connect_tcp(&target, resolver, timeout, max_retries).await?;
        let local_addr = tcp.local_addr()?;
        let remote_addr = tcp.peer_addr()?;

        let Some(connector) = &connector else {
            return Ok(Established {
                stream: MaybeTlsStream::Plain(tcp),
                local_addr,
                remote_addr,
            });
        };

        let server_name = target.server_name();
        let handshake = tokio::time::timeout(timeout, connector.connect(&server_name, tcp));
        let failure = match handshake.await {
            Ok(Ok(tls)) => {
                debug!(remote = %remote_addr, "TLS established");
                return Ok(Established {
                    stream: MaybeTlsStream::Tls(Box::new(tls)),
                    local_addr,
                    remote_addr,
                });
            }
            Ok(Err(e @ TlsError::InvalidDnsName(_))) => return Err(e.into()),
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("TLS handshake timed out after {:?}", timeout),
        };

        if tls_retried {
            return Err(Error::Tls(failure));
        }
        warn!(remote = %remote_addr, error = %failure, "TLS handshake failed, retrying once");
        tls_retried = true;
    }
}

async fn connect_tcp(
    target: &Target,
    resolver: &dyn Resolver,
    timeout: Duration,
    max_retries: u32,
) -> Result<TcpStream> {
    let ip = resolve_host(resolver, target.host_ref()).await?;
    let addr = SocketAddr::new(ip, target.port());

    let mut attempt = 0;
    loop {
        let reason = match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("timed out after {:?}", timeout),
        };

        if attempt >= max_retries {
            return Err(Error::Connect {
                addr: addr.to_string(),
                reason,
            });
        }
        attempt += 1;
        debug!(%addr, attempt, error = %reason, "connect failed, retrying");
    }
}
