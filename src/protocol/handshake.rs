//! Client side of the WebSocket opening handshake (RFC 6455 Section 4).
//!
//! This module builds the HTTP/1.1 Upgrade request, reads the response head
//! off the stream and decides whether the session is open.

use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use bytes::BytesMut;
use sha1::{Digest, Sha1};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};
use url::Url;

use crate::config::{Config, Limits};
use crate::error::{Error, Result};
use crate::protocol::auth::{SignatureChallenge, SigningKey};

/// The WebSocket GUID used in the Sec-WebSocket-Accept calculation (RFC 6455).
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Status used for a response synthesized after a handshake timeout.
pub const STATUS_TIMEOUT: u16 = 408;

/// Status used for a response synthesized after the peer closed or sent garbage.
pub const STATUS_BAD_GATEWAY: u16 = 502;

/// Validate that a header value does not contain CR or LF characters.
///
/// # Errors
/// Returns `Error::InvalidHeaderValue` if the value contains `\r` or `\n`.
pub fn validate_header_value(header_name: &str, value: &str) -> Result<()> {
    if value.contains('\r') || value.contains('\n') {
        return Err(Error::InvalidHeaderValue {
            header: header_name.to_string(),
            reason: "contains CR or LF characters".to_string(),
        });
    }
    Ok(())
}

/// Computes the Sec-WebSocket-Accept value from the client's Sec-WebSocket-Key.
///
/// The accept key is calculated as: Base64(SHA-1(key + GUID))
///
/// # Example
///
/// ```
/// use wsconn::protocol::handshake::compute_accept_key;
///
/// let key = "dGhlIHNhbXBsZSBub25jZQ==";
/// let accept = compute_accept_key(key);
/// assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
#[must_use]
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Generate a fresh `Sec-WebSocket-Key`: 16 random bytes, base64 encoded.
#[must_use]
pub fn generate_key() -> String {
    let mut raw = [0u8; 16];
    for chunk in raw.chunks_exact_mut(4) {
        chunk.copy_from_slice(&crate::protocol::mask::generate_mask_key());
    }
    BASE64.encode(raw)
}

/// Ordered HTTP header list with case-insensitive lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Create an empty header list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// First value for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values for `name`, in order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether `name` is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Append a header, keeping existing values.
    ///
    /// # Errors
    /// Returns `Error::InvalidHeaderValue` if the name or value contains CR/LF.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let name = name.into();
        let value = value.into();
        validate_header_value(&name, &name)?;
        validate_header_value(&name, &value)?;
        self.entries.push((name, value));
        Ok(())
    }

    /// Replace every value of `name` with a single one.
    ///
    /// # Errors
    /// Returns `Error::InvalidHeaderValue` if the name or value contains CR/LF.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let name = name.into();
        self.remove(&name);
        self.append(name, value)
    }

    /// Remove every value of `name`.
    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// Iterate over `(name, value)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of header lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn push_parsed(&mut self, name: &str, value: &str) {
        self.entries
            .push((name.trim().to_string(), value.trim().to_string()));
    }
}

/// Outgoing upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    /// Request target, path plus query.
    pub path: String,
    /// Host header value.
    pub host: String,
    /// Header lines, including the WebSocket ones.
    pub headers: Headers,
    key: String,
}

impl HandshakeRequest {
    /// Build the upgrade request for `url` with a fresh key.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidUrl` if the URL has no host
    /// - `Error::InvalidHeaderValue` if a configured value contains CR/LF
    pub fn new(url: &Url, config: &Config) -> Result<Self> {
        let host = url
            .host_str()
            .ok_or_else(|| Error::InvalidUrl(format!("{} has no host", url)))?;
        let host = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        let mut path = url.path().to_string();
        if path.is_empty() {
            path.push('/');
        }
        if let Some(query) = url.query() {
            path.push('?');
            path.push_str(query);
        }

        let key = generate_key();
        let mut headers = Headers::new();
        headers.append("Host", host.clone())?;
        headers.append("Connection", "Upgrade")?;
        headers.append("Upgrade", "websocket")?;
        headers.append("Sec-WebSocket-Key", key.clone())?;
        headers.append("Sec-WebSocket-Version", "13")?;
        if !config.subprotocols.is_empty() {
            headers.append("Sec-WebSocket-Protocol", config.subprotocols.join(", "))?;
        }
        if let Some(authorization) = &config.authorization {
            headers.append("Authorization", authorization.clone())?;
        }

        Ok(Self {
            path,
            host,
            headers,
            key,
        })
    }

    /// The `Sec-WebSocket-Key` this request carries.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The accept value a conforming server must answer with.
    #[must_use]
    pub fn expected_accept(&self) -> String {
        compute_accept_key(&self.key)
    }

    /// Subprotocols offered by this request.
    #[must_use]
    pub fn offered_protocols(&self) -> Vec<String> {
        self.headers
            .get_all("sec-websocket-protocol")
            .flat_map(|v| v.split(','))
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect()
    }

    /// Write the HTTP request to a buffer.
    ///
    /// # Errors
    /// Returns `Error::InvalidHeaderValue` if the path or any header contains
    /// CR/LF (headers may have been edited by a customization hook).
    pub fn write(&self, buf: &mut Vec<u8>) -> Result<()> {
        validate_header_value("request-target", &self.path)?;
        buf.extend_from_slice(format!("GET {} HTTP/1.1\r\n", self.path).as_bytes());
        for (name, value) in self.headers.iter() {
            validate_header_value(name, name)?;
            validate_header_value(name, value)?;
            buf.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
        }
        buf.extend_from_slice(b"\r\n");
        Ok(())
    }
}

/// Parsed (or synthesized) HTTP response to the upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResponse {
    /// HTTP status code.
    pub status: u16,
    /// Reason phrase.
    pub reason: String,
    /// Response headers.
    pub headers: Headers,
    synthetic: bool,
}

impl HandshakeResponse {
    /// Parse a response head (status line and headers).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] if:
    /// - The data is not valid UTF-8.
    /// - The status line is missing or not `HTTP/1.x <code> ...`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|_| Error::InvalidHandshake("Invalid UTF-8".into()))?;

        let mut lines = text.lines();

        // Parse status line: "HTTP/1.1 101 Switching Protocols"
        let status_line = lines
            .next()
            .ok_or_else(|| Error::InvalidHandshake("Empty response".into()))?;

        let mut parts = status_line.splitn(3, ' ');
        let version = parts.next().unwrap_or_default();
        if !version.starts_with("HTTP/1.") {
            return Err(Error::InvalidHandshake(format!(
                "Invalid status line: {}",
                status_line
            )));
        }
        let status: u16 = parts
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| {
                Error::InvalidHandshake(format!("Invalid status line: {}", status_line))
            })?;
        let reason = parts.next().unwrap_or_default().trim().to_string();

        let mut headers = Headers::new();
        for line in lines {
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                headers.push_parsed(name, value);
            }
        }

        Ok(Self {
            status,
            reason,
            headers,
            synthetic: false,
        })
    }

    /// A response made up locally when no real one could be read.
    #[must_use]
    pub fn synthetic(status: u16, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
            headers: Headers::new(),
            synthetic: true,
        }
    }

    /// Whether this response was made up locally.
    #[must_use]
    pub const fn is_synthetic(&self) -> bool {
        self.synthetic
    }

    /// `Sec-WebSocket-Accept` value, if any.
    #[must_use]
    pub fn accept(&self) -> Option<&str> {
        self.headers.get("sec-websocket-accept")
    }

    /// `Sec-WebSocket-Protocol` value, if any.
    #[must_use]
    pub fn protocol(&self) -> Option<&str> {
        self.headers.get("sec-websocket-protocol")
    }
}

/// Result of the opening handshake.
///
/// A rejected handshake is not an error: the outcome carries the response
/// and the reason the session did not open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeOutcome {
    response: HandshakeResponse,
    open: bool,
    close_reason: Option<String>,
    subprotocol: Option<String>,
    challenge_authorization: Option<String>,
}

impl HandshakeOutcome {
    /// Judge `response` against the request that produced it.
    ///
    /// Open only for status 101 with a matching accept value and, when the
    /// server picked a subprotocol, one that was offered. A 401 with a
    /// `Signature` challenge is answered with `signing_key` when configured.
    #[must_use]
    pub fn evaluate(
        request: &HandshakeRequest,
        response: HandshakeResponse,
        signing_key: Option<&SigningKey>,
    ) -> Self {
        let mut outcome = Self {
            response,
            open: false,
            close_reason: None,
            subprotocol: None,
            challenge_authorization: None,
        };

        let expected = request.expected_accept();
        let accept_matches = outcome.response.accept() == Some(expected.as_str());

        if outcome.response.status != 101 {
            outcome.close_reason = Some(format!(
                "Unexpected status {} {}",
                outcome.response.status, outcome.response.reason
            ));
            if outcome.response.status == 401 {
                outcome.challenge_authorization =
                    answer_challenge(&outcome.response, signing_key);
            }
            return outcome;
        }

        if !accept_matches {
            outcome.close_reason = Some("Sec-WebSocket-Accept mismatch".into());
            return outcome;
        }

        if let Some(protocol) = outcome.response.protocol() {
            if !request.offered_protocols().iter().any(|p| p == protocol) {
                outcome.close_reason = Some(format!("Server selected unoffered protocol {}", protocol));
                return outcome;
            }
            outcome.subprotocol = Some(protocol.to_string());
        }

        outcome.open = true;
        outcome
    }

    /// Outcome for a handshake that never produced a usable response.
    #[must_use]
    pub fn failed(status: u16, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            response: HandshakeResponse::synthetic(status, reason.clone()),
            open: false,
            close_reason: Some(reason),
            subprotocol: None,
            challenge_authorization: None,
        }
    }

    /// Whether the session is open.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.open
    }

    /// The response, real or synthetic.
    #[must_use]
    pub const fn response(&self) -> &HandshakeResponse {
        &self.response
    }

    /// HTTP status of the response.
    #[must_use]
    pub const fn status(&self) -> u16 {
        self.response.status
    }

    /// Why the session did not open.
    #[must_use]
    pub fn close_reason(&self) -> Option<&str> {
        self.close_reason.as_deref()
    }

    /// Negotiated subprotocol.
    #[must_use]
    pub fn subprotocol(&self) -> Option<&str> {
        self.subprotocol.as_deref()
    }

    /// `Authorization` value answering a 401 signature challenge.
    ///
    /// The request is not re-sent automatically; a caller may connect again
    /// with this value configured.
    #[must_use]
    pub fn challenge_authorization(&self) -> Option<&str> {
        self.challenge_authorization.as_deref()
    }
}

fn answer_challenge(response: &HandshakeResponse, key: Option<&SigningKey>) -> Option<String> {
    let header = response.headers.get("www-authenticate")?;
    let Some(key) = key else {
        debug!("401 challenge received but no signing key configured");
        return None;
    };
    match SignatureChallenge::parse(header).and_then(|c| c.authorization(key)) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(error = %e, "could not answer authentication challenge");
            None
        }
    }
}

/// Find the end of an HTTP head: the index just past `\r\n\r\n`.
#[must_use]
pub fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

/// Send `request` and read the response head.
///
/// Returns the parsed response and any bytes read past the head; those are
/// the first bytes of the frame stream.
///
/// # Errors
///
/// - `Error::HandshakeTimeout` if no complete head arrives within `timeout`
/// - `Error::HandshakeTooLarge` if the head exceeds `limits.max_handshake_size`
/// - `Error::ConnectionClosed` if the peer closes before the head is complete
/// - `Error::InvalidHandshake` / `Error::Io` otherwise
pub async fn exchange<S>(
    stream: &mut S,
    request: &HandshakeRequest,
    limits: &Limits,
    timeout: Duration,
) -> Result<(HandshakeResponse, BytesMut)>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let fut = async {
        let mut out = Vec::with_capacity(256);
        request.write(&mut out)?;
        stream.write_all(&out).await?;
        stream.flush().await?;
        read_head(stream, limits).await
    };

    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::HandshakeTimeout(timeout.as_millis() as u64)),
    }
}

async fn read_head<S>(stream: &mut S, limits: &Limits) -> Result<(HandshakeResponse, BytesMut)>
where
    S: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(1024);
    loop {
        if let Some(end) = find_head_end(&buf) {
            limits.check_handshake_size(end)?;
            let head = buf.split_to(end);
            let response = HandshakeResponse::parse(&head)?;
            return Ok((response, buf));
        }
        limits.check_handshake_size(buf.len())?;

        let n = stream.read_buf(&mut buf).await?;
        if n == 0 {
            return Err(Error::ConnectionClosed(None));
        }
    }
}
