//! TLS for `wss://` connections, built on rustls.

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::client::ResolvesClientCert;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::warn;

/// TLS setup and handshake failures.
#[derive(Debug, Error)]
pub enum TlsError {
    /// Reading certificate or key material failed.
    #[error("TLS I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// rustls rejected the configuration.
    #[error("TLS configuration error: {0}")]
    Configuration(String),
    /// The handshake with the server failed.
    #[error("TLS handshake failed: {0}")]
    Handshake(String),
    /// A PEM file held no certificates.
    #[error("no certificates found in file")]
    NoCertificatesFound,
    /// A PEM file held no private key.
    #[error("no private key found in file")]
    NoPrivateKeyFound,
    /// The host is not a valid TLS server name.
    #[error("invalid DNS name: {0}")]
    InvalidDnsName(String),
}

impl From<TlsError> for crate::Error {
    fn from(err: TlsError) -> Self {
        crate::Error::Tls(err.to_string())
    }
}

/// Decides whether a server certificate chain is acceptable.
///
/// Signatures made during the handshake are still checked against the
/// presented certificate; this only replaces chain trust.
pub trait CertificateValidator: fmt::Debug + Send + Sync {
    /// Accept or reject the chain presented by `server_name`.
    ///
    /// # Errors
    ///
    /// A rejection reason, reported as a TLS handshake failure.
    fn validate(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &str,
    ) -> Result<(), String>;
}

/// How server certificates are validated.
#[derive(Debug, Clone, Default)]
pub enum CertificatePolicy {
    /// Accept any certificate. Server identity is not verified.
    #[default]
    AcceptAll,
    /// Validate against the bundled Mozilla root set.
    WebPkiRoots,
    /// Delegate the decision to a caller-supplied validator.
    Custom(Arc<dyn CertificateValidator>),
}

/// Certificate presented to servers that ask for client authentication.
#[derive(Clone)]
pub enum ClientCertificate {
    /// A fixed chain and its private key.
    Static {
        /// Leaf first.
        chain: Vec<CertificateDer<'static>>,
        /// Key for the leaf.
        key: Arc<PrivateKeyDer<'static>>,
    },
    /// Pick a certificate per handshake.
    Resolver(Arc<dyn ResolvesClientCert>),
}

impl ClientCertificate {
    /// Load a chain and key from PEM files.
    ///
    /// # Errors
    ///
    /// See [`load_certs_from_file`] and [`load_private_key_from_file`].
    pub fn from_pem_files(cert_path: &Path, key_path: &Path) -> Result<Self, TlsError> {
        Ok(ClientCertificate::Static {
            chain: load_certs_from_file(cert_path)?,
            key: Arc::new(load_private_key_from_file(key_path)?),
        })
    }
}

impl fmt::Debug for ClientCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientCertificate::Static { chain, .. } => f
                .debug_struct("Static")
                .field("chain_len", &chain.len())
                .field("key", &"<redacted>")
                .finish(),
            ClientCertificate::Resolver(resolver) => {
                f.debug_tuple("Resolver").field(resolver).finish()
            }
        }
    }
}

/// Server certificate verifier for the `AcceptAll` and `Custom` policies.
#[derive(Debug)]
struct PolicyVerifier {
    validator: Option<Arc<dyn CertificateValidator>>,
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for PolicyVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        match &self.validator {
            None => Ok(ServerCertVerified::assertion()),
            Some(validator) => validator
                .validate(end_entity, intermediates, &server_name.to_str())
                .map(|()| ServerCertVerified::assertion())
                .map_err(rustls::Error::General),
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Build a rustls client configuration.
///
/// # Errors
///
/// Returns `TlsError::Configuration` if rustls rejects the protocol versions
/// or the client certificate.
pub fn client_config(
    policy: &CertificatePolicy,
    client_certificate: Option<&ClientCertificate>,
) -> Result<Arc<ClientConfig>, TlsError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| TlsError::Configuration(e.to_string()))?;

    let builder = match policy {
        CertificatePolicy::WebPkiRoots => {
            let roots = RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            builder.with_root_certificates(roots)
        }
        CertificatePolicy::AcceptAll => {
            warn!("server certificate validation disabled; any certificate is accepted");
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(PolicyVerifier {
                    validator: None,
                    provider,
                }))
        }
        CertificatePolicy::Custom(validator) => builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(PolicyVerifier {
                validator: Some(validator.clone()),
                provider,
            })),
    };

    let config = match client_certificate {
        None => builder.with_no_client_auth(),
        Some(ClientCertificate::Static { chain, key }) => builder
            .with_client_auth_cert(chain.clone(), key.clone_key())
            .map_err(|e| TlsError::Configuration(e.to_string()))?,
        Some(ClientCertificate::Resolver(resolver)) => {
            builder.with_client_cert_resolver(resolver.clone())
        }
    };

    Ok(Arc::new(config))
}

/// Client-side TLS connector.
#[derive(Clone)]
pub struct TlsConnector {
    inner: tokio_rustls::TlsConnector,
}

impl TlsConnector {
    /// Wrap a rustls client configuration.
    #[must_use]
    pub fn new(config: Arc<ClientConfig>) -> Self {
        Self {
            inner: tokio_rustls::TlsConnector::from(config),
        }
    }

    /// Run the TLS handshake over `stream` for `domain`.
    ///
    /// # Errors
    ///
    /// - `TlsError::InvalidDnsName` if `domain` is not a valid server name
    /// - `TlsError::Handshake` if the handshake fails
    pub async fn connect<S>(
        &self,
        domain: &str,
        stream: S,
    ) -> Result<tokio_rustls::client::TlsStream<S>, TlsError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let server_name = ServerName::try_from(domain.to_string())
            .map_err(|_| TlsError::InvalidDnsName(domain.to_string()))?;

        self.inner
            .connect(server_name, stream)
            .await
            .map_err(|e| TlsError::Handshake(e.to_string()))
    }
}

/// Load every certificate from a PEM file.
///
/// # Errors
///
/// - `TlsError::Io` if the file cannot be read
/// - `TlsError::NoCertificatesFound` if it holds none
pub fn load_certs_from_file(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let certs: Vec<CertificateDer<'static>> =
        rustls_pemfile::certs(&mut reader).collect::<Result<Vec<_>, _>>()?;

    if certs.is_empty() {
        return Err(TlsError::NoCertificatesFound);
    }

    Ok(certs)
}

/// Load the first private key (PKCS#1, PKCS#8 or SEC1) from a PEM file.
///
/// # Errors
///
/// - `TlsError::Io` if the file cannot be read
/// - `TlsError::NoPrivateKeyFound` if it holds none
pub fn load_private_key_from_file(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    for item in rustls_pemfile::read_all(&mut reader) {
        match item? {
            rustls_pemfile::Item::Pkcs1Key(key) => return Ok(PrivateKeyDer::Pkcs1(key)),
            rustls_pemfile::Item::Pkcs8Key(key) => return Ok(PrivateKeyDer::Pkcs8(key)),
            rustls_pemfile::Item::Sec1Key(key) => return Ok(PrivateKeyDer::Sec1(key)),
            _ => continue,
        }
    }

    Err(TlsError::NoPrivateKeyFound)
}
