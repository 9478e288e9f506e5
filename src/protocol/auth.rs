//! Answering `WWW-Authenticate: Signature` challenges on a 401 upgrade response.
//!
//! The server names a hash and an HMAC algorithm and supplies `nonce` and
//! `opaque` values. The answer is
//! `base64(HMAC-<algorithm>(secret, <hash>(nonce || opaque)))`.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};

use crate::error::{Error, Result};

/// Hash functions a challenge may name, for either the digest or the HMAC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    /// SHA-1
    Sha1,
    /// SHA-256
    Sha256,
    /// SHA-512
    Sha512,
}

impl HashAlgorithm {
    /// Parse a `hash` parameter (`sha1`, `sha256`, `sha512`, with or without a dash).
    ///
    /// # Errors
    ///
    /// Returns `Error::Authentication` for anything else.
    pub fn from_hash_name(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().replace('-', "").as_str() {
            "sha1" => Ok(HashAlgorithm::Sha1),
            "sha256" => Ok(HashAlgorithm::Sha256),
            "sha512" => Ok(HashAlgorithm::Sha512),
            other => Err(Error::Authentication(format!(
                "Unsupported hash: {}",
                other
            ))),
        }
    }

    /// Parse an `algorithm` parameter (`hmac-sha1`, `hmac-sha256`, `hmac-sha512`).
    ///
    /// # Errors
    ///
    /// Returns `Error::Authentication` for anything else.
    pub fn from_hmac_name(name: &str) -> Result<Self> {
        let lower = name.to_ascii_lowercase();
        let Some(hash) = lower.strip_prefix("hmac-") else {
            return Err(Error::Authentication(format!(
                "Unsupported algorithm: {}",
                name
            )));
        };
        Self::from_hash_name(hash)
    }

    fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            HashAlgorithm::Sha1 => Sha1::digest(data).to_vec(),
            HashAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
            HashAlgorithm::Sha512 => Sha512::digest(data).to_vec(),
        }
    }

    fn hmac(self, key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
        fn run<M: Mac + hmac::digest::KeyInit>(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
            let mut mac = <M as Mac>::new_from_slice(key)
                .map_err(|e| Error::Authentication(e.to_string()))?;
            mac.update(data);
            Ok(mac.finalize().into_bytes().to_vec())
        }

        match self {
            HashAlgorithm::Sha1 => run::<Hmac<Sha1>>(key, data),
            HashAlgorithm::Sha256 => run::<Hmac<Sha256>>(key, data),
            HashAlgorithm::Sha512 => run::<Hmac<Sha512>>(key, data),
        }
    }
}

/// Credentials used to sign challenges.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningKey {
    key_id: String,
    secret: Vec<u8>,
}

impl SigningKey {
    /// Create a key with the identifier the server knows it by.
    pub fn new(key_id: impl Into<String>, secret: impl Into<Vec<u8>>) -> Self {
        Self {
            key_id: key_id.into(),
            secret: secret.into(),
        }
    }

    /// Key identifier.
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("key_id", &self.key_id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Parameters of a `WWW-Authenticate: Signature ...` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureChallenge {
    /// Key the server expects, if named.
    pub key_id: Option<String>,
    /// Digest applied to `nonce || opaque`.
    pub hash: HashAlgorithm,
    /// HMAC applied to the digest.
    pub algorithm: HashAlgorithm,
    /// Server nonce.
    pub nonce: String,
    /// Server opaque value.
    pub opaque: String,
}

impl SignatureChallenge {
    /// Parse a challenge header value.
    ///
    /// # Errors
    ///
    /// Returns `Error::Authentication` if the scheme is not `Signature` or a
    /// required parameter is missing or unsupported.
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        let (scheme, params) = value.split_once(char::is_whitespace).unwrap_or((value, ""));
        if !scheme.eq_ignore_ascii_case("signature") {
            return Err(Error::Authentication(format!(
                "Unsupported challenge scheme: {}",
                scheme
            )));
        }

        let mut key_id = None;
        let mut hash = None;
        let mut algorithm = None;
        let mut nonce = None;
        let mut opaque = None;

        for param in params.split(',') {
            let Some((name, raw)) = param.split_once('=') else {
                continue;
            };
            let v = raw.trim().trim_matches('"').to_string();
            match name.trim().to_ascii_lowercase().as_str() {
                "keyid" => key_id = Some(v),
                "hash" => hash = Some(HashAlgorithm::from_hash_name(&v)?),
                "algorithm" => algorithm = Some(HashAlgorithm::from_hmac_name(&v)?),
                "nonce" => nonce = Some(v),
                "opaque" => opaque = Some(v),
                _ => {}
            }
        }

        let missing = |name: &str| Error::Authentication(format!("Challenge missing {}", name));
        Ok(Self {
            key_id,
            hash: hash.ok_or_else(|| missing("hash"))?,
            algorithm: algorithm.ok_or_else(|| missing("algorithm"))?,
            nonce: nonce.ok_or_else(|| missing("nonce"))?,
            opaque: opaque.unwrap_or_default(),
        })
    }

    /// Compute the base64 signature for this challenge.
    ///
    /// # Errors
    ///
    /// Returns `Error::Authentication` if the challenge names a different key.
    pub fn sign(&self, key: &SigningKey) -> Result<String> {
        if let Some(expected) = &self.key_id {
            if !expected.is_empty() && *expected != key.key_id {
                return Err(Error::Authentication(format!(
                    "Challenge requests key {}, configured key is {}",
                    expected, key.key_id
                )));
            }
        }

        let mut material = Vec::with_capacity(self.nonce.len() + self.opaque.len());
        material.extend_from_slice(self.nonce.as_bytes());
        material.extend_from_slice(self.opaque.as_bytes());

        let digest = self.hash.digest(&material);
        let signature = self.algorithm.hmac(&key.secret, &digest)?;
        Ok(BASE64.encode(signature))
    }

    /// Build the `Authorization` header value answering this challenge.
    ///
    /// # Errors
    ///
    /// See [`SignatureChallenge::sign`].
    pub fn authorization(&self, key: &SigningKey) -> Result<String> {
        let signature = self.sign(key)?;
        Ok(format!(
            "Signature keyId=\"{}\",nonce=\"{}\",opaque=\"{}\",signature=\"{}\"",
            key.key_id, self.nonce, self.opaque, signature
        ))
    }
}
