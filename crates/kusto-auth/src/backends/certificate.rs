//! Application id + certificate: client credentials with a signed JWT
//! client assertion.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::instrument;

use crate::backend::{AcquisitionRequest, IdentityBackend, SilentRequest, TokenGrant};
use crate::error::{Error, ErrorKind, Result};
use crate::oauth::{request_token, token_endpoint};

const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Acquires application tokens by signing a client assertion with the
/// certificate's private key.
#[derive(Clone)]
pub struct CertificateBackend {
    client_id: String,
    private_key: EncodingKey,
    /// SHA-1 thumbprint, base64url (`x5t`).
    x5t: Option<String>,
    /// SHA-256 thumbprint, base64url (`x5t#S256`).
    x5t_s256: Option<String>,
    /// DER certificate, base64 (`x5c`).
    certificate: Option<String>,
    send_x5c: bool,
    assertion_lifetime: Duration,
    http: reqwest::Client,
}

impl std::fmt::Debug for CertificateBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateBackend")
            .field("client_id", &self.client_id)
            .field("private_key", &"[REDACTED]")
            .field("x5t", &self.x5t)
            .field("x5t_s256", &self.x5t_s256)
            .field("send_x5c", &self.send_x5c)
            .finish_non_exhaustive()
    }
}

impl CertificateBackend {
    /// Create a backend from an RSA private key and its certificate, both PEM.
    pub fn from_pem(
        client_id: impl Into<String>,
        private_key_pem: &[u8],
        certificate_pem: &[u8],
    ) -> Result<Self> {
        let der = pem_to_der(certificate_pem)?;
        let mut backend = Self::new(client_id.into(), EncodingKey::from_rsa_pem(private_key_pem)?);
        backend.x5t_s256 = Some(URL_SAFE_NO_PAD.encode(Sha256::digest(&der)));
        backend.certificate = Some(STANDARD.encode(&der));
        Ok(backend)
    }

    /// Create a backend from an RSA private key (PEM) and the certificate's
    /// hex SHA-1 thumbprint.
    pub fn from_thumbprint(
        client_id: impl Into<String>,
        private_key_pem: &[u8],
        thumbprint: &str,
    ) -> Result<Self> {
        let digest = decode_hex(thumbprint).ok_or_else(|| {
            Error::new(ErrorKind::InvalidCredentials(
                "certificate thumbprint must be 40 hex characters".to_string(),
            ))
        })?;

        let mut backend = Self::new(client_id.into(), EncodingKey::from_rsa_pem(private_key_pem)?);
        backend.x5t = Some(URL_SAFE_NO_PAD.encode(digest));
        Ok(backend)
    }

    /// Load the private key and certificate from PEM files.
    pub fn from_files(
        client_id: impl Into<String>,
        private_key_path: impl AsRef<std::path::Path>,
        certificate_path: impl AsRef<std::path::Path>,
    ) -> Result<Self> {
        let private_key = std::fs::read(private_key_path.as_ref())?;
        let certificate = std::fs::read(certificate_path.as_ref())?;
        Self::from_pem(client_id, &private_key, &certificate)
    }

    fn new(client_id: String, private_key: EncodingKey) -> Self {
        Self {
            client_id,
            private_key,
            x5t: None,
            x5t_s256: None,
            certificate: None,
            send_x5c: false,
            assertion_lifetime: Duration::minutes(10),
            http: reqwest::Client::new(),
        }
    }

    /// Send the public certificate with each assertion (subject name /
    /// issuer authentication).
    pub fn with_send_x5c(mut self, send_x5c: bool) -> Self {
        self.send_x5c = send_x5c;
        self
    }

    /// Use a specific HTTP client for token requests.
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Sign a client assertion for the given token endpoint.
    pub(crate) fn assertion(&self, audience: &str) -> Result<String> {
        let now = Utc::now();

        let claims = AssertionClaims {
            aud: audience.to_string(),
            iss: self.client_id.clone(),
            sub: self.client_id.clone(),
            jti: uuid::Uuid::new_v4().to_string(),
            nbf: now.timestamp(),
            iat: now.timestamp(),
            exp: (now + self.assertion_lifetime).timestamp(),
        };

        let mut header = Header::new(Algorithm::RS256);
        header.x5t = self.x5t.clone();
        header.x5t_s256 = self.x5t_s256.clone();
        if self.send_x5c {
            header.x5c = self.certificate.clone().map(|c| vec![c]);
        }

        Ok(encode(&header, &claims, &self.private_key)?)
    }
}

impl IdentityBackend for CertificateBackend {
    fn client_id(&self) -> Option<&str> {
        Some(&self.client_id)
    }

    async fn acquire_silently(&self, _request: &SilentRequest) -> Result<Option<TokenGrant>> {
        Ok(None)
    }

    #[instrument(skip(self), fields(client_id = %self.client_id))]
    async fn acquire_new(&self, request: &AcquisitionRequest) -> Result<TokenGrant> {
        let endpoint = token_endpoint(&request.authority);
        let assertion = self.assertion(&endpoint)?;
        let scope = request.scopes.join(" ");

        request_token(
            &self.http,
            &endpoint,
            &[
                ("grant_type", "client_credentials"),
                ("client_id", &self.client_id),
                ("client_assertion_type", CLIENT_ASSERTION_TYPE),
                ("client_assertion", &assertion),
                ("scope", &scope),
            ],
        )
        .await
    }
}

/// JWT claims of a client assertion.
#[derive(Debug, Serialize)]
struct AssertionClaims {
    aud: String,
    iss: String,
    sub: String,
    jti: String,
    nbf: i64,
    iat: i64,
    exp: i64,
}

fn pem_to_der(pem: &[u8]) -> Result<Vec<u8>> {
    let text = std::str::from_utf8(pem).map_err(|e| {
        Error::with_source(
            ErrorKind::InvalidCredentials("certificate is not PEM text".to_string()),
            e,
        )
    })?;

    let body: String = text
        .lines()
        .skip_while(|l| !l.starts_with("-----BEGIN CERTIFICATE-----"))
        .skip(1)
        .take_while(|l| !l.starts_with("-----END CERTIFICATE-----"))
        .map(str::trim)
        .collect();

    if body.is_empty() {
        return Err(Error::new(ErrorKind::InvalidCredentials(
            "no certificate found in PEM".to_string(),
        )));
    }

    STANDARD.decode(body).map_err(|e| {
        Error::with_source(
            ErrorKind::InvalidCredentials("certificate PEM is not valid base64".to_string()),
            e,
        )
    })
}

fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    let hex: String = hex.chars().filter(|c| !c.is_whitespace() && *c != ':').collect();
    if hex.len() != 40 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok())
        .collect()
}
