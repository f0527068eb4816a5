//! # Identity Token Sources
//!
//! Adapters that produce OAuth2 bearer tokens for the auth test cases.
//!
//! - [`ServiceAccountTokenSource`] exchanges a signed assertion for an access
//!   token at the key's token endpoint (JWT-bearer grant).
//! - [`JwtAccessTokenSource`] signs a self-issued JWT addressed to the target
//!   service; no network round trip.
//! - [`MetadataServerTokenSource`] asks the compute metadata server for the
//!   default service account's token.
//! - [`StaticTokenSource`] hands out a fixed token.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::error::{InteropError, InteropResult};

/// Default OAuth2 token endpoint for service account keys without a `token_uri`.
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const TOKEN_LIFETIME_SECS: i64 = 3600;
const DEFAULT_METADATA_HOST: &str = "metadata.google.internal";

/// A bearer token and its expiry, if known
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    /// Create a token without a known expiry
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            expires_at: None,
        }
    }

    /// Whether the token is already past its expiry
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Utc::now())
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"[redacted]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Source of bearer tokens for a scope
#[async_trait]
pub trait TokenSource: Send + Sync + fmt::Debug {
    /// Short name for logging
    fn name(&self) -> &'static str;

    /// Fetch a token, optionally restricted to `scope`
    async fn token(&self, scope: Option<&str>) -> InteropResult<AccessToken>;
}

/// Service account JSON key, as downloaded from the cloud console
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default)]
    pub token_uri: Option<String>,
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountKey {
    /// Parse a key from its JSON text
    pub fn from_json(json: &str) -> InteropResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a key file
    pub fn from_file(path: &Path) -> InteropResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            InteropError::credential(format!(
                "Failed to read service account key {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&content)
    }

    /// Token endpoint for this key
    pub fn token_uri(&self) -> &str {
        self.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI)
    }

    fn encoding_key(&self) -> InteropResult<EncodingKey> {
        EncodingKey::from_rsa_pem(self.private_key.as_bytes()).map_err(|e| {
            InteropError::credential(format!("Invalid service account private key: {}", e))
        })
    }

    fn header(&self) -> Header {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.private_key_id.clone();
        header
    }
}

/// Claims of the assertion exchanged at the token endpoint
#[derive(Debug, Serialize, Deserialize)]
struct AssertionClaims {
    iss: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
    aud: String,
    iat: i64,
    exp: i64,
}

/// Claims of a self-signed JWT access token
#[derive(Debug, Serialize, Deserialize)]
struct JwtAccessClaims {
    iss: String,
    sub: String,
    aud: String,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl TokenResponse {
    fn into_access_token(self) -> AccessToken {
        AccessToken {
            token: self.access_token,
            expires_at: self
                .expires_in
                .map(|secs| Utc::now() + Duration::seconds(secs)),
        }
    }
}

/// Exchanges a signed service account assertion for an OAuth2 access token
#[derive(Debug, Clone)]
pub struct ServiceAccountTokenSource {
    key: ServiceAccountKey,
    http: reqwest::Client,
}

impl ServiceAccountTokenSource {
    pub fn new(key: ServiceAccountKey, http: reqwest::Client) -> Self {
        Self { key, http }
    }

    /// Build the signed assertion for `scope`
    pub fn assertion(&self, scope: Option<&str>) -> InteropResult<String> {
        let now = Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: self.key.client_email.clone(),
            scope: scope.map(str::to_string),
            aud: self.key.token_uri().to_string(),
            iat: now,
            exp: now + TOKEN_LIFETIME_SECS,
        };
        Ok(encode(&self.key.header(), &claims, &self.key.encoding_key()?)?)
    }
}

#[async_trait]
impl TokenSource for ServiceAccountTokenSource {
    fn name(&self) -> &'static str {
        "service_account"
    }

    async fn token(&self, scope: Option<&str>) -> InteropResult<AccessToken> {
        let assertion = self.assertion(scope)?;

        debug!(
            client_email = %self.key.client_email,
            token_uri = %self.key.token_uri(),
            "Exchanging service account assertion"
        );

        let response = self
            .http
            .post(self.key.token_uri())
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(InteropError::credential(format!(
                "Token endpoint returned {}: {}",
                status, body
            )));
        }

        Ok(response.json::<TokenResponse>().await?.into_access_token())
    }
}

/// Self-signed JWT addressed to the target service
#[derive(Debug, Clone)]
pub struct JwtAccessTokenSource {
    key: ServiceAccountKey,
    audience: String,
}

impl JwtAccessTokenSource {
    pub fn new(key: ServiceAccountKey, audience: impl Into<String>) -> Self {
        Self {
            key,
            audience: audience.into(),
        }
    }
}

#[async_trait]
impl TokenSource for JwtAccessTokenSource {
    fn name(&self) -> &'static str {
        "jwt_access"
    }

    async fn token(&self, _scope: Option<&str>) -> InteropResult<AccessToken> {
        let now = Utc::now();
        let claims = JwtAccessClaims {
            iss: self.key.client_email.clone(),
            sub: self.key.client_email.clone(),
            aud: self.audience.clone(),
            iat: now.timestamp(),
            exp: now.timestamp() + TOKEN_LIFETIME_SECS,
        };

        debug!(audience = %self.audience, "Signing JWT access token");

        let token = encode(&self.key.header(), &claims, &self.key.encoding_key()?)?;
        Ok(AccessToken {
            token,
            expires_at: Some(now + Duration::seconds(TOKEN_LIFETIME_SECS)),
        })
    }
}

/// Token for the compute instance's default service account
#[derive(Debug, Clone)]
pub struct MetadataServerTokenSource {
    host: String,
    http: reqwest::Client,
}

impl MetadataServerTokenSource {
    /// Use the metadata host from `GCE_METADATA_HOST`, or the well-known default
    pub fn new(http: reqwest::Client) -> Self {
        let host = std::env::var("GCE_METADATA_HOST")
            .unwrap_or_else(|_| DEFAULT_METADATA_HOST.to_string());
        Self::with_host(host, http)
    }

    pub fn with_host(host: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            host: host.into(),
            http,
        }
    }

    fn token_url(&self) -> String {
        format!(
            "http://{}/computeMetadata/v1/instance/service-accounts/default/token",
            self.host
        )
    }
}

#[async_trait]
impl TokenSource for MetadataServerTokenSource {
    fn name(&self) -> &'static str {
        "metadata_server"
    }

    async fn token(&self, scope: Option<&str>) -> InteropResult<AccessToken> {
        let mut request = self
            .http
            .get(self.token_url())
            .header("Metadata-Flavor", "Google");
        if let Some(scope) = scope {
            request = request.query(&[("scopes", scope)]);
        }

        debug!(host = %self.host, "Requesting token from metadata server");

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(InteropError::credential(format!(
                "Metadata server returned {}",
                response.status()
            )));
        }

        Ok(response.json::<TokenResponse>().await?.into_access_token())
    }
}

/// Hands out a fixed token
#[derive(Debug, Clone)]
pub struct StaticTokenSource {
    token: AccessToken,
}

impl StaticTokenSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: AccessToken::new(token),
        }
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn token(&self, _scope: Option<&str>) -> InteropResult<AccessToken> {
        Ok(self.token.clone())
    }
}

/// Resolve application default credentials
///
/// A service account key (from `key_file`, else `GOOGLE_APPLICATION_CREDENTIALS`)
/// wins; without one the metadata server is used.
pub fn application_default(
    key_file: Option<&Path>,
    http: reqwest::Client,
) -> InteropResult<Arc<dyn TokenSource>> {
    let env_path = std::env::var_os("GOOGLE_APPLICATION_CREDENTIALS");
    let key_path = key_file.or_else(|| env_path.as_deref().map(Path::new));

    match key_path {
        Some(path) => {
            let key = ServiceAccountKey::from_file(path)?;
            debug!(client_email = %key.client_email, "Application default: service account key");
            Ok(Arc::new(ServiceAccountTokenSource::new(key, http)))
        }
        None => {
            debug!("Application default: metadata server");
            Ok(Arc::new(MetadataServerTokenSource::new(http)))
        }
    }
}
