//! # Credentials
//!
//! Channel credentials (insecure or TLS), call credentials (a bearer token
//! attached per call or per channel) and the resolvers that turn a test
//! case's identity requirement into a concrete call credential.
//!
//! Token acquisition goes through an [`IdentityProvider`], so callers can
//! swap the cloud-backed [`GoogleIdentityProvider`] for a
//! [`StaticIdentityProvider`] when no real identity service is reachable.

pub mod token_source;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tonic::metadata::{Ascii, MetadataValue};
use tonic::Request;
use tracing::debug;

use crate::error::{InteropError, InteropResult};

pub use token_source::{
    application_default, AccessToken, JwtAccessTokenSource, MetadataServerTokenSource,
    ServiceAccountKey, ServiceAccountTokenSource, StaticTokenSource, TokenSource,
};

/// Transport security for the channel
#[derive(Clone, PartialEq, Eq)]
pub enum ChannelCredential {
    /// Plaintext HTTP/2
    Insecure,
    /// TLS, optionally trusting a specific CA and overriding the verified name
    Tls {
        ca_pem: Option<Vec<u8>>,
        server_name_override: Option<String>,
    },
}

impl ChannelCredential {
    #[must_use]
    pub fn is_tls(&self) -> bool {
        matches!(self, ChannelCredential::Tls { .. })
    }

    /// URI scheme matching this credential
    #[must_use]
    pub fn scheme(&self) -> &'static str {
        if self.is_tls() {
            "https"
        } else {
            "http"
        }
    }
}

impl fmt::Debug for ChannelCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelCredential::Insecure => write!(f, "Insecure"),
            ChannelCredential::Tls {
                ca_pem,
                server_name_override,
            } => f
                .debug_struct("Tls")
                .field("custom_ca", &ca_pem.is_some())
                .field("server_name_override", server_name_override)
                .finish(),
        }
    }
}

/// Bearer token attached as `authorization` metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallCredential {
    token: AccessToken,
}

impl CallCredential {
    pub fn bearer(token: AccessToken) -> Self {
        Self { token }
    }

    pub fn token(&self) -> &AccessToken {
        &self.token
    }

    /// The `authorization` header value
    pub fn header_value(&self) -> InteropResult<MetadataValue<Ascii>> {
        format!("Bearer {}", self.token.token)
            .parse::<MetadataValue<Ascii>>()
            .map_err(|e| InteropError::credential(format!("Invalid bearer token: {}", e)))
    }

    /// Attach this credential to a single request
    pub fn apply<T>(&self, request: &mut Request<T>) -> InteropResult<()> {
        let value = self.header_value()?;
        request.metadata_mut().insert("authorization", value);
        Ok(())
    }
}

/// Channel credential plus an optional credential attached to every call
#[derive(Debug, Clone)]
pub struct ResolvedCredentials {
    pub channel: ChannelCredential,
    pub call: Option<CallCredential>,
}

impl ResolvedCredentials {
    /// Base channel credential without any call credential
    pub fn channel_only(channel: ChannelCredential) -> Self {
        Self {
            channel,
            call: None,
        }
    }

    /// Combine the base channel credential with a call credential
    pub fn combined(channel: ChannelCredential, call: CallCredential) -> Self {
        Self {
            channel,
            call: Some(call),
        }
    }
}

/// Inputs a resolver may need
#[derive(Debug, Clone, Default)]
pub struct CredentialContext {
    /// OAuth scope requested for the token, if any
    pub scope: Option<String>,
    /// Audience for self-signed tokens (the target service URL)
    pub audience: String,
}

impl CredentialContext {
    /// Audience for a service on `host`
    pub fn service_audience(host: &str) -> String {
        format!("https://{}/grpc.testing.TestService", host)
    }
}

/// Identity requirement of a test case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialResolver {
    /// Whatever the environment provides (key file or metadata server)
    ApplicationDefault,
    /// Self-signed JWT from the service account key
    JwtAccess,
    /// OAuth2 access token fetched up front from the service account key
    OAuth2AccessToken,
}

impl CredentialResolver {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialResolver::ApplicationDefault => "application_default",
            CredentialResolver::JwtAccess => "jwt_access",
            CredentialResolver::OAuth2AccessToken => "oauth2_access_token",
        }
    }

    /// Produce the call credential for this requirement
    pub async fn resolve(
        &self,
        provider: &dyn IdentityProvider,
        context: &CredentialContext,
    ) -> InteropResult<CallCredential> {
        let source = provider.token_source(*self, context)?;

        debug!(
            resolver = self.as_str(),
            source = source.name(),
            scope = ?context.scope,
            "Resolving call credential"
        );

        let token = source.token(context.scope.as_deref()).await?;
        if token.is_expired() {
            return Err(InteropError::credential(format!(
                "{} returned a token that has already expired",
                source.name()
            )));
        }
        Ok(CallCredential::bearer(token))
    }
}

impl fmt::Display for CredentialResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chooses the token source behind each credential resolver
pub trait IdentityProvider: Send + Sync + fmt::Debug {
    fn token_source(
        &self,
        resolver: CredentialResolver,
        context: &CredentialContext,
    ) -> InteropResult<Arc<dyn TokenSource>>;

    /// Email of the service account the tokens identify
    fn service_account_email(&self) -> InteropResult<String>;
}

/// Provider backed by service account keys and the metadata server
#[derive(Debug, Clone)]
pub struct GoogleIdentityProvider {
    key_file: Option<PathBuf>,
    http: reqwest::Client,
}

impl GoogleIdentityProvider {
    pub fn new(key_file: Option<PathBuf>) -> Self {
        Self {
            key_file,
            http: reqwest::Client::new(),
        }
    }

    fn service_account_key(&self) -> InteropResult<ServiceAccountKey> {
        let env_path = std::env::var_os("GOOGLE_APPLICATION_CREDENTIALS").map(PathBuf::from);
        let path = self.key_file.clone().or(env_path).ok_or_else(|| {
            InteropError::credential(
                "A service account key file is required (service_account_key_file or GOOGLE_APPLICATION_CREDENTIALS)",
            )
        })?;
        ServiceAccountKey::from_file(&path)
    }
}

impl IdentityProvider for GoogleIdentityProvider {
    fn token_source(
        &self,
        resolver: CredentialResolver,
        context: &CredentialContext,
    ) -> InteropResult<Arc<dyn TokenSource>> {
        match resolver {
            CredentialResolver::ApplicationDefault => {
                application_default(self.key_file.as_deref(), self.http.clone())
            }
            CredentialResolver::JwtAccess => Ok(Arc::new(JwtAccessTokenSource::new(
                self.service_account_key()?,
                context.audience.clone(),
            ))),
            CredentialResolver::OAuth2AccessToken => Ok(Arc::new(
                ServiceAccountTokenSource::new(self.service_account_key()?, self.http.clone()),
            )),
        }
    }

    fn service_account_email(&self) -> InteropResult<String> {
        Ok(self.service_account_key()?.client_email)
    }
}

/// Provider that answers every resolver with the same token
#[derive(Debug, Clone)]
pub struct StaticIdentityProvider {
    source: Arc<StaticTokenSource>,
    email: String,
}

impl StaticIdentityProvider {
    pub fn new(token: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            source: Arc::new(StaticTokenSource::new(token)),
            email: email.into(),
        }
    }
}

impl IdentityProvider for StaticIdentityProvider {
    fn token_source(
        &self,
        _resolver: CredentialResolver,
        _context: &CredentialContext,
    ) -> InteropResult<Arc<dyn TokenSource>> {
        Ok(self.source.clone())
    }

    fn service_account_email(&self) -> InteropResult<String> {
        Ok(self.email.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_credential_sets_authorization() {
        let credential = CallCredential::bearer(AccessToken::new("abc123"));
        let mut request = Request::new(());
        credential.apply(&mut request).unwrap();

        let value = request.metadata().get("authorization").unwrap();
        assert_eq!(value.to_str().unwrap(), "Bearer abc123");
    }

    #[test]
    fn test_call_credential_rejects_invalid_token() {
        let credential = CallCredential::bearer(AccessToken::new("bad\ntoken"));
        let mut request = Request::new(());
        assert!(matches!(
            credential.apply(&mut request),
            Err(InteropError::Credential(_))
        ));
    }

    #[test]
    fn test_channel_credential_scheme() {
        assert_eq!(ChannelCredential::Insecure.scheme(), "http");
        let tls = ChannelCredential::Tls {
            ca_pem: None,
            server_name_override: Some("foo.test.google.fr".to_string()),
        };
        assert!(tls.is_tls());
        assert_eq!(tls.scheme(), "https");
    }

    #[test]
    fn test_service_audience() {
        assert_eq!(
            CredentialContext::service_audience("example.com"),
            "https://example.com/grpc.testing.TestService"
        );
    }

    #[tokio::test]
    async fn test_resolve_with_static_provider() {
        let provider = StaticIdentityProvider::new("static-token", "svc@example.com");
        assert_eq!(provider.service_account_email().unwrap(), "svc@example.com");
        let context = CredentialContext {
            scope: Some("https://www.googleapis.com/auth/xapi.zoo".to_string()),
            audience: CredentialContext::service_audience("localhost"),
        };

        for resolver in [
            CredentialResolver::ApplicationDefault,
            CredentialResolver::JwtAccess,
            CredentialResolver::OAuth2AccessToken,
        ] {
            let credential = resolver.resolve(&provider, &context).await.unwrap();
            assert_eq!(credential.token().token, "static-token");
        }
    }

    #[derive(Debug)]
    struct ExpiredTokenSource;

    #[async_trait::async_trait]
    impl TokenSource for ExpiredTokenSource {
        fn name(&self) -> &'static str {
            "expired"
        }

        async fn token(&self, _scope: Option<&str>) -> InteropResult<AccessToken> {
            Ok(AccessToken {
                token: "stale".to_string(),
                expires_at: Some(chrono::Utc::now() - chrono::Duration::minutes(5)),
            })
        }
    }

    #[derive(Debug)]
    struct ExpiredProvider;

    impl IdentityProvider for ExpiredProvider {
        fn token_source(
            &self,
            _resolver: CredentialResolver,
            _context: &CredentialContext,
        ) -> InteropResult<Arc<dyn TokenSource>> {
            Ok(Arc::new(ExpiredTokenSource))
        }

        fn service_account_email(&self) -> InteropResult<String> {
            Ok("svc@example.com".to_string())
        }
    }

    #[tokio::test]
    async fn test_resolve_rejects_expired_token() {
        let result = CredentialResolver::OAuth2AccessToken
            .resolve(&ExpiredProvider, &CredentialContext::default())
            .await;
        match result {
            Err(InteropError::Credential(message)) => assert!(message.contains("expired")),
            other => panic!("expected a credential error, got {other:?}"),
        }
    }

    #[test]
    fn test_google_provider_jwt_requires_key() {
        let provider =
            GoogleIdentityProvider::new(Some(PathBuf::from("/nonexistent/interop-key.json")));
        let result =
            provider.token_source(CredentialResolver::JwtAccess, &CredentialContext::default());
        assert!(matches!(result, Err(InteropError::Credential(_))));
        assert!(provider.service_account_email().is_err());
    }
}
