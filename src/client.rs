//! # Interop Client Construction
//!
//! Builds the tonic channel for a run (plaintext or TLS, optionally pinned to
//! a test CA and with a server name override) and wraps it in the client stub
//! a test case's capability calls for.

use std::time::Duration;

use tonic::{
    metadata::{Ascii, MetadataValue},
    service::{interceptor::InterceptedService, Interceptor},
    transport::{Certificate, Channel, ClientTlsConfig, Endpoint, Uri},
    Request, Status,
};
use tracing::debug;

use crate::credentials::{CallCredential, ChannelCredential, ResolvedCredentials};
use crate::error::{InteropError, InteropResult};
use crate::proto::client::{TestServiceClient, UnimplementedServiceClient};

/// Channel wrapped with the channel-level call credential, if any
pub type AuthChannel = InterceptedService<Channel, AuthInterceptor>;

/// Stub for the full test service
pub type StandardClient = TestServiceClient<AuthChannel>;

/// Stub for a service the server does not expose
pub type UnimplementedEndpointClient = UnimplementedServiceClient<AuthChannel>;

/// Which client stub a test case needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientCapability {
    Standard,
    UnimplementedEndpoint,
}

impl ClientCapability {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientCapability::Standard => "standard",
            ClientCapability::UnimplementedEndpoint => "unimplemented_endpoint",
        }
    }
}

/// gRPC interceptor adding `authorization: Bearer <token>` to every call
#[derive(Debug, Clone)]
pub struct AuthInterceptor {
    authorization: Option<MetadataValue<Ascii>>,
}

impl AuthInterceptor {
    /// Interceptor carrying `credential`; fails if the token is not a valid header value
    pub fn new(credential: Option<&CallCredential>) -> InteropResult<Self> {
        let authorization = credential.map(CallCredential::header_value).transpose()?;
        Ok(Self { authorization })
    }

    /// Interceptor that leaves requests untouched
    #[must_use]
    pub fn none() -> Self {
        Self {
            authorization: None,
        }
    }
}

impl Interceptor for AuthInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        if let Some(ref value) = self.authorization {
            request
                .metadata_mut()
                .insert("authorization", value.clone());
        }
        Ok(request)
    }
}

/// Client built for a test case, tagged by capability
#[derive(Debug, Clone)]
pub enum InteropClient {
    /// Test service stub and the channel under it, for calls the stub cannot shape
    Standard(StandardClient, AuthChannel),
    UnimplementedEndpoint(UnimplementedEndpointClient),
}

impl InteropClient {
    #[must_use]
    pub fn capability(&self) -> ClientCapability {
        match self {
            InteropClient::Standard(..) => ClientCapability::Standard,
            InteropClient::UnimplementedEndpoint(_) => ClientCapability::UnimplementedEndpoint,
        }
    }

    /// The test service stub, or an assertion failure naming `test_case`
    pub fn standard(&self, test_case: &str) -> InteropResult<StandardClient> {
        match self {
            InteropClient::Standard(client, _) => Ok(client.clone()),
            other => Err(InteropError::assertion(
                test_case,
                format!(
                    "requires a standard client, got {}",
                    other.capability().as_str()
                ),
            )),
        }
    }

    /// Channel under the test service stub, or an assertion failure naming `test_case`
    pub fn standard_channel(&self, test_case: &str) -> InteropResult<AuthChannel> {
        match self {
            InteropClient::Standard(_, channel) => Ok(channel.clone()),
            other => Err(InteropError::assertion(
                test_case,
                format!(
                    "requires a standard client, got {}",
                    other.capability().as_str()
                ),
            )),
        }
    }

    /// The unimplemented-service stub, or an assertion failure naming `test_case`
    pub fn unimplemented_endpoint(
        &self,
        test_case: &str,
    ) -> InteropResult<UnimplementedEndpointClient> {
        match self {
            InteropClient::UnimplementedEndpoint(client) => Ok(client.clone()),
            other => Err(InteropError::assertion(
                test_case,
                format!(
                    "requires an unimplemented-endpoint client, got {}",
                    other.capability().as_str()
                ),
            )),
        }
    }
}

/// Builds channels and client stubs
#[derive(Debug, Clone)]
pub struct ClientFactory {
    /// Request timeout applied to every call on the channel
    pub timeout: Duration,
    /// Connection timeout
    pub connect_timeout: Duration,
}

impl Default for ClientFactory {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl ClientFactory {
    #[must_use]
    pub fn new(timeout: Duration, connect_timeout: Duration) -> Self {
        Self {
            timeout,
            connect_timeout,
        }
    }

    /// Configure an endpoint for `address` (`host:port`) secured by `credential`
    pub fn endpoint(&self, address: &str, credential: &ChannelCredential) -> InteropResult<Endpoint> {
        let url = format!("{}://{}", credential.scheme(), address);
        let mut endpoint = Endpoint::from_shared(url.clone()).map_err(|e| {
            InteropError::config_error(format!("Invalid gRPC endpoint '{}': {}", url, e))
        })?;

        endpoint = endpoint
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout);

        if let ChannelCredential::Tls {
            ca_pem,
            server_name_override,
        } = credential
        {
            let mut tls = match ca_pem {
                Some(pem) => ClientTlsConfig::new().ca_certificate(Certificate::from_pem(pem)),
                None => ClientTlsConfig::new().with_native_roots(),
            };

            if let Some(name) = server_name_override {
                tls = tls.domain_name(name.clone());

                let origin = format!("https://{}", name).parse::<Uri>().map_err(|e| {
                    InteropError::config_error(format!(
                        "Invalid server host override '{}': {}",
                        name, e
                    ))
                })?;
                endpoint = endpoint.origin(origin);
            }

            endpoint = endpoint.tls_config(tls).map_err(|e| {
                InteropError::config_error(format!("Invalid TLS configuration: {}", e))
            })?;
        }

        Ok(endpoint)
    }

    /// Connect a channel to `address`
    pub async fn connect(
        &self,
        address: &str,
        credential: &ChannelCredential,
    ) -> InteropResult<Channel> {
        let endpoint = self.endpoint(address, credential)?;

        debug!(endpoint = %address, credential = ?credential, "Connecting to interop server");

        endpoint
            .connect()
            .await
            .map_err(|e| InteropError::Connect {
                endpoint: address.to_string(),
                reason: format!("Failed to connect: {}", e),
            })
    }

    /// Build the client stub `capability` requires, using `credentials`
    pub async fn build(
        &self,
        capability: ClientCapability,
        address: &str,
        credentials: &ResolvedCredentials,
    ) -> InteropResult<InteropClient> {
        let channel = self.connect(address, &credentials.channel).await?;
        let interceptor = AuthInterceptor::new(credentials.call.as_ref())?;

        debug!(
            capability = capability.as_str(),
            call_credential = credentials.call.is_some(),
            "Building interop client"
        );

        Ok(match capability {
            ClientCapability::Standard => {
                let channel = InterceptedService::new(channel, interceptor);
                InteropClient::Standard(TestServiceClient::new(channel.clone()), channel)
            }
            ClientCapability::UnimplementedEndpoint => InteropClient::UnimplementedEndpoint(
                UnimplementedServiceClient::with_interceptor(channel, interceptor),
            ),
        })
    }
}
