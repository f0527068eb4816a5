//! # Orchestrator
//!
//! Runs one named test case end to end:
//!
//! 1. build the base channel credential (insecure or TLS, optionally pinned
//!    to the test CA and with a server name override),
//! 2. look the case up and, if it declares a credential resolver, resolve it
//!    and combine it with the base credential,
//! 3. build the client of the capability the case requires,
//! 4. drive the case's runner and report its outcome.
//!
//! A resolution or connection failure ends the run before any RPC is made.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::catalog::TestCatalog;
use crate::client::ClientFactory;
use crate::config::{InteropConfig, EXTRA_OAUTH_SCOPE, TEST_CA_SERVER_NAME};
use crate::credentials::{
    ChannelCredential, CredentialContext, GoogleIdentityProvider, IdentityProvider,
    ResolvedCredentials,
};
use crate::error::{InteropError, InteropResult};
use crate::runners::RunContext;

/// Inputs of a single run
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    /// `host:port` of the server
    pub address: String,
    /// TLS server name and authority override
    pub host_override: Option<String>,
    pub test_case: String,
    pub use_tls: bool,
    /// Trust this PEM root instead of the native roots
    pub test_ca_pem: Option<Vec<u8>>,
    /// Parameters passed through to the runner
    pub extra_params: HashMap<String, String>,
}

impl RunRequest {
    /// Build a request from configuration, reading the test CA when it is used
    pub fn from_config(config: &InteropConfig) -> InteropResult<Self> {
        config.validate()?;

        let test_ca_pem = if config.use_test_ca {
            Some(std::fs::read(&config.test_ca_file).map_err(|e| {
                InteropError::config_error(format!(
                    "Failed to read test CA {}: {}",
                    config.test_ca_file.display(),
                    e
                ))
            })?)
        } else {
            None
        };

        Ok(Self {
            address: config.address(),
            host_override: config.effective_host_override(),
            test_case: config.test_case.clone(),
            use_tls: config.use_tls,
            test_ca_pem,
            extra_params: config.extra_params(),
        })
    }

    /// Base channel credential for this request
    pub fn channel_credential(&self) -> ChannelCredential {
        if !self.use_tls {
            return ChannelCredential::Insecure;
        }
        let server_name_override = match (&self.host_override, &self.test_ca_pem) {
            (Some(host), _) => Some(host.clone()),
            (None, Some(_)) => Some(TEST_CA_SERVER_NAME.to_string()),
            (None, None) => None,
        };
        ChannelCredential::Tls {
            ca_pem: self.test_ca_pem.clone(),
            server_name_override,
        }
    }

    fn credential_context(&self) -> CredentialContext {
        let host = self
            .host_override
            .clone()
            .unwrap_or_else(|| host_of(&self.address).to_string());
        CredentialContext {
            scope: self.extra_params.get(EXTRA_OAUTH_SCOPE).cloned(),
            audience: CredentialContext::service_audience(&host),
        }
    }
}

fn host_of(address: &str) -> &str {
    address
        .rsplit_once(':')
        .map_or(address, |(host, _port)| host)
}

/// Outcome of a passing run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestReport {
    pub name: String,
    pub elapsed: Duration,
}

/// Resolves credentials, builds clients and drives catalog runners
#[derive(Debug, Clone)]
pub struct Orchestrator {
    catalog: Arc<TestCatalog>,
    factory: ClientFactory,
    identity: Arc<dyn IdentityProvider>,
}

impl Orchestrator {
    pub fn new(
        catalog: Arc<TestCatalog>,
        factory: ClientFactory,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            catalog,
            factory,
            identity,
        }
    }

    /// Orchestrator over the standard catalog, with timeouts and identity taken from `config`
    pub fn from_config(config: &InteropConfig) -> Self {
        Self::new(
            Arc::new(TestCatalog::standard()),
            ClientFactory::new(config.timeout(), config.connect_timeout()),
            Arc::new(GoogleIdentityProvider::new(
                config.service_account_key_file.clone(),
            )),
        )
    }

    pub fn catalog(&self) -> &TestCatalog {
        &self.catalog
    }

    /// Run `request.test_case` to completion
    pub async fn run_test(&self, request: RunRequest) -> InteropResult<TestReport> {
        let started = Instant::now();
        let base = request.channel_credential();

        let descriptor = self.catalog.lookup(&request.test_case)?;

        for key in descriptor.extra_params {
            if !request.extra_params.contains_key(*key) {
                return Err(InteropError::config_error(format!(
                    "{} requires the '{}' parameter",
                    descriptor.name, key
                )));
            }
        }

        let credential_context = request.credential_context();

        let credentials = match descriptor.credential_resolver {
            Some(resolver) => {
                debug!(test_case = descriptor.name, resolver = %resolver, "Resolving credentials");
                let call = resolver
                    .resolve(self.identity.as_ref(), &credential_context)
                    .await
                    .inspect_err(|e| {
                        warn!(test_case = descriptor.name, error = %e, "Credential resolution failed")
                    })?;
                ResolvedCredentials::combined(base, call)
            }
            None => ResolvedCredentials::channel_only(base),
        };

        let client = self
            .factory
            .build(descriptor.capability, &request.address, &credentials)
            .await?;

        info!(
            test_case = descriptor.name,
            endpoint = %request.address,
            tls = credentials.channel.is_tls(),
            "Running interop test"
        );

        let context = RunContext {
            test_case: descriptor.name.to_string(),
            client,
            extra_params: request.extra_params,
            identity: self.identity.clone(),
            credentials: credential_context,
        };

        descriptor.runner.run(context).await?;

        let report = TestReport {
            name: descriptor.name.to_string(),
            elapsed: started.elapsed(),
        };
        info!(
            test_case = %report.name,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Interop test passed"
        );
        Ok(report)
    }
}
