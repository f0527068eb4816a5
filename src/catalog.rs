//! # Test Catalog
//!
//! Read-only registry mapping each interop test case name to its descriptor:
//! the runner that drives it, the client capability it needs, the credential
//! it resolves before the client is built, and the caller parameters it
//! reads.
//!
//! ## Usage
//!
//! ```rust
//! use interop_client::catalog::TestCatalog;
//! use interop_client::client::ClientCapability;
//!
//! let catalog = TestCatalog::standard();
//! let descriptor = catalog.lookup("unimplemented_service").unwrap();
//! assert_eq!(descriptor.capability, ClientCapability::UnimplementedEndpoint);
//! assert!(catalog.lookup("no_such_case").is_err());
//! ```

use std::collections::BTreeMap;

use crate::client::ClientCapability;
use crate::config::{EXTRA_OAUTH_SCOPE, EXTRA_SERVICE_ACCOUNT};
use crate::credentials::CredentialResolver;
use crate::error::{InteropError, InteropResult};
use crate::runners::CallPatternRunner;

/// Everything the orchestrator needs to run one named test case
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCaseDescriptor {
    pub name: &'static str,
    pub runner: CallPatternRunner,
    pub capability: ClientCapability,
    /// Credential combined with the channel before the client is built
    pub credential_resolver: Option<CredentialResolver>,
    /// Caller parameters the runner reads
    pub extra_params: &'static [&'static str],
}

impl TestCaseDescriptor {
    /// Descriptor for a standard-client case with no credential or parameters
    pub const fn plain(name: &'static str, runner: CallPatternRunner) -> Self {
        Self {
            name,
            runner,
            capability: ClientCapability::Standard,
            credential_resolver: None,
            extra_params: &[],
        }
    }

    /// Descriptor for an authenticated case
    pub const fn authenticated(
        name: &'static str,
        runner: CallPatternRunner,
        credential_resolver: Option<CredentialResolver>,
        extra_params: &'static [&'static str],
    ) -> Self {
        Self {
            name,
            runner,
            capability: ClientCapability::Standard,
            credential_resolver,
            extra_params,
        }
    }
}

const STANDARD_CASES: &[TestCaseDescriptor] = &[
    TestCaseDescriptor::plain("empty_unary", CallPatternRunner::EmptyUnary),
    TestCaseDescriptor::plain("large_unary", CallPatternRunner::LargeUnary),
    TestCaseDescriptor::plain("client_streaming", CallPatternRunner::ClientStreaming),
    TestCaseDescriptor::plain("server_streaming", CallPatternRunner::ServerStreaming),
    TestCaseDescriptor::plain("ping_pong", CallPatternRunner::PingPong),
    TestCaseDescriptor::plain("empty_stream", CallPatternRunner::EmptyStream),
    TestCaseDescriptor::plain("cancel_after_begin", CallPatternRunner::CancelAfterBegin),
    TestCaseDescriptor::plain(
        "cancel_after_first_response",
        CallPatternRunner::CancelAfterFirstResponse,
    ),
    TestCaseDescriptor::plain(
        "timeout_on_sleeping_server",
        CallPatternRunner::TimeoutOnSleepingServer,
    ),
    TestCaseDescriptor::plain("custom_metadata", CallPatternRunner::CustomMetadata),
    TestCaseDescriptor::plain(
        "status_code_and_message",
        CallPatternRunner::StatusCodeAndMessage,
    ),
    TestCaseDescriptor::plain(
        "special_status_message",
        CallPatternRunner::SpecialStatusMessage,
    ),
    TestCaseDescriptor::plain("unimplemented_method", CallPatternRunner::UnimplementedMethod),
    TestCaseDescriptor {
        name: "unimplemented_service",
        runner: CallPatternRunner::UnimplementedService,
        capability: ClientCapability::UnimplementedEndpoint,
        credential_resolver: None,
        extra_params: &[],
    },
    TestCaseDescriptor::authenticated(
        "compute_engine_creds",
        CallPatternRunner::ComputeEngineCreds,
        Some(CredentialResolver::ApplicationDefault),
        &[EXTRA_SERVICE_ACCOUNT],
    ),
    TestCaseDescriptor::authenticated(
        "service_account_creds",
        CallPatternRunner::ServiceAccountCreds,
        Some(CredentialResolver::ApplicationDefault),
        &[EXTRA_OAUTH_SCOPE],
    ),
    TestCaseDescriptor::authenticated(
        "jwt_token_creds",
        CallPatternRunner::JwtTokenCreds,
        Some(CredentialResolver::JwtAccess),
        &[],
    ),
    TestCaseDescriptor::authenticated(
        "oauth2_auth_token",
        CallPatternRunner::OAuth2AuthToken,
        Some(CredentialResolver::OAuth2AccessToken),
        &[EXTRA_OAUTH_SCOPE],
    ),
    TestCaseDescriptor::authenticated(
        "per_rpc_creds",
        CallPatternRunner::PerRpcCreds,
        None,
        &[EXTRA_OAUTH_SCOPE],
    ),
];

/// Immutable name-to-descriptor registry
#[derive(Debug, Clone)]
pub struct TestCatalog {
    entries: BTreeMap<&'static str, TestCaseDescriptor>,
}

impl TestCatalog {
    /// The full interop catalog
    pub fn standard() -> Self {
        Self::from_descriptors(STANDARD_CASES.iter().cloned())
    }

    /// Catalog holding exactly `descriptors`; a later duplicate name replaces an earlier one
    pub fn from_descriptors(descriptors: impl IntoIterator<Item = TestCaseDescriptor>) -> Self {
        let entries = descriptors
            .into_iter()
            .map(|descriptor| (descriptor.name, descriptor))
            .collect();
        Self { entries }
    }

    /// Descriptor registered under `name`
    pub fn lookup(&self, name: &str) -> InteropResult<&TestCaseDescriptor> {
        self.entries
            .get(name)
            .ok_or_else(|| InteropError::UnknownTestCase(name.to_string()))
    }

    /// Registered names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &TestCaseDescriptor> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for TestCatalog {
    fn default() -> Self {
        Self::standard()
    }
}
