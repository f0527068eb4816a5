//! # Call Pattern Runners
//!
//! One procedure per RPC interaction shape, plus the specialised scenarios
//! for cancellation, deadlines, metadata echo, status propagation,
//! unimplemented endpoints and authentication. Each runner drives the client
//! it is handed through a single scenario and resolves to `Ok(())` once every
//! expected confirmation has arrived, or to the first failure.

pub mod auth;
pub mod cancel;
pub mod metadata;
pub mod status;
pub mod streaming;
pub mod unary;
pub mod unimplemented;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::client::InteropClient;
use crate::credentials::{CredentialContext, IdentityProvider};
use crate::error::{InteropError, InteropResult};

/// Everything a runner receives for one test invocation
#[derive(Clone)]
pub struct RunContext {
    /// Catalog name of the scenario, used in assertion messages
    pub test_case: String,
    /// Client of the capability the scenario declared
    pub client: InteropClient,
    /// Caller-supplied parameters (`service_account`, `oauth_scope`)
    pub extra_params: HashMap<String, String>,
    /// Identity provider for scenarios that resolve credentials themselves
    pub identity: Arc<dyn IdentityProvider>,
    /// Scope and audience for credential resolution
    pub credentials: CredentialContext,
}

impl RunContext {
    /// Required extra parameter `key`
    pub fn param(&self, key: &str) -> InteropResult<&str> {
        self.extra_params
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| {
                InteropError::config_error(format!(
                    "{} requires the '{}' parameter",
                    self.test_case, key
                ))
            })
    }
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("test_case", &self.test_case)
            .field("capability", &self.client.capability())
            .field("extra_params", &self.extra_params)
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

/// The interaction a catalog entry drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallPatternRunner {
    EmptyUnary,
    LargeUnary,
    ClientStreaming,
    ServerStreaming,
    PingPong,
    EmptyStream,
    CancelAfterBegin,
    CancelAfterFirstResponse,
    TimeoutOnSleepingServer,
    CustomMetadata,
    StatusCodeAndMessage,
    SpecialStatusMessage,
    UnimplementedMethod,
    UnimplementedService,
    ComputeEngineCreds,
    ServiceAccountCreds,
    JwtTokenCreds,
    OAuth2AuthToken,
    PerRpcCreds,
}

impl CallPatternRunner {
    /// Drive the scenario to completion
    pub async fn run(self, ctx: RunContext) -> InteropResult<()> {
        match self {
            CallPatternRunner::EmptyUnary => unary::empty_unary(&ctx).await,
            CallPatternRunner::LargeUnary => unary::large_unary(&ctx).await,
            CallPatternRunner::ClientStreaming => streaming::client_streaming(&ctx).await,
            CallPatternRunner::ServerStreaming => streaming::server_streaming(&ctx).await,
            CallPatternRunner::PingPong => streaming::ping_pong(&ctx).await,
            CallPatternRunner::EmptyStream => streaming::empty_stream(&ctx).await,
            CallPatternRunner::CancelAfterBegin => cancel::cancel_after_begin(&ctx).await,
            CallPatternRunner::CancelAfterFirstResponse => {
                cancel::cancel_after_first_response(&ctx).await
            }
            CallPatternRunner::TimeoutOnSleepingServer => {
                cancel::timeout_on_sleeping_server(&ctx).await
            }
            CallPatternRunner::CustomMetadata => metadata::custom_metadata(&ctx).await,
            CallPatternRunner::StatusCodeAndMessage => status::status_code_and_message(&ctx).await,
            CallPatternRunner::SpecialStatusMessage => status::special_status_message(&ctx).await,
            CallPatternRunner::UnimplementedMethod => {
                unimplemented::unimplemented_method(&ctx).await
            }
            CallPatternRunner::UnimplementedService => {
                unimplemented::unimplemented_service(&ctx).await
            }
            CallPatternRunner::ComputeEngineCreds => auth::compute_engine_creds(&ctx).await,
            CallPatternRunner::ServiceAccountCreds => auth::service_account_creds(&ctx).await,
            CallPatternRunner::JwtTokenCreds => auth::jwt_token_creds(&ctx).await,
            CallPatternRunner::OAuth2AuthToken => auth::oauth2_auth_token(&ctx).await,
            CallPatternRunner::PerRpcCreds => auth::per_rpc_creds(&ctx).await,
        }
    }
}
