#![allow(dead_code)]

pub mod reference_server;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use interop_client::client::StandardClient;
use interop_client::config::{EXTRA_OAUTH_SCOPE, EXTRA_SERVICE_ACCOUNT};
use interop_client::credentials::{ChannelCredential, ResolvedCredentials};
use interop_client::{
    ClientCapability, ClientFactory, Orchestrator, RunRequest, StaticIdentityProvider, TestCatalog,
};

pub use reference_server::{spawn_reference_server, Behavior, ReferenceServerHandle, ServerIdentity};

pub const TEST_TOKEN: &str = "interop-test-token";
pub const TEST_SERVICE_ACCOUNT: &str = "interop-test@example.iam.gserviceaccount.com";
pub const TEST_OAUTH_SCOPE: &str = "https://www.googleapis.com/auth/xapi.zoo";
/// Scope the reference server reports, contained in [`TEST_OAUTH_SCOPE`]
pub const SERVER_OAUTH_SCOPE: &str = "xapi.zoo";

pub fn server_identity() -> ServerIdentity {
    ServerIdentity {
        token: TEST_TOKEN.to_string(),
        username: TEST_SERVICE_ACCOUNT.to_string(),
        oauth_scope: SERVER_OAUTH_SCOPE.to_string(),
    }
}

/// Orchestrator over the standard catalog whose identity provider hands out [`TEST_TOKEN`]
pub fn client_factory() -> ClientFactory {
    ClientFactory::new(Duration::from_secs(10), Duration::from_secs(5))
}

pub fn orchestrator_with_token(token: &str) -> Orchestrator {
    Orchestrator::new(
        Arc::new(TestCatalog::standard()),
        client_factory(),
        Arc::new(StaticIdentityProvider::new(token, TEST_SERVICE_ACCOUNT)),
    )
}

pub fn orchestrator() -> Orchestrator {
    orchestrator_with_token(TEST_TOKEN)
}

/// Plaintext run of `test_case` against `address`, with the auth parameters set
pub fn run_request(address: &str, test_case: &str) -> RunRequest {
    let extra_params: HashMap<String, String> = [
        (EXTRA_SERVICE_ACCOUNT, TEST_SERVICE_ACCOUNT),
        (EXTRA_OAUTH_SCOPE, TEST_OAUTH_SCOPE),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    RunRequest {
        address: address.to_string(),
        test_case: test_case.to_string(),
        extra_params,
        ..Default::default()
    }
}

pub async fn conformant_server() -> anyhow::Result<ReferenceServerHandle> {
    spawn_reference_server(Behavior::Conformant, server_identity()).await
}

/// Plaintext test service stub for driving runner helpers directly
pub async fn standard_client(address: &str) -> anyhow::Result<StandardClient> {
    let credentials = ResolvedCredentials::channel_only(ChannelCredential::Insecure);
    let client = client_factory()
        .build(ClientCapability::Standard, address, &credentials)
        .await?;
    Ok(client.standard("direct")?)
}
