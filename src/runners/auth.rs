//! Authentication runners.
//!
//! Every scenario sends the large unary request with `fill_username` and
//! `fill_oauth_scope` set and checks the identity the server reports back.
//! The channel already carries the credential for all scenarios except
//! `per_rpc_creds`, which resolves an OAuth2 token itself and attaches it to
//! the single call.

use tonic::Request;
use tracing::{debug, info};

use super::unary::{large_unary_request, verify_large_response};
use super::RunContext;
use crate::config::{EXTRA_OAUTH_SCOPE, EXTRA_SERVICE_ACCOUNT};
use crate::credentials::CredentialResolver;
use crate::error::{check, InteropResult};
use crate::proto::testing::{SimpleRequest, SimpleResponse};

fn auth_request() -> SimpleRequest {
    SimpleRequest {
        fill_username: true,
        fill_oauth_scope: true,
        ..large_unary_request()
    }
}

/// Assert the server saw `expected_user`, and a scope contained in `scope` when given
pub fn verify_identity(
    test_case: &str,
    response: &SimpleResponse,
    expected_user: &str,
    scope: Option<&str>,
) -> InteropResult<()> {
    verify_large_response(test_case, response)?;

    check(response.username == expected_user, test_case, || {
        format!(
            "server saw user {:?}, expected {:?}",
            response.username, expected_user
        )
    })?;

    if let Some(scope) = scope {
        check(
            !response.oauth_scope.is_empty() && scope.contains(&response.oauth_scope),
            test_case,
            || {
                format!(
                    "server saw scope {:?}, not part of {:?}",
                    response.oauth_scope, scope
                )
            },
        )?;
    }
    Ok(())
}

async fn auth_unary(ctx: &RunContext, request: Request<SimpleRequest>) -> InteropResult<SimpleResponse> {
    let mut client = ctx.client.standard(&ctx.test_case)?;
    Ok(client.unary_call(request).await?.into_inner())
}

pub async fn compute_engine_creds(ctx: &RunContext) -> InteropResult<()> {
    let expected_user = ctx.param(EXTRA_SERVICE_ACCOUNT)?;

    let response = auth_unary(ctx, Request::new(auth_request())).await?;
    verify_identity(&ctx.test_case, &response, expected_user, None)?;

    info!(test_case = %ctx.test_case, user = %response.username, "Compute engine credentials accepted");
    Ok(())
}

pub async fn service_account_creds(ctx: &RunContext) -> InteropResult<()> {
    let scope = ctx.param(EXTRA_OAUTH_SCOPE)?;
    let expected_user = ctx.identity.service_account_email()?;

    let response = auth_unary(ctx, Request::new(auth_request())).await?;
    verify_identity(&ctx.test_case, &response, &expected_user, Some(scope))?;

    info!(test_case = %ctx.test_case, user = %response.username, "Service account credentials accepted");
    Ok(())
}

pub async fn jwt_token_creds(ctx: &RunContext) -> InteropResult<()> {
    let expected_user = ctx.identity.service_account_email()?;

    let response = auth_unary(ctx, Request::new(auth_request())).await?;
    verify_identity(&ctx.test_case, &response, &expected_user, None)?;

    info!(test_case = %ctx.test_case, user = %response.username, "JWT token credentials accepted");
    Ok(())
}

pub async fn oauth2_auth_token(ctx: &RunContext) -> InteropResult<()> {
    let scope = ctx.param(EXTRA_OAUTH_SCOPE)?;
    let expected_user = ctx.identity.service_account_email()?;

    let response = auth_unary(ctx, Request::new(auth_request())).await?;
    verify_identity(&ctx.test_case, &response, &expected_user, Some(scope))?;

    info!(test_case = %ctx.test_case, user = %response.username, "OAuth2 token accepted");
    Ok(())
}

pub async fn per_rpc_creds(ctx: &RunContext) -> InteropResult<()> {
    let scope = ctx.param(EXTRA_OAUTH_SCOPE)?;
    let expected_user = ctx.identity.service_account_email()?;

    let credential = CredentialResolver::OAuth2AccessToken
        .resolve(ctx.identity.as_ref(), &ctx.credentials)
        .await?;

    let mut request = Request::new(auth_request());
    credential.apply(&mut request)?;
    debug!("Attached per-call credential");

    let response = auth_unary(ctx, request).await?;
    verify_identity(&ctx.test_case, &response, &expected_user, Some(scope))?;

    info!(test_case = %ctx.test_case, user = %response.username, "Per-call credentials accepted");
    Ok(())
}
