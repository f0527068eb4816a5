//! Unary call runners.

use tracing::{debug, info};

use super::RunContext;
use crate::error::{check, InteropResult};
use crate::payload::{verify_payload, zero_payload, LARGE_REQUEST_SIZE, LARGE_RESPONSE_SIZE};
use crate::proto::testing::{Empty, PayloadType, SimpleRequest, SimpleResponse};

/// Request for a 314159-byte compressable response, carrying 271828 zero bytes
pub fn large_unary_request() -> SimpleRequest {
    SimpleRequest {
        response_type: PayloadType::Compressable as i32,
        response_size: LARGE_RESPONSE_SIZE,
        payload: Some(zero_payload(LARGE_REQUEST_SIZE)),
        ..Default::default()
    }
}

/// Assert the response to [`large_unary_request`] carries the requested payload
pub fn verify_large_response(test_case: &str, response: &SimpleResponse) -> InteropResult<()> {
    verify_payload(
        test_case,
        response.payload.as_ref(),
        PayloadType::Compressable,
        LARGE_RESPONSE_SIZE as usize,
    )
}

pub async fn empty_unary(ctx: &RunContext) -> InteropResult<()> {
    let mut client = ctx.client.standard(&ctx.test_case)?;

    let response = client.empty_call(Empty {}).await?.into_inner();
    check(response == Empty {}, &ctx.test_case, || {
        format!("expected an empty response, got {:?}", response)
    })?;

    info!(test_case = %ctx.test_case, "Empty unary call completed");
    Ok(())
}

pub async fn large_unary(ctx: &RunContext) -> InteropResult<()> {
    let mut client = ctx.client.standard(&ctx.test_case)?;

    debug!(
        request_size = LARGE_REQUEST_SIZE,
        response_size = LARGE_RESPONSE_SIZE,
        "Sending large unary request"
    );

    let response = client.unary_call(large_unary_request()).await?.into_inner();
    verify_large_response(&ctx.test_case, &response)?;

    info!(test_case = %ctx.test_case, "Large unary call completed");
    Ok(())
}
